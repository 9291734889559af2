// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup directories: one per snapshot, addressed by timestamp, with a
//! `metadata.json` sidecar mirroring directory state.

use std::path::{Path, PathBuf};

use botd_core::BackupMetadata;
use tracing::warn;

use super::SafetyError;

const SIDECAR: &str = "metadata.json";

/// Copy `source_dir` into `{backups_dir}/{at_ms}/` and write the sidecar.
///
/// The sidecar is written last: a backup interrupted mid-copy has no
/// sidecar and therefore reads back as corrupted instead of restorable.
pub(super) fn create(
    backups_dir: &Path,
    at_ms: u64,
    version: String,
    source_dir: &Path,
) -> Result<BackupMetadata, SafetyError> {
    let dir = backups_dir.join(at_ms.to_string());
    std::fs::create_dir_all(&dir)?;

    let size_bytes = copy_dir(source_dir, &dir)?;

    let metadata = BackupMetadata { at_ms, version, path: dir.clone(), size_bytes };
    let payload = serde_json::to_vec_pretty(&metadata)?;
    std::fs::write(dir.join(SIDECAR), payload)?;
    Ok(metadata)
}

/// Restore backup `at_ms` into `dest_dir`.
pub(super) fn restore(
    backups_dir: &Path,
    at_ms: u64,
    dest_dir: &Path,
) -> Result<BackupMetadata, SafetyError> {
    let dir = backups_dir.join(at_ms.to_string());
    if !dir.is_dir() {
        return Err(SafetyError::RollbackUnavailable(at_ms));
    }

    let metadata = read_sidecar(&dir)
        .map_err(|detail| SafetyError::RollbackCorrupted(at_ms, detail))?;

    std::fs::create_dir_all(dest_dir)?;
    copy_dir_excluding_sidecar(&dir, dest_dir)?;
    Ok(metadata)
}

/// All backups with readable sidecars, newest first.
pub(super) fn list(backups_dir: &Path) -> Vec<BackupMetadata> {
    let mut backups = Vec::new();
    let entries = match std::fs::read_dir(backups_dir) {
        Ok(entries) => entries,
        Err(_) => return backups,
    };
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        match read_sidecar(&dir) {
            Ok(metadata) => backups.push(metadata),
            Err(detail) => {
                warn!(dir = %dir.display(), detail, "skipping backup with unreadable sidecar");
            }
        }
    }
    backups.sort_by(|a, b| b.at_ms.cmp(&a.at_ms));
    backups
}

fn read_sidecar(dir: &Path) -> Result<BackupMetadata, String> {
    let path = dir.join(SIDECAR);
    let bytes = std::fs::read(&path).map_err(|e| format!("missing sidecar: {e}"))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("unreadable sidecar: {e}"))
}

/// Total size of the regular files under `dir`.
pub(super) fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(meta) = entry.metadata() {
                total += meta.len();
            }
        }
    }
    total
}

/// Recursive copy. Returns the number of bytes copied.
fn copy_dir(src: &Path, dst: &Path) -> Result<u64, SafetyError> {
    let mut copied = 0;
    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((src, dst)) = stack.pop() {
        std::fs::create_dir_all(&dst)?;
        for entry in std::fs::read_dir(&src)?.flatten() {
            let from = entry.path();
            let to = dst.join(entry.file_name());
            if from.is_dir() {
                stack.push((from, to));
            } else {
                copied += std::fs::copy(&from, &to)?;
            }
        }
    }
    Ok(copied)
}

fn copy_dir_excluding_sidecar(src: &Path, dst: &Path) -> Result<(), SafetyError> {
    for entry in std::fs::read_dir(src)?.flatten() {
        let from = entry.path();
        if entry.file_name() == SIDECAR {
            continue;
        }
        let to = PathBuf::from(dst).join(entry.file_name());
        if from.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "backups_tests.rs"]
mod tests;
