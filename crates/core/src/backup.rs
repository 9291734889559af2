// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup metadata sidecar contents.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Describes one point-in-time backup directory.
///
/// Written as `metadata.json` inside the backup directory and mirrored in the
/// rollback-snapshot pointer. A metadata entry whose `path` no longer exists
/// on disk is treated as unavailable, never restored from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Backup creation time, epoch milliseconds. Doubles as the directory name.
    pub at_ms: u64,
    /// Worker version the backup was taken from.
    pub version: String,
    /// Absolute path of the backup directory.
    pub path: PathBuf,
    /// Total size of the backed-up files in bytes.
    pub size_bytes: u64,
}

impl BackupMetadata {
    /// Whether the backup directory is still present on disk.
    pub fn is_available(&self) -> bool {
        self.path.is_dir()
    }
}
