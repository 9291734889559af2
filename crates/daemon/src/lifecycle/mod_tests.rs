// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn config_paths_live_under_the_state_dir() {
    let config = Config::in_dir(PathBuf::from("/tmp/botd-test"));
    assert_eq!(config.socket_path, PathBuf::from("/tmp/botd-test/botd.sock"));
    assert_eq!(config.lock_path, PathBuf::from("/tmp/botd-test/botd.pid"));
    assert_eq!(config.safety_path, PathBuf::from("/tmp/botd-test/safety.json"));
    assert_eq!(config.crashes_path, PathBuf::from("/tmp/botd-test/crashes"));
    assert_eq!(config.backups_path, PathBuf::from("/tmp/botd-test/backups"));
    assert_eq!(config.data_path, PathBuf::from("/tmp/botd-test/data"));
    assert_eq!(config.control_socket_path, PathBuf::from("/tmp/botd-test/worker.sock"));
}
