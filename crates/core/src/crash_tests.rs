// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn record(at_ms: u64) -> CrashRecord {
    CrashRecord::new(at_ms, Some(1), None, &[])
}

#[test]
fn snippet_keeps_only_the_tail() {
    let logs: Vec<String> = (0..80).map(|i| format!("line-{i}")).collect();
    let crash = CrashRecord::new(0, Some(1), None, &logs);
    assert_eq!(crash.log_snippet.len(), CRASH_SNIPPET_MAX_LINES);
    assert_eq!(crash.log_snippet[0], "line-30");
    assert_eq!(crash.log_snippet[49], "line-79");
}

#[test]
fn snippet_takes_short_logs_whole() {
    let logs = vec!["a".to_string(), "b".to_string()];
    let crash = CrashRecord::new(0, None, Some("SIGSEGV".into()), &logs);
    assert_eq!(crash.log_snippet, logs);
}

#[test]
fn prune_drops_records_older_than_24h() {
    let now = 100 * CRASH_HISTORY_RETENTION_MS;
    let mut history = vec![
        record(now - CRASH_HISTORY_RETENTION_MS - 1),
        record(now - CRASH_HISTORY_RETENTION_MS + 1),
        record(now),
    ];
    prune_history(&mut history, now);
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| now - r.at_ms < CRASH_HISTORY_RETENTION_MS));
}

#[test]
fn window_count_includes_boundary() {
    let history = vec![record(0), record(10_000), record(20_000)];
    // Window reaching back exactly to t=0 includes all three.
    assert_eq!(count_in_window(&history, 20_000, 20_000), 3);
    // Narrower window drops the oldest.
    assert_eq!(count_in_window(&history, 20_000, 10_000), 2);
    assert_eq!(count_in_window(&history, 20_000, 0), 1);
}

#[test]
fn crash_record_roundtrips() {
    let crash = CrashRecord::new(42, Some(137), Some("SIGKILL".into()), &["boom".to_string()]);
    let json = serde_json::to_string(&crash).unwrap();
    let parsed: CrashRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, crash);
}

proptest! {
    #[test]
    fn pruned_history_never_contains_stale_records(
        offsets in proptest::collection::vec(0u64..(2 * CRASH_HISTORY_RETENTION_MS), 0..50)
    ) {
        let now = 10 * CRASH_HISTORY_RETENTION_MS;
        let mut history: Vec<CrashRecord> =
            offsets.iter().map(|off| record(now - off)).collect();
        prune_history(&mut history, now);
        prop_assert!(history.iter().all(|r| now - r.at_ms < CRASH_HISTORY_RETENTION_MS));
    }

    #[test]
    fn window_count_matches_manual_filter(
        offsets in proptest::collection::vec(0u64..500_000, 0..50),
        window in 0u64..500_000
    ) {
        let now = 1_000_000;
        let history: Vec<CrashRecord> = offsets.iter().map(|off| record(now - off)).collect();
        let expected = offsets.iter().filter(|off| **off <= window).count();
        prop_assert_eq!(count_in_window(&history, now, window), expected);
    }
}
