// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn status() -> WorkerStatus {
    WorkerStatus {
        running: true,
        uptime_secs: 12,
        pid: Some(4242),
        crashed: false,
        safe_mode: false,
        safe_mode_reason: None,
    }
}

#[test]
fn event_serializes_with_colon_type_tag() {
    let event = SupervisorEvent::Startup { pid: 4242 };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "bot:startup");
    assert_eq!(json["pid"], 4242);
}

#[test]
fn payload_strips_the_type_tag() {
    let event = SupervisorEvent::Status { status: status() };
    let payload = event.payload();
    assert!(payload.get("type").is_none());
    assert_eq!(payload["status"]["running"], true);
}

#[test]
fn kind_matches_serialized_tag() {
    let events = vec![
        SupervisorEvent::Status { status: status() },
        SupervisorEvent::Log { stream: LogStream::Stdout, line: "hi".into() },
        SupervisorEvent::Startup { pid: 1 },
        SupervisorEvent::Shutdown { emergency: false },
        SupervisorEvent::Crash {
            exit_code: Some(1),
            signal: None,
            crash_count: 1,
            safe_mode: false,
        },
        SupervisorEvent::Authenticated { subscriber_id: SubscriberId::from_string("sub-x") },
        SupervisorEvent::PanelUpdated { panel_id: "general".into(), data: serde_json::json!({}) },
    ];
    for event in events {
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind().as_str(), "tag mismatch for {:?}", event);
    }
}

#[test]
fn status_omits_absent_pid() {
    let mut s = status();
    s.pid = None;
    let json = serde_json::to_value(&s).unwrap();
    assert!(json.get("pid").is_none());
}

#[test]
fn crash_event_roundtrips() {
    let event = SupervisorEvent::Crash {
        exit_code: None,
        signal: Some("SIGKILL".into()),
        crash_count: 3,
        safe_mode: true,
    };
    let json = serde_json::to_string(&event).unwrap();
    let parsed: SupervisorEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, event);
}
