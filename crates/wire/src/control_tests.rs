// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn envelope_serializes_with_camel_case_request_id() {
    let envelope = ControlEnvelope::new(
        &ControlCommand::ListPanels,
        RequestId::from("list-panels-1-abc"),
    );
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["type"], "list-panels");
    assert_eq!(json["requestId"], "list-panels-1-abc");
    assert!(json["data"].is_object());
}

#[test]
fn execute_action_data_carries_panel_and_action() {
    let command = ControlCommand::ExecuteAction {
        panel_id: "moderation".into(),
        action_id: "kick".into(),
        data: serde_json::json!({"user": "u-1"}),
    };
    let data = command.data();
    assert_eq!(data["panelId"], "moderation");
    assert_eq!(data["actionId"], "kick");
    assert_eq!(data["payload"]["user"], "u-1");
}

#[parameterized(
    ping = { "ping", true },
    get_status = { "get-status", true },
    list_panels = { "list-panels", true },
)]
fn read_only_commands_are_exempt(kind: &str, read_only: bool) {
    let raw = RawEnvelope {
        kind: Some(kind.to_string()),
        request_id: Some(RequestId::from("r-1")),
        data: None,
        caller: None,
    };
    assert_eq!(raw.command().unwrap().is_read_only(), read_only);
}

#[test]
fn execute_action_is_rate_limited() {
    let raw = RawEnvelope {
        kind: Some("execute-action".to_string()),
        request_id: Some(RequestId::from("r-2")),
        data: Some(serde_json::json!({"panelId": "p", "actionId": "a"})),
        caller: Some("user-7".into()),
    };
    let command = raw.command().unwrap();
    assert!(!command.is_read_only());
    assert_eq!(
        command,
        ControlCommand::ExecuteAction {
            panel_id: "p".into(),
            action_id: "a".into(),
            data: serde_json::Value::Null,
        }
    );
}

#[test]
fn unknown_type_is_an_explicit_parse_error() {
    let raw = RawEnvelope {
        kind: Some("self-destruct".to_string()),
        request_id: Some(RequestId::from("r-3")),
        data: None,
        caller: None,
    };
    assert_eq!(
        raw.command(),
        Err(CommandParseError::UnknownType("self-destruct".to_string()))
    );
}

#[test]
fn execute_action_without_panel_id_is_invalid_fields() {
    let raw = RawEnvelope {
        kind: Some("execute-action".to_string()),
        request_id: Some(RequestId::from("r-4")),
        data: Some(serde_json::json!({"actionId": "a"})),
        caller: None,
    };
    assert!(matches!(raw.command(), Err(CommandParseError::InvalidFields { .. })));
}

#[test]
fn garbage_bytes_parse_to_empty_envelope() {
    let raw = RawEnvelope::from_bytes(b"not json at all");
    assert!(raw.kind.is_none());
    assert!(raw.request_id.is_none());
}

#[test]
fn envelope_missing_request_id_still_parses() {
    let raw = RawEnvelope::from_bytes(br#"{"type": "ping", "data": {}}"#);
    assert_eq!(raw.kind.as_deref(), Some("ping"));
    assert!(raw.request_id.is_none());
}

#[test]
fn reply_data_ok_with_flattens_objects() {
    let reply = ReplyData::ok_with(serde_json::json!({"panels": ["a", "b"]}));
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["panels"][0], "a");
    assert!(json.get("error").is_none());
}

#[test]
fn reply_data_ok_with_wraps_scalars() {
    let reply = ReplyData::ok_with(serde_json::json!(42));
    let json = serde_json::to_value(&reply).unwrap();
    assert_eq!(json["result"], 42);
}

#[test]
fn reply_envelope_roundtrips() {
    let reply = ReplyEnvelope::new(RequestId::from("ping-1-x"), ReplyData::err("rate limited"));
    let json = serde_json::to_string(&reply).unwrap();
    let parsed: ReplyEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.request_id, reply.request_id);
    assert!(!parsed.data.success);
    assert_eq!(parsed.data.error.as_deref(), Some("rate limited"));
}
