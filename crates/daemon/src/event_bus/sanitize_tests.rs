// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    token = { "token" },
    bot_token = { "bot_token" },
    access_token_camel = { "accessToken" },
    secret = { "client_secret" },
    password = { "password" },
    credential = { "credentials" },
    authorization = { "authorization" },
    api_key = { "api_key" },
    apikey = { "apiKey" },
)]
fn sensitive_keys_are_stripped(key: &str) {
    let payload = json!({ key: "hunter2", "kept": 1 });
    let clean = sanitize(payload);
    assert!(clean.get(key).is_none(), "{key} should be stripped");
    assert_eq!(clean["kept"], 1);
}

#[test]
fn nested_objects_are_sanitized() {
    let payload = json!({
        "panel": {
            "name": "general",
            "config": { "webhook_token": "abc", "color": "red" }
        }
    });
    let clean = sanitize(payload);
    assert!(clean["panel"]["config"].get("webhook_token").is_none());
    assert_eq!(clean["panel"]["config"]["color"], "red");
}

#[test]
fn arrays_of_objects_are_sanitized() {
    let payload = json!({
        "items": [
            { "id": 1, "secret": "x" },
            { "id": 2, "secret": "y" }
        ]
    });
    let clean = sanitize(payload);
    for item in clean["items"].as_array().unwrap() {
        assert!(item.get("secret").is_none());
        assert!(item.get("id").is_some());
    }
}

#[test]
fn benign_keys_survive() {
    let payload = json!({
        "author": "alice",
        "status": "running",
        "uptime_secs": 30
    });
    let clean = sanitize(payload.clone());
    assert_eq!(clean, payload);
}

#[test]
fn scalars_pass_through() {
    assert_eq!(sanitize(json!("hello")), json!("hello"));
    assert_eq!(sanitize(json!(42)), json!(42));
    assert_eq!(sanitize(json!(null)), json!(null));
}
