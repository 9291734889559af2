// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound payload sanitization.
//!
//! Every broadcast payload passes through here regardless of event type: any
//! object key whose lowercased name contains a denylisted fragment is
//! stripped, recursively, before serialization.

use serde_json::Value;

/// Field-name fragments that must never reach a subscriber.
const DENYLIST: &[&str] = &[
    "token",
    "secret",
    "password",
    "passwd",
    "credential",
    "authorization",
    "api_key",
    "apikey",
    "private_key",
];

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    DENYLIST.iter().any(|fragment| key.contains(fragment))
}

/// Strip sensitive fields from a payload, recursing into nested objects and
/// arrays. Non-object values pass through untouched.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !is_sensitive(key))
                .map(|(key, value)| (key, sanitize(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        other => other,
    }
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
