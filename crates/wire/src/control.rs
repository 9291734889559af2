// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Correlated control-channel envelopes.
//!
//! Requests travel supervisor → worker as `{type, requestId, data}`; replies
//! travel back as `{requestId, data}` where `data` always carries at least
//! `{success, error?}`. Inbound envelopes are parsed loosely first so the
//! worker can distinguish "no requestId — drop silently" from "bad fields —
//! reply with an error".

use botd_core::RequestId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Typed control commands the worker understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Liveness probe.
    Ping,
    /// Worker-side runtime status.
    GetStatus,
    /// Enumerate the worker's admin panels.
    ListPanels,
    /// Execute one panel action.
    ExecuteAction { panel_id: String, action_id: String, data: Value },
}

impl ControlCommand {
    /// Wire name for the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlCommand::Ping => "ping",
            ControlCommand::GetStatus => "get-status",
            ControlCommand::ListPanels => "list-panels",
            ControlCommand::ExecuteAction { .. } => "execute-action",
        }
    }

    /// Read-only commands are exempt from worker-side rate limiting.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ControlCommand::Ping | ControlCommand::GetStatus | ControlCommand::ListPanels
        )
    }

    /// Command payload for the envelope's `data` field.
    pub fn data(&self) -> Value {
        match self {
            ControlCommand::Ping | ControlCommand::GetStatus | ControlCommand::ListPanels => {
                Value::Object(serde_json::Map::new())
            }
            ControlCommand::ExecuteAction { panel_id, action_id, data } => serde_json::json!({
                "panelId": panel_id,
                "actionId": action_id,
                "payload": data,
            }),
        }
    }
}

/// Why a raw envelope could not be turned into a [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("missing message type")]
    MissingType,

    #[error("invalid fields for {kind}: {detail}")]
    InvalidFields { kind: String, detail: String },
}

/// Loosely-parsed inbound envelope. Everything is optional so validation can
/// decide between dropping and error-replying.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "requestId")]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub data: Option<Value>,
    /// Optional caller identity for rate limiting (user id or similar).
    #[serde(default)]
    pub caller: Option<String>,
}

impl RawEnvelope {
    /// Parse raw frame bytes. A frame that is not a JSON object at all counts
    /// as an envelope with every field missing.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    /// Resolve this envelope into a typed command.
    pub fn command(&self) -> Result<ControlCommand, CommandParseError> {
        let kind = self.kind.as_deref().ok_or(CommandParseError::MissingType)?;
        let data = self.data.clone().unwrap_or(Value::Object(serde_json::Map::new()));
        match kind {
            "ping" => Ok(ControlCommand::Ping),
            "get-status" => Ok(ControlCommand::GetStatus),
            "list-panels" => Ok(ControlCommand::ListPanels),
            "execute-action" => {
                let panel_id = data
                    .get("panelId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CommandParseError::InvalidFields {
                        kind: kind.to_string(),
                        detail: "panelId required".to_string(),
                    })?
                    .to_string();
                let action_id = data
                    .get("actionId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CommandParseError::InvalidFields {
                        kind: kind.to_string(),
                        detail: "actionId required".to_string(),
                    })?
                    .to_string();
                let payload = data.get("payload").cloned().unwrap_or(Value::Null);
                Ok(ControlCommand::ExecuteAction { panel_id, action_id, data: payload })
            }
            other => Err(CommandParseError::UnknownType(other.to_string())),
        }
    }
}

/// Outbound request envelope, supervisor → worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
}

impl ControlEnvelope {
    pub fn new(command: &ControlCommand, request_id: RequestId) -> Self {
        Self {
            kind: command.kind().to_string(),
            request_id,
            data: command.data(),
            caller: None,
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// Reply payload. `success`/`error` are always present in spirit; extra
/// type-specific fields ride along flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyData {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, Value>,
}

impl ReplyData {
    pub fn ok() -> Self {
        Self { success: true, error: None, rest: serde_json::Map::new() }
    }

    /// Successful reply with extra fields. Non-object values are nested under
    /// a `"result"` key so the envelope stays an object.
    pub fn ok_with(value: Value) -> Self {
        let rest = match value {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self { success: true, error: None, rest }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, error: Some(message.into()), rest: serde_json::Map::new() }
    }
}

/// Reply envelope, worker → supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    pub data: ReplyData,
}

impl ReplyEnvelope {
    pub fn new(request_id: RequestId, data: ReplyData) -> Self {
        Self { request_id, data }
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
