// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocols for the botd supervisor.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload. Three
//! protocol surfaces ride on it:
//!
//! - the correlated control channel between supervisor and worker
//!   ([`control`]),
//! - the management request/response protocol on the daemon socket
//!   ([`mgmt`]),
//! - the event-stream envelope pushed to WebSocket subscribers ([`stream`]).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod control;
mod framing;
mod mgmt;
mod stream;

pub use control::{
    CommandParseError, ControlCommand, ControlEnvelope, RawEnvelope, ReplyData, ReplyEnvelope,
};
pub use framing::{
    decode, encode, read_message, read_request, write_message, write_response, ProtocolError,
};
pub use mgmt::{Request, Response};
pub use stream::EventFrame;
