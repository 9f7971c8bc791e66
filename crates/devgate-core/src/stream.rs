//! The browser-facing stream message model and the relay frame type.
//!
//! Devices push JSON messages over their byte-stream endpoint; each message
//! is an object with a `"type"` discriminant:
//!
//! ```json
//! {"type":"status","payload":{"status":"running"}}
//! {"type":"logs","payload":{"message":"booting...","timestamp":1722945600}}
//! ```
//!
//! The gateway itself never interprets these payloads — it relays bytes
//! verbatim in both directions.  This model exists for the browser-facing
//! contract and for tests that stand in for real devices.
//!
//! [`Frame`] is the transport-neutral unit the relay fans out: the gateway
//! must preserve the text/binary framing of whatever a device sends.

use serde::{Deserialize, Serialize};

// ── Device → browser messages ─────────────────────────────────────────────────

/// All messages a device pushes on its stream endpoint.
///
/// Serde's `#[serde(tag = "type")]` maps the `"type"` field in the JSON
/// object to the enum variant, so matching on a decoded message is
/// exhaustive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    /// The device's run state changed.
    Status { payload: StatusPayload },
    /// The device emitted a log line.
    Logs { payload: LogsPayload },
}

/// Payload of a [`StreamMessage::Status`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: RunState,
}

/// The two run states a device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopped,
}

/// Payload of a [`StreamMessage::Logs`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsPayload {
    /// The log line, already formatted by the device.
    pub message: String,
    /// Seconds since the Unix epoch, as stamped by the device.
    pub timestamp: u64,
}

// ── Relay frames ──────────────────────────────────────────────────────────────

/// One relayed WebSocket payload, framing preserved.
///
/// The relay forwards frames without inspecting content, but text and
/// binary frames must stay distinct end to end: a JSON log message sent as
/// text must arrive at the browser as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
