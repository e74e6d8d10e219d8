//! Messages exchanged with dialing devices.
//!
//! Devices talk to the server either by HTTP polling or over a WebSocket.
//! Both transports carry the same [`QueuedMessage`] payloads; the WebSocket
//! additionally frames them in [`ClientFrame`] / [`ServerFrame`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::types::DeviceStatus;

/// A message waiting in a device's queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub id: String,
    pub device_id: String,
    /// Free-form tag, see [`crate::constants::message_kinds`].
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    /// Enqueue (or last retry) time, Unix epoch millis.
    pub timestamp: i64,
    pub retries: u32,
}

/// Frames sent by a device over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    DeviceConnect {
        #[serde(default)]
        device_type: Option<String>,
    },
    Ping,
    /// Drain the device's queue.
    Poll,
}

impl ClientFrame {
    /// Parse a text frame, telling unknown frame types apart from garbage.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let frame_type = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);

        match serde_json::from_value(value) {
            Ok(frame) => Ok(frame),
            Err(e) => match frame_type {
                Some(t) if !matches!(t.as_str(), "device_connect" | "ping" | "poll") => {
                    Err(ProtocolError::UnknownFrame(t))
                }
                _ => Err(ProtocolError::Malformed(e)),
            },
        }
    }
}

/// Frames sent by the server over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConnectionConfirmed {
        session_id: String,
        timestamp: i64,
    },
    Pong {
        timestamp: i64,
    },
    Messages {
        messages: Vec<QueuedMessage>,
        has_messages: bool,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outcome of a single dialed number, reported by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub list_id: String,
    pub number: String,
    /// `completed`, `failed`, `busy`, ...
    pub outcome: String,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StatusReport {
    status: DeviceStatus,
}

/// A report piggybacked on a device's `POST /poll`.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceReport {
    Status(DeviceStatus),
    CallStarted,
    CallResult(CallResult),
}

impl DeviceReport {
    /// Interpret a `{type, data}` pair. `Ok(None)` for untyped polls and for
    /// report types this server does not act on.
    pub fn from_parts(kind: Option<&str>, data: &Value) -> Result<Option<Self>, ProtocolError> {
        let Some(kind) = kind else {
            return Ok(None);
        };

        match kind {
            "status" => {
                let report: StatusReport = serde_json::from_value(data.clone())?;
                Ok(Some(Self::Status(report.status)))
            }
            "call_started" => Ok(Some(Self::CallStarted)),
            "call_result" => Ok(Some(Self::CallResult(serde_json::from_value(data.clone())?))),
            _ => Ok(None),
        }
    }
}
