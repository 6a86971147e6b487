//! Wire types.

use serde::{Deserialize, Serialize};

/// Action group and item that request shutdown.
pub const QUIT_ACTION: (&str, &str) = ("Common", "Quit");

/// Request from a control surface to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Health check
    Ping,

    /// Engine, session and transport status
    Status,

    /// Trigger a named action, e.g. `Common/Quit`
    AccessAction { group: String, item: String },
}

impl Request {
    pub fn access_action(group: impl Into<String>, item: impl Into<String>) -> Self {
        Request::AccessAction {
            group: group.into(),
            item: item.into(),
        }
    }

    /// The action that shuts the host down.
    pub fn quit() -> Self {
        Self::access_action(QUIT_ACTION.0, QUIT_ACTION.1)
    }
}

/// Response from the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Success with optional data
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<ResponseData>,
    },

    /// Request accepted; nothing to report
    Ack,

    Error { code: ErrorCode, message: String },
}

impl Response {
    pub fn ok_with(data: ResponseData) -> Self {
        Response::Ok { data: Some(data) }
    }

    pub fn ack() -> Self {
        Response::Ack
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    Pong { timestamp: i64 },

    Status {
        version: String,
        backend: String,
        client: String,
        session: String,
        sample_rate: u32,
        buffer_size: u32,
        /// Whether the engine's process thread is running
        running: bool,
        #[serde(default)]
        cycles: u64,
        #[serde(default)]
        transport_speed: f64,
        /// Playhead in frames
        #[serde(default)]
        transport_position: u64,
        #[serde(default)]
        warnings: u64,
        #[serde(default)]
        errors: u64,
        uptime_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request format is invalid
    InvalidRequest,
    /// Host is tearing down
    ShuttingDown,
}
