//! Unified event types for the realtime session.
//!
//! The vendor wire format is translated at the transport boundary into
//! this union so the bridge's state machine can be exercised without real
//! network or audio I/O.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Events received from the remote streaming endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Setup completed; the session is ready for audio.
    SessionReady,

    /// A chunk of synthesized speech (raw PCM16 LE bytes at the playback
    /// rate). Chunks must be played back-to-back in arrival order.
    Audio {
        /// Raw audio payload, already base64-decoded.
        data: Vec<u8>,
    },

    /// The remote has finished producing output for the current exchange.
    TurnComplete,

    /// A batch of tool invocations. Every invocation must be acknowledged.
    ToolCalls {
        /// The invocations, in wire order.
        calls: Vec<ToolInvocation>,
    },

    /// Unrecognized message (forward compatibility). Ignored by consumers.
    Unknown,
}

/// A structured request from the remote endpoint naming a local action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Invocation identifier; the acknowledgment must reference it.
    pub id: String,
    /// Tool/function name.
    pub name: String,
    /// Arguments as JSON.
    pub args: Value,
}

/// An acknowledgment for a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The invocation id being acknowledged.
    pub id: String,
    /// The tool name, echoed back.
    pub name: String,
    /// The result payload.
    pub result: Value,
}

impl ToolResult {
    /// A successful acknowledgment.
    pub fn ok(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), result: json!({ "result": "ok" }) }
    }

    /// An acknowledgment carrying an arbitrary result payload.
    pub fn with_result(
        id: impl Into<String>,
        name: impl Into<String>,
        result: impl Serialize,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            result: serde_json::to_value(result).unwrap_or(Value::Null),
        }
    }
}
