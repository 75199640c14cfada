//! Switch frames and responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State of one chain link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No hand-off in flight
    Idle,

    /// The caller is suspended waiting for the target
    AwaitingTarget,

    /// The target answered; the frame is about to be popped
    Resumed,
}

/// One in-flight hand-off in a chain's stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchFrame {
    /// Frame ID (correlates the pending response)
    pub frame_id: String,

    /// Chain this frame belongs to
    pub chain_id: String,

    /// Calling agent
    pub from_agent: String,

    /// Target agent
    pub to_agent: String,

    /// Why control was handed over
    pub reason: String,

    /// When the switch began
    pub entered_at: chrono::DateTime<chrono::Utc>,

    /// Link state
    pub state: LinkState,
}

impl SwitchFrame {
    pub fn new<S: Into<String>>(chain_id: S, from: S, to: S, reason: S) -> Self {
        Self {
            frame_id: uuid::Uuid::new_v4().to_string(),
            chain_id: chain_id.into(),
            from_agent: from.into(),
            to_agent: to.into(),
            reason: reason.into(),
            entered_at: chrono::Utc::now(),
            state: LinkState::AwaitingTarget,
        }
    }
}

/// The value a completed hand-off resumes its caller with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchResponse {
    /// Agent that produced the response
    pub from_agent: String,

    /// Response payload
    pub body: Value,

    /// Error message if the target's turn failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SwitchResponse {
    /// Create a successful response
    pub fn ok<S: Into<String>>(from: S, body: Value) -> Self {
        Self {
            from_agent: from.into(),
            body,
            error: None,
        }
    }

    /// Create an error response
    pub fn err<S: Into<String>>(from: S, error: S) -> Self {
        Self {
            from_agent: from.into(),
            body: Value::Null,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
