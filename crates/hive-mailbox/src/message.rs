//! Inter-agent messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message priority
///
/// Drains return higher priorities first; arrival order is preserved within
/// a priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A mailbox entry
///
/// Owned by the recipient's mailbox once delivered; the sender retains no
/// further control over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: String,

    /// Sending agent ID
    pub from_agent: String,

    /// Receiving agent ID
    pub to_agent: String,

    /// Optional short subject line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Message payload
    pub body: Value,

    /// Priority
    #[serde(default)]
    pub priority: MessagePriority,

    /// Creation timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Whether the recipient has read this message
    #[serde(default)]
    pub read: bool,

    /// True for a synchronous-switch request, false for fire-and-forget mail
    #[serde(default)]
    pub requires_handoff: bool,

    /// Switch chain this hand-off belongs to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

impl Message {
    /// Create a fire-and-forget message
    pub fn new<S: Into<String>>(from: S, to: S, body: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: from.into(),
            to_agent: to.into(),
            subject: None,
            body,
            priority: MessagePriority::Normal,
            created_at: chrono::Utc::now(),
            read: false,
            requires_handoff: false,
            chain_id: None,
        }
    }

    /// Create a hand-off request bound to a switch chain
    pub fn handoff<S: Into<String>>(from: S, to: S, body: Value, chain_id: S) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from_agent: from.into(),
            to_agent: to.into(),
            subject: None,
            body,
            priority: MessagePriority::High,
            created_at: chrono::Utc::now(),
            read: false,
            requires_handoff: true,
            chain_id: Some(chain_id.into()),
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the subject line
    pub fn with_subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = Some(subject.into());
        self
    }
}
