//! Error types for mailbox operations

/// Result type for mailbox operations
pub type Result<T> = std::result::Result<T, MailboxError>;

/// Errors in mailbox routing and delivery
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Target agent has no registered mailbox
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MailboxError {
    /// Create an unknown recipient error
    pub fn unknown_recipient<S: Into<String>>(agent_id: S) -> Self {
        Self::UnknownRecipient(agent_id.into())
    }
}
