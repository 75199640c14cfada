//! Error types for the hand-off protocol

use hive_mailbox::MailboxError;

/// Result type for switch operations
pub type Result<T> = std::result::Result<T, SwitchError>;

/// Errors in the synchronous hand-off protocol
///
/// Validation failures are returned synchronously to the caller and never
/// placed on a queue or mailbox; the caller's turn is not suspended.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    /// An agent may not switch to itself
    #[error("Agent {0} cannot switch to itself")]
    SelfSwitch(String),

    /// The target already appears in the active chain
    #[error("Circular switch: agent {agent} already appears in chain {chain}")]
    CircularSwitch { agent: String, chain: String },

    /// The chain is at its configured depth limit
    #[error("Max switch depth exceeded: {0}")]
    MaxDepthExceeded(usize),

    /// The target session stopped while the caller was waiting
    #[error("Switch target stopped: {0}")]
    SwitchTargetStopped(String),

    /// The target did not respond within the caller-visible timeout
    #[error("Switch timed out after {0:?}")]
    SwitchTimeout(std::time::Duration),

    /// No frame is awaiting a response from this agent
    #[error("No pending switch for agent: {0}")]
    NoPendingSwitch(String),

    /// Delivery of the hand-off message failed
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}
