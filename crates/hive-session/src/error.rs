//! Error types for session management

use hive_core::CoreError;
use hive_mailbox::MailboxError;
use hive_switch::SwitchError;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors in session lifecycle and task handling
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An agent with this ID already has a session
    #[error("Duplicate agent: {0}")]
    DuplicateAgent(String),

    /// No session exists for this agent
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// The session has been stopped and accepts no further work
    #[error("Session stopped: {0}")]
    SessionStopped(String),

    /// The requested lifecycle transition is not allowed
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A reasoning-loop turn raised an error
    #[error("Turn execution failed: {0}")]
    TurnExecutionFailed(String),

    /// No task with this ID is known to the session
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Mailbox failure
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// Hand-off failure
    #[error(transparent)]
    Switch(#[from] SwitchError),

    /// Core failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SessionError {
    pub fn duplicate_agent<S: Into<String>>(agent_id: S) -> Self {
        Self::DuplicateAgent(agent_id.into())
    }

    pub fn unknown_agent<S: Into<String>>(agent_id: S) -> Self {
        Self::UnknownAgent(agent_id.into())
    }

    pub fn stopped<S: Into<String>>(agent_id: S) -> Self {
        Self::SessionStopped(agent_id.into())
    }

    pub fn invalid_transition<S: Into<String>>(from: S, to: S) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn task_not_found<S: Into<String>>(task_id: S) -> Self {
        Self::TaskNotFound(task_id.into())
    }
}
