//! Orchestration event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the orchestration core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// Session lifecycle
    SessionStateChanged {
        agent_id: String,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    SessionWoken {
        agent_id: String,
        cause: String,
        timestamp: DateTime<Utc>,
    },

    /// Task outcomes
    TaskCompleted {
        agent_id: String,
        task_id: String,
        stop_reason: String,
        timestamp: DateTime<Utc>,
    },

    TaskFailed {
        agent_id: String,
        task_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Inter-agent mail
    MessageDelivered {
        message_id: String,
        from: String,
        to: String,
        requires_handoff: bool,
        timestamp: DateTime<Utc>,
    },

    /// Synchronous hand-offs
    SwitchRequested {
        chain_id: String,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    SwitchCompleted {
        chain_id: String,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },
}

impl OrchestratorEvent {
    /// Get the agent ID this event is attributed to
    pub fn agent_id(&self) -> &str {
        match self {
            Self::SessionStateChanged { agent_id, .. } => agent_id,
            Self::SessionWoken { agent_id, .. } => agent_id,
            Self::TaskCompleted { agent_id, .. } => agent_id,
            Self::TaskFailed { agent_id, .. } => agent_id,
            Self::MessageDelivered { to, .. } => to,
            Self::SwitchRequested { from, .. } => from,
            Self::SwitchCompleted { from, .. } => from,
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::SessionStateChanged { timestamp, .. } => timestamp,
            Self::SessionWoken { timestamp, .. } => timestamp,
            Self::TaskCompleted { timestamp, .. } => timestamp,
            Self::TaskFailed { timestamp, .. } => timestamp,
            Self::MessageDelivered { timestamp, .. } => timestamp,
            Self::SwitchRequested { timestamp, .. } => timestamp,
            Self::SwitchCompleted { timestamp, .. } => timestamp,
        }
    }

    // Convenience constructors
    pub fn state_changed(
        agent_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::SessionStateChanged {
            agent_id: agent_id.into(),
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn woken(agent_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::SessionWoken {
            agent_id: agent_id.into(),
            cause: cause.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn task_completed(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        stop_reason: impl Into<String>,
    ) -> Self {
        Self::TaskCompleted {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            stop_reason: stop_reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn task_failed(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::TaskFailed {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn message_delivered(
        message_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        requires_handoff: bool,
    ) -> Self {
        Self::MessageDelivered {
            message_id: message_id.into(),
            from: from.into(),
            to: to.into(),
            requires_handoff,
            timestamp: Utc::now(),
        }
    }

    pub fn switch_requested(
        chain_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::SwitchRequested {
            chain_id: chain_id.into(),
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn switch_completed(
        chain_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::SwitchCompleted {
            chain_id: chain_id.into(),
            from: from.into(),
            to: to.into(),
            timestamp: Utc::now(),
        }
    }
}
