//! The reasoning-loop contract
//!
//! The orchestration core never runs a model or a tool itself. Each session
//! owns one [`ReasoningLoop`] implementation and feeds it exactly one
//! [`TurnInput`] at a time; the loop returns a [`TurnOutcome`] describing
//! what the actor did, and the continuation engine decides what happens next.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use hive_continuation::{ToolCallSignature, TurnOutcome, TurnStatus};

/// What triggered a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnSource {
    /// A task popped from the session's queue
    Task { task_id: String },

    /// A synchronous hand-off request from another agent
    Handoff {
        message_id: String,
        from_agent: String,
        chain_id: Option<String>,
    },

    /// A continuation of the previous turn in the same sequence
    Continuation,
}

/// Input to a single turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    /// What triggered the turn
    pub source: TurnSource,

    /// Payload: the task payload, the hand-off message body, or the previous
    /// turn's output
    pub payload: Value,
}

impl TurnInput {
    pub fn new(source: TurnSource, payload: Value) -> Self {
        Self { source, payload }
    }
}

/// One actor's reasoning loop
///
/// The session loop owns its instance exclusively and awaits each turn to
/// completion before starting the next; implementations never see concurrent
/// calls for the same agent.
#[async_trait]
pub trait ReasoningLoop: Send + Sync {
    async fn run_turn(&self, input: TurnInput) -> hive_core::Result<TurnOutcome>;
}
