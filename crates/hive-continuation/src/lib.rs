//! Hive Continuation
//!
//! Pure decision logic for unattended agent turns. After every turn the
//! session loop feeds the [`TurnOutcome`] to a [`ContinuationState`], which
//! decides whether the agent keeps acting or stops, and records whether that
//! decision was explicit, inferred, or forced by a safety limit.
//!
//! # Example
//!
//! ```
//! use hive_continuation::{ContinuationPolicy, ContinuationState, ContinuationAction, TurnOutcome, TurnStatus};
//!
//! let mut state = ContinuationState::new(ContinuationPolicy::default());
//!
//! let outcome = TurnOutcome::new(serde_json::json!("done"))
//!     .with_status(TurnStatus::Terminate);
//!
//! let decision = state.evaluate(&outcome);
//! assert_eq!(decision.action, ContinuationAction::Terminate);
//! ```

pub mod engine;
pub mod error;
pub mod outcome;

// Re-exports
pub use engine::{
    ContinuationAction, ContinuationPolicy, ContinuationState, Decision, DecisionSource,
    StopReason,
};
pub use error::{ContinuationError, Result};
pub use outcome::{ToolCallCapacity, ToolCallSignature, TurnOutcome, TurnStatus};
