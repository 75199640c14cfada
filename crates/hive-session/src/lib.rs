//! Hive Session
//!
//! Agent session lifecycle and scheduling. A [`SessionManager`] owns one
//! session per agent; each started session runs a background loop that
//! serves hand-off requests, pops queued tasks in priority order, and feeds
//! every turn through the continuation engine. At most one turn runs per
//! session at any time.
//!
//! # Example
//!
//! ```no_run
//! use hive_session::{ReasoningLoop, SessionManager, Task, TurnInput, TurnOutcome, TurnStatus};
//! use async_trait::async_trait;
//!
//! struct MyLoop;
//!
//! #[async_trait]
//! impl ReasoningLoop for MyLoop {
//!     async fn run_turn(&self, input: TurnInput) -> hive_core::Result<TurnOutcome> {
//!         Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Terminate))
//!     }
//! }
//!
//! # #[tokio::main] async fn main() -> hive_session::Result<()> {
//! let manager = SessionManager::from_settings(&hive_core::OrchestratorSettings::default());
//! manager.create_session("worker", Box::new(MyLoop), None)?;
//! manager.start("worker")?;
//! let task_id = manager.submit_task("worker", Task::new(serde_json::json!({"goal": "go"})))?;
//! # let _ = task_id; Ok(()) }
//! ```

pub mod error;
pub mod manager;
pub mod reasoning;
pub mod session;
pub mod task;

// Re-exports
pub use error::{Result, SessionError};
pub use manager::SessionManager;
pub use reasoning::{ReasoningLoop, ToolCallSignature, TurnInput, TurnOutcome, TurnSource, TurnStatus};
pub use session::{SessionConfig, SessionSnapshot, SessionState, WakeCondition};
pub use task::{Task, TaskPriority, TaskQueue, TaskStatus};
