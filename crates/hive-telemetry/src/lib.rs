//! Hive Telemetry
//!
//! Outbound notifications from the orchestration core. Every session state
//! transition, task completion, mailbox delivery, and hand-off emits an
//! [`OrchestratorEvent`] through an [`EventCollector`]. Delivery is
//! best-effort and never blocks a session loop.

pub mod collector;
pub mod event;

pub use collector::EventCollector;
pub use event::OrchestratorEvent;
