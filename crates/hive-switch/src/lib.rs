//! Hive Switch
//!
//! Synchronous control transfer between agent sessions: actor A "calls"
//! actor B and resumes when B is done, as an alternative to fire-and-forget
//! mail. The [`SwitchHandler`] tracks an explicit frame stack per chain to
//! reject cycles, self-loops, and over-deep chains, and times out callers
//! rather than blocking them forever.

pub mod error;
pub mod frame;
pub mod handler;

// Re-exports
pub use error::{Result, SwitchError};
pub use frame::{LinkState, SwitchFrame, SwitchResponse};
pub use handler::SwitchHandler;
