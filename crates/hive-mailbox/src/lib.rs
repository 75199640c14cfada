//! Hive Mailbox
//!
//! Asynchronous inter-agent message passing. Every registered agent owns one
//! [`Mailbox`]; the [`MailboxRouter`] is the single delivery surface shared
//! between sessions.
//!
//! # Example
//!
//! ```
//! use hive_mailbox::{MailboxRouter, Message};
//!
//! let router = MailboxRouter::new();
//! router.register("agent-b");
//!
//! let msg = Message::new("agent-a", "agent-b", serde_json::json!({"text": "hello"}));
//! let id = router.deliver(msg).unwrap();
//!
//! let mail = router.drain("agent-b", true).unwrap();
//! assert_eq!(mail[0].id, id);
//! ```

pub mod error;
pub mod mailbox;
pub mod message;
pub mod router;

// Re-exports
pub use error::{MailboxError, Result};
pub use mailbox::Mailbox;
pub use message::{Message, MessagePriority};
pub use router::MailboxRouter;
