//! Mailbox routing between registered agents

use dashmap::DashMap;
use std::sync::Arc;

use hive_telemetry::{EventCollector, OrchestratorEvent};

use crate::{error::MailboxError, Mailbox, Message, Result};

/// Routes messages to per-agent mailboxes
///
/// The router is the only component that mutates mailboxes; sessions and the
/// switch handler go through it. Cheap to clone.
#[derive(Clone, Default)]
pub struct MailboxRouter {
    mailboxes: Arc<DashMap<String, Arc<Mailbox>>>,
    collector: Option<EventCollector>,
}

impl MailboxRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router that emits delivery notifications
    pub fn with_collector(collector: EventCollector) -> Self {
        Self {
            mailboxes: Arc::new(DashMap::new()),
            collector: Some(collector),
        }
    }

    /// Register a mailbox for an agent
    pub fn register(&self, agent_id: &str) {
        self.mailboxes
            .entry(agent_id.to_string())
            .or_insert_with(|| Arc::new(Mailbox::new()));
        tracing::debug!("Registered mailbox for agent: {}", agent_id);
    }

    /// Remove an agent's mailbox entirely
    pub fn unregister(&self, agent_id: &str) {
        self.mailboxes.remove(agent_id);
        tracing::debug!("Unregistered mailbox for agent: {}", agent_id);
    }

    /// Whether an agent has a registered mailbox
    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.mailboxes.contains_key(agent_id)
    }

    fn mailbox(&self, agent_id: &str) -> Result<Arc<Mailbox>> {
        self.mailboxes
            .get(agent_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| MailboxError::unknown_recipient(agent_id))
    }

    /// Deliver a message to its recipient's mailbox
    ///
    /// Returns the message id. Fails with `UnknownRecipient` if the target
    /// agent is not registered.
    pub fn deliver(&self, message: Message) -> Result<String> {
        let mailbox = self.mailbox(&message.to_agent)?;

        let id = message.id.clone();
        let from = message.from_agent.clone();
        let to = message.to_agent.clone();
        let requires_handoff = message.requires_handoff;

        // The message must be visible in the mailbox before the notification
        // goes out; a loop woken by the event re-checks the mailbox once.
        mailbox.push(message);

        if let Some(collector) = &self.collector {
            collector.emit(OrchestratorEvent::message_delivered(
                &id,
                &from,
                &to,
                requires_handoff,
            ));
        }

        tracing::debug!(
            from = %from,
            to = %to,
            handoff = requires_handoff,
            "Delivered message {}",
            id
        );
        Ok(id)
    }

    /// Return and mark-read all matching messages for an agent, ordered by
    /// priority then arrival; never blocks
    pub fn drain(&self, agent_id: &str, only_unread: bool) -> Result<Vec<Message>> {
        Ok(self.mailbox(agent_id)?.drain(only_unread))
    }

    /// Unread hand-off requests for an agent, without marking them read
    pub fn peek_handoff_requests(&self, agent_id: &str) -> Result<Vec<Message>> {
        Ok(self.mailbox(agent_id)?.peek_handoff_requests())
    }

    /// Pop the next unread hand-off request for an agent
    pub fn take_next_handoff(&self, agent_id: &str) -> Result<Option<Message>> {
        Ok(self.mailbox(agent_id)?.take_next_handoff())
    }

    /// Number of unread messages for an agent
    pub fn unread_count(&self, agent_id: &str) -> Result<usize> {
        Ok(self.mailbox(agent_id)?.unread_count())
    }

    /// Empty an agent's mailbox (used on session stop)
    pub fn clear(&self, agent_id: &str) -> Result<usize> {
        let count = self.mailbox(agent_id)?.clear();
        tracing::debug!("Cleared {} messages for agent {}", count, agent_id);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessagePriority;
    use serde_json::json;

    #[test]
    fn test_deliver_to_unknown_recipient() {
        let router = MailboxRouter::new();
        let msg = Message::new("a", "ghost", json!({}));

        let result = router.deliver(msg);
        assert!(matches!(result, Err(MailboxError::UnknownRecipient(_))));
    }

    #[test]
    fn test_deliver_and_drain() {
        let router = MailboxRouter::new();
        router.register("b");

        router.deliver(Message::new("a", "b", json!({"n": 1}))).unwrap();
        router.deliver(Message::new("a", "b", json!({"n": 2}))).unwrap();

        let drained = router.drain("b", true).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].body["n"], 1);
        assert_eq!(drained[1].body["n"], 2);

        // Marked read: second drain is empty
        assert!(router.drain("b", true).unwrap().is_empty());
    }

    #[test]
    fn test_fifo_within_priority_across_deliveries() {
        let router = MailboxRouter::new();
        router.register("b");

        for n in 0..5 {
            router
                .deliver(
                    Message::new("a", "b", json!({"n": n}))
                        .with_priority(MessagePriority::Normal),
                )
                .unwrap();
        }

        let drained = router.drain("b", true).unwrap();
        let order: Vec<u64> = drained.iter().map(|m| m.body["n"].as_u64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unregister() {
        let router = MailboxRouter::new();
        router.register("b");
        assert!(router.is_registered("b"));

        router.unregister("b");
        assert!(!router.is_registered("b"));
        assert!(router.drain("b", true).is_err());
    }

    #[tokio::test]
    async fn test_delivery_notification() {
        let collector = EventCollector::new(16);
        let mut sub = collector.subscribe();
        let router = MailboxRouter::with_collector(collector);
        router.register("b");

        router.deliver(Message::new("a", "b", json!({}))).unwrap();

        let event = sub.recv().await.unwrap();
        match event {
            OrchestratorEvent::MessageDelivered { from, to, .. } => {
                assert_eq!(from, "a");
                assert_eq!(to, "b");
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_clear_on_stop() {
        let router = MailboxRouter::new();
        router.register("b");
        router.deliver(Message::new("a", "b", json!({}))).unwrap();

        assert_eq!(router.clear("b").unwrap(), 1);
        assert_eq!(router.unread_count("b").unwrap(), 0);
    }
}
