//! Per-agent mailbox

use std::sync::Mutex;

use crate::message::{Message, MessagePriority};

/// An agent's inbox: an ordered multiset of messages
///
/// Insertion order is preserved for equal priority. All operations are
/// non-blocking; the inner lock is held only for the duration of a single
/// insert or scan.
#[derive(Default)]
pub struct Mailbox {
    entries: Mutex<Vec<Message>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message in arrival order
    pub fn push(&self, message: Message) {
        let mut entries = self.entries.lock().unwrap();
        entries.push(message);
    }

    /// Return matching messages ordered by priority then arrival, marking
    /// each returned message read
    pub fn drain(&self, only_unread: bool) -> Vec<Message> {
        let mut entries = self.entries.lock().unwrap();

        let mut matched: Vec<Message> = entries
            .iter_mut()
            .filter(|m| !only_unread || !m.read)
            .map(|m| {
                m.read = true;
                m.clone()
            })
            .collect();

        // Stable sort keeps arrival order within a priority
        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }

    /// Unread hand-off requests, ordered by priority then arrival, without
    /// marking them read
    pub fn peek_handoff_requests(&self) -> Vec<Message> {
        let entries = self.entries.lock().unwrap();

        let mut matched: Vec<Message> = entries
            .iter()
            .filter(|m| m.requires_handoff && !m.read)
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.priority.cmp(&a.priority));
        matched
    }

    /// Pop the next unread hand-off request (highest priority, earliest
    /// arrival), marking it read
    pub fn take_next_handoff(&self) -> Option<Message> {
        let mut entries = self.entries.lock().unwrap();

        let mut best: Option<(usize, MessagePriority)> = None;
        for (idx, m) in entries.iter().enumerate() {
            if m.requires_handoff && !m.read {
                match best {
                    Some((_, p)) if p >= m.priority => {}
                    _ => best = Some((idx, m.priority)),
                }
            }
        }

        best.map(|(idx, _)| {
            entries[idx].read = true;
            entries[idx].clone()
        })
    }

    /// Number of unread messages
    pub fn unread_count(&self) -> usize {
        self.entries.lock().unwrap().iter().filter(|m| !m.read).count()
    }

    /// Total number of messages
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Empty the mailbox, returning how many messages were discarded
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let count = entries.len();
        entries.clear();
        count
    }
}
