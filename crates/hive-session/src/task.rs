//! Tasks and the per-session task queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Task priority shares the mailbox ordering semantics
pub type TaskPriority = hive_mailbox::MessagePriority;

/// Lifecycle of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A unit of work submitted to a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task ID
    pub id: String,

    /// Scheduling priority
    #[serde(default)]
    pub priority: TaskPriority,

    /// Task payload, handed to the reasoning loop as the first turn's input
    pub payload: Value,

    /// Current status
    pub status: TaskStatus,

    /// When the task was submitted
    pub submitted_at: DateTime<Utc>,

    /// When the task reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Final output, for completed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error string, for failed tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn new(payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            priority: TaskPriority::Normal,
            payload,
            status: TaskStatus::Pending,
            submitted_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Heap entry: higher priority first, earlier submission first within a
/// priority
struct QueuedTask {
    priority: TaskPriority,
    seq: u64,
    task: Task,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority queue of pending tasks, strict FIFO within equal priority
#[derive(Default)]
pub struct TaskQueue {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        let entry = QueuedTask {
            priority: task.priority,
            seq: self.next_seq,
            task,
        };
        self.next_seq += 1;
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|entry| entry.task)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove all pending tasks, in the order they would have run
    pub fn drain(&mut self) -> Vec<Task> {
        let mut drained = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            drained.push(entry.task);
        }
        drained
    }
}
