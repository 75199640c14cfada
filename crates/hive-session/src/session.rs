//! Session state, configuration, and the shared per-session record

use chrono::{DateTime, Utc};
use hive_continuation::{ContinuationAction, ContinuationPolicy, ToolCallCapacity};
use hive_core::OrchestratorSettings;
use hive_telemetry::{EventCollector, OrchestratorEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::task::{Task, TaskQueue, TaskStatus};
use hive_continuation::StopReason;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Allocated but not yet started
    Created,

    /// The background loop is live; working or idle
    Running,

    /// Suspended until a wake condition is met
    Sleeping,

    /// Terminal: stopped by request
    Stopped,

    /// Terminal: the background loop gave up
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Sleeping => "sleeping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

/// Per-session configuration, derivable from [`OrchestratorSettings`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hard cap on unattended turns per sequence
    pub max_iterations: usize,

    /// Tool-call capacity of the backing model
    pub tool_call_capacity: ToolCallCapacity,

    /// Window for the no-progress guard
    pub no_progress_window: usize,

    /// Fallback when a turn carries neither tool calls nor a signal
    pub default_action_without_signal: ContinuationAction,

    /// Running-idle duration before the session goes to sleep on its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_sleep_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&OrchestratorSettings::default())
    }
}

impl From<&OrchestratorSettings> for SessionConfig {
    fn from(settings: &OrchestratorSettings) -> Self {
        let capacity = match settings.tool_call_capacity {
            hive_core::ToolCallCapacity::Single => ToolCallCapacity::Single,
            hive_core::ToolCallCapacity::Unbounded => ToolCallCapacity::Unbounded,
        };

        Self {
            max_iterations: settings.max_continuation_iterations,
            tool_call_capacity: capacity,
            no_progress_window: settings.no_progress_window,
            default_action_without_signal: ContinuationAction::Terminate,
            idle_sleep_timeout: settings.idle_sleep_secs.map(Duration::from_secs),
        }
    }
}

impl SessionConfig {
    /// The continuation policy a fresh turn sequence starts with
    pub fn continuation_policy(&self) -> ContinuationPolicy {
        ContinuationPolicy {
            max_iterations: self.max_iterations,
            tool_call_capacity: self.tool_call_capacity,
            no_progress_window: self.no_progress_window,
            default_action_without_signal: self.default_action_without_signal,
        }
    }
}

/// What wakes a sleeping session
///
/// An empty condition means only an explicit wake, a submitted task, a
/// hand-off, or stop will resume the session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WakeCondition {
    /// Named events that wake the session
    #[serde(default)]
    pub events: HashSet<String>,

    /// Advisory timer; the session wakes when it elapses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_at: Option<DateTime<Utc>>,
}

impl WakeCondition {
    pub fn on_events<S: Into<String>>(events: impl IntoIterator<Item = S>) -> Self {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            wake_at: None,
        }
    }

    pub fn with_wake_at(mut self, wake_at: DateTime<Utc>) -> Self {
        self.wake_at = Some(wake_at);
        self
    }

    /// Whether the given event (or the elapsed timer) wakes the session
    pub fn matches(&self, event: &str, now: DateTime<Utc>) -> bool {
        self.events.contains(event) || self.wake_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Read-only view of a session; taking one never blocks the session loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub agent_id: String,
    pub state: SessionState,
    pub queue_depth: usize,
    pub unread_messages: usize,
    pub last_activity_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wake_at: Option<DateTime<Utc>>,
}

/// Nudge delivered to a session loop over its control channel
///
/// State itself lives in [`SessionShared`]; the signal only tells the loop
/// to re-check it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlSignal {
    Nudge,
    Stop,
}

/// How many recent turn outputs a session retains
const HISTORY_LIMIT: usize = 64;

/// State shared between the manager and a session's background loop
///
/// All locks are short-lived and never held across an await point.
pub(crate) struct SessionShared {
    pub(crate) agent_id: String,
    pub(crate) config: SessionConfig,
    state: Mutex<SessionState>,
    queue: Mutex<TaskQueue>,
    tasks: Mutex<HashMap<String, Task>>,
    wake: Mutex<WakeCondition>,
    last_activity: Mutex<DateTime<Utc>>,
    history: Mutex<VecDeque<Value>>,
    control: mpsc::UnboundedSender<ControlSignal>,
}

impl SessionShared {
    pub(crate) fn new(
        agent_id: String,
        config: SessionConfig,
        control: mpsc::UnboundedSender<ControlSignal>,
    ) -> Self {
        Self {
            agent_id,
            config,
            state: Mutex::new(SessionState::Created),
            queue: Mutex::new(TaskQueue::new()),
            tasks: Mutex::new(HashMap::new()),
            wake: Mutex::new(WakeCondition::default()),
            last_activity: Mutex::new(Utc::now()),
            history: Mutex::new(VecDeque::new()),
            control,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Move to a new state, emitting the transition
    pub(crate) fn transition(&self, to: SessionState, collector: &EventCollector) {
        let from = {
            let mut state = self.state.lock().unwrap();
            let from = *state;
            *state = to;
            from
        };

        if from != to {
            tracing::info!(agent = %self.agent_id, "Session {} -> {}", from.as_str(), to.as_str());
            collector.emit(OrchestratorEvent::state_changed(
                &self.agent_id,
                from.as_str(),
                to.as_str(),
            ));
        }
    }

    pub(crate) fn nudge(&self, signal: ControlSignal) {
        // The loop may have exited already; a missed nudge is harmless then
        let _ = self.control.send(signal);
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock().unwrap() = Utc::now();
    }

    pub(crate) fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock().unwrap()
    }

    pub(crate) fn set_wake_condition(&self, condition: WakeCondition) {
        *self.wake.lock().unwrap() = condition;
    }

    pub(crate) fn wake_condition(&self) -> WakeCondition {
        self.wake.lock().unwrap().clone()
    }

    /// Append a turn output to the bounded history buffer
    pub(crate) fn record_history(&self, output: Value) {
        let mut history = self.history.lock().unwrap();
        history.push_back(output);
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
    }

    /// Recent turn outputs, oldest first
    pub(crate) fn history(&self) -> Vec<Value> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    pub(crate) fn push_task(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id.clone(), task.clone());
        self.queue.lock().unwrap().push(task);
    }

    pub(crate) fn pop_task(&self) -> Option<Task> {
        self.queue.lock().unwrap().pop()
    }

    pub(crate) fn queue_depth(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub(crate) fn drain_queue(&self) -> Vec<Task> {
        self.queue.lock().unwrap().drain()
    }

    pub(crate) fn task(&self, task_id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().get(task_id).cloned()
    }

    pub(crate) fn mark_task_running(&self, task_id: &str) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(task_id) {
            task.status = TaskStatus::Running;
        }
    }

    pub(crate) fn finish_task_completed(
        &self,
        task_id: &str,
        result: Value,
        reason: StopReason,
        collector: &EventCollector,
    ) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(task_id) {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            task.result = Some(result);
        }
        self.touch();

        tracing::debug!(agent = %self.agent_id, task = %task_id, reason = reason.as_str(), "Task completed");
        collector.emit(OrchestratorEvent::task_completed(
            &self.agent_id,
            task_id,
            reason.as_str(),
        ));
    }

    pub(crate) fn finish_task_failed(&self, task_id: &str, error: &str, collector: &EventCollector) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.error = Some(error.to_string());
        }
        self.touch();

        tracing::warn!(agent = %self.agent_id, task = %task_id, "Task failed: {}", error);
        collector.emit(OrchestratorEvent::task_failed(&self.agent_id, task_id, error));
    }
}
