//! Session manager and per-session background loops

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hive_continuation::{ContinuationState, StopReason};
use hive_core::OrchestratorSettings;
use hive_mailbox::{MailboxRouter, Message};
use hive_switch::{SwitchError, SwitchHandler, SwitchResponse};
use hive_telemetry::{EventCollector, OrchestratorEvent};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::{
    error::{Result, SessionError},
    reasoning::{ReasoningLoop, TurnInput, TurnSource},
    session::{ControlSignal, SessionConfig, SessionShared, SessionSnapshot, SessionState, WakeCondition},
    task::Task,
};

/// One registered session
///
/// The runner and control receiver are taken exactly once, when the
/// background loop is spawned.
struct SessionEntry {
    shared: Arc<SessionShared>,
    runner: Mutex<Option<Box<dyn ReasoningLoop>>>,
    control_rx: Mutex<Option<mpsc::UnboundedReceiver<ControlSignal>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Owns every agent session and their background loops
///
/// An explicit instance; callers create as many managers as they need and
/// nothing is process-global. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    router: MailboxRouter,
    switch: SwitchHandler,
    collector: EventCollector,
    sessions: Arc<DashMap<String, SessionEntry>>,
    defaults: SessionConfig,
}

impl SessionManager {
    /// Assemble a manager from pre-built parts
    ///
    /// The router and switch handler must share `collector`, otherwise
    /// sessions cannot observe hand-off deliveries while idle. Prefer
    /// [`from_settings`](SessionManager::from_settings) unless the parts are
    /// shared with something else.
    pub fn new(
        router: MailboxRouter,
        switch: SwitchHandler,
        collector: EventCollector,
        defaults: SessionConfig,
    ) -> Self {
        Self {
            router,
            switch,
            collector,
            sessions: Arc::new(DashMap::new()),
            defaults,
        }
    }

    /// Build a fully wired manager from orchestrator settings
    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        let collector = EventCollector::default();
        let router = MailboxRouter::with_collector(collector.clone());
        let switch = SwitchHandler::new(
            router.clone(),
            settings.max_switch_depth,
            Duration::from_secs(settings.switch_timeout_secs),
        )
        .with_collector(collector.clone());

        Self::new(router, switch, collector, SessionConfig::from(settings))
    }

    pub fn router(&self) -> &MailboxRouter {
        &self.router
    }

    pub fn switch(&self) -> &SwitchHandler {
        &self.switch
    }

    /// Subscribe to orchestration events
    pub fn subscribe_events(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.collector.subscribe()
    }

    /// Allocate a session in the Created state and register its mailbox
    pub fn create_session(
        &self,
        agent_id: &str,
        runner: Box<dyn ReasoningLoop>,
        config: Option<SessionConfig>,
    ) -> Result<()> {
        match self.sessions.entry(agent_id.to_string()) {
            Entry::Occupied(_) => Err(SessionError::duplicate_agent(agent_id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let shared = Arc::new(SessionShared::new(
                    agent_id.to_string(),
                    config.unwrap_or_else(|| self.defaults.clone()),
                    tx,
                ));

                self.router.register(agent_id);
                slot.insert(SessionEntry {
                    shared,
                    runner: Mutex::new(Some(runner)),
                    control_rx: Mutex::new(Some(rx)),
                    join: Mutex::new(None),
                });

                tracing::info!("Created session for agent {}", agent_id);
                Ok(())
            }
        }
    }

    /// Start (or wake) a session's background loop; idempotent on Running
    pub fn start(&self, agent_id: &str) -> Result<()> {
        let entry = self.entry(agent_id)?;

        match entry.shared.state() {
            SessionState::Created => {
                // Whichever caller takes the runner spawns; a concurrent
                // start finds it gone and treats the session as started
                let runner = entry.runner.lock().unwrap().take();
                let control_rx = entry.control_rx.lock().unwrap().take();

                if let (Some(runner), Some(control_rx)) = (runner, control_rx) {
                    entry.shared.transition(SessionState::Running, &self.collector);

                    let handle = tokio::spawn(session_loop(
                        Arc::clone(&entry.shared),
                        runner,
                        control_rx,
                        self.router.clone(),
                        self.switch.clone(),
                        self.collector.clone(),
                    ));
                    *entry.join.lock().unwrap() = Some(handle);
                }
                Ok(())
            }
            SessionState::Sleeping => {
                drop(entry);
                self.wake(agent_id, None)?;
                Ok(())
            }
            SessionState::Running => Ok(()),
            SessionState::Stopped | SessionState::Failed => Err(SessionError::stopped(agent_id)),
        }
    }

    /// Stop a session and return its undone queue
    ///
    /// The loop exits at its next suspension point. Callers suspended on a
    /// switch into this agent are resumed with `SwitchTargetStopped`, and the
    /// mailbox is emptied. Completed-task history stays readable.
    pub fn stop(&self, agent_id: &str) -> Result<Vec<Task>> {
        let entry = self.entry(agent_id)?;

        if entry.shared.state().is_terminal() {
            return Ok(Vec::new());
        }

        entry.shared.transition(SessionState::Stopped, &self.collector);
        entry.shared.nudge(ControlSignal::Stop);

        let drained = entry.shared.drain_queue();
        drop(entry);

        self.switch.fail_pending_for(agent_id);
        let _ = self.router.clear(agent_id);

        tracing::info!("Stopped session {} ({} tasks drained)", agent_id, drained.len());
        Ok(drained)
    }

    /// Stop every session and wait for the background loops to exit
    pub async fn shutdown(&self) {
        let agent_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();

        for agent_id in &agent_ids {
            let _ = self.stop(agent_id);
        }

        for agent_id in agent_ids {
            let handle = self
                .sessions
                .get(&agent_id)
                .and_then(|entry| entry.join.lock().unwrap().take());
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }

        tracing::info!("Session manager shut down");
    }

    /// Queue a task; queued work always eventually wakes a sleeping session
    pub fn submit_task(&self, agent_id: &str, task: Task) -> Result<String> {
        let entry = self.entry(agent_id)?;

        if entry.shared.state().is_terminal() {
            return Err(SessionError::stopped(agent_id));
        }

        let task_id = task.id.clone();
        entry.shared.push_task(task);

        if entry.shared.state() == SessionState::Sleeping {
            entry.shared.transition(SessionState::Running, &self.collector);
            self.collector.emit(OrchestratorEvent::woken(agent_id, "task"));
        }
        entry.shared.nudge(ControlSignal::Nudge);

        tracing::debug!(agent = %agent_id, "Task {} submitted", task_id);
        Ok(task_id)
    }

    /// Put a Running session to sleep until a wake condition is met
    pub fn sleep(&self, agent_id: &str, condition: WakeCondition) -> Result<()> {
        let entry = self.entry(agent_id)?;

        let state = entry.shared.state();
        if state != SessionState::Running {
            return Err(SessionError::invalid_transition(
                state.as_str(),
                SessionState::Sleeping.as_str(),
            ));
        }

        entry.shared.set_wake_condition(condition);
        entry.shared.transition(SessionState::Sleeping, &self.collector);
        entry.shared.nudge(ControlSignal::Nudge);
        Ok(())
    }

    /// Wake a sleeping session
    ///
    /// An explicit wake (`None`) always wakes. A named event wakes only if it
    /// matches a registered condition or the wake timer has elapsed; a
    /// non-matching event is a no-op returning `false`. Waking a session that
    /// is not sleeping is also a no-op returning `false`.
    pub fn wake(&self, agent_id: &str, event: Option<&str>) -> Result<bool> {
        let entry = self.entry(agent_id)?;

        if entry.shared.state() != SessionState::Sleeping {
            return Ok(false);
        }

        let cause = match event {
            None => "explicit".to_string(),
            Some(event) => {
                let condition = entry.shared.wake_condition();
                if !condition.matches(event, Utc::now()) {
                    return Ok(false);
                }
                event.to_string()
            }
        };

        entry.shared.transition(SessionState::Running, &self.collector);
        self.collector.emit(OrchestratorEvent::woken(agent_id, cause));
        entry.shared.nudge(ControlSignal::Nudge);
        Ok(true)
    }

    /// Wake every session sleeping on `event`, queueing the payload as a
    /// task for each; returns the number of sessions woken
    pub fn broadcast(&self, event: &str, payload: Value) -> usize {
        let mut woken = 0;

        for entry in self.sessions.iter() {
            let shared = &entry.value().shared;
            if shared.state() != SessionState::Sleeping {
                continue;
            }
            if !shared.wake_condition().events.contains(event) {
                continue;
            }

            shared.push_task(Task::new(payload.clone()));
            shared.transition(SessionState::Running, &self.collector);
            self.collector.emit(OrchestratorEvent::woken(&shared.agent_id, event));
            shared.nudge(ControlSignal::Nudge);
            woken += 1;
        }

        tracing::debug!("Broadcast '{}' woke {} sessions", event, woken);
        woken
    }

    /// Snapshot one session
    pub fn get_state(&self, agent_id: &str) -> Result<SessionSnapshot> {
        let entry = self.entry(agent_id)?;
        Ok(self.snapshot(&entry.shared))
    }

    /// Snapshot every session
    pub fn get_session_states(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .iter()
            .map(|entry| self.snapshot(&entry.value().shared))
            .collect()
    }

    /// Recent turn outputs for a session, oldest first (bounded buffer)
    pub fn history(&self, agent_id: &str) -> Result<Vec<Value>> {
        Ok(self.entry(agent_id)?.shared.history())
    }

    /// Look up a task, running or finished
    pub fn task_status(&self, agent_id: &str, task_id: &str) -> Result<Task> {
        let entry = self.entry(agent_id)?;
        entry
            .shared
            .task(task_id)
            .ok_or_else(|| SessionError::task_not_found(task_id))
    }

    /// Hand control to another agent on behalf of `from` and wait
    ///
    /// Adds a state check on top of the switch handler: targeting a stopped
    /// or failed session fails fast with `SwitchTargetStopped` instead of
    /// timing out.
    pub async fn request_switch(
        &self,
        chain_id: &str,
        from: &str,
        to: &str,
        reason: &str,
        body: Value,
    ) -> Result<SwitchResponse> {
        if let Some(entry) = self.sessions.get(to) {
            if entry.shared.state().is_terminal() {
                return Err(SwitchError::SwitchTargetStopped(to.to_string()).into());
            }
        }

        let response = self.switch.request_switch(chain_id, from, to, reason, body).await?;
        Ok(response)
    }

    fn entry(&self, agent_id: &str) -> Result<dashmap::mapref::one::Ref<'_, String, SessionEntry>> {
        self.sessions
            .get(agent_id)
            .ok_or_else(|| SessionError::unknown_agent(agent_id))
    }

    fn snapshot(&self, shared: &SessionShared) -> SessionSnapshot {
        let state = shared.state();
        let wake_at = match state {
            SessionState::Sleeping => shared.wake_condition().wake_at,
            _ => None,
        };

        SessionSnapshot {
            agent_id: shared.agent_id.clone(),
            state,
            queue_depth: shared.queue_depth(),
            unread_messages: self.router.unread_count(&shared.agent_id).unwrap_or(0),
            last_activity_at: shared.last_activity(),
            wake_at,
        }
    }
}

/// The per-session background loop; one logical thread of control
///
/// The loop exclusively owns the reasoning loop instance, so at most one
/// turn runs at a time. Hand-off requests are served before queued tasks
/// because a suspended caller may be waiting on them.
async fn session_loop(
    shared: Arc<SessionShared>,
    runner: Box<dyn ReasoningLoop>,
    mut control: mpsc::UnboundedReceiver<ControlSignal>,
    router: MailboxRouter,
    switch: SwitchHandler,
    collector: EventCollector,
) {
    let mut events = collector.subscribe();
    let agent_id = shared.agent_id.clone();
    tracing::debug!("Session loop started for agent {}", agent_id);

    loop {
        match shared.state() {
            SessionState::Stopped | SessionState::Failed => break,
            SessionState::Sleeping => {
                if !wait_while_sleeping(&shared, &mut control, &mut events, &collector).await {
                    break;
                }
                continue;
            }
            _ => {}
        }

        match router.take_next_handoff(&agent_id) {
            Ok(Some(message)) => {
                run_handoff_sequence(&shared, runner.as_ref(), &switch, &collector, message).await;
                continue;
            }
            Ok(None) => {}
            // Mailbox unregistered out from under us; treated as empty
            Err(_) => {}
        }

        if let Some(task) = shared.pop_task() {
            run_task_sequence(&shared, runner.as_ref(), &collector, task).await;
            continue;
        }

        if !idle_wait(&shared, &mut control, &mut events, &collector).await {
            break;
        }
    }

    if !shared.state().is_terminal() {
        shared.transition(SessionState::Failed, &collector);
    }
    tracing::debug!("Session loop exited for agent {}", agent_id);
}

/// Idle-wait for a nudge, a hand-off delivery, or the idle-sleep timeout;
/// returns false when the loop should exit
async fn idle_wait(
    shared: &Arc<SessionShared>,
    control: &mut mpsc::UnboundedReceiver<ControlSignal>,
    events: &mut broadcast::Receiver<OrchestratorEvent>,
    collector: &EventCollector,
) -> bool {
    let wait = async {
        loop {
            tokio::select! {
                signal = control.recv() => return signal.is_some(),
                event = events.recv() => match event {
                    Ok(OrchestratorEvent::MessageDelivered { to, requires_handoff: true, .. })
                        if to == shared.agent_id =>
                    {
                        return true;
                    }
                    Ok(_) => {}
                    // Lagged: re-check the mailbox rather than trusting the stream
                    Err(_) => return true,
                },
            }
        }
    };

    match shared.config.idle_sleep_timeout {
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(alive) => alive,
            Err(_) => {
                // Idle too long; suspend until something arrives
                shared.set_wake_condition(WakeCondition::default());
                shared.transition(SessionState::Sleeping, collector);
                true
            }
        },
        None => wait.await,
    }
}

/// Block while Sleeping; returns false when the loop should exit
async fn wait_while_sleeping(
    shared: &Arc<SessionShared>,
    control: &mut mpsc::UnboundedReceiver<ControlSignal>,
    events: &mut broadcast::Receiver<OrchestratorEvent>,
    collector: &EventCollector,
) -> bool {
    let wake_at = shared.wake_condition().wake_at;
    let timer = async {
        match wake_at {
            Some(at) => {
                let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(delay).await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = timer => {
            shared.transition(SessionState::Running, collector);
            collector.emit(OrchestratorEvent::woken(&shared.agent_id, "timer"));
            true
        }
        signal = control.recv() => signal.is_some(),
        event = events.recv() => {
            match event {
                Ok(OrchestratorEvent::MessageDelivered { to, requires_handoff: true, .. })
                    if to == shared.agent_id =>
                {
                    // A hand-off counts as queued work: wake and serve it
                    shared.transition(SessionState::Running, collector);
                    collector.emit(OrchestratorEvent::woken(&shared.agent_id, "handoff"));
                }
                _ => {}
            }
            true
        }
    }
}

/// Run one task through a full unattended turn sequence
async fn run_task_sequence(
    shared: &Arc<SessionShared>,
    runner: &dyn ReasoningLoop,
    collector: &EventCollector,
    task: Task,
) {
    shared.touch();
    shared.mark_task_running(&task.id);

    let mut continuation = ContinuationState::new(shared.config.continuation_policy());
    let mut input = TurnInput::new(
        TurnSource::Task {
            task_id: task.id.clone(),
        },
        task.payload.clone(),
    );

    loop {
        // Stop cancels the sequence at the next turn boundary
        if shared.state().is_terminal() {
            shared.finish_task_failed(&task.id, "session stopped", collector);
            return;
        }

        match runner.run_turn(input).await {
            Ok(outcome) => {
                shared.record_history(outcome.output.clone());
                let decision = continuation.evaluate(&outcome);
                tracing::trace!(
                    agent = %shared.agent_id,
                    task = %task.id,
                    turn = continuation.iteration_count(),
                    "Turn decision: {:?}",
                    decision.action
                );

                if decision.is_continue() {
                    input = TurnInput::new(TurnSource::Continuation, outcome.output);
                } else {
                    let reason = decision.stop_reason.unwrap_or(StopReason::ExplicitSignal);
                    shared.finish_task_completed(&task.id, outcome.output, reason, collector);
                    return;
                }
            }
            Err(e) => {
                shared.finish_task_failed(&task.id, &e.to_string(), collector);
                return;
            }
        }
    }
}

/// Serve one hand-off request and resume the suspended caller
async fn run_handoff_sequence(
    shared: &Arc<SessionShared>,
    runner: &dyn ReasoningLoop,
    switch: &SwitchHandler,
    collector: &EventCollector,
    message: Message,
) {
    shared.touch();

    let mut continuation = ContinuationState::new(shared.config.continuation_policy());
    let mut input = TurnInput::new(
        TurnSource::Handoff {
            message_id: message.id.clone(),
            from_agent: message.from_agent.clone(),
            chain_id: message.chain_id.clone(),
        },
        message.body.clone(),
    );

    loop {
        if shared.state().is_terminal() {
            // Stop already resumed the caller with SwitchTargetStopped
            return;
        }

        match runner.run_turn(input).await {
            Ok(outcome) => {
                shared.record_history(outcome.output.clone());
                let decision = continuation.evaluate(&outcome);

                if decision.is_continue() {
                    input = TurnInput::new(TurnSource::Continuation, outcome.output);
                } else {
                    let response = SwitchResponse::ok(shared.agent_id.clone(), outcome.output);
                    resume_caller(switch, message.chain_id.as_deref(), &shared.agent_id, response);
                    shared.touch();
                    return;
                }
            }
            Err(e) => {
                // A failed hand-off turn resumes the caller with the error
                let response = SwitchResponse::err(shared.agent_id.clone(), e.to_string());
                resume_caller(switch, message.chain_id.as_deref(), &shared.agent_id, response);
                shared.touch();
                return;
            }
        }
    }
}

/// Complete the chain the served hand-off message belongs to
///
/// The chain id correlates the response with its caller; without it, two
/// concurrent chains through the same target could cross responses.
fn resume_caller(
    switch: &SwitchHandler,
    chain_id: Option<&str>,
    agent_id: &str,
    response: SwitchResponse,
) {
    let Some(chain_id) = chain_id else {
        tracing::warn!(agent = %agent_id, "Hand-off message carried no chain id; no caller to resume");
        return;
    };

    if let Err(e) = switch.complete_switch(chain_id, agent_id, response) {
        // Caller most likely timed out while we worked
        tracing::warn!(
            agent = %agent_id,
            chain = %chain_id,
            "Could not resume hand-off caller: {}",
            e
        );
    }
}
