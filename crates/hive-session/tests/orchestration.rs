//! End-to-end orchestration scenarios across sessions, mailboxes, hand-offs,
//! and continuation control.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

use hive_core::OrchestratorSettings;
use hive_mailbox::MailboxRouter;
use hive_session::{
    ReasoningLoop, SessionConfig, SessionError, SessionManager, SessionState, Task, TaskPriority,
    TaskStatus, ToolCallSignature, TurnInput, TurnOutcome, TurnSource, TurnStatus, WakeCondition,
};
use hive_switch::{SwitchError, SwitchHandler};
use hive_telemetry::{EventCollector, OrchestratorEvent};

// -------------------------------------------------------------------------
// Test doubles
// -------------------------------------------------------------------------

#[derive(Default)]
struct LoopStats {
    seen: Mutex<Vec<TurnInput>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    turns: AtomicUsize,
}

impl LoopStats {
    fn turns(&self) -> usize {
        self.turns.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn task_payloads(&self) -> Vec<Value> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|input| matches!(input.source, TurnSource::Task { .. }))
            .map(|input| input.payload.clone())
            .collect()
    }
}

type Behavior =
    Box<dyn Fn(TurnInput, usize) -> hive_core::Result<TurnOutcome> + Send + Sync + 'static>;

/// A scripted reasoning loop that records everything it is fed
struct MockLoop {
    stats: Arc<LoopStats>,
    behavior: Behavior,
    delay: Duration,
}

impl MockLoop {
    fn new(
        behavior: impl Fn(TurnInput, usize) -> hive_core::Result<TurnOutcome> + Send + Sync + 'static,
    ) -> (Box<dyn ReasoningLoop>, Arc<LoopStats>) {
        Self::with_delay(Duration::ZERO, behavior)
    }

    fn with_delay(
        delay: Duration,
        behavior: impl Fn(TurnInput, usize) -> hive_core::Result<TurnOutcome> + Send + Sync + 'static,
    ) -> (Box<dyn ReasoningLoop>, Arc<LoopStats>) {
        let stats = Arc::new(LoopStats::default());
        let mock = MockLoop {
            stats: Arc::clone(&stats),
            behavior: Box::new(behavior),
            delay,
        };
        (Box::new(mock), stats)
    }

    /// A loop that answers every turn with the payload and an explicit stop
    fn echo() -> (Box<dyn ReasoningLoop>, Arc<LoopStats>) {
        Self::new(|input, _| Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Terminate)))
    }
}

#[async_trait]
impl ReasoningLoop for MockLoop {
    async fn run_turn(&self, input: TurnInput) -> hive_core::Result<TurnOutcome> {
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_active.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let turn = self.stats.turns.fetch_add(1, Ordering::SeqCst);
        self.stats.seen.lock().unwrap().push(input.clone());
        let result = (self.behavior)(input, turn);

        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// A loop that hands its task off to another agent and relays the response
struct DelegatingLoop {
    manager: SessionManager,
    agent_id: String,
    target: String,
}

#[async_trait]
impl ReasoningLoop for DelegatingLoop {
    async fn run_turn(&self, input: TurnInput) -> hive_core::Result<TurnOutcome> {
        match input.source {
            TurnSource::Task { ref task_id } => {
                let chain_id = format!("chain-{}", task_id);
                match self
                    .manager
                    .request_switch(&chain_id, &self.agent_id, &self.target, "delegate", input.payload)
                    .await
                {
                    Ok(response) => Ok(TurnOutcome::new(json!({
                        "body": response.body,
                        "error": response.error,
                    }))
                    .with_status(TurnStatus::Terminate)),
                    Err(e) => Err(hive_core::CoreError::turn_failed(e.to_string())),
                }
            }
            _ => Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Terminate)),
        }
    }
}

/// A loop that tries to hand a hand-off straight back to its caller
struct BounceBackLoop {
    manager: SessionManager,
    agent_id: String,
}

#[async_trait]
impl ReasoningLoop for BounceBackLoop {
    async fn run_turn(&self, input: TurnInput) -> hive_core::Result<TurnOutcome> {
        if let TurnSource::Handoff {
            ref from_agent,
            ref chain_id,
            ..
        } = input.source
        {
            let chain = chain_id.clone().unwrap_or_default();
            let bounced = self
                .manager
                .request_switch(&chain, &self.agent_id, from_agent, "bounce", json!({}))
                .await;

            let rejected_as_circular = matches!(
                bounced,
                Err(SessionError::Switch(SwitchError::CircularSwitch { .. }))
            );
            return Ok(TurnOutcome::new(json!({"circular_rejected": rejected_as_circular}))
                .with_status(TurnStatus::Terminate));
        }

        Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Terminate))
    }
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn manager() -> SessionManager {
    SessionManager::from_settings(&OrchestratorSettings::default())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_task(manager: &SessionManager, agent_id: &str, task_id: &str) -> Task {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let task = manager.task_status(agent_id, task_id).unwrap();
        if matches!(task.status, TaskStatus::Completed | TaskStatus::Failed) {
            return task;
        }
        assert!(Instant::now() < deadline, "task did not settle within 5s");
        sleep(Duration::from_millis(10)).await;
    }
}

/// Scan the event stream for the first event matching the predicate
async fn expect_event(
    events: &mut tokio::sync::broadcast::Receiver<OrchestratorEvent>,
    predicate: impl Fn(&OrchestratorEvent) -> bool,
) -> OrchestratorEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event stream closed: {}", e),
            }
        }
    })
    .await
    .expect("expected event not observed within 5s")
}

// -------------------------------------------------------------------------
// Scenario: a task completes in one turn on an explicit stop signal
// -------------------------------------------------------------------------

#[tokio::test]
async fn task_completes_in_single_turn_on_explicit_terminate() {
    let manager = manager();
    let mut events = manager.subscribe_events();

    let (runner, stats) = MockLoop::echo();
    manager.create_session("solo", runner, None).unwrap();
    manager.start("solo").unwrap();

    let task_id = manager
        .submit_task("solo", Task::new(json!({"goal": "answer"})))
        .unwrap();

    let task = wait_for_task(&manager, "solo", &task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result, Some(json!({"goal": "answer"})));
    assert_eq!(stats.turns(), 1);

    let event = expect_event(&mut events, |e| {
        matches!(e, OrchestratorEvent::TaskCompleted { task_id: t, .. } if *t == task_id)
    })
    .await;
    match event {
        OrchestratorEvent::TaskCompleted { stop_reason, .. } => {
            assert_eq!(stop_reason, "explicit_signal");
        }
        _ => unreachable!(),
    }

    // Back to idle, not stopped
    assert_eq!(manager.get_state("solo").unwrap().state, SessionState::Running);
}

// -------------------------------------------------------------------------
// Task queue ordering
// -------------------------------------------------------------------------

#[tokio::test]
async fn tasks_run_in_priority_then_fifo_order() {
    let manager = manager();
    let (runner, stats) = MockLoop::echo();
    manager.create_session("worker", runner, None).unwrap();

    // Queue before starting so ordering is decided by the queue alone
    for (payload, priority) in [
        (json!("n1"), TaskPriority::Normal),
        (json!("u1"), TaskPriority::Urgent),
        (json!("n2"), TaskPriority::Normal),
        (json!("u2"), TaskPriority::Urgent),
        (json!("l1"), TaskPriority::Low),
    ] {
        manager
            .submit_task("worker", Task::new(payload).with_priority(priority))
            .unwrap();
    }

    manager.start("worker").unwrap();
    wait_until(|| stats.turns() == 5).await;

    assert_eq!(
        stats.task_payloads(),
        vec![json!("u1"), json!("u2"), json!("n1"), json!("n2"), json!("l1")]
    );
}

// -------------------------------------------------------------------------
// Concurrency model: never more than one turn in flight per session
// -------------------------------------------------------------------------

#[tokio::test]
async fn at_most_one_turn_runs_at_a_time() {
    let manager = manager();
    let (runner, stats) = MockLoop::with_delay(Duration::from_millis(20), |input, _| {
        Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Terminate))
    });
    manager.create_session("serial", runner, None).unwrap();
    manager.start("serial").unwrap();

    for n in 0..6 {
        manager.submit_task("serial", Task::new(json!(n))).unwrap();
    }

    wait_until(|| stats.turns() == 6).await;
    assert_eq!(stats.max_active(), 1);
}

// -------------------------------------------------------------------------
/// Scenario: max_iterations=3 with a loop that always continues
// -------------------------------------------------------------------------

#[tokio::test]
async fn safety_limit_ends_sequence_after_exactly_three_turns() {
    let manager = manager();
    let mut events = manager.subscribe_events();

    let config = SessionConfig {
        max_iterations: 3,
        ..Default::default()
    };
    let (runner, stats) = MockLoop::new(|input, _| {
        Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Continue))
    });
    manager.create_session("eager", runner, Some(config)).unwrap();
    manager.start("eager").unwrap();

    let task_id = manager.submit_task("eager", Task::new(json!("go"))).unwrap();

    let task = wait_for_task(&manager, "eager", &task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(stats.turns(), 3);

    let event = expect_event(&mut events, |e| {
        matches!(e, OrchestratorEvent::TaskCompleted { task_id: t, .. } if *t == task_id)
    })
    .await;
    match event {
        OrchestratorEvent::TaskCompleted { stop_reason, .. } => {
            assert_eq!(stop_reason, "iteration_limit");
        }
        _ => unreachable!(),
    }

    // The guard ends the sequence, not the session
    assert_eq!(manager.get_state("eager").unwrap().state, SessionState::Running);

    // Every turn output landed in the session history, oldest first
    let history = manager.history("eager").unwrap();
    assert_eq!(history, vec![json!("go"), json!("go"), json!("go")]);
}

#[tokio::test]
async fn explicit_terminate_outranks_issued_tool_calls() {
    let manager = manager();
    let (runner, stats) = MockLoop::new(|_, _| {
        Ok(TurnOutcome::new(Value::Null)
            .with_tool_call(ToolCallSignature::new("search", json!({"q": "x"})))
            .with_status(TurnStatus::Terminate))
    });
    manager.create_session("decisive", runner, None).unwrap();
    manager.start("decisive").unwrap();

    let task_id = manager.submit_task("decisive", Task::new(json!("go"))).unwrap();
    let task = wait_for_task(&manager, "decisive", &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(stats.turns(), 1);
}

// -------------------------------------------------------------------------
// Hand-offs
// -------------------------------------------------------------------------

#[tokio::test]
async fn handoff_suspends_caller_until_target_responds() {
    let manager = manager();

    let (expert, _) = MockLoop::new(|input, _| {
        Ok(TurnOutcome::new(json!({"answer": 42, "asked": input.payload}))
            .with_status(TurnStatus::Terminate))
    });
    manager.create_session("expert", expert, None).unwrap();
    manager.start("expert").unwrap();

    let delegator = DelegatingLoop {
        manager: manager.clone(),
        agent_id: "front".to_string(),
        target: "expert".to_string(),
    };
    manager.create_session("front", Box::new(delegator), None).unwrap();
    manager.start("front").unwrap();

    let task_id = manager
        .submit_task("front", Task::new(json!({"question": "life?"})))
        .unwrap();

    let task = wait_for_task(&manager, "front", &task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);

    let result = task.result.unwrap();
    assert_eq!(result["body"]["answer"], 42);
    assert_eq!(result["body"]["asked"]["question"], "life?");
    assert_eq!(result["error"], Value::Null);
}

#[tokio::test]
async fn concurrent_handoffs_resume_their_own_callers() {
    let manager = manager();

    // Echo target with a small delay so both hand-offs queue before either
    // response goes out
    let (oracle, _) = MockLoop::with_delay(Duration::from_millis(20), |input, _| {
        Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Terminate))
    });
    manager.create_session("oracle", oracle, None).unwrap();
    manager.start("oracle").unwrap();

    for caller in ["alice", "bob"] {
        let delegator = DelegatingLoop {
            manager: manager.clone(),
            agent_id: caller.to_string(),
            target: "oracle".to_string(),
        };
        manager.create_session(caller, Box::new(delegator), None).unwrap();
        manager.start(caller).unwrap();
    }

    // Overlapping chains through the one target, round after round; each
    // response must reach the caller whose chain carried the request
    for round in 0..10 {
        let alice_task = manager
            .submit_task("alice", Task::new(json!({"owner": "alice", "round": round})))
            .unwrap();
        let bob_task = manager
            .submit_task("bob", Task::new(json!({"owner": "bob", "round": round})))
            .unwrap();

        let alice_result = wait_for_task(&manager, "alice", &alice_task).await;
        let bob_result = wait_for_task(&manager, "bob", &bob_task).await;

        assert_eq!(alice_result.status, TaskStatus::Completed);
        assert_eq!(bob_result.status, TaskStatus::Completed);
        assert_eq!(
            alice_result.result.unwrap()["body"]["owner"],
            "alice",
            "round {round}: response crossed to the wrong caller"
        );
        assert_eq!(
            bob_result.result.unwrap()["body"]["owner"],
            "bob",
            "round {round}: response crossed to the wrong caller"
        );
    }
}

#[tokio::test]
async fn failed_handoff_turn_resumes_caller_with_error_response() {
    let manager = manager();

    let (flaky, _) = MockLoop::new(|input, _| match input.source {
        TurnSource::Handoff { .. } => Err(hive_core::CoreError::turn_failed("model unavailable")),
        _ => Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Terminate)),
    });
    manager.create_session("flaky", flaky, None).unwrap();
    manager.start("flaky").unwrap();

    let delegator = DelegatingLoop {
        manager: manager.clone(),
        agent_id: "front".to_string(),
        target: "flaky".to_string(),
    };
    manager.create_session("front", Box::new(delegator), None).unwrap();
    manager.start("front").unwrap();

    let task_id = manager.submit_task("front", Task::new(json!("q"))).unwrap();
    let task = wait_for_task(&manager, "front", &task_id).await;

    // The caller's own task completes; the error travels in the response
    assert_eq!(task.status, TaskStatus::Completed);
    let result = task.result.unwrap();
    assert!(result["error"].as_str().unwrap().contains("model unavailable"));
}

#[tokio::test]
async fn bounce_back_to_caller_is_rejected_as_circular() {
    let manager = manager();

    let bouncer = BounceBackLoop {
        manager: manager.clone(),
        agent_id: "replier".to_string(),
    };
    manager.create_session("replier", Box::new(bouncer), None).unwrap();
    manager.start("replier").unwrap();

    let delegator = DelegatingLoop {
        manager: manager.clone(),
        agent_id: "asker".to_string(),
        target: "replier".to_string(),
    };
    manager.create_session("asker", Box::new(delegator), None).unwrap();
    manager.start("asker").unwrap();

    let task_id = manager.submit_task("asker", Task::new(json!("q"))).unwrap();
    let task = wait_for_task(&manager, "asker", &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.unwrap()["body"]["circular_rejected"], true);
}

#[tokio::test]
async fn switch_to_unknown_agent_fails_without_suspending_caller() {
    let manager = manager();
    let started = Instant::now();

    let result = manager
        .request_switch("chain-1", "someone", "ghost", "help", json!({}))
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Switch(SwitchError::Mailbox(_)))
    ));
    // Synchronous rejection, nowhere near the switch timeout
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn self_switch_is_rejected() {
    let manager = manager();
    let (runner, _) = MockLoop::echo();
    manager.create_session("narcissist", runner, None).unwrap();

    let result = manager
        .request_switch("chain-1", "narcissist", "narcissist", "loop", json!({}))
        .await;
    assert!(matches!(
        result,
        Err(SessionError::Switch(SwitchError::SelfSwitch(_)))
    ));
}

#[tokio::test]
async fn switch_times_out_when_target_never_serves_it() {
    // Wire a short switch timeout by assembling the parts by hand
    let collector = EventCollector::default();
    let router = MailboxRouter::with_collector(collector.clone());
    let switch = SwitchHandler::new(router.clone(), 5, Duration::from_millis(100))
        .with_collector(collector.clone());
    let manager = SessionManager::new(router, switch, collector, SessionConfig::default());

    // Created but never started: the hand-off is delivered and sits unread
    let (runner, _) = MockLoop::echo();
    manager.create_session("dormant", runner, None).unwrap();

    let result = manager
        .request_switch("chain-1", "caller", "dormant", "anyone home", json!({}))
        .await;
    assert!(matches!(
        result,
        Err(SessionError::Switch(SwitchError::SwitchTimeout(_)))
    ));
}

#[tokio::test]
async fn stopping_target_resumes_suspended_caller() {
    let manager = manager();

    // Target never starts, so the caller stays suspended until the stop
    let (runner, _) = MockLoop::echo();
    manager.create_session("vanishing", runner, None).unwrap();

    let delegator = DelegatingLoop {
        manager: manager.clone(),
        agent_id: "front".to_string(),
        target: "vanishing".to_string(),
    };
    manager.create_session("front", Box::new(delegator), None).unwrap();
    manager.start("front").unwrap();

    let task_id = manager.submit_task("front", Task::new(json!("q"))).unwrap();

    // Once the hand-off is visible in the target's mailbox the caller is
    // suspended; stop the target out from under it
    wait_until(|| {
        !manager
            .router()
            .peek_handoff_requests("vanishing")
            .unwrap()
            .is_empty()
    })
    .await;
    manager.stop("vanishing").unwrap();

    let task = wait_for_task(&manager, "front", &task_id).await;
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.unwrap().to_lowercase().contains("stopped"));
}

// -------------------------------------------------------------------------
// Sleep / wake
// -------------------------------------------------------------------------

#[tokio::test]
async fn wake_matches_registered_conditions_only() {
    let manager = manager();
    let (runner, _) = MockLoop::echo();
    manager.create_session("dozer", runner, None).unwrap();
    manager.start("dozer").unwrap();

    manager.sleep("dozer", WakeCondition::on_events(["alert"])).unwrap();
    assert_eq!(manager.get_state("dozer").unwrap().state, SessionState::Sleeping);

    // Non-matching event: documented no-op
    assert!(!manager.wake("dozer", Some("unrelated")).unwrap());
    assert_eq!(manager.get_state("dozer").unwrap().state, SessionState::Sleeping);

    assert!(manager.wake("dozer", Some("alert")).unwrap());
    assert_eq!(manager.get_state("dozer").unwrap().state, SessionState::Running);

    // Already awake: no-op
    assert!(!manager.wake("dozer", Some("alert")).unwrap());
}

#[tokio::test]
async fn handoff_wakes_a_sleeping_target() {
    let manager = manager();

    let (oracle, _) = MockLoop::echo();
    manager.create_session("oracle", oracle, None).unwrap();
    manager.start("oracle").unwrap();
    manager.sleep("oracle", WakeCondition::on_events(["never-sent"])).unwrap();
    assert_eq!(manager.get_state("oracle").unwrap().state, SessionState::Sleeping);

    let delegator = DelegatingLoop {
        manager: manager.clone(),
        agent_id: "front".to_string(),
        target: "oracle".to_string(),
    };
    manager.create_session("front", Box::new(delegator), None).unwrap();
    manager.start("front").unwrap();

    // The hand-off wakes the sleeper and is served, not left to time out
    let task_id = manager
        .submit_task("front", Task::new(json!({"q": 1})))
        .unwrap();
    let task = wait_for_task(&manager, "front", &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.unwrap()["body"]["q"], 1);
    assert_eq!(manager.get_state("oracle").unwrap().state, SessionState::Running);
}

#[tokio::test]
async fn explicit_wake_always_wakes() {
    let manager = manager();
    let (runner, _) = MockLoop::echo();
    manager.create_session("dozer", runner, None).unwrap();
    manager.start("dozer").unwrap();

    manager.sleep("dozer", WakeCondition::on_events(["never-sent"])).unwrap();
    assert!(manager.wake("dozer", None).unwrap());
    assert_eq!(manager.get_state("dozer").unwrap().state, SessionState::Running);
}

#[tokio::test]
async fn submitted_task_wakes_sleeping_session() {
    let manager = manager();
    let (runner, stats) = MockLoop::echo();
    manager.create_session("dozer", runner, None).unwrap();
    manager.start("dozer").unwrap();

    manager.sleep("dozer", WakeCondition::default()).unwrap();

    let task_id = manager.submit_task("dozer", Task::new(json!("work"))).unwrap();
    let task = wait_for_task(&manager, "dozer", &task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(stats.turns(), 1);
    assert_eq!(manager.get_state("dozer").unwrap().state, SessionState::Running);
}

#[tokio::test]
async fn wake_timer_elapses_on_its_own() {
    let manager = manager();
    let (runner, _) = MockLoop::echo();
    manager.create_session("napper", runner, None).unwrap();
    manager.start("napper").unwrap();

    let wake_at = chrono::Utc::now() + chrono::Duration::milliseconds(100);
    manager
        .sleep("napper", WakeCondition::default().with_wake_at(wake_at))
        .unwrap();

    wait_until(|| manager.get_state("napper").unwrap().state == SessionState::Running).await;
}

#[tokio::test]
async fn idle_session_sleeps_after_the_configured_timeout() {
    let manager = manager();
    let config = SessionConfig {
        idle_sleep_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let (runner, stats) = MockLoop::echo();
    manager.create_session("lazy", runner, Some(config)).unwrap();
    manager.start("lazy").unwrap();

    wait_until(|| manager.get_state("lazy").unwrap().state == SessionState::Sleeping).await;

    // Queued work still wakes it
    let task_id = manager.submit_task("lazy", Task::new(json!("work"))).unwrap();
    let task = wait_for_task(&manager, "lazy", &task_id).await;
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(stats.turns(), 1);
}

#[tokio::test]
async fn broadcast_wakes_matching_sleepers_and_queues_the_payload() {
    let manager = manager();

    let (a_runner, a_stats) = MockLoop::echo();
    let (b_runner, b_stats) = MockLoop::echo();
    let (c_runner, c_stats) = MockLoop::echo();
    manager.create_session("a", a_runner, None).unwrap();
    manager.create_session("b", b_runner, None).unwrap();
    manager.create_session("c", c_runner, None).unwrap();
    for agent in ["a", "b", "c"] {
        manager.start(agent).unwrap();
    }

    manager.sleep("a", WakeCondition::on_events(["tick"])).unwrap();
    manager.sleep("b", WakeCondition::on_events(["tick"])).unwrap();
    manager.sleep("c", WakeCondition::on_events(["other"])).unwrap();

    let woken = manager.broadcast("tick", json!({"beat": 1}));
    assert_eq!(woken, 2);

    wait_until(|| a_stats.turns() == 1 && b_stats.turns() == 1).await;
    assert_eq!(a_stats.task_payloads(), vec![json!({"beat": 1})]);
    assert_eq!(b_stats.task_payloads(), vec![json!({"beat": 1})]);

    // The non-matching sleeper stays asleep and untouched
    assert_eq!(manager.get_state("c").unwrap().state, SessionState::Sleeping);
    assert_eq!(c_stats.turns(), 0);
}

// -------------------------------------------------------------------------
// Failure isolation
// -------------------------------------------------------------------------

#[tokio::test]
async fn failed_turn_fails_the_task_but_not_the_session() {
    let manager = manager();
    let (runner, _) = MockLoop::new(|input, turn| {
        if turn == 0 {
            Err(hive_core::CoreError::turn_failed("tool crashed"))
        } else {
            Ok(TurnOutcome::new(input.payload).with_status(TurnStatus::Terminate))
        }
    });
    manager.create_session("resilient", runner, None).unwrap();
    manager.start("resilient").unwrap();

    let first = manager.submit_task("resilient", Task::new(json!(1))).unwrap();
    let failed = wait_for_task(&manager, "resilient", &first).await;
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.unwrap().contains("tool crashed"));

    // The session keeps serving work
    let second = manager.submit_task("resilient", Task::new(json!(2))).unwrap();
    let completed = wait_for_task(&manager, "resilient", &second).await;
    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(manager.get_state("resilient").unwrap().state, SessionState::Running);
}

// -------------------------------------------------------------------------
// Mailbox ordering end to end
// -------------------------------------------------------------------------

#[tokio::test]
async fn mailbox_drain_orders_priority_then_arrival() {
    let manager = manager();
    let (runner, _) = MockLoop::echo();
    manager.create_session("reader", runner, None).unwrap();

    let router = manager.router();
    for (n, priority) in [
        (1, hive_mailbox::MessagePriority::Normal),
        (2, hive_mailbox::MessagePriority::Urgent),
        (3, hive_mailbox::MessagePriority::Normal),
        (4, hive_mailbox::MessagePriority::Urgent),
    ] {
        router
            .deliver(
                hive_mailbox::Message::new("peer", "reader", json!({"n": n}))
                    .with_priority(priority),
            )
            .unwrap();
    }

    let snapshot = manager.get_state("reader").unwrap();
    assert_eq!(snapshot.unread_messages, 4);

    let drained = router.drain("reader", true).unwrap();
    let order: Vec<u64> = drained.iter().map(|m| m.body["n"].as_u64().unwrap()).collect();
    assert_eq!(order, vec![2, 4, 1, 3]);

    // Read flags stick: nothing left unread
    assert_eq!(manager.get_state("reader").unwrap().unread_messages, 0);
}
