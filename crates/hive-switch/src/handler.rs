//! Hand-off coordinator

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

use hive_mailbox::{MailboxRouter, Message};
use hive_telemetry::{EventCollector, OrchestratorEvent};

use crate::{
    error::SwitchError,
    frame::{LinkState, SwitchFrame, SwitchResponse},
    Result,
};

type PendingSender = oneshot::Sender<Result<SwitchResponse>>;

/// Coordinates synchronous hand-offs between sessions
///
/// Owns one explicit frame stack per chain id. A caller suspends in
/// [`request_switch`](SwitchHandler::request_switch) until the target's
/// session completes the switch, the timeout elapses, or the target stops.
/// Frames are popped regardless of outcome.
#[derive(Clone)]
pub struct SwitchHandler {
    router: MailboxRouter,
    chains: Arc<DashMap<String, Vec<SwitchFrame>>>,
    pending: Arc<DashMap<String, PendingSender>>,
    collector: Option<EventCollector>,
    max_depth: usize,
    default_timeout: Duration,
}

impl SwitchHandler {
    /// Create a handler with the given depth limit and caller-visible timeout
    pub fn new(router: MailboxRouter, max_depth: usize, default_timeout: Duration) -> Self {
        Self {
            router,
            chains: Arc::new(DashMap::new()),
            pending: Arc::new(DashMap::new()),
            collector: None,
            max_depth,
            default_timeout,
        }
    }

    /// Attach an event collector for switch notifications
    pub fn with_collector(mut self, collector: EventCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Current stack depth of a chain
    pub fn active_depth(&self, chain_id: &str) -> usize {
        self.chains.get(chain_id).map(|c| c.len()).unwrap_or(0)
    }

    /// Hand control to another agent and wait for its response
    ///
    /// Validates the link (self-loop, cycle, depth) before anything is
    /// queued; a validation failure returns immediately and the caller is
    /// never suspended. On success the hand-off message is delivered with
    /// `requires_handoff=true` and the caller blocks until
    /// [`complete_switch`](SwitchHandler::complete_switch) or the timeout.
    pub async fn request_switch(
        &self,
        chain_id: &str,
        from: &str,
        to: &str,
        reason: &str,
        body: Value,
    ) -> Result<SwitchResponse> {
        let frame = self.push_frame(chain_id, from, to, reason)?;
        let frame_id = frame.frame_id.clone();

        let (tx, rx) = oneshot::channel();
        self.pending.insert(frame_id.clone(), tx);

        // Deliver the hand-off request; an unknown recipient aborts the
        // link before the caller suspends.
        let message = Message::handoff(from, to, body, chain_id);
        if let Err(e) = self.router.deliver(message) {
            self.pop_frame(chain_id, &frame_id);
            self.pending.remove(&frame_id);
            return Err(e.into());
        }

        if let Some(collector) = &self.collector {
            collector.emit(OrchestratorEvent::switch_requested(chain_id, from, to));
        }
        tracing::debug!(chain = %chain_id, from = %from, to = %to, "Switch requested");

        match timeout(self.default_timeout, rx).await {
            Ok(Ok(result)) => {
                if result.is_ok() {
                    if let Some(collector) = &self.collector {
                        collector.emit(OrchestratorEvent::switch_completed(chain_id, from, to));
                    }
                }
                result
            }
            // Sender dropped without a response: the target went away
            Ok(Err(_)) => {
                self.pop_frame(chain_id, &frame_id);
                Err(SwitchError::SwitchTargetStopped(to.to_string()))
            }
            // Timeout elapsed; fail the caller rather than blocking forever
            Err(_) => {
                self.pop_frame(chain_id, &frame_id);
                self.pending.remove(&frame_id);
                tracing::warn!(chain = %chain_id, from = %from, to = %to, "Switch timed out");
                Err(SwitchError::SwitchTimeout(self.default_timeout))
            }
        }
    }

    /// Resume the caller of `chain_id` waiting on `agent_id`
    ///
    /// Pops the innermost frame of that chain awaiting this agent and fulfils
    /// its pending response. Correlating by chain keeps concurrent chains
    /// through the same target from crossing their responses. Fails with
    /// `NoPendingSwitch` if nothing matches.
    pub fn complete_switch(
        &self,
        chain_id: &str,
        agent_id: &str,
        response: SwitchResponse,
    ) -> Result<()> {
        let frame = self
            .take_frame_awaiting(chain_id, agent_id)
            .ok_or_else(|| SwitchError::NoPendingSwitch(agent_id.to_string()))?;

        let sender = self
            .pending
            .remove(&frame.frame_id)
            .map(|(_, tx)| tx)
            .ok_or_else(|| SwitchError::NoPendingSwitch(agent_id.to_string()))?;

        tracing::debug!(
            chain = %frame.chain_id,
            from = %frame.from_agent,
            to = %frame.to_agent,
            "Switch completed"
        );

        // Caller may have timed out already; that is fine
        let _ = sender.send(Ok(response));
        Ok(())
    }

    /// Fail every caller currently waiting on `agent_id`
    ///
    /// Invoked when a session stops so in-flight chains through it resume
    /// their callers with `SwitchTargetStopped` instead of hanging.
    pub fn fail_pending_for(&self, agent_id: &str) -> usize {
        let mut failed = 0;

        let chain_ids: Vec<String> = self.chains.iter().map(|e| e.key().clone()).collect();
        for chain_id in chain_ids {
            let removed: Vec<SwitchFrame> = match self.chains.get_mut(&chain_id) {
                Some(mut chain) => {
                    let (stopped, kept): (Vec<_>, Vec<_>) = chain
                        .drain(..)
                        .partition(|f| f.to_agent == agent_id);
                    *chain = kept;
                    stopped
                }
                None => continue,
            };

            for frame in removed {
                if let Some((_, tx)) = self.pending.remove(&frame.frame_id) {
                    let _ = tx.send(Err(SwitchError::SwitchTargetStopped(agent_id.to_string())));
                    failed += 1;
                }
            }

            self.chains.remove_if(&chain_id, |_, chain| chain.is_empty());
        }

        if failed > 0 {
            tracing::info!("Failed {} pending switches targeting {}", failed, agent_id);
        }
        failed
    }

    fn push_frame(&self, chain_id: &str, from: &str, to: &str, reason: &str) -> Result<SwitchFrame> {
        if from == to {
            return Err(SwitchError::SelfSwitch(from.to_string()));
        }

        let mut chain = self.chains.entry(chain_id.to_string()).or_default();

        // Cycle rule: the target may not already be part of this chain
        let in_chain = chain
            .iter()
            .any(|f| f.from_agent == to || f.to_agent == to);
        if in_chain {
            return Err(SwitchError::CircularSwitch {
                agent: to.to_string(),
                chain: chain_id.to_string(),
            });
        }

        if chain.len() >= self.max_depth {
            return Err(SwitchError::MaxDepthExceeded(self.max_depth));
        }

        let frame = SwitchFrame::new(chain_id, from, to, reason);
        chain.push(frame.clone());
        Ok(frame)
    }

    fn pop_frame(&self, chain_id: &str, frame_id: &str) {
        if let Some(mut chain) = self.chains.get_mut(chain_id) {
            chain.retain(|f| f.frame_id != frame_id);
        }
        self.chains.remove_if(chain_id, |_, chain| chain.is_empty());
    }

    /// Remove and return the innermost frame of `chain_id` awaiting `agent_id`
    fn take_frame_awaiting(&self, chain_id: &str, agent_id: &str) -> Option<SwitchFrame> {
        let taken = {
            let mut chain = self.chains.get_mut(chain_id)?;
            let pos = chain
                .iter()
                .rposition(|f| f.to_agent == agent_id && f.state == LinkState::AwaitingTarget)?;
            let mut frame = chain.remove(pos);
            frame.state = LinkState::Resumed;
            frame
        };

        // Empty-chain cleanup happens after the map guard is released
        self.chains.remove_if(chain_id, |_, chain| chain.is_empty());
        Some(taken)
    }
}
