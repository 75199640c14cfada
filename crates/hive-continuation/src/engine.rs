//! Continuation decision engine
//!
//! Given the outcome of one actor turn, decides CONTINUE or TERMINATE and
//! records whether the decision was explicit, inferred, or forced by a
//! safety limit. The decision is an explicit tagged value, never control
//! flow.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::outcome::{ToolCallCapacity, TurnOutcome, TurnStatus};

/// The decision itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContinuationAction {
    Continue,
    Terminate,
}

/// Where the decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// The actor's output carried an explicit signal
    Explicit,

    /// Derived from tool-call behavior or the default-safe rule
    Inferred,

    /// A hard cap overrode everything else
    SafetyLimit,
}

/// Why a terminate decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    IterationLimit,
    ExplicitSignal,
    NoToolCalls,
    /// Tool calls were issued but the policy default ended the sequence
    DefaultPolicy,
    NoProgress,
    TurnFailed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IterationLimit => "iteration_limit",
            Self::ExplicitSignal => "explicit_signal",
            Self::NoToolCalls => "no_tool_calls",
            Self::DefaultPolicy => "default_policy",
            Self::NoProgress => "no_progress",
            Self::TurnFailed => "turn_failed",
        }
    }
}

/// A per-turn decision with its provenance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: ContinuationAction,
    pub source: DecisionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl Decision {
    fn cont(source: DecisionSource) -> Self {
        Self {
            action: ContinuationAction::Continue,
            source,
            stop_reason: None,
        }
    }

    fn stop(source: DecisionSource, reason: StopReason) -> Self {
        Self {
            action: ContinuationAction::Terminate,
            source,
            stop_reason: Some(reason),
        }
    }

    pub fn is_continue(&self) -> bool {
        self.action == ContinuationAction::Continue
    }
}

/// Policy knobs for a turn sequence
///
/// `default_action_without_signal` covers the "no tool call and no explicit
/// signal" fallback, kept configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationPolicy {
    /// Hard cap on unattended turns per sequence
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Tool-call capacity of the acting model
    #[serde(default)]
    pub tool_call_capacity: ToolCallCapacity,

    /// How many identical consecutive turns trip the no-progress guard
    #[serde(default = "default_no_progress_window")]
    pub no_progress_window: usize,

    /// Fallback when a turn carries neither tool calls nor a signal
    #[serde(default = "default_action_without_signal")]
    pub default_action_without_signal: ContinuationAction,
}

fn default_max_iterations() -> usize {
    10
}

fn default_no_progress_window() -> usize {
    3
}

fn default_action_without_signal() -> ContinuationAction {
    ContinuationAction::Terminate
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_call_capacity: ToolCallCapacity::Unbounded,
            no_progress_window: default_no_progress_window(),
            default_action_without_signal: default_action_without_signal(),
        }
    }
}

/// Running state of one unattended turn sequence
///
/// Created when the sequence starts, updated after every turn, discarded
/// when the sequence ends.
#[derive(Debug)]
pub struct ContinuationState {
    policy: ContinuationPolicy,
    iteration_count: usize,
    last_decision: Option<ContinuationAction>,
    recent_signatures: VecDeque<String>,
}

impl ContinuationState {
    pub fn new(policy: ContinuationPolicy) -> Self {
        Self {
            policy,
            iteration_count: 0,
            last_decision: None,
            recent_signatures: VecDeque::new(),
        }
    }

    /// Turns completed so far in this sequence
    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    /// The most recent decision, if any
    pub fn last_decision(&self) -> Option<ContinuationAction> {
        self.last_decision
    }

    /// Decide whether the actor keeps acting after the given turn
    ///
    /// Priority order: iteration cap, explicit signal, inferred continue for
    /// single-call models mid-task, then the policy default. A continue
    /// decision is still subject to the no-progress guard.
    pub fn evaluate(&mut self, outcome: &TurnOutcome) -> Decision {
        self.iteration_count += 1;

        let decision = self.decide(outcome);

        let decision = if decision.is_continue() {
            self.apply_no_progress_guard(outcome, decision)
        } else {
            decision
        };

        self.last_decision = Some(decision.action);
        decision
    }

    fn decide(&self, outcome: &TurnOutcome) -> Decision {
        // 1. Hard stop always wins
        if self.iteration_count >= self.policy.max_iterations {
            return Decision::stop(DecisionSource::SafetyLimit, StopReason::IterationLimit);
        }

        // 2. Explicit signal
        match outcome.declared_status {
            Some(TurnStatus::Continue) => return Decision::cont(DecisionSource::Explicit),
            Some(TurnStatus::Terminate) => {
                return Decision::stop(DecisionSource::Explicit, StopReason::ExplicitSignal)
            }
            None => {}
        }

        // 3. Single-call models cannot batch multi-step work themselves
        if !outcome.tool_calls.is_empty()
            && self.policy.tool_call_capacity == ToolCallCapacity::Single
            && outcome.implies_unfinished_work()
        {
            return Decision::cont(DecisionSource::Inferred);
        }

        // 4/5. Default-safe fallback
        match self.policy.default_action_without_signal {
            ContinuationAction::Continue => Decision::cont(DecisionSource::Inferred),
            ContinuationAction::Terminate => {
                let reason = if outcome.tool_calls.is_empty() {
                    StopReason::NoToolCalls
                } else {
                    StopReason::DefaultPolicy
                };
                Decision::stop(DecisionSource::Inferred, reason)
            }
        }
    }

    fn apply_no_progress_guard(&mut self, outcome: &TurnOutcome, decision: Decision) -> Decision {
        let key = outcome.signature_key();

        self.recent_signatures.push_back(key.clone());
        while self.recent_signatures.len() > self.policy.no_progress_window {
            self.recent_signatures.pop_front();
        }

        // A window of identical non-empty signatures means the actor is
        // spinning on the same tool call without new information.
        let window_full = self.recent_signatures.len() == self.policy.no_progress_window;
        if window_full && !key.is_empty() && self.recent_signatures.iter().all(|k| *k == key) {
            tracing::warn!(
                "No-progress guard tripped: identical tool calls over {} turns",
                self.policy.no_progress_window
            );
            return Decision::stop(DecisionSource::SafetyLimit, StopReason::NoProgress);
        }

        decision
    }
}
