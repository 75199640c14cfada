//! Turn outcome types
//!
//! This is the shape every reasoning loop returns from a turn; the engine
//! depends only on it, not on how the loop calls a model or tools.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Explicit continuation signal embedded in an actor's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    Continue,
    Terminate,
}

/// How many tool calls the acting model can issue per turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallCapacity {
    /// One tool call per turn; multi-step work needs inferred continuation
    Single,

    /// The model batches its own tool calls
    #[default]
    Unbounded,
}

/// Signature of one tool call issued during a turn
///
/// Only the signature is observed here; tool execution belongs to the
/// reasoning loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallSignature {
    /// Tool name
    pub name: String,

    /// Arguments as passed to the tool
    pub arguments: Value,
}

impl ToolCallSignature {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Canonical form used for no-progress comparison
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.arguments)
    }
}

/// The result of one reasoning-loop turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Tool calls issued this turn
    #[serde(default)]
    pub tool_calls: Vec<ToolCallSignature>,

    /// Explicit continue/terminate signal, if the model declared one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_status: Option<TurnStatus>,

    /// The turn's output payload
    pub output: Value,
}

impl TurnOutcome {
    pub fn new(output: Value) -> Self {
        Self {
            tool_calls: Vec::new(),
            declared_status: None,
            output,
        }
    }

    pub fn with_status(mut self, status: TurnStatus) -> Self {
        self.declared_status = Some(status);
        self
    }

    pub fn with_tool_call(mut self, call: ToolCallSignature) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Whether the turn's output suggests unfinished multi-step work
    ///
    /// A turn that issued tool calls but produced no final text is treated
    /// as mid-task; one that produced a concrete answer is not.
    pub fn implies_unfinished_work(&self) -> bool {
        if self.tool_calls.is_empty() {
            return false;
        }

        match &self.output {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            Value::Object(map) => map
                .get("text")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().is_empty())
                .unwrap_or(true),
            _ => false,
        }
    }

    /// Canonical form of this turn's tool-call set
    pub fn signature_key(&self) -> String {
        let mut keys: Vec<String> = self.tool_calls.iter().map(|c| c.key()).collect();
        keys.sort();
        keys.join("|")
    }
}
