use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phases of an invocation's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Init,
    Start,
    EventLoopStart,
    MessageStart,
    MessageStop,
    Complete,
    ForceStop,
}

impl LifecyclePhase {
    /// Complete and ForceStop end an invocation. Nothing is dispatched after them.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecyclePhase::Complete | LifecyclePhase::ForceStop)
    }

    /// Phases that belong to the invocation as a whole rather than to one message.
    pub fn is_invocation_scoped(self) -> bool {
        matches!(
            self,
            LifecyclePhase::Init
                | LifecyclePhase::Start
                | LifecyclePhase::EventLoopStart
                | LifecyclePhase::Complete
                | LifecyclePhase::ForceStop
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPhase {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Error,
}

/// One item of a tool result's content list.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultItem {
    Text(String),
    Json(Value),
}

/// A tool starting or finishing.
///
/// Start and End are paired by `tool_name` alone; the runtime gives no call id here.
/// Two concurrent calls to the same tool cannot be told apart.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub phase: ToolPhase,
    pub tool_name: String,
    pub input: Value,
    pub result: Option<Value>,
}

/// A tool result as echoed back in the conversation (user-role message).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub status: ToolStatus,
    pub content: Vec<ResultItem>,
}

/// Usage and latency reported at the end of a model message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
}

/// Everything observable during one agent invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Lifecycle {
        phase: LifecyclePhase,
        reason: Option<String>,
    },
    TextDelta {
        content: String,
        is_final: bool,
    },
    ToolInvocation(ToolInvocation),
    ToolResult(ToolResult),
    Metadata(Metadata),
    ContentBlock {
        phase: BlockPhase,
        index: u64,
        tool_name: Option<String>,
    },
}

impl AgentEvent {
    pub fn lifecycle(phase: LifecyclePhase) -> Self {
        AgentEvent::Lifecycle {
            phase,
            reason: None,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        AgentEvent::TextDelta {
            content: content.into(),
            is_final: false,
        }
    }

    pub fn tool_start(tool_name: impl Into<String>, input: Value) -> Self {
        AgentEvent::ToolInvocation(ToolInvocation {
            phase: ToolPhase::Start,
            tool_name: tool_name.into(),
            input,
            result: None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Lifecycle { phase, .. } if phase.is_terminal())
    }
}

/// Wire envelope pushed to WebSocket / SSE clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Text { content: String },
    ToolStart { name: String, input: Value },
    ToolEnd { name: String, input: Value },
    Complete,
    Error { content: String },
}

impl Envelope {
    /// Map an event to its envelope. Events the transport doesn't carry map to `None`.
    pub fn from_event(event: &AgentEvent) -> Option<Self> {
        match event {
            AgentEvent::TextDelta { content, .. } => Some(Envelope::Text {
                content: content.clone(),
            }),
            AgentEvent::ToolInvocation(tool) => {
                let name = tool.tool_name.clone();
                let input = tool.input.clone();
                Some(match tool.phase {
                    ToolPhase::Start => Envelope::ToolStart { name, input },
                    ToolPhase::End => Envelope::ToolEnd { name, input },
                })
            }
            AgentEvent::Lifecycle {
                phase: LifecyclePhase::Complete,
                ..
            } => Some(Envelope::Complete),
            AgentEvent::Lifecycle {
                phase: LifecyclePhase::ForceStop,
                reason,
            } => Some(Envelope::Error {
                content: reason.clone().unwrap_or_else(|| "force stopped".into()),
            }),
            _ => None,
        }
    }

    /// The `type` field value.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Text { .. } => "text",
            Envelope::ToolStart { .. } => "tool_start",
            Envelope::ToolEnd { .. } => "tool_end",
            Envelope::Complete => "complete",
            Envelope::Error { .. } => "error",
        }
    }

    /// The consumer stops draining after a terminal envelope.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Envelope::Complete | Envelope::Error { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
