use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::EventSink;
use crate::dispatcher::Dispatcher;
use crate::error::SinkError;
use crate::events::{
    AgentEvent, BlockPhase, LifecyclePhase, Metadata, ToolInvocation, ToolPhase, ToolResult,
};

/// Relays a sub-agent's events into its parent's dispatcher, tagged with the
/// sub-agent's name.
///
/// Text becomes `"[<agent>] <text>"` and tool names become `"[<agent>] <tool>"`.
/// The sub-agent's own invocation-level lifecycle (init, start, complete,
/// force stop) stays local: forwarding it would open or close the parent's
/// stream. Its text is never final from the parent's point of view.
pub struct AttributedSink {
    agent: String,
    parent: Arc<Dispatcher>,
}

impl AttributedSink {
    pub fn new(agent: impl Into<String>, parent: Arc<Dispatcher>) -> Self {
        Self {
            agent: agent.into(),
            parent,
        }
    }

    fn tag(&self, s: &str) -> String {
        format!("[{}] {}", self.agent, s)
    }

    fn forward(&self, event: AgentEvent) -> Result<(), SinkError> {
        self.parent.forward(&event).map(|_| ())
    }
}

impl EventSink for AttributedSink {
    fn on_lifecycle(&self, phase: LifecyclePhase, reason: Option<&str>) -> Result<(), SinkError> {
        if phase.is_invocation_scoped() {
            debug!(agent = %self.agent, ?phase, "sub-agent lifecycle kept local");
            return Ok(());
        }
        self.forward(AgentEvent::Lifecycle {
            phase,
            reason: reason.map(str::to_string),
        })
    }

    fn on_text(&self, content: &str, _is_final: bool) -> Result<(), SinkError> {
        self.forward(AgentEvent::TextDelta {
            content: self.tag(content),
            is_final: false,
        })
    }

    fn on_tool_start(&self, name: &str, input: &Value) -> Result<(), SinkError> {
        self.forward(AgentEvent::tool_start(self.tag(name), input.clone()))
    }

    fn on_tool_end(&self, name: &str, input: &Value, result: &Value) -> Result<(), SinkError> {
        self.forward(AgentEvent::ToolInvocation(ToolInvocation {
            phase: ToolPhase::End,
            tool_name: self.tag(name),
            input: input.clone(),
            result: Some(result.clone()),
        }))
    }

    fn on_tool_result(&self, result: &ToolResult) -> Result<(), SinkError> {
        self.forward(AgentEvent::ToolResult(result.clone()))
    }

    fn on_metadata(&self, metadata: &Metadata) -> Result<(), SinkError> {
        self.forward(AgentEvent::Metadata(*metadata))
    }

    fn on_content_block(
        &self,
        phase: BlockPhase,
        index: u64,
        tool_name: Option<&str>,
    ) -> Result<(), SinkError> {
        self.forward(AgentEvent::ContentBlock {
            phase,
            index,
            tool_name: tool_name.map(str::to_string),
        })
    }
}
