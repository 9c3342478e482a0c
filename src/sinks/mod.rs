pub mod attributed;
pub mod buffer;
pub mod composite;
pub mod console;
pub mod logging;
pub mod queue;

use std::sync::Arc;

use serde_json::Value;

use crate::error::SinkError;
use crate::events::{
    AgentEvent, BlockPhase, LifecyclePhase, Metadata, ToolPhase, ToolResult,
};

pub use attributed::AttributedSink;
pub use buffer::{BufferSink, BufferedResult, ToolUse};
pub use composite::CompositeSink;
pub use console::ConsoleSink;
pub use logging::LoggingSink;
pub use queue::QueueSink;

/// A consumer of dispatched events. One hook per event kind; every hook
/// defaults to a no-op so sinks only implement what they care about.
///
/// Hooks take `&self`. Sinks that accumulate state keep it behind a lock so a
/// caller can hold an `Arc` to the sink and query it after dispatch.
pub trait EventSink: Send + Sync {
    fn on_lifecycle(&self, _phase: LifecyclePhase, _reason: Option<&str>) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_text(&self, _content: &str, _is_final: bool) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_tool_start(&self, _name: &str, _input: &Value) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_tool_end(&self, _name: &str, _input: &Value, _result: &Value) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_tool_result(&self, _result: &ToolResult) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_metadata(&self, _metadata: &Metadata) -> Result<(), SinkError> {
        Ok(())
    }

    fn on_content_block(
        &self,
        _phase: BlockPhase,
        _index: u64,
        _tool_name: Option<&str>,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Lets a caller keep an `Arc` to a sink (e.g. to read a buffer afterwards)
/// while handing a clone to a dispatcher.
impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn on_lifecycle(&self, phase: LifecyclePhase, reason: Option<&str>) -> Result<(), SinkError> {
        (**self).on_lifecycle(phase, reason)
    }

    fn on_text(&self, content: &str, is_final: bool) -> Result<(), SinkError> {
        (**self).on_text(content, is_final)
    }

    fn on_tool_start(&self, name: &str, input: &Value) -> Result<(), SinkError> {
        (**self).on_tool_start(name, input)
    }

    fn on_tool_end(&self, name: &str, input: &Value, result: &Value) -> Result<(), SinkError> {
        (**self).on_tool_end(name, input, result)
    }

    fn on_tool_result(&self, result: &ToolResult) -> Result<(), SinkError> {
        (**self).on_tool_result(result)
    }

    fn on_metadata(&self, metadata: &Metadata) -> Result<(), SinkError> {
        (**self).on_metadata(metadata)
    }

    fn on_content_block(
        &self,
        phase: BlockPhase,
        index: u64,
        tool_name: Option<&str>,
    ) -> Result<(), SinkError> {
        (**self).on_content_block(phase, index, tool_name)
    }
}

/// Route one event to the matching hook.
pub fn deliver(sink: &dyn EventSink, event: &AgentEvent) -> Result<(), SinkError> {
    match event {
        AgentEvent::Lifecycle { phase, reason } => sink.on_lifecycle(*phase, reason.as_deref()),
        AgentEvent::TextDelta { content, is_final } => sink.on_text(content, *is_final),
        AgentEvent::ToolInvocation(tool) => match tool.phase {
            ToolPhase::Start => sink.on_tool_start(&tool.tool_name, &tool.input),
            ToolPhase::End => sink.on_tool_end(
                &tool.tool_name,
                &tool.input,
                tool.result.as_ref().unwrap_or(&Value::Null),
            ),
        },
        AgentEvent::ToolResult(result) => sink.on_tool_result(result),
        AgentEvent::Metadata(metadata) => sink.on_metadata(metadata),
        AgentEvent::ContentBlock {
            phase,
            index,
            tool_name,
        } => sink.on_content_block(*phase, *index, tool_name.as_deref()),
    }
}
