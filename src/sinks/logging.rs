use serde_json::Value;
use tracing::{debug, info, warn};

use super::EventSink;
use crate::error::SinkError;
use crate::events::{BlockPhase, LifecyclePhase, Metadata, ResultItem, ToolResult, ToolStatus};

/// Mirrors the console through `tracing`. Text deltas at debug, everything
/// structural at info. Keeps nothing.
pub struct LoggingSink {
    agent: String,
}

impl LoggingSink {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
        }
    }
}

impl EventSink for LoggingSink {
    fn on_lifecycle(&self, phase: LifecyclePhase, reason: Option<&str>) -> Result<(), SinkError> {
        match phase {
            LifecyclePhase::ForceStop => {
                warn!(agent = %self.agent, reason = reason.unwrap_or("unknown"), "event loop force stopped");
            }
            LifecyclePhase::MessageStop => {
                info!(agent = %self.agent, reason = reason.unwrap_or("unknown"), "message stop");
            }
            _ => info!(agent = %self.agent, ?phase, "lifecycle"),
        }
        Ok(())
    }

    fn on_text(&self, content: &str, is_final: bool) -> Result<(), SinkError> {
        if !content.is_empty() {
            debug!(agent = %self.agent, content, "text delta");
        }
        if is_final {
            info!(agent = %self.agent, "text generation complete");
        }
        Ok(())
    }

    fn on_tool_start(&self, name: &str, input: &Value) -> Result<(), SinkError> {
        info!(agent = %self.agent, tool = name, "tool start");
        debug!(agent = %self.agent, tool = name, %input, "tool input");
        Ok(())
    }

    fn on_tool_end(&self, name: &str, _input: &Value, result: &Value) -> Result<(), SinkError> {
        info!(agent = %self.agent, tool = name, "tool end");
        debug!(agent = %self.agent, tool = name, %result, "tool output");
        Ok(())
    }

    fn on_tool_result(&self, result: &ToolResult) -> Result<(), SinkError> {
        let is_error = result.status == ToolStatus::Error;
        info!(
            agent = %self.agent,
            tool_call_id = %result.tool_call_id,
            is_error,
            items = result.content.len(),
            "tool result"
        );
        for item in &result.content {
            match item {
                ResultItem::Text(text) => debug!(agent = %self.agent, text = %text, "tool result text"),
                ResultItem::Json(json) => debug!(agent = %self.agent, %json, "tool result json"),
            }
        }
        Ok(())
    }

    fn on_metadata(&self, metadata: &Metadata) -> Result<(), SinkError> {
        info!(
            agent = %self.agent,
            input_tokens = metadata.input_tokens,
            output_tokens = metadata.output_tokens,
            latency_ms = metadata.latency_ms,
            "usage"
        );
        Ok(())
    }

    fn on_content_block(
        &self,
        phase: BlockPhase,
        index: u64,
        tool_name: Option<&str>,
    ) -> Result<(), SinkError> {
        info!(agent = %self.agent, ?phase, index, tool = tool_name.unwrap_or(""), "content block");
        Ok(())
    }
}
