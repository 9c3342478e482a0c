use std::sync::Arc;

use serde_json::Value;

use super::EventSink;
use crate::error::SinkError;
use crate::events::{BlockPhase, LifecyclePhase, Metadata, ToolResult};

/// Fans every hook out to its children in registration order.
///
/// No fault isolation: the first child that fails stops the fan-out for that
/// event and its error is returned. Children after it never see the event.
/// Wrap a fragile sink yourself if it must not take the others down.
#[derive(Default, Clone)]
pub struct CompositeSink {
    children: Vec<Arc<dyn EventSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.push(sink);
        self
    }

    pub fn push(&mut self, sink: impl EventSink + 'static) {
        self.children.push(Arc::new(sink));
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }
}

impl EventSink for CompositeSink {
    fn on_lifecycle(&self, phase: LifecyclePhase, reason: Option<&str>) -> Result<(), SinkError> {
        for child in &self.children {
            child.on_lifecycle(phase, reason)?;
        }
        Ok(())
    }

    fn on_text(&self, content: &str, is_final: bool) -> Result<(), SinkError> {
        for child in &self.children {
            child.on_text(content, is_final)?;
        }
        Ok(())
    }

    fn on_tool_start(&self, name: &str, input: &Value) -> Result<(), SinkError> {
        for child in &self.children {
            child.on_tool_start(name, input)?;
        }
        Ok(())
    }

    fn on_tool_end(&self, name: &str, input: &Value, result: &Value) -> Result<(), SinkError> {
        for child in &self.children {
            child.on_tool_end(name, input, result)?;
        }
        Ok(())
    }

    fn on_tool_result(&self, result: &ToolResult) -> Result<(), SinkError> {
        for child in &self.children {
            child.on_tool_result(result)?;
        }
        Ok(())
    }

    fn on_metadata(&self, metadata: &Metadata) -> Result<(), SinkError> {
        for child in &self.children {
            child.on_metadata(metadata)?;
        }
        Ok(())
    }

    fn on_content_block(
        &self,
        phase: BlockPhase,
        index: u64,
        tool_name: Option<&str>,
    ) -> Result<(), SinkError> {
        for child in &self.children {
            child.on_content_block(phase, index, tool_name)?;
        }
        Ok(())
    }
}
