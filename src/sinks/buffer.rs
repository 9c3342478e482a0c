use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use super::EventSink;
use crate::error::SinkError;
use crate::events::LifecyclePhase;

/// A tool the agent started, as recorded by the buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolUse {
    pub name: String,
    pub input: Value,
}

/// Snapshot of everything a [`BufferSink`] has collected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BufferedResult {
    pub text: String,
    pub tool_uses: Vec<ToolUse>,
    pub complete: bool,
}

/// Collects a whole invocation for non-streaming callers.
///
/// `result().text` is exactly the concatenation of every text delta received,
/// in receipt order. Only tool *starts* are recorded; an End with no Start
/// leaves no entry.
#[derive(Default)]
pub struct BufferSink {
    state: Mutex<BufferedResult>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn result(&self) -> BufferedResult {
        self.state.lock().clone()
    }

    /// Clear everything so the buffer can serve another invocation.
    pub fn reset(&self) {
        *self.state.lock() = BufferedResult::default();
    }
}

impl EventSink for BufferSink {
    fn on_text(&self, content: &str, _is_final: bool) -> Result<(), SinkError> {
        self.state.lock().text.push_str(content);
        Ok(())
    }

    fn on_tool_start(&self, name: &str, input: &Value) -> Result<(), SinkError> {
        self.state.lock().tool_uses.push(ToolUse {
            name: name.to_string(),
            input: input.clone(),
        });
        Ok(())
    }

    fn on_lifecycle(&self, phase: LifecyclePhase, _reason: Option<&str>) -> Result<(), SinkError> {
        if phase == LifecyclePhase::Complete {
            self.state.lock().complete = true;
        }
        Ok(())
    }
}
