use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::EventSink;
use crate::error::SinkError;
use crate::events::{Envelope, LifecyclePhase};

/// Forwards envelopes to a transport through an unbounded queue.
///
/// Pushing never blocks and never fails: dispatch code stays off the transport's
/// I/O path. A separate task drains the receiver into a WebSocket or SSE stream
/// and stops after the first terminal envelope.
///
/// When the receiver is gone (client disconnected) the first failed push cancels
/// the invocation's token so upstream work stops instead of running on unheard.
#[derive(Clone)]
pub struct QueueSink {
    tx: mpsc::UnboundedSender<Envelope>,
    cancel: CancellationToken,
}

impl QueueSink {
    pub fn channel(cancel: CancellationToken) -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, cancel }, rx)
    }

    /// Push a terminal error envelope. Used by the calling layer when the
    /// invocation itself fails.
    pub fn push_error(&self, message: impl Into<String>) {
        self.push(Envelope::Error {
            content: message.into(),
        });
    }

    fn push(&self, envelope: Envelope) {
        if self.tx.send(envelope).is_err() && !self.cancel.is_cancelled() {
            info!("transport consumer gone, cancelling invocation");
            self.cancel.cancel();
        }
    }
}

impl EventSink for QueueSink {
    fn on_text(&self, content: &str, _is_final: bool) -> Result<(), SinkError> {
        self.push(Envelope::Text {
            content: content.to_string(),
        });
        Ok(())
    }

    fn on_tool_start(&self, name: &str, input: &Value) -> Result<(), SinkError> {
        self.push(Envelope::ToolStart {
            name: name.to_string(),
            input: input.clone(),
        });
        Ok(())
    }

    fn on_tool_end(&self, name: &str, input: &Value, _result: &Value) -> Result<(), SinkError> {
        self.push(Envelope::ToolEnd {
            name: name.to_string(),
            input: input.clone(),
        });
        Ok(())
    }

    fn on_lifecycle(&self, phase: LifecyclePhase, reason: Option<&str>) -> Result<(), SinkError> {
        match phase {
            LifecyclePhase::Complete => self.push(Envelope::Complete),
            LifecyclePhase::ForceStop => self.push_error(reason.unwrap_or("force stopped")),
            _ => {}
        }
        Ok(())
    }
}
