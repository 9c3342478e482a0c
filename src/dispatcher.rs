use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::decode::Decoder;
use crate::error::SinkError;
use crate::events::{AgentEvent, LifecyclePhase};
use crate::sinks::{deliver, CompositeSink, EventSink};

/// Per-invocation stream state. Enforces the lifecycle envelope around events.
#[derive(Debug, Default)]
struct StreamState {
    started: bool,
    terminated: bool,
}

/// What to do with one incoming event.
enum Admit {
    Drop,
    Deliver,
    /// Deliver a synthesized Init first, then the event.
    InitThenDeliver,
}

/// Decodes raw runtime payloads and routes the events to registered sinks.
///
/// One dispatcher serves one invocation (call [`Dispatcher::reset`] to reuse it).
/// Sinks run in registration order with no isolation; a failing sink aborts
/// delivery of that event and the error comes back to the caller.
///
/// The lifecycle envelope is enforced here, not trusted from the runtime:
/// - if the first event is not `Init`, one is synthesized ahead of it;
/// - a second `Init` is dropped;
/// - after `Complete` or `ForceStop`, everything is dropped.
pub struct Dispatcher {
    label: String,
    decoder: Decoder,
    sinks: CompositeSink,
    state: Mutex<StreamState>,
}

impl Dispatcher {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            decoder: Decoder::new(),
            sinks: CompositeSink::new(),
            state: Mutex::new(StreamState::default()),
        }
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Register a sink. With none registered, events are decoded and dropped.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn decoder(&self) -> Decoder {
        self.decoder
    }

    /// Decode one raw payload and dispatch every resulting event, in order.
    /// Returns how many events were delivered; a payload with no recognized
    /// keys delivers none.
    pub fn handle(&self, payload: &Value) -> Result<usize, SinkError> {
        let mut delivered = 0;
        for event in self.decoder.decode(payload) {
            if self.forward(&event)? {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Dispatch an already-typed event. Returns false if the lifecycle rules
    /// dropped it.
    ///
    /// Stream state only advances once delivery succeeds: if a sink fails on
    /// `Init`, the next event synthesizes it again; if a sink fails on a
    /// terminal event, the stream stays open and `finish` can retry.
    pub fn forward(&self, event: &AgentEvent) -> Result<bool, SinkError> {
        match self.admit(event) {
            Admit::Drop => {
                debug!(dispatcher = %self.label, ?event, "event dropped outside lifecycle");
                return Ok(false);
            }
            Admit::Deliver => deliver(&self.sinks, event)?,
            Admit::InitThenDeliver => {
                deliver(&self.sinks, &AgentEvent::lifecycle(LifecyclePhase::Init))?;
                self.state.lock().started = true;
                deliver(&self.sinks, event)?;
            }
        }
        self.record(event);
        Ok(true)
    }

    /// Close the stream with `Complete` unless it is already terminated.
    pub fn finish(&self) -> Result<(), SinkError> {
        if !self.is_terminated() {
            self.forward(&AgentEvent::lifecycle(LifecyclePhase::Complete))?;
        }
        Ok(())
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Forget lifecycle state so the dispatcher can serve another invocation.
    /// Sinks keep their own state; reset those separately.
    pub fn reset(&self) {
        *self.state.lock() = StreamState::default();
    }

    fn admit(&self, event: &AgentEvent) -> Admit {
        let state = self.state.lock();
        if state.terminated {
            return Admit::Drop;
        }

        let is_init = matches!(
            event,
            AgentEvent::Lifecycle {
                phase: LifecyclePhase::Init,
                ..
            }
        );
        match (state.started, is_init) {
            (true, true) => Admit::Drop,
            (false, true) => Admit::Deliver,
            (false, false) => Admit::InitThenDeliver,
            (true, false) => Admit::Deliver,
        }
    }

    fn record(&self, event: &AgentEvent) {
        let mut state = self.state.lock();
        state.started = true;
        if event.is_terminal() {
            state.terminated = true;
        }
    }
}
