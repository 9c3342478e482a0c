//! Streaming event relay for advisory agents.
//!
//! An agent runtime reports loosely-structured JSON payloads while it works.
//! The [`Decoder`] turns each payload into typed [`AgentEvent`]s, a
//! [`Dispatcher`] enforces the stream lifecycle and fans events out to
//! [`EventSink`]s, and sinks render them: to a console, to logs, into a buffer
//! for request/response callers, or onto a queue drained by a WebSocket or SSE
//! transport.
//!
//! Nested agents report into their parent's stream through
//! [`invoke_sub_agent`], with their text and tool names tagged `[name] `.

pub mod agents;
pub mod config;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod invocation;
pub mod server;
pub mod sinks;

pub use agents::{AgentRuntime, RemoteAgent, ScriptedAgent, Step};
pub use config::{AgentSource, RelayConfig};
pub use decode::Decoder;
pub use dispatcher::Dispatcher;
pub use error::{AgentError, ConfigError, SinkError};
pub use events::{
    AgentEvent, BlockPhase, Envelope, LifecyclePhase, Metadata, ResultItem, ToolInvocation,
    ToolPhase, ToolResult, ToolStatus,
};
pub use invocation::{invoke_agent, invoke_sub_agent, InvocationContext};
pub use server::{router, AppState, QueryRequest};
pub use sinks::{
    AttributedSink, BufferSink, BufferedResult, CompositeSink, ConsoleSink, EventSink,
    LoggingSink, QueueSink, ToolUse,
};
