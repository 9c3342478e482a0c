pub mod remote;
pub mod scripted;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::invocation::InvocationContext;

/// The external agent. Takes a prompt, reports raw payloads through the
/// context as it works, returns its final reply text.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn invoke(&self, prompt: &str, ctx: &InvocationContext) -> Result<String, AgentError>;
}

#[async_trait]
impl AgentRuntime for Box<dyn AgentRuntime> {
    async fn invoke(&self, prompt: &str, ctx: &InvocationContext) -> Result<String, AgentError> {
        (**self).invoke(prompt, ctx).await
    }
}

#[async_trait]
impl AgentRuntime for Arc<dyn AgentRuntime> {
    async fn invoke(&self, prompt: &str, ctx: &InvocationContext) -> Result<String, AgentError> {
        (**self).invoke(prompt, ctx).await
    }
}

pub use remote::RemoteAgent;
pub use scripted::{ScriptedAgent, Step};
