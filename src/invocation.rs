use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agents::AgentRuntime;
use crate::dispatcher::Dispatcher;
use crate::error::AgentError;
use crate::sinks::AttributedSink;

/// Everything an invocation needs to report progress: which agent it is, the
/// dispatcher its events go to (if any), and the token that cancels it.
///
/// Passed explicitly to every invocation, nested ones included. A sub-agent
/// derives its context from its parent's via [`InvocationContext::sub_agent`].
#[derive(Clone)]
pub struct InvocationContext {
    agent: String,
    dispatcher: Option<Arc<Dispatcher>>,
    cancel: CancellationToken,
}

impl InvocationContext {
    pub fn new(dispatcher: Arc<Dispatcher>, cancel: CancellationToken) -> Self {
        Self {
            agent: dispatcher.label().to_string(),
            dispatcher: Some(dispatcher),
            cancel,
        }
    }

    /// A context with no dispatcher. Events are decoded nowhere and dropped.
    pub fn detached(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            dispatcher: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The dispatcher a nested invocation should report into. `None` is not an
    /// error: the nested agent just runs undispatched.
    pub fn parent_dispatcher(&self) -> Option<&Arc<Dispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Report one raw runtime payload.
    pub fn emit(&self, payload: &Value) -> Result<(), AgentError> {
        if self.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if let Some(ref dispatcher) = self.dispatcher {
            dispatcher.handle(payload)?;
        }
        Ok(())
    }

    /// Derive the context for a named sub-agent. Its events reach this
    /// context's dispatcher tagged with `name`; cancelling this context
    /// cancels the sub-agent too.
    pub fn sub_agent(&self, name: &str) -> InvocationContext {
        let cancel = self.cancel.child_token();
        match self.parent_dispatcher() {
            Some(parent) => {
                let dispatcher = Dispatcher::new(name)
                    .with_decoder(parent.decoder())
                    .with_sink(AttributedSink::new(name, parent.clone()));
                InvocationContext {
                    agent: name.to_string(),
                    dispatcher: Some(Arc::new(dispatcher)),
                    cancel,
                }
            }
            None => {
                debug!(agent = name, "no parent dispatcher, sub-agent runs undispatched");
                InvocationContext {
                    agent: name.to_string(),
                    dispatcher: None,
                    cancel,
                }
            }
        }
    }

    fn finish(&self) -> Result<(), AgentError> {
        if let Some(ref dispatcher) = self.dispatcher {
            dispatcher.finish()?;
        }
        Ok(())
    }
}

/// Run one invocation to completion.
///
/// The runtime reports through `ctx`; once it returns successfully the stream
/// is closed with `Complete` if the runtime didn't close it itself. Failures
/// are returned unchanged and never retried. Cancelling the context's token
/// abandons the runtime at its next suspension point.
pub async fn invoke_agent(
    agent: &dyn AgentRuntime,
    prompt: &str,
    ctx: &InvocationContext,
) -> Result<String, AgentError> {
    info!(agent = ctx.agent(), "invoking agent");

    let reply = tokio::select! {
        result = agent.invoke(prompt, ctx) => result?,
        _ = ctx.cancel.cancelled() => {
            info!(agent = ctx.agent(), "agent cancelled");
            return Err(AgentError::Cancelled);
        }
    };

    ctx.finish()?;
    info!(agent = ctx.agent(), reply_len = reply.len(), "agent finished");
    Ok(reply)
}

/// Run a named sub-agent under `parent`, attributing its events to `name`.
pub async fn invoke_sub_agent(
    agent: &dyn AgentRuntime,
    name: &str,
    prompt: &str,
    parent: &InvocationContext,
) -> Result<String, AgentError> {
    let ctx = parent.sub_agent(name);
    invoke_agent(agent, prompt, &ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AgentEvent;
    use crate::sinks::recording::RecordingSink;
    use crate::sinks::BufferSink;
    use async_trait::async_trait;
    use serde_json::json;

    /// Replays fixed payloads, then optionally fails.
    struct Replay {
        payloads: Vec<Value>,
        fail_with: Option<String>,
    }

    impl Replay {
        fn new(payloads: Vec<Value>) -> Self {
            Self {
                payloads,
                fail_with: None,
            }
        }
    }

    #[async_trait]
    impl AgentRuntime for Replay {
        async fn invoke(&self, _prompt: &str, ctx: &InvocationContext) -> Result<String, AgentError> {
            for p in &self.payloads {
                ctx.emit(p)?;
            }
            match self.fail_with {
                Some(ref msg) => Err(AgentError::Request(msg.clone())),
                None => Ok("ok".into()),
            }
        }
    }

    /// Delegates to a sub-agent mid-stream.
    struct Manager {
        expert: Replay,
    }

    #[async_trait]
    impl AgentRuntime for Manager {
        async fn invoke(&self, prompt: &str, ctx: &InvocationContext) -> Result<String, AgentError> {
            ctx.emit(&json!({"init_event_loop": true}))?;
            ctx.emit(&json!({"data": "Asking expert. "}))?;
            let answer = invoke_sub_agent(&self.expert, "FooExpert", prompt, ctx).await?;
            ctx.emit(&json!({"data": "Done."}))?;
            Ok(answer)
        }
    }

    /// Never finishes on its own.
    struct Hang;

    #[async_trait]
    impl AgentRuntime for Hang {
        async fn invoke(&self, _prompt: &str, ctx: &InvocationContext) -> Result<String, AgentError> {
            ctx.emit(&json!({"data": "thinking"}))?;
            std::future::pending::<()>().await;
            Ok(String::new())
        }
    }

    fn context_with(sink: impl crate::sinks::EventSink + 'static) -> InvocationContext {
        let dispatcher = Arc::new(Dispatcher::new("PortfolioManager").with_sink(sink));
        InvocationContext::new(dispatcher, CancellationToken::new())
    }

    #[tokio::test]
    async fn invocation_closes_stream() {
        let buffer = Arc::new(BufferSink::new());
        let ctx = context_with(buffer.clone());
        let agent = Replay::new(vec![json!({"init_event_loop": true}), json!({"data": "hi"})]);

        let reply = invoke_agent(&agent, "q", &ctx).await.unwrap();
        assert_eq!(reply, "ok");

        let result = buffer.result();
        assert_eq!(result.text, "hi");
        assert!(result.complete);
    }

    #[tokio::test]
    async fn nested_events_attributed_to_sub_agent() {
        let rec = Arc::new(RecordingSink::new());
        let ctx = context_with(rec.clone());
        let agent = Manager {
            expert: Replay::new(vec![
                json!({"init_event_loop": true}),
                json!({"data": "bar"}),
                json!({"current_tool_use": {"name": "get_fund_info", "input": {}}}),
                json!({"data": "!", "complete": true}),
            ]),
        };

        invoke_agent(&agent, "q", &ctx).await.unwrap();

        assert_eq!(
            rec.texts(),
            vec!["Asking expert. ", "[FooExpert] bar", "[FooExpert] !", "Done."]
        );
        assert!(rec
            .events()
            .contains(&AgentEvent::tool_start("[FooExpert] get_fund_info", json!({}))));

        // One Init, one terminal, both from the parent.
        let events = rec.events();
        let inits = events
            .iter()
            .filter(|e| **e == AgentEvent::lifecycle(crate::events::LifecyclePhase::Init))
            .count();
        assert_eq!(inits, 1);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn sub_agent_without_parent_runs_undispatched() {
        let ctx = InvocationContext::detached("PortfolioManager");
        assert!(ctx.parent_dispatcher().is_none());

        let sub = ctx.sub_agent("FooExpert");
        assert!(sub.parent_dispatcher().is_none());

        let expert = Replay::new(vec![json!({"data": "unseen"})]);
        let reply = invoke_sub_agent(&expert, "FooExpert", "q", &ctx).await.unwrap();
        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn sub_agent_failure_propagates() {
        let buffer = Arc::new(BufferSink::new());
        let ctx = context_with(buffer.clone());
        let agent = Manager {
            expert: Replay {
                payloads: vec![json!({"data": "partial"})],
                fail_with: Some("model unavailable".into()),
            },
        };

        let err = invoke_agent(&agent, "q", &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Request(ref m) if m == "model unavailable"));

        // No Complete on failure; the caller decides how to report it.
        let result = buffer.result();
        assert!(!result.complete);
        assert_eq!(result.text, "Asking expert. [FooExpert] partial");
    }

    #[tokio::test]
    async fn sink_failure_fails_the_invocation() {
        let ctx = context_with(RecordingSink::failing_on_text());
        let agent = Replay::new(vec![json!({"data": "x"})]);

        let err = invoke_agent(&agent, "q", &ctx).await.unwrap_err();
        assert!(matches!(err, AgentError::Sink(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_a_running_agent() {
        let rec = Arc::new(RecordingSink::new());
        let ctx = context_with(rec.clone());
        let cancel = ctx.cancel_token().clone();

        let handle = tokio::spawn(async move { invoke_agent(&Hang, "q", &ctx).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(!rec.events().iter().any(|e| e.is_terminal()));
    }

    #[tokio::test]
    async fn cancelled_context_rejects_emits() {
        let ctx = context_with(RecordingSink::new());
        let sub = ctx.sub_agent("FooExpert");
        ctx.cancel_token().cancel();

        assert!(sub.is_cancelled());
        assert!(matches!(
            sub.emit(&json!({"data": "x"})),
            Err(AgentError::Cancelled)
        ));
    }
}
