use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::AgentRuntime;
use crate::error::AgentError;
use crate::invocation::{invoke_sub_agent, InvocationContext};

/// One step of a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Emit this raw payload as-is.
    Payload(Value),
    /// Run a named sub-agent with its own script.
    Delegate {
        agent: String,
        prompt: String,
        steps: Vec<Step>,
    },
}

impl Step {
    /// `{"delegate": {"agent": ..., "prompt": ..., "steps": [...]}}` is a
    /// delegation; any other value is a payload.
    pub fn parse(value: &Value) -> Result<Self, AgentError> {
        let Some(delegate) = value.get("delegate") else {
            return Ok(Step::Payload(value.clone()));
        };

        let agent = delegate["agent"]
            .as_str()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| AgentError::Script("delegate step needs an agent name".into()))?;
        let steps = delegate["steps"]
            .as_array()
            .ok_or_else(|| AgentError::Script(format!("delegate step for {agent} needs steps")))?;

        Ok(Step::Delegate {
            agent: agent.to_string(),
            prompt: delegate["prompt"].as_str().unwrap_or("").to_string(),
            steps: steps.iter().map(Step::parse).collect::<Result<_, _>>()?,
        })
    }
}

/// Replays a fixed sequence of payloads. Stands in for a hosted agent in
/// demos and tests; the reply is the concatenation of its `data` payloads.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    steps: Vec<Step>,
    pace: Duration,
}

impl ScriptedAgent {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            pace: Duration::ZERO,
        }
    }

    /// Parse a script from a JSON array of steps.
    pub fn from_json(script: &Value) -> Result<Self, AgentError> {
        let steps = script
            .as_array()
            .ok_or_else(|| AgentError::Script("script must be a JSON array".into()))?;
        Ok(Self::new(
            steps.iter().map(Step::parse).collect::<Result<_, _>>()?,
        ))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AgentError::Script(format!("{}: {e}", path.display())))?;
        let script: Value =
            serde_json::from_str(&text).map_err(|e| AgentError::Parse(e.to_string()))?;
        Self::from_json(&script)
    }

    /// Sleep this long before each step, to imitate a model producing output.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// A portfolio manager that looks up a fund, consults a strategy expert
    /// and summarizes.
    pub fn demo() -> Self {
        let fund = json!({"fundCode": "000001"});
        let expert_query = json!({"query": "000001"});

        Self::new(vec![
            Step::Payload(json!({"init_event_loop": true})),
            Step::Payload(json!({"start": true})),
            Step::Payload(json!({"start_event_loop": true})),
            Step::Payload(json!({"data": "Let me look up fund 000001. "})),
            Step::Payload(json!({"current_tool_use": {"name": "get_fund_info", "input": fund}})),
            Step::Payload(json!({
                "current_tool_use": {"name": "get_fund_info", "input": fund},
                "tool_result": {"fundCode": "000001", "type": "mixed"}
            })),
            Step::Payload(json!({
                "current_tool_use": {"name": "strategy_performance_expert", "input": expert_query}
            })),
            Step::Delegate {
                agent: "StrategyExpert".into(),
                prompt: "Assess the strategy and performance of fund 000001".into(),
                steps: vec![
                    Step::Payload(json!({"init_event_loop": true})),
                    Step::Payload(json!({
                        "current_tool_use": {"name": "get_fund_performance", "input": fund}
                    })),
                    Step::Payload(json!({"data": "Strategy execution is consistent. "})),
                    Step::Payload(json!({
                        "data": "Risk-adjusted returns track the benchmark.",
                        "complete": true
                    })),
                ],
            },
            Step::Payload(json!({
                "current_tool_use": {"name": "strategy_performance_expert", "input": expert_query},
                "tool_result": {"status": "success"}
            })),
            Step::Payload(json!({"data": "\nThe fund fits a balanced allocation.", "complete": true})),
        ])
    }

    async fn run(&self, steps: &[Step], ctx: &InvocationContext) -> Result<String, AgentError> {
        let mut reply = String::new();
        for step in steps {
            if !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
            match step {
                Step::Payload(payload) => {
                    ctx.emit(payload)?;
                    if let Some(text) = payload.get("data").and_then(Value::as_str) {
                        reply.push_str(text);
                    }
                }
                Step::Delegate {
                    agent,
                    prompt,
                    steps,
                } => {
                    let sub = ScriptedAgent {
                        steps: steps.clone(),
                        pace: self.pace,
                    };
                    invoke_sub_agent(&sub, agent, prompt, ctx).await?;
                }
            }
        }
        Ok(reply)
    }
}

#[async_trait]
impl AgentRuntime for ScriptedAgent {
    async fn invoke(&self, _prompt: &str, ctx: &InvocationContext) -> Result<String, AgentError> {
        self.run(&self.steps, ctx).await
    }
}
