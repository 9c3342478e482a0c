use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::AgentRuntime;
use crate::error::AgentError;
use crate::invocation::InvocationContext;

/// An agent hosted behind HTTP.
///
/// `POST {base_url}/invoke` with `{"prompt": ...}`; the response body is
/// newline-delimited JSON, one raw runtime payload per line. Payloads are
/// reported as they arrive and the reply is the concatenation of their `data`
/// strings.
pub struct RemoteAgent {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteAgent {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Sent as a bearer token.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn report_line(
        line: &[u8],
        ctx: &InvocationContext,
        reply: &mut String,
    ) -> Result<(), AgentError> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let payload: Value =
            serde_json::from_str(line).map_err(|e| AgentError::Parse(e.to_string()))?;
        ctx.emit(&payload)?;
        if let Some(text) = payload.get("data").and_then(Value::as_str) {
            reply.push_str(text);
        }
        Ok(())
    }
}

#[async_trait]
impl AgentRuntime for RemoteAgent {
    async fn invoke(&self, prompt: &str, ctx: &InvocationContext) -> Result<String, AgentError> {
        debug!(agent = ctx.agent(), url = %self.base_url, "remote invocation");

        let mut req = self
            .client
            .post(format!("{}/invoke", self.base_url))
            .header("accept", "application/x-ndjson")
            .json(&json!({ "prompt": prompt }));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let mut resp = req
            .send()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .map_err(|e| AgentError::Request(e.to_string()))?;
            return Err(AgentError::ApiError { status, body });
        }

        let mut reply = String::new();
        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?
        {
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                Self::report_line(&line, ctx, &mut reply)?;
            }
        }
        // Last line may lack a trailing newline.
        Self::report_line(&pending, ctx, &mut reply)?;

        Ok(reply)
    }
}
