use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::agents::{AgentRuntime, RemoteAgent, ScriptedAgent};
use crate::decode::Decoder;
use crate::error::{AgentError, ConfigError};

/// Relay configuration. Every field has a default, so an empty file (or no
/// file) is a working demo setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind: String,
    /// Map raw `contentBlockDelta` text to text deltas. Turn off for runtimes
    /// that also report the same text as `data`.
    pub stream_text_events: bool,
    /// Label of the top-level agent.
    pub agent_name: String,
    pub agent: AgentSource,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
            stream_text_events: true,
            agent_name: "PortfolioManager".into(),
            agent: AgentSource::default(),
        }
    }
}

/// Where invocations go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentSource {
    /// The built-in demo script.
    Demo {
        #[serde(default)]
        pace_ms: u64,
    },
    /// A script file (JSON array of steps).
    Scripted {
        path: PathBuf,
        #[serde(default)]
        pace_ms: u64,
    },
    /// An HTTP agent endpoint streaming NDJSON payloads.
    Remote {
        url: String,
        /// Environment variable holding the bearer token.
        #[serde(default)]
        api_key_env: Option<String>,
    },
}

impl Default for AgentSource {
    fn default() -> Self {
        AgentSource::Demo { pace_ms: 0 }
    }
}

impl RelayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn decoder(&self) -> Decoder {
        Decoder::new().with_stream_text(self.stream_text_events)
    }

    pub async fn build_agent(&self) -> Result<Arc<dyn AgentRuntime>, AgentError> {
        let agent: Arc<dyn AgentRuntime> = match self.agent {
            AgentSource::Demo { pace_ms } => {
                Arc::new(ScriptedAgent::demo().with_pace(Duration::from_millis(pace_ms)))
            }
            AgentSource::Scripted { ref path, pace_ms } => Arc::new(
                ScriptedAgent::load(path)
                    .await?
                    .with_pace(Duration::from_millis(pace_ms)),
            ),
            AgentSource::Remote {
                ref url,
                ref api_key_env,
            } => {
                let mut remote = RemoteAgent::new(url.as_str());
                if let Some(var) = api_key_env {
                    match std::env::var(var) {
                        Ok(key) => remote = remote.with_api_key(key),
                        Err(_) => warn!(var = %var, "api key variable not set, sending no token"),
                    }
                }
                Arc::new(remote)
            }
        };
        Ok(agent)
    }
}
