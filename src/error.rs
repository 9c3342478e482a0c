/// Failure inside a sink hook. Propagates to whoever dispatched the event.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("agent cancelled")]
    Cancelled,
    #[error("request failed: {0}")]
    Request(String),
    #[error("agent endpoint returned {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse payload: {0}")]
    Parse(String),
    #[error("script error: {0}")]
    Script(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
