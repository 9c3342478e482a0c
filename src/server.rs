use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agents::AgentRuntime;
use crate::config::RelayConfig;
use crate::decode::Decoder;
use crate::dispatcher::Dispatcher;
use crate::error::AgentError;
use crate::events::Envelope;
use crate::invocation::{invoke_agent, InvocationContext};
use crate::sinks::{BufferSink, LoggingSink, QueueSink};

/// Shared application state.
pub struct AppState {
    agent: Arc<dyn AgentRuntime>,
    agent_name: String,
    decoder: Decoder,
}

impl AppState {
    pub fn new(agent: Arc<dyn AgentRuntime>, agent_name: impl Into<String>) -> Self {
        Self {
            agent,
            agent_name: agent_name.into(),
            decoder: Decoder::new(),
        }
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub async fn from_config(config: &RelayConfig) -> Result<Self, AgentError> {
        Ok(Self::new(config.build_agent().await?, config.agent_name.clone())
            .with_decoder(config.decoder()))
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.agent_name.as_str())
            .with_decoder(self.decoder)
            .with_sink(LoggingSink::new(self.agent_name.as_str()))
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/advisor", post(advisor_handler))
        .route("/advisor/stream", post(text_stream_handler))
        .route(
            "/advisor/stream/events",
            post(sse_handler).get(sse_query_handler),
        )
        .route("/ws/advisor", get(ws_handler))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn missing_query() -> Response {
    error_response(StatusCode::BAD_REQUEST, "query is required")
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") }))
}

async fn advisor_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return missing_query();
    }

    let buffer = Arc::new(BufferSink::new());
    let dispatcher = state.dispatcher().with_sink(buffer.clone());
    let ctx = InvocationContext::new(Arc::new(dispatcher), CancellationToken::new());

    match invoke_agent(state.agent.as_ref(), &request.query, &ctx).await {
        Ok(_) => {
            let result = buffer.result();
            Json(json!({
                "response": result.text,
                "tool_uses": result.tool_uses,
                "session_id": request.session_id,
                "status": "success",
            }))
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "advisor request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Start one invocation in the background, reporting into a fresh queue.
///
/// The receiver yields envelopes until the invocation ends; a failed
/// invocation ends with an `error` envelope. Dropping the receiver cancels
/// the invocation at its next report.
fn spawn_stream(state: Arc<AppState>, query: String) -> mpsc::UnboundedReceiver<Envelope> {
    let cancel = CancellationToken::new();
    let (queue, rx) = QueueSink::channel(cancel.clone());
    let dispatcher = state.dispatcher().with_sink(queue.clone());
    let ctx = InvocationContext::new(Arc::new(dispatcher), cancel);

    tokio::spawn(async move {
        match invoke_agent(state.agent.as_ref(), &query, &ctx).await {
            Ok(_) => {}
            Err(AgentError::Cancelled) => info!("stream abandoned by client"),
            Err(e) => {
                warn!(error = %e, "streamed invocation failed");
                queue.push_error(e.to_string());
            }
        }
    });

    rx
}

/// Envelopes up to and including the first terminal one.
fn envelopes(rx: mpsc::UnboundedReceiver<Envelope>) -> impl Stream<Item = Envelope> + Send {
    futures_util::stream::unfold((rx, false), |(mut rx, done)| async move {
        if done {
            return None;
        }
        let envelope = rx.recv().await?;
        let done = envelope.is_terminal();
        Some((envelope, (rx, done)))
    })
}

fn sse_response(state: Arc<AppState>, request: QueryRequest) -> Response {
    if request.query.trim().is_empty() {
        return missing_query();
    }
    let events = envelopes(spawn_stream(state, request.query))
        .map(|envelope| Event::default().event(envelope.kind()).json_data(&envelope));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Response {
    sse_response(state, request)
}

async fn sse_query_handler(
    State(state): State<Arc<AppState>>,
    Query(request): Query<QueryRequest>,
) -> Response {
    sse_response(state, request)
}

/// Plain text stream: the reply text with a banner line for each tool call.
async fn text_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return missing_query();
    }
    let chunks = envelopes(spawn_stream(state, request.query)).filter_map(|envelope| async move {
        match envelope {
            Envelope::Text { content } => Some(Ok::<_, Infallible>(content)),
            Envelope::ToolStart { name, .. } => Some(Ok(format!("\n[Using tool: {name}]\n"))),
            Envelope::Error { content } => Some(Ok(format!("\n[error: {content}]\n"))),
            Envelope::ToolEnd { .. } | Envelope::Complete => None,
        }
    });
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(chunks),
    )
        .into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_envelope(socket: &mut WebSocket, envelope: &Envelope) -> Result<(), axum::Error> {
    let text = envelope.to_json().map_err(axum::Error::new)?;
    socket.send(Message::Text(text.into())).await
}

/// One query per text frame. Queries on a socket run one at a time; every
/// envelope of a query is sent before the next frame is read.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    info!("websocket connected");

    while let Some(Ok(msg)) = socket.recv().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let query = match serde_json::from_str::<QueryRequest>(text.as_str()) {
            Ok(request) if !request.query.trim().is_empty() => request.query,
            Ok(_) => {
                let reply = Envelope::Error {
                    content: "query is required".into(),
                };
                if send_envelope(&mut socket, &reply).await.is_err() {
                    break;
                }
                continue;
            }
            Err(e) => {
                let reply = Envelope::Error {
                    content: format!("invalid request: {e}"),
                };
                if send_envelope(&mut socket, &reply).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let mut rx = spawn_stream(state.clone(), query);
        let mut connected = true;
        while let Some(envelope) = rx.recv().await {
            if send_envelope(&mut socket, &envelope).await.is_err() {
                connected = false;
                break;
            }
            if envelope.is_terminal() {
                break;
            }
        }
        if !connected {
            break;
        }
    }

    info!("websocket disconnected");
}
