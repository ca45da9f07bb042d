//! HTTP + WebSocket API for the browser frontend.
//!
//! Each WebSocket connection gets its own conversation session, created on
//! connect and dropped on disconnect. REST callers share named sessions from
//! the registry (`"default"` unless a `session_id` is given).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::emotion::Emotion;
use crate::pipeline::{Pipeline, PipelineError};
use crate::session::{SessionRegistry, SharedSession};

pub const DEFAULT_SESSION: &str = "default";

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub sessions: Arc<SessionRegistry>,
    pub gemini_configured: bool,
}

// --- Socket events ---

/// Event sent by the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    TextMessage { text: String },
    Reset,
    Ping,
}

#[derive(Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ClientEvent {
    /// Parse a `{"event": ..., "data": {...}}` frame.
    pub fn parse(frame: &str) -> Result<Self, String> {
        let inbound: InboundFrame =
            serde_json::from_str(frame).map_err(|e| format!("Malformed message: {e}"))?;
        match inbound.event.as_str() {
            "text_message" => {
                let text = inbound
                    .data
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::TextMessage { text })
            }
            "reset" => Ok(Self::Reset),
            "ping" => Ok(Self::Ping),
            other => Err(format!("Unknown event: {other}")),
        }
    }
}

/// Event sent to the browser.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        data: String,
    },
    Response {
        text: String,
        audio: Option<String>,
        emotion: Emotion,
    },
    Error {
        message: String,
    },
    Reset {
        status: String,
    },
    Pong {},
}

impl ServerEvent {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// --- REST request types ---

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    text: String,
    session_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct ResetRequest {
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct SpeakRequest {
    #[serde(default)]
    text: String,
    emotion: Option<String>,
}

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/ws", get(handle_ws_upgrade))
        .route("/api/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .route("/api/reset-conversation", post(handle_reset))
        .route("/api/text-to-speech", post(handle_text_to_speech))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: ApiState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("FRIDAY API listening on {addr}");
    axum::serve(listener, router(state)).await
}

// --- Handlers ---

async fn handle_index() -> Json<serde_json::Value> {
    Json(json!({ "status": "FRIDAY backend is running" }))
}

async fn handle_health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let gemini = if state.gemini_configured {
        "configured"
    } else {
        "not configured"
    };
    let health = json!({
        "status": "healthy",
        "gemini": gemini,
        "mode": "client-side speech recognition",
        "voice": state.pipeline.voices().default_voice(),
        "connections": state.sessions.open_connections(),
    });
    debug!("Health check: {health}");
    Json(health)
}

async fn handle_chat(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> Response {
    let text = req.text.trim();
    if text.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No text provided");
    }

    let id = req.session_id.as_deref().unwrap_or(DEFAULT_SESSION);
    info!("Chat API request [{id}]: {text}");
    let session = state.sessions.get_or_create(id).await;
    let response = session.lock().await.respond(text).await;

    Json(json!({ "success": true, "response": response })).into_response()
}

async fn handle_reset(State(state): State<ApiState>, body: Bytes) -> Response {
    let req: ResetRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ResetRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(req) => req,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Invalid body: {e}")),
        }
    };

    let id = req.session_id.as_deref().unwrap_or(DEFAULT_SESSION);
    state.sessions.reset(id).await;
    info!("Conversation reset by user [{id}]");
    Json(json!({ "status": "Conversation reset" })).into_response()
}

async fn handle_text_to_speech(State(state): State<ApiState>, Json(req): Json<SpeakRequest>) -> Response {
    if req.text.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No text provided");
    }

    let emotion = match req.emotion.as_deref().map(|e| (e, Emotion::parse(e))) {
        None => None,
        Some((_, Some(emotion))) => Some(emotion),
        Some((raw, None)) => {
            return error_response(StatusCode::BAD_REQUEST, format!("Unknown emotion: {raw}"));
        }
    };

    match state.pipeline.speak(&req.text, emotion).await {
        Ok(audio) => (
            [
                (header::CONTENT_TYPE, "audio/mpeg"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"response.mp3\""),
            ],
            audio,
        )
            .into_response(),
        Err(e) => {
            warn!("Text-to-speech request failed: {e}");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// --- WebSocket ---

async fn handle_ws_upgrade(State(state): State<ApiState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Counts a socket as open until dropped.
struct OpenConnection(Arc<SessionRegistry>);

impl OpenConnection {
    fn new(registry: Arc<SessionRegistry>) -> Self {
        registry.connection_opened();
        Self(registry)
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let _open = OpenConnection::new(state.sessions.clone());
    let session = state.sessions.connection_session();
    let session_id = session.lock().await.id().to_string();
    info!("Client connected [{session_id}]");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(16);

    // Writer task: everything for this client goes through `tx`.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to serialize event: {e}");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let _ = tx
        .send(ServerEvent::Connected {
            data: "Connected to FRIDAY".into(),
        })
        .await;

    while let Some(msg) = receiver.next().await {
        let frame = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket receive error [{session_id}]: {e}");
                break;
            }
        };

        let event = match ClientEvent::parse(frame.as_str()) {
            Ok(event) => event,
            Err(message) => {
                warn!("[{session_id}] {message}");
                let _ = tx.send(ServerEvent::error(message)).await;
                continue;
            }
        };

        let outgoing = dispatch(&state, &session, event).await;
        if tx.send(outgoing).await.is_err() {
            break;
        }
    }

    drop(tx);
    let _ = writer.await;
    info!("Client disconnected [{session_id}]");
}

/// Handle one client event and produce the reply event.
pub async fn dispatch(state: &ApiState, session: &SharedSession, event: ClientEvent) -> ServerEvent {
    match event {
        ClientEvent::Ping => ServerEvent::Pong {},
        ClientEvent::Reset => {
            session.lock().await.reset();
            ServerEvent::Reset {
                status: "Conversation reset".into(),
            }
        }
        ClientEvent::TextMessage { text } => {
            info!("Received text message: {text}");
            match run_pipeline(state, session, text).await {
                Ok(reply) => {
                    info!("Response sent ({}, audio: {})", reply.emotion, reply.audio().is_some());
                    ServerEvent::Response {
                        audio: reply.audio_base64(),
                        text: reply.text,
                        emotion: reply.emotion,
                    }
                }
                Err(PipelineError::EmptyInput) => ServerEvent::error(PipelineError::EmptyInput.to_string()),
                Err(e) => {
                    error!("Error processing text message: {e}");
                    ServerEvent::error("Something went wrong while processing your message")
                }
            }
        }
    }
}

/// Run the pipeline on its own task so a panic inside a collaborator is
/// contained to this message.
async fn run_pipeline(
    state: &ApiState,
    session: &SharedSession,
    text: String,
) -> Result<crate::pipeline::AssistantReply, PipelineError> {
    let pipeline = state.pipeline.clone();
    let session = session.clone();
    tokio::spawn(async move { pipeline.handle_message(&session, &text).await })
        .await
        .map_err(|e| PipelineError::Internal(e.to_string()))?
}
