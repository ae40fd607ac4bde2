pub(crate) mod chat_api;

use crate::models::ModelManager;
use crate::prompts::PromptStore;
use crate::store::{ChatStore, StoredMessage};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub struct ServerState {
    pub store: Arc<ChatStore>,
    pub models: Arc<ModelManager>,
    pub prompts: Arc<PromptStore>,
    pub options: ServerOptions,
    pub events_tx: broadcast::Sender<ServerEvent>,
    event_seq: AtomicU64,
}

/// Behavior knobs lifted out of the config at startup.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Bearer token required on every request when set (single-user stub).
    pub api_key: Option<String>,
    /// Maximum stored messages forwarded to the model per turn.
    pub max_history: usize,
    /// Stream tokens from the provider, or fall back to one blocking call.
    pub streaming: bool,
}

/// Events pushed to the UI over `/api/events`. Serialized as tagged JSON;
/// the TUI deserializes the same enum on the other side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    MessageAdded {
        chat_id: String,
        message: StoredMessage,
    },
    Token {
        chat_id: String,
        token: String,
        done: bool,
    },
    Status {
        chat_id: String,
        state: String, // "thinking" | "idle"
    },
    Resync {
        reason: String,
    },
}

pub struct ServerHandle {
    pub task: tokio::task::JoinHandle<anyhow::Result<()>>,
    pub port: u16,
}

pub async fn prepare_server(
    store: Arc<ChatStore>,
    models: Arc<ModelManager>,
    prompts: Arc<PromptStore>,
    options: ServerOptions,
    port: u16,
) -> anyhow::Result<ServerHandle> {
    info!("charter server starting on port {}...", port);

    // Token events can be bursty; a large buffer keeps lag drops rare.
    let (events_tx, _) = broadcast::channel(1024);

    let state = Arc::new(ServerState {
        store,
        models,
        prompts,
        options,
        events_tx,
        event_seq: AtomicU64::new(1),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route(
            "/api/chats",
            get(chat_api::list_chats_handler).post(chat_api::create_chat_handler),
        )
        .route("/api/chats/{id}", delete(chat_api::remove_chat_handler))
        .route("/api/chats/{id}/messages", get(chat_api::chat_messages_handler))
        .route("/api/chat", post(chat_api::chat_handler))
        .route("/api/chat/clear", post(chat_api::clear_chat_handler))
        .route("/api/events", get(events_handler))
        .route("/api/health", get(health_handler))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(cors)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    let actual_port = listener.local_addr()?.port();
    info!("Server running on http://localhost:{}", actual_port);

    let task = tokio::spawn(async move {
        axum::serve(listener, app).await?;
        Ok(())
    });

    Ok(ServerHandle {
        task,
        port: actual_port,
    })
}

pub async fn start_server(
    store: Arc<ChatStore>,
    models: Arc<ModelManager>,
    prompts: Arc<PromptStore>,
    options: ServerOptions,
    port: u16,
) -> anyhow::Result<()> {
    let handle = prepare_server(store, models, prompts, options, port).await?;
    handle.task.await??;
    Ok(())
}

/// Single-user auth stub: bearer token check, active only when a key is
/// configured. The health check stays open for liveness probes.
async fn require_api_key(
    State(state): State<Arc<ServerState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.options.api_key.as_deref() else {
        return next.run(req).await;
    };
    if req.uri().path() == "/api/health" {
        return next.run(req).await;
    }
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false);
    if authorized {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "invalid or missing API key").into_response()
    }
}

async fn events_handler(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events_tx.subscribe();
    let stream = BroadcastStream::new(rx).map(move |msg| {
        let event = match msg {
            Ok(event) => event,
            // A lagged receiver has lost events; tell it to refetch.
            Err(_) => ServerEvent::Resync {
                reason: "broadcast_lag".into(),
            },
        };
        let seq = state.event_seq.fetch_add(1, Ordering::Relaxed);
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().id(seq.to_string()).data(data))
    });

    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::default())
}

async fn health_handler() -> impl IntoResponse {
    axum::Json(json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_events_round_trip_as_tagged_json() {
        let event = ServerEvent::Token {
            chat_id: "c1".into(),
            token: "Hel".into(),
            done: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"token\""));
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        match back {
            ServerEvent::Token { chat_id, token, done } => {
                assert_eq!(chat_id, "c1");
                assert_eq!(token, "Hel");
                assert!(!done);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn status_event_uses_snake_case_tag() {
        let event = ServerEvent::MessageAdded {
            chat_id: "c1".into(),
            message: StoredMessage {
                id: "m1".into(),
                role: "assistant".into(),
                content: "hi".into(),
                project_plan: None,
                created_at: 0,
            },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"message_added\""));
        // The side channel is omitted entirely when absent.
        assert!(!json.contains("project_plan"));
    }
}
