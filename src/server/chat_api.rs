use crate::ollama::ChatMessage;
use crate::plan;
use crate::server::{ServerEvent, ServerState};
use crate::store::StoredMessage;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

#[derive(Deserialize)]
pub(crate) struct SendMessageRequest {
    chat_id: Option<String>,
    message: String,
    model: Option<String>,
}

#[derive(Serialize)]
struct SendMessageResponse {
    chat_id: String,
    message: StoredMessage,
}

#[derive(Deserialize)]
pub(crate) struct CreateChatRequest {
    title: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ClearChatRequest {
    chat_id: String,
}

const CHAT_TITLE_MAX_CHARS: usize = 48;

/// New chats are titled after the first line of the first user message.
fn derive_chat_title(message: &str) -> String {
    let first_line = message.trim().lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "New chat".to_string();
    }
    if first_line.chars().count() <= CHAT_TITLE_MAX_CHARS {
        return first_line.to_string();
    }
    let truncated: String = first_line
        .chars()
        .take(CHAT_TITLE_MAX_CHARS.saturating_sub(3))
        .collect();
    format!("{}...", truncated.trim_end())
}

/// POST /api/chat: relay one user message to the configured model.
///
/// Creates the chat on demand, stores the user message, injects the
/// plan-format instruction when the detector fires, streams the reply out as
/// token events, pre-parses the completed reply for a plan block, then
/// stores and returns the assistant message.
pub(crate) async fn chat_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let text = req.message.trim();
    if text.is_empty() {
        return (StatusCode::BAD_REQUEST, "message must not be empty").into_response();
    }
    let model_id = match state.models.resolve(req.model.as_deref()) {
        Ok(id) => id,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let chat_id = match &req.chat_id {
        Some(id) if state.store.chat_exists(id).await => id.clone(),
        Some(id) => {
            return (StatusCode::NOT_FOUND, format!("unknown chat {id}")).into_response();
        }
        None => {
            state
                .store
                .create_chat(Some(derive_chat_title(text)))
                .await
                .id
        }
    };

    let user_message = match state.store.add_message(&chat_id, "user", text, None).await {
        Ok(msg) => msg,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };
    let _ = state.events_tx.send(ServerEvent::MessageAdded {
        chat_id: chat_id.clone(),
        message: user_message,
    });

    // Outgoing conversation: system prompt, the per-turn plan instruction if
    // the detector fires (never stored in history), then recent messages.
    let mut outgoing = Vec::new();
    if let Some(system) = state.prompts.get(crate::prompts::CHAT_SYSTEM) {
        outgoing.push(ChatMessage::new("system", system));
    }
    if plan::is_plan_request(text) {
        info!("Plan request detected, injecting plan-format instruction");
        if let Some(instruction) = state.prompts.get(crate::prompts::PLAN_FORMAT) {
            outgoing.push(ChatMessage::new("system", instruction));
        }
    }
    let history = state.store.messages(&chat_id).await.unwrap_or_default();
    let skip = history.len().saturating_sub(state.options.max_history);
    for msg in history.iter().skip(skip) {
        outgoing.push(ChatMessage::new(&msg.role, &msg.content));
    }

    let _ = state.events_tx.send(ServerEvent::Status {
        chat_id: chat_id.clone(),
        state: "thinking".to_string(),
    });

    let reply = match relay_to_model(&state, &chat_id, &model_id, &outgoing).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Model call failed: {}", e);
            let _ = state.events_tx.send(ServerEvent::Status {
                chat_id: chat_id.clone(),
                state: "idle".to_string(),
            });
            return (StatusCode::BAD_GATEWAY, e.to_string()).into_response();
        }
    };

    // Best-effort pre-parse: attach the plan JSON only when the reply carries
    // a valid tag-delimited block. The client re-parses from raw text and
    // uses this value purely as the no-tags fallback.
    let side_channel = plan::extract(&reply, None)
        .plan
        .and_then(|p| serde_json::to_value(p).ok());
    if side_channel.is_some() {
        info!("Pre-parsed a project plan from the model reply");
    }

    let assistant_message = match state
        .store
        .add_message(&chat_id, "assistant", &reply, side_channel)
        .await
    {
        Ok(msg) => msg,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let _ = state.events_tx.send(ServerEvent::Status {
        chat_id: chat_id.clone(),
        state: "idle".to_string(),
    });
    let _ = state.events_tx.send(ServerEvent::MessageAdded {
        chat_id: chat_id.clone(),
        message: assistant_message.clone(),
    });

    Json(SendMessageResponse {
        chat_id,
        message: assistant_message,
    })
    .into_response()
}

/// Call the model and return the assembled reply text.
///
/// In streaming mode the reply is forwarded token by token as it arrives; a
/// stream that dies after producing output keeps the partial reply, one that
/// dies before producing anything is a hard failure.
async fn relay_to_model(
    state: &Arc<ServerState>,
    chat_id: &str,
    model_id: &str,
    messages: &[ChatMessage],
) -> anyhow::Result<String> {
    if !state.options.streaming {
        let reply = state.models.chat_text(model_id, messages).await?;
        if reply.trim().is_empty() {
            anyhow::bail!("model returned an empty reply");
        }
        return Ok(reply);
    }

    let mut stream = state.models.chat_text_stream(model_id, messages).await?;
    let mut reply = String::new();

    while let Some(item) = stream.next().await {
        match item {
            Ok(token) => {
                if token.is_empty() {
                    continue;
                }
                reply.push_str(&token);
                let _ = state.events_tx.send(ServerEvent::Token {
                    chat_id: chat_id.to_string(),
                    token,
                    done: false,
                });
            }
            Err(e) if reply.is_empty() => return Err(e),
            Err(e) => {
                warn!("Model stream ended early, keeping partial reply: {}", e);
                break;
            }
        }
    }

    let _ = state.events_tx.send(ServerEvent::Token {
        chat_id: chat_id.to_string(),
        token: String::new(),
        done: true,
    });

    if reply.trim().is_empty() {
        anyhow::bail!("model returned an empty reply");
    }
    Ok(reply)
}

pub(crate) async fn list_chats_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.store.list_chats().await)
}

pub(crate) async fn create_chat_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<CreateChatRequest>,
) -> impl IntoResponse {
    let title = req.title.filter(|t| !t.trim().is_empty());
    Json(state.store.create_chat(title).await)
}

pub(crate) async fn remove_chat_handler(
    State(state): State<Arc<ServerState>>,
    Path(chat_id): Path<String>,
) -> impl IntoResponse {
    if state.store.remove_chat(&chat_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, format!("unknown chat {chat_id}")).into_response()
    }
}

pub(crate) async fn chat_messages_handler(
    State(state): State<Arc<ServerState>>,
    Path(chat_id): Path<String>,
) -> impl IntoResponse {
    match state.store.messages(&chat_id).await {
        Some(messages) => Json(messages).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown chat {chat_id}")).into_response(),
    }
}

pub(crate) async fn clear_chat_handler(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<ClearChatRequest>,
) -> impl IntoResponse {
    match state.store.clear_messages(&req.chat_id).await {
        Some(removed) => {
            info!("Cleared {} messages from chat {}", removed, req.chat_id);
            Json(serde_json::json!({ "removed": removed })).into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("unknown chat {}", req.chat_id)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_title_from_first_line() {
        assert_eq!(derive_chat_title("Plan the launch\nwith details"), "Plan the launch");
        assert_eq!(derive_chat_title("   "), "New chat");
    }

    #[test]
    fn chat_title_is_truncated() {
        let long = "a".repeat(100);
        let title = derive_chat_title(&long);
        assert!(title.chars().count() <= CHAT_TITLE_MAX_CHARS);
        assert!(title.ends_with("..."));
    }
}
