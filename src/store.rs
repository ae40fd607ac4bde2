//! In-memory chat store, keyed by chat id.
//!
//! A chat owns an ordered message list. Messages are never mutated after
//! insertion; the client re-derives the plan panel from `content` on every
//! render, so `project_plan` is only the server's pre-parse side channel.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: u64,
    pub message_count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoredMessage {
    pub id: String,
    pub role: String, // "user" | "assistant"
    pub content: String,
    /// Best-effort server pre-parse of a plan block in `content`. Fallback
    /// only; the client's own extraction of `content` is authoritative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_plan: Option<serde_json::Value>,
    pub created_at: u64,
}

#[derive(Debug, Clone)]
struct Chat {
    id: String,
    title: String,
    created_at: u64,
    messages: Vec<StoredMessage>,
}

#[derive(Default)]
pub struct ChatStore {
    chats: RwLock<HashMap<String, Chat>>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_chat(&self, title: Option<String>) -> ChatSummary {
        let chat = Chat {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.unwrap_or_else(|| "New chat".to_string()),
            created_at: crate::util::now_ts_secs(),
            messages: Vec::new(),
        };
        let summary = summarize(&chat);
        self.chats.write().await.insert(chat.id.clone(), chat);
        summary
    }

    pub async fn list_chats(&self) -> Vec<ChatSummary> {
        let chats = self.chats.read().await;
        let mut summaries: Vec<ChatSummary> = chats.values().map(summarize).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    pub async fn chat_exists(&self, chat_id: &str) -> bool {
        self.chats.read().await.contains_key(chat_id)
    }

    pub async fn remove_chat(&self, chat_id: &str) -> bool {
        self.chats.write().await.remove(chat_id).is_some()
    }

    /// Append a message. Fails on an unknown chat id.
    pub async fn add_message(
        &self,
        chat_id: &str,
        role: &str,
        content: &str,
        project_plan: Option<serde_json::Value>,
    ) -> anyhow::Result<StoredMessage> {
        let mut chats = self.chats.write().await;
        let chat = chats
            .get_mut(chat_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown chat {}", chat_id))?;
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: role.to_string(),
            content: content.to_string(),
            project_plan,
            created_at: crate::util::now_ts_secs(),
        };
        chat.messages.push(message.clone());
        Ok(message)
    }

    pub async fn messages(&self, chat_id: &str) -> Option<Vec<StoredMessage>> {
        self.chats
            .read()
            .await
            .get(chat_id)
            .map(|chat| chat.messages.clone())
    }

    /// Remove all messages from a chat. Returns the removed count, or `None`
    /// for an unknown chat.
    pub async fn clear_messages(&self, chat_id: &str) -> Option<usize> {
        let mut chats = self.chats.write().await;
        let chat = chats.get_mut(chat_id)?;
        let removed = chat.messages.len();
        chat.messages.clear();
        Some(removed)
    }
}

fn summarize(chat: &Chat) -> ChatSummary {
    ChatSummary {
        id: chat.id.clone(),
        title: chat.title.clone(),
        created_at: chat.created_at,
        message_count: chat.messages.len(),
    }
}
