use crate::server::ServerEvent;
use crate::store::StoredMessage;
use anyhow::Result;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::warn;

/// One update delivered to the TUI from the SSE subscription task.
#[derive(Debug)]
pub enum SseUpdate {
    Connected,
    Disconnected(String),
    Event(ServerEvent),
}

pub struct ApiClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl ApiClient {
    pub fn new(port: u16, api_key: Option<String>) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            api_key,
            client: Client::new(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => rb.header("Authorization", format!("Bearer {}", key)),
            None => rb,
        }
    }

    pub async fn health_check(&self) -> bool {
        self.get("/api/health")
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Send a chat message. Returns the chat id from the server response
    /// (useful when the server auto-creates the chat). The messages
    /// themselves arrive over SSE.
    pub async fn send_chat(&self, chat_id: Option<&str>, message: &str) -> Result<String> {
        let mut body = json!({ "message": message });
        if let Some(id) = chat_id {
            body["chat_id"] = json!(id);
        }
        let resp = self.post("/api/chat").json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Chat request failed ({}): {}", status, text);
        }
        let resp_body: serde_json::Value = resp.json().await.unwrap_or_default();
        resp_body
            .get("chat_id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("chat response missing chat_id"))
    }

    /// Fetch the full message history of a chat (used for resync).
    pub async fn fetch_messages(&self, chat_id: &str) -> Result<Vec<StoredMessage>> {
        let resp = self
            .get(&format!("/api/chats/{}/messages", chat_id))
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("message fetch failed: {}", resp.status());
        }
        Ok(resp.json().await?)
    }

    /// Subscribe to SSE events. The connection runs in a background task with
    /// automatic reconnection using exponential backoff (1s doubling, capped
    /// at 30s).
    pub fn subscribe_sse(&self) -> mpsc::UnboundedReceiver<SseUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let url = format!("{}/api/events", self.base_url);
        let client = self.client.clone();
        let api_key = self.api_key.clone();

        tokio::spawn(async move {
            let mut backoff_secs: u64 = 1;
            const MAX_BACKOFF: u64 = 30;

            loop {
                let mut rb = client.get(&url);
                if let Some(key) = &api_key {
                    rb = rb.header("Authorization", format!("Bearer {}", key));
                }
                let resp = match rb.send().await {
                    Ok(r) if r.status().is_success() => {
                        backoff_secs = 1;
                        if tx.send(SseUpdate::Connected).is_err() {
                            return; // receiver dropped
                        }
                        r
                    }
                    Ok(r) => {
                        let _ = tx.send(SseUpdate::Disconnected(format!(
                            "Event stream rejected: {}",
                            r.status()
                        )));
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF);
                        continue;
                    }
                    Err(e) => {
                        warn!("SSE connect failed: {}", e);
                        let _ = tx.send(SseUpdate::Disconnected(format!("Connect failed: {e}")));
                        tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                        backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF);
                        continue;
                    }
                };

                let mut stream = resp.bytes_stream();
                let mut buf = String::new();

                use futures_util::StreamExt;
                while let Some(chunk) = stream.next().await {
                    let chunk = match chunk {
                        Ok(c) => c,
                        Err(e) => {
                            warn!("SSE stream error: {}", e);
                            break;
                        }
                    };
                    buf.push_str(&String::from_utf8_lossy(&chunk));

                    // SSE frames: "data:" lines separated by blank lines.
                    while let Some(pos) = buf.find("\n\n") {
                        let frame = buf[..pos].to_string();
                        buf = buf[pos + 2..].to_string();

                        for line in frame.lines() {
                            let Some(data) = line.strip_prefix("data:") else {
                                continue;
                            };
                            let data = data.trim();
                            if data.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<ServerEvent>(data) {
                                Ok(event) => {
                                    if tx.send(SseUpdate::Event(event)).is_err() {
                                        return; // receiver dropped
                                    }
                                }
                                Err(_) => {
                                    // Skip malformed frames silently
                                }
                            }
                        }
                    }
                }

                let _ = tx.send(SseUpdate::Disconnected("Stream ended".to_string()));
                tokio::time::sleep(std::time::Duration::from_secs(backoff_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF);
            }
        });

        rx
    }
}
