use crate::ollama::ChatMessage;
use anyhow::Result;
use futures_util::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Clone)]
pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Non-streaming message call.
    pub async fn chat_text(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let total_len: usize = messages.iter().map(|m| m.content.len()).sum();
        tracing::info!(
            "Anthropic Request (Text): model={}, messages={}, total_chars={}",
            model,
            messages.len(),
            total_len
        );

        let req = AnthropicRequest::build(model, messages, false);
        let resp = self.request(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("anthropic error ({}): {}", status, text);
        }

        let payload: AnthropicResponse = resp.json().await?;
        let content = payload
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(content)
    }

    /// Streaming message call (SSE; text arrives as content_block_delta events).
    pub async fn chat_text_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<String>>> {
        let total_len: usize = messages.iter().map(|m| m.content.len()).sum();
        tracing::info!(
            "Anthropic Request (Stream): model={}, messages={}, total_chars={}",
            model,
            messages.len(),
            total_len
        );

        let req = AnthropicRequest::build(model, messages, true);
        let resp = self.request(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("anthropic error ({}): {}", status, text);
        }

        use futures_util::StreamExt;
        let byte_stream = resp
            .bytes_stream()
            .map(|item| item.map_err(std::io::Error::other));
        let reader = tokio_util::io::StreamReader::new(byte_stream);
        let lines =
            tokio_util::codec::FramedRead::new(reader, tokio_util::codec::LinesCodec::new());

        let token_stream = lines.filter_map(|line_result| async move {
            let line = match line_result {
                Ok(l) => l,
                Err(e) => return Some(Err(anyhow::anyhow!("stream error: {}", e))),
            };
            let data = match line.trim().strip_prefix("data: ") {
                Some(d) => d.trim(),
                None => return None, // "event:" lines and keep-alives
            };
            let event: AnthropicStreamEvent = match serde_json::from_str(data) {
                Ok(e) => e,
                Err(e) => {
                    return Some(Err(anyhow::anyhow!(
                        "anthropic json parse error: {} (data: {})",
                        e,
                        data
                    )));
                }
            };
            if event.kind != "content_block_delta" {
                return None;
            }
            match event.delta.and_then(|d| d.text) {
                Some(text) if !text.is_empty() => Some(Ok(text)),
                _ => None,
            }
        });

        Ok(token_stream.boxed())
    }

    fn request(&self, req: &AnthropicRequest) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/messages", self.base_url);
        let mut rb = self
            .http
            .post(url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(req);
        if let Some(key) = &self.api_key {
            rb = rb.header("x-api-key", key);
        }
        rb
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl AnthropicRequest {
    /// The Messages API takes the system prompt out of band, so system-role
    /// entries are collected into `system` and the rest keep their order.
    fn build(model: &str, messages: &[ChatMessage], stream: bool) -> Self {
        let mut system_parts = Vec::new();
        let mut turns = Vec::new();
        for msg in messages {
            if msg.role == "system" {
                system_parts.push(msg.content.clone());
            } else {
                turns.push(AnthropicMessage {
                    role: msg.role.clone(),
                    content: msg.content.clone(),
                });
            }
        }
        Self {
            model: model.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            messages: turns,
            stream,
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
}
