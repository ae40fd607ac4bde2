//! Model registry and provider dispatch.
//!
//! Each configured model gets a provider client and a semaphore limiting it
//! to one in-flight request, so a slow backend cannot be piled onto.

use crate::anthropic::AnthropicClient;
use crate::config::ModelConfig;
use crate::ollama::{ChatMessage, OllamaClient};
use crate::openai::OpenAiClient;
use anyhow::Result;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct ModelManager {
    models: HashMap<String, ModelInstance>,
    default_id: Option<String>,
    first_id: Option<String>,
}

struct ModelInstance {
    config: ModelConfig,
    client: ProviderClient,
    semaphore: Arc<Semaphore>,
}

enum ProviderClient {
    Ollama(OllamaClient),
    OpenAi(OpenAiClient),
    Anthropic(AnthropicClient),
}

impl ProviderClient {
    fn for_config(cfg: &ModelConfig) -> Self {
        match cfg.provider.as_str() {
            "openai" => Self::OpenAi(OpenAiClient::new(cfg.url.clone(), cfg.api_key.clone())),
            "anthropic" => {
                Self::Anthropic(AnthropicClient::new(cfg.url.clone(), cfg.api_key.clone()))
            }
            _ => Self::Ollama(OllamaClient::new(cfg.url.clone(), cfg.api_key.clone())),
        }
    }

    async fn chat_text(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        match self {
            Self::Ollama(client) => client.chat_text(model, messages).await,
            Self::OpenAi(client) => client.chat_text(model, messages).await,
            Self::Anthropic(client) => client.chat_text(model, messages).await,
        }
    }

    async fn chat_text_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<String>>> {
        match self {
            Self::Ollama(client) => client.chat_text_stream(model, messages).await,
            Self::OpenAi(client) => client.chat_text_stream(model, messages).await,
            Self::Anthropic(client) => client.chat_text_stream(model, messages).await,
        }
    }
}

impl ModelManager {
    pub fn new(configs: Vec<ModelConfig>, default_model: Option<String>) -> Self {
        let first_id = configs.first().map(|c| c.id.clone());
        let mut models = HashMap::new();
        for cfg in configs {
            let client = ProviderClient::for_config(&cfg);
            let semaphore = Arc::new(Semaphore::new(1));
            models.insert(
                cfg.id.clone(),
                ModelInstance {
                    config: cfg,
                    client,
                    semaphore,
                },
            );
        }
        Self {
            models,
            default_id: default_model,
            first_id,
        }
    }

    /// Resolve a requested model id to a configured one: explicit request,
    /// then the configured default, then the first configured model.
    pub fn resolve(&self, requested: Option<&str>) -> Result<String> {
        let candidate = requested
            .map(str::to_string)
            .or_else(|| self.default_id.clone())
            .or_else(|| self.first_id.clone())
            .ok_or_else(|| anyhow::anyhow!("No models configured"))?;
        if !self.models.contains_key(&candidate) {
            anyhow::bail!("Model {} not found", candidate);
        }
        Ok(candidate)
    }

    pub async fn chat_text(&self, model_id: &str, messages: &[ChatMessage]) -> Result<String> {
        let instance = self
            .models
            .get(model_id)
            .ok_or_else(|| anyhow::anyhow!("Model {} not found", model_id))?;
        let _permit = instance.semaphore.acquire().await?;
        instance
            .client
            .chat_text(&instance.config.model, messages)
            .await
    }

    pub async fn chat_text_stream(
        &self,
        model_id: &str,
        messages: &[ChatMessage],
    ) -> Result<impl Stream<Item = Result<String>> + Send + Unpin> {
        let instance = self
            .models
            .get(model_id)
            .ok_or_else(|| anyhow::anyhow!("Model {} not found", model_id))?;

        // The permit is held for the lifetime of the stream.
        let permit = instance.semaphore.clone().acquire_owned().await?;
        let stream = instance
            .client
            .chat_text_stream(&instance.config.model, messages)
            .await?;

        Ok(Box::pin(futures_util::stream::unfold(
            (stream, permit),
            |(mut stream, permit)| async move {
                match stream.next().await {
                    Some(item) => Some((item, (stream, permit))),
                    None => None,
                }
            },
        )))
    }

    pub fn list_models(&self) -> Vec<&ModelConfig> {
        self.models.values().map(|m| &m.config).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, provider: &str) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            provider: provider.to_string(),
            url: "http://127.0.0.1:1".to_string(),
            model: format!("{id}-wire"),
            api_key: None,
        }
    }

    #[test]
    fn resolve_prefers_explicit_then_default_then_first() {
        let manager = ModelManager::new(
            vec![model("local", "ollama"), model("claude", "anthropic")],
            Some("claude".to_string()),
        );
        assert_eq!(manager.resolve(Some("local")).unwrap(), "local");
        assert_eq!(manager.resolve(None).unwrap(), "claude");

        let manager = ModelManager::new(vec![model("local", "ollama")], None);
        assert_eq!(manager.resolve(None).unwrap(), "local");
    }

    #[test]
    fn resolve_rejects_unknown_ids() {
        let manager = ModelManager::new(vec![model("local", "ollama")], None);
        assert!(manager.resolve(Some("missing")).is_err());

        let manager = ModelManager::new(vec![], None);
        assert!(manager.resolve(None).is_err());
    }
}
