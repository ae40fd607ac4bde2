use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    pub id: String,
    pub provider: String, // "ollama" | "openai" | "anthropic"
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Optional bearer token. When set, every API request except the health
    /// check must carry it. Single-user auth stub, not an auth system.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 7878,
            api_key: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatConfig {
    /// Model id used when a request does not name one. Falls back to the
    /// first configured model when unset.
    #[serde(default)]
    pub default_model: Option<String>,
    /// Maximum number of stored messages forwarded to the model per turn.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Stream tokens from the provider. Disable for backends that do not
    /// support streaming responses.
    #[serde(default = "default_streaming")]
    pub streaming: bool,
}

fn default_max_history() -> usize {
    40
}

fn default_streaming() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_model: None,
            max_history: default_max_history(),
            streaming: default_streaming(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub directory: Option<String>,
    pub retention_days: Option<u64>,
}

const KNOWN_PROVIDERS: [&str; 3] = ["ollama", "openai", "anthropic"];

impl Config {
    pub fn load_with_path() -> Result<(Self, Option<PathBuf>)> {
        let mut candidates = Vec::new();

        if let Ok(explicit) = std::env::var("CHARTER_CONFIG") {
            candidates.push(PathBuf::from(explicit));
        }

        candidates.push(PathBuf::from("charter.toml"));

        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("charter").join("charter.toml"));
        }
        if let Some(dir) = dirs::data_dir() {
            candidates.push(dir.join("charter").join("charter.toml"));
        }

        for path in candidates {
            if path.exists() {
                let content = fs::read_to_string(&path)?;
                let config: Config = toml::from_str(&content)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            anyhow::bail!("At least one model must be configured");
        }
        let mut seen_ids = std::collections::HashSet::new();
        for model in &self.models {
            if model.id.trim().is_empty() {
                anyhow::bail!("Model ID cannot be empty");
            }
            if !seen_ids.insert(&model.id) {
                anyhow::bail!("Duplicate model ID: {}", model.id);
            }
            if !KNOWN_PROVIDERS.contains(&model.provider.as_str()) {
                anyhow::bail!(
                    "Model '{}' has unknown provider '{}'. Known providers: {}",
                    model.id,
                    model.provider,
                    KNOWN_PROVIDERS.join(", ")
                );
            }
            // Validate the URL scheme to prevent SSRF.
            let url_lower = model.url.trim().to_lowercase();
            if !url_lower.starts_with("http://") && !url_lower.starts_with("https://") {
                anyhow::bail!(
                    "Model '{}' URL must start with http:// or https://, got: {}",
                    model.id,
                    model.url
                );
            }
        }
        if let Some(default) = &self.chat.default_model {
            if !self.models.iter().any(|m| &m.id == default) {
                anyhow::bail!("Default model '{}' is not a configured model", default);
            }
        }
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }
        if self.chat.max_history == 0 {
            anyhow::bail!("chat.max_history must be greater than 0");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: vec![ModelConfig {
                id: "default".to_string(),
                provider: "ollama".to_string(),
                url: "http://127.0.0.1:11434".to_string(),
                model: "qwen3".to_string(),
                api_key: None,
            }],
            server: ServerConfig::default(),
            chat: ChatConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_provider() {
        let mut config = Config::default();
        config.models[0].provider = "bedrock".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_url_scheme() {
        let mut config = Config::default();
        config.models[0].url = "file:///etc/passwd".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_model_ids() {
        let mut config = Config::default();
        config.models.push(config.models[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unconfigured_default_model() {
        let mut config = Config::default();
        config.chat.default_model = Some("missing".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_src = r#"
            [[models]]
            id = "claude"
            provider = "anthropic"
            url = "https://api.anthropic.com"
            model = "claude-sonnet-4-5"
            api_key = "sk-test"

            [server]
            port = 9000

            [chat]
            default_model = "claude"
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.chat.max_history, 40);
        assert_eq!(config.chat.default_model.as_deref(), Some("claude"));
    }
}
