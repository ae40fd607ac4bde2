mod anthropic;
mod config;
mod logging;
mod models;
mod ollama;
mod openai;
mod plan;
mod prompts;
mod server;
mod store;
mod tui;
mod tui_client;
mod util;

use crate::config::Config;
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "charter", version)]
#[command(about = "Charter: single-user LLM chat with inline project plans", long_about = None)]
struct Cli {
    /// Port for the embedded server
    #[arg(long)]
    port: Option<u16>,

    /// Run the HTTP server only, no TUI
    #[arg(long, default_value_t = false)]
    web: bool,

    /// Model id to use for this run (overrides the configured default)
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_path) = Config::load_with_path().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config, using defaults: {e}");
        (Config::default(), None)
    });
    config.validate()?;

    let cli = Cli::parse();

    // Suppress stdout logging in TUI mode — ratatui owns the terminal.
    let will_run_tui = !cli.web;
    let log_dir = match logging::setup_tracing_with_settings(logging::LoggingSettings {
        level: config.logging.level.as_deref(),
        directory: config.logging.directory.as_deref(),
        retention_days: config.logging.retention_days,
        suppress_stdout: will_run_tui,
    }) {
        Ok(path) => Some(path),
        Err(err) => {
            eprintln!("Failed to initialize logging: {err}");
            None
        }
    };

    tracing::info!("--- Charter Startup ---");
    if let Some(path) = config_path.as_ref() {
        tracing::info!("Config File: {}", path.display());
    } else {
        tracing::info!("Config File: (default)");
    }
    if let Some(dir) = log_dir.as_ref() {
        tracing::info!("Log Directory: {}", dir.display());
    }

    let port = cli.port.unwrap_or(config.server.port);
    let default_model = cli.model.clone().or_else(|| config.chat.default_model.clone());

    let models = Arc::new(models::ModelManager::new(config.models.clone(), default_model));
    tracing::info!("Configured Models ({}):", models.list_models().len());
    for m in models.list_models() {
        tracing::info!(
            "  - ID: {}, Provider: {}, Model: {}, URL: {}",
            m.id, m.provider, m.model, m.url
        );
    }

    let store = Arc::new(store::ChatStore::new());
    let prompt_dir = prompts::PromptStore::default_override_dir();
    let prompt_store = Arc::new(prompts::PromptStore::load(Some(&prompt_dir)));

    let options = server::ServerOptions {
        api_key: config.server.api_key.clone(),
        max_history: config.chat.max_history,
        streaming: config.chat.streaming,
    };

    if cli.web {
        tracing::info!("Server Port: {}", port);
        server::start_server(store, models, prompt_store, options, port).await?;
    } else {
        let handle = server::prepare_server(store, models, prompt_store, options, port).await?;
        let result = tui::run_tui(handle.port, config.server.api_key.clone()).await;
        handle.task.abort();
        result?;
    }

    Ok(())
}
