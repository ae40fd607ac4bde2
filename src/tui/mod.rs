pub mod app;
pub mod display;
pub mod markdown;
pub mod render;

use crate::tui_client::ApiClient;
use anyhow::Result;
use crossterm::event::{Event, EventStream};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::{Terminal, TerminalOptions, Viewport};
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

pub async fn run_tui(port: u16, api_key: Option<String>) -> Result<()> {
    let client = ApiClient::new(port, api_key);

    // Wait for server health
    for _ in 0..50 {
        if client.health_check().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if !client.health_check().await {
        anyhow::bail!("Server did not become healthy in time");
    }

    let sse_rx = client.subscribe_sse();
    let client = Arc::new(client);
    let mut terminal = setup_terminal()?;
    let mut app = app::App::new(client, sse_rx);

    let tick_rate = Duration::from_millis(50);
    let mut event_stream = EventStream::new();

    loop {
        // Drain all pending SSE events before rendering
        while let Ok(update) = app.sse_rx.try_recv() {
            app.handle_sse(update);
        }

        // Pick up results from spawned send tasks
        app.poll_slots();

        if app.needs_reload() {
            if let Err(e) = app.reload().await {
                app.set_notice(format!("Reload failed: {e}"));
            }
        }

        terminal.draw(|f| app.render(f))?;

        // Wait for a terminal event, an SSE event, or the tick.
        tokio::select! {
            maybe_event = event_stream.next() => {
                if let Some(Ok(Event::Key(key))) = maybe_event {
                    if app.handle_key(key)? {
                        restore_terminal(terminal)?;
                        return Ok(());
                    }
                }
            }
            Some(update) = app.sse_rx.recv() => {
                app.handle_sse(update);
            }
            _ = tokio::time::sleep(tick_rate) => {}
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let (_, rows) = crossterm::terminal::size()?;
    let terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(rows),
        },
    )?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.show_cursor()?;
    Ok(())
}
