//! TUI application state: transcript, input line, streaming reply, and the
//! fold/focus state of inline plan panels.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

use super::display::{self, DisplayBlock};
use super::markdown;
use super::render::{render_block, PlanView};
use crate::server::ServerEvent;
use crate::store::StoredMessage;
use crate::tui_client::{ApiClient, SseUpdate};

pub struct App {
    client: Arc<ApiClient>,
    pub sse_rx: mpsc::UnboundedReceiver<SseUpdate>,
    pub chat_id: Option<String>,
    /// Filled by spawned send tasks when the server auto-creates the chat.
    chat_id_slot: Arc<Mutex<Option<String>>>,
    /// Errors from spawned send tasks, surfaced on the status line.
    error_slot: Arc<Mutex<Option<String>>>,
    messages: Vec<StoredMessage>,
    pending_reply: String,
    thinking: bool,
    notice: Option<String>,
    needs_reload: bool,
    input: String,
    /// Lines scrolled up from the bottom of the transcript.
    scroll_offset: u16,
    /// Focused workstream row, keyed by (message index, workstream index).
    focused: Option<(usize, usize)>,
    /// Expanded workstream rows. Cleared on every transcript reload; fold
    /// state is view-local and never persisted.
    expanded: HashSet<(usize, usize)>,
}

impl App {
    pub fn new(client: Arc<ApiClient>, sse_rx: mpsc::UnboundedReceiver<SseUpdate>) -> Self {
        Self {
            client,
            sse_rx,
            chat_id: None,
            chat_id_slot: Arc::new(Mutex::new(None)),
            error_slot: Arc::new(Mutex::new(None)),
            messages: Vec::new(),
            pending_reply: String::new(),
            thinking: false,
            notice: None,
            needs_reload: false,
            input: String::new(),
            scroll_offset: 0,
            focused: None,
            expanded: HashSet::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Input handling
    // -----------------------------------------------------------------------

    /// Returns `Ok(true)` when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('d') if ctrl => return Ok(true),
            KeyCode::Tab => self.focus_step(1),
            KeyCode::BackTab => self.focus_step(-1),
            KeyCode::Esc => self.focused = None,
            KeyCode::Enter => {
                if let Some(slot) = self.focused {
                    self.toggle_workstream(slot);
                } else {
                    self.submit_input();
                }
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Up => self.scroll_offset = self.scroll_offset.saturating_add(1),
            KeyCode::Down => self.scroll_offset = self.scroll_offset.saturating_sub(1),
            KeyCode::PageUp => self.scroll_offset = self.scroll_offset.saturating_add(10),
            KeyCode::PageDown => self.scroll_offset = self.scroll_offset.saturating_sub(10),
            KeyCode::Char(c) if !ctrl => self.input.push(c),
            _ => {}
        }
        Ok(false)
    }

    fn toggle_workstream(&mut self, slot: (usize, usize)) {
        if !self.expanded.remove(&slot) {
            self.expanded.insert(slot);
        }
    }

    /// Every focusable workstream row, in transcript order.
    fn plan_slots(&self) -> Vec<(usize, usize)> {
        let mut slots = Vec::new();
        for (index, msg) in self.messages.iter().enumerate() {
            for block in display::blocks_for_message(index, msg) {
                if let DisplayBlock::PlanPanel { plan, .. } = block {
                    for ws_index in 0..plan.workstreams.len() {
                        slots.push((index, ws_index));
                    }
                }
            }
        }
        slots
    }

    /// Move focus forward (+1) or backward (-1) through the plan rows,
    /// passing through the unfocused state at both ends.
    fn focus_step(&mut self, direction: isize) {
        let slots = self.plan_slots();
        if slots.is_empty() {
            self.focused = None;
            return;
        }
        let current = self.focused.and_then(|f| slots.iter().position(|&s| s == f));
        self.focused = match (current, direction >= 0) {
            (None, true) => Some(slots[0]),
            (None, false) => slots.last().copied(),
            (Some(i), true) => slots.get(i + 1).copied(),
            (Some(0), false) => None,
            (Some(i), false) => slots.get(i - 1).copied(),
        };
    }

    fn submit_input(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() || self.thinking {
            return;
        }
        self.input.clear();
        self.notice = None;
        self.thinking = true;

        let client = self.client.clone();
        let chat_id = self.chat_id.clone();
        let chat_id_slot = self.chat_id_slot.clone();
        let error_slot = self.error_slot.clone();
        tokio::spawn(async move {
            match client.send_chat(chat_id.as_deref(), &text).await {
                Ok(id) => {
                    if let Ok(mut slot) = chat_id_slot.lock() {
                        *slot = Some(id);
                    }
                }
                Err(e) => {
                    warn!("send_chat failed: {}", e);
                    if let Ok(mut slot) = error_slot.lock() {
                        *slot = Some(e.to_string());
                    }
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Server updates
    // -----------------------------------------------------------------------

    pub fn handle_sse(&mut self, update: SseUpdate) {
        match update {
            SseUpdate::Connected => self.notice = None,
            SseUpdate::Disconnected(reason) => self.notice = Some(reason),
            SseUpdate::Event(event) => self.handle_server_event(event),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::MessageAdded { chat_id, message } => {
                if !self.accepts_chat(&chat_id) {
                    return;
                }
                if self.chat_id.is_none() {
                    self.chat_id = Some(chat_id);
                }
                if message.role == "assistant" {
                    self.pending_reply.clear();
                    self.thinking = false;
                }
                self.messages.push(message);
                self.scroll_offset = 0;
            }
            ServerEvent::Token { chat_id, token, done } => {
                if !self.accepts_chat(&chat_id) || done {
                    return;
                }
                self.pending_reply.push_str(&token);
                self.scroll_offset = 0;
            }
            ServerEvent::Status { chat_id, state } => {
                if self.accepts_chat(&chat_id) {
                    self.thinking = state == "thinking";
                }
            }
            ServerEvent::Resync { .. } => self.needs_reload = true,
        }
    }

    fn accepts_chat(&self, chat_id: &str) -> bool {
        match &self.chat_id {
            Some(current) => current == chat_id,
            // No chat adopted yet (single-user app, one live chat at a time).
            None => true,
        }
    }

    /// Drain results handed over from spawned send tasks.
    pub fn poll_slots(&mut self) {
        if self.chat_id.is_none() {
            if let Ok(mut slot) = self.chat_id_slot.lock() {
                if let Some(id) = slot.take() {
                    self.chat_id = Some(id);
                }
            }
        }
        if let Ok(mut slot) = self.error_slot.lock() {
            if let Some(err) = slot.take() {
                self.notice = Some(err);
                self.thinking = false;
            }
        }
    }

    pub fn needs_reload(&self) -> bool {
        self.needs_reload
    }

    /// Refetch the transcript after SSE lag.
    pub async fn reload(&mut self) -> Result<()> {
        match self.chat_id.clone() {
            Some(chat_id) => {
                let messages = self.client.fetch_messages(&chat_id).await?;
                self.reset_transcript(messages);
            }
            None => self.needs_reload = false,
        }
        Ok(())
    }

    fn reset_transcript(&mut self, messages: Vec<StoredMessage>) {
        self.messages = messages;
        // Fold and focus state never survives a transcript reload.
        self.expanded.clear();
        self.focused = None;
        self.needs_reload = false;
    }

    pub fn set_notice(&mut self, notice: String) {
        self.notice = Some(notice);
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    pub fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(3),
            ])
            .split(f.area());

        self.render_transcript(f, chunks[0]);
        self.render_status(f, chunks[1]);
        self.render_input(f, chunks[2]);
    }

    fn render_transcript(&self, f: &mut Frame, area: Rect) {
        let lines = self.transcript_lines();
        let height = wrapped_height(&lines, area.width.max(1));
        let bottom = height.saturating_sub(area.height);
        let y = bottom.saturating_sub(self.scroll_offset);
        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((y, 0));
        f.render_widget(paragraph, area);
    }

    fn transcript_lines(&self) -> Vec<Line<'static>> {
        let view = PlanView {
            expanded: &self.expanded,
            focused: self.focused,
        };
        let mut lines = Vec::new();
        for (index, msg) in self.messages.iter().enumerate() {
            for block in display::blocks_for_message(index, msg) {
                lines.extend(render_block(&block, &view));
            }
            lines.push(Line::from(""));
        }
        if !self.pending_reply.is_empty() {
            // Streaming preview: raw text, re-rendered as regions once the
            // completed message lands.
            lines.extend(markdown::markdown_to_lines(&self.pending_reply));
        } else if self.thinking {
            lines.push(Line::from(Span::styled(
                "✻ Thinking...",
                Style::default().fg(Color::Yellow),
            )));
        }
        lines
    }

    fn render_status(&self, f: &mut Frame, area: Rect) {
        let text = if let Some(notice) = &self.notice {
            Span::styled(notice.clone(), Style::default().fg(Color::Red))
        } else if self.thinking {
            Span::styled("working...", Style::default().fg(Color::Yellow))
        } else if self.focused.is_some() {
            Span::styled(
                "Enter toggle · Tab next · Esc back to typing",
                Style::default().fg(Color::DarkGray),
            )
        } else {
            Span::styled(
                "Enter send · Tab focus plan · Ctrl+C quit",
                Style::default().fg(Color::DarkGray),
            )
        };
        f.render_widget(Paragraph::new(Line::from(text)), area);
    }

    fn render_input(&self, f: &mut Frame, area: Rect) {
        let paragraph = Paragraph::new(self.input.as_str())
            .style(Style::default().fg(Color::White))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(if self.focused.is_some() {
                        Color::DarkGray
                    } else {
                        Color::Cyan
                    }))
                    .title(" message "),
            );
        f.render_widget(paragraph, area);
        if self.focused.is_none() {
            let cursor_x = area.x + 1 + self.input.chars().count() as u16;
            f.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(2)), area.y + 1));
        }
    }
}

/// Approximate display height of `lines` wrapped at `width` columns.
fn wrapped_height(lines: &[Line<'_>], width: u16) -> u16 {
    let width = width as usize;
    let mut total = 0usize;
    for line in lines {
        let w = line.width();
        total += if w == 0 { 1 } else { w.div_ceil(width) };
    }
    total.min(u16::MAX as usize) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PLAN_CLOSE_TAG, PLAN_OPEN_TAG};
    use crossterm::event::KeyCode;

    fn plan_content(workstreams: usize) -> String {
        let ws: Vec<String> = (0..workstreams)
            .map(|i| {
                format!(
                    r#"{{"title":"W{i}","description":"D{i}","deliverables":[]}}"#
                )
            })
            .collect();
        format!(
            "{PLAN_OPEN_TAG}{{\"workstreams\":[{}]}}{PLAN_CLOSE_TAG}",
            ws.join(",")
        )
    }

    fn assistant(content: &str) -> StoredMessage {
        StoredMessage {
            id: "m".into(),
            role: "assistant".into(),
            content: content.into(),
            project_plan: None,
            created_at: 0,
        }
    }

    fn test_app() -> App {
        let (_tx, rx) = mpsc::unbounded_channel();
        App::new(Arc::new(ApiClient::new(1, None)), rx)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::from(code)).unwrap();
    }

    #[test]
    fn tab_cycles_focus_through_workstreams() {
        let mut app = test_app();
        app.messages.push(assistant(&plan_content(2)));
        app.messages.push(assistant(&plan_content(1)));

        assert_eq!(app.focused, None);
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focused, Some((0, 0)));
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focused, Some((0, 1)));
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focused, Some((1, 0)));
        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focused, None);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.focused, Some((1, 0)));
    }

    #[test]
    fn enter_toggles_focused_workstream() {
        let mut app = test_app();
        app.messages.push(assistant(&plan_content(1)));

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Enter);
        assert!(app.expanded.contains(&(0, 0)));
        press(&mut app, KeyCode::Enter);
        assert!(!app.expanded.contains(&(0, 0)));
    }

    #[test]
    fn typing_goes_to_input_and_esc_drops_focus() {
        let mut app = test_app();
        app.messages.push(assistant(&plan_content(1)));
        press(&mut app, KeyCode::Char('h'));
        press(&mut app, KeyCode::Char('i'));
        assert_eq!(app.input, "hi");
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.focused, None);
    }

    #[test]
    fn assistant_message_clears_pending_reply() {
        let mut app = test_app();
        app.handle_sse(SseUpdate::Event(ServerEvent::Token {
            chat_id: "c1".into(),
            token: "partial".into(),
            done: false,
        }));
        assert_eq!(app.pending_reply, "partial");
        assert!(app.chat_id.is_none());

        app.handle_sse(SseUpdate::Event(ServerEvent::MessageAdded {
            chat_id: "c1".into(),
            message: assistant("full reply"),
        }));
        assert_eq!(app.pending_reply, "");
        assert_eq!(app.chat_id.as_deref(), Some("c1"));
        assert_eq!(app.messages.len(), 1);
    }

    #[test]
    fn events_for_other_chats_are_ignored() {
        let mut app = test_app();
        app.chat_id = Some("mine".into());
        app.handle_sse(SseUpdate::Event(ServerEvent::MessageAdded {
            chat_id: "other".into(),
            message: assistant("nope"),
        }));
        assert!(app.messages.is_empty());
    }

    #[test]
    fn reload_resets_fold_and_focus_state() {
        let mut app = test_app();
        app.messages.push(assistant(&plan_content(2)));
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Enter);
        assert!(!app.expanded.is_empty());

        app.handle_sse(SseUpdate::Event(ServerEvent::Resync {
            reason: "broadcast_lag".into(),
        }));
        assert!(app.needs_reload());

        app.reset_transcript(vec![assistant(&plan_content(2))]);
        assert!(app.expanded.is_empty());
        assert_eq!(app.focused, None);
        assert!(!app.needs_reload());
    }

    #[test]
    fn wrapped_height_counts_wrapping() {
        let lines = vec![Line::from("a".repeat(25)), Line::from("")];
        assert_eq!(wrapped_height(&lines, 10), 4);
    }
}
