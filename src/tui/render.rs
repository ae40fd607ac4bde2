//! Rendering logic: converts DisplayBlock variants into `Vec<Line>`.
//!
//! Plan panels render as a titled header plus one fold row per workstream:
//! collapsed rows show `▸ title`, expanded rows show `▾ title` followed by
//! the description and the ordered deliverables.

use chrono::TimeZone;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use std::collections::HashSet;

use super::display::DisplayBlock;
use super::markdown;
use crate::plan::Workstream;

/// Fold and focus state for plan panels, owned by the App and rebuilt from
/// scratch whenever the transcript reloads.
pub struct PlanView<'a> {
    pub expanded: &'a HashSet<(usize, usize)>,
    pub focused: Option<(usize, usize)>,
}

pub fn render_block(block: &DisplayBlock, view: &PlanView<'_>) -> Vec<Line<'static>> {
    match block {
        DisplayBlock::UserMessage { text, timestamp } => render_user_message(text, *timestamp),
        DisplayBlock::AssistantText { text } => markdown::markdown_to_lines(text),
        DisplayBlock::PlanPanel {
            message_index,
            plan,
        } => render_plan_panel(*message_index, &plan.workstreams, view),
        DisplayBlock::SystemNote { text } => vec![Line::from(Span::styled(
            text.to_string(),
            Style::default().fg(Color::Yellow),
        ))],
    }
}

fn render_user_message(text: &str, timestamp: u64) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (i, msg_line) in text.lines().enumerate() {
        let prefix = if i == 0 { "> " } else { "  " };
        let mut spans = vec![
            Span::styled(
                prefix,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(msg_line.to_string(), Style::default().fg(Color::White)),
        ];
        if i == 0 {
            let time = format_time(timestamp);
            if !time.is_empty() {
                spans.push(Span::styled(
                    format!("  {time}"),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        lines.push(Line::from(spans));
    }
    lines
}

/// "1 workstream" / "3 workstreams".
pub(super) fn workstream_count_label(count: usize) -> String {
    format!("{} workstream{}", count, if count == 1 { "" } else { "s" })
}

fn render_plan_panel(
    message_index: usize,
    workstreams: &[Workstream],
    view: &PlanView<'_>,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    lines.push(Line::from(vec![
        Span::styled("◆ ", Style::default().fg(Color::Cyan)),
        Span::styled(
            "Project plan",
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" ({})", workstream_count_label(workstreams.len())),
            Style::default().fg(Color::DarkGray),
        ),
    ]));

    for (ws_index, workstream) in workstreams.iter().enumerate() {
        let key = (message_index, ws_index);
        let is_expanded = view.expanded.contains(&key);
        let is_focused = view.focused == Some(key);

        let marker = if is_expanded { "▾ " } else { "▸ " };
        let title_style = if is_focused {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else if is_expanded {
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };

        lines.push(Line::from(vec![
            Span::styled(format!("  {marker}"), Style::default().fg(Color::Cyan)),
            Span::styled(workstream.title.clone(), title_style),
        ]));

        if !is_expanded {
            continue;
        }

        for desc_line in workstream.description.lines() {
            lines.push(Line::from(Span::styled(
                format!("      {}", desc_line.trim_end()),
                Style::default().fg(Color::Gray),
            )));
        }

        let total = workstream.deliverables.len();
        for (i, deliverable) in workstream.deliverables.iter().enumerate() {
            let branch = if i == total - 1 { "└ " } else { "├ " };
            lines.push(Line::from(vec![
                Span::styled(
                    format!("      {branch}"),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    deliverable.title.clone(),
                    Style::default().fg(Color::White),
                ),
                Span::styled(
                    format!(" · {}", deliverable.description),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
        }
    }

    lines
}

fn format_time(timestamp: u64) -> String {
    if timestamp == 0 {
        return String::new();
    }
    chrono::Local
        .timestamp_opt(timestamp as i64, 0)
        .single()
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Deliverable, ProjectPlan};

    fn sample_plan() -> ProjectPlan {
        ProjectPlan {
            workstreams: vec![
                Workstream {
                    title: "Backend".into(),
                    description: "API and storage".into(),
                    deliverables: vec![
                        Deliverable {
                            title: "Schema".into(),
                            description: "Initial tables".into(),
                        },
                        Deliverable {
                            title: "Routes".into(),
                            description: "CRUD endpoints".into(),
                        },
                    ],
                },
                Workstream {
                    title: "Frontend".into(),
                    description: "Screens".into(),
                    deliverables: vec![],
                },
            ],
        }
    }

    fn text_of(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn pluralizes_workstream_count() {
        assert_eq!(workstream_count_label(0), "0 workstreams");
        assert_eq!(workstream_count_label(1), "1 workstream");
        assert_eq!(workstream_count_label(2), "2 workstreams");
    }

    #[test]
    fn collapsed_panel_is_header_plus_one_row_per_workstream() {
        let plan = sample_plan();
        let expanded = HashSet::new();
        let view = PlanView {
            expanded: &expanded,
            focused: None,
        };
        let lines = render_plan_panel(0, &plan.workstreams, &view);
        assert_eq!(lines.len(), 3);
        assert!(text_of(&lines[0]).contains("Project plan (2 workstreams)"));
        assert!(text_of(&lines[1]).contains("▸ Backend"));
        assert!(text_of(&lines[2]).contains("▸ Frontend"));
        // Collapsed rows keep descriptions and deliverables hidden.
        assert!(!lines.iter().any(|l| text_of(l).contains("Schema")));
    }

    #[test]
    fn expanded_row_reveals_description_and_deliverables_in_order() {
        let plan = sample_plan();
        let mut expanded = HashSet::new();
        expanded.insert((5, 0));
        let view = PlanView {
            expanded: &expanded,
            focused: None,
        };
        let lines = render_plan_panel(5, &plan.workstreams, &view);
        let texts: Vec<String> = lines.iter().map(text_of).collect();
        assert!(texts[1].contains("▾ Backend"));
        assert!(texts[2].contains("API and storage"));
        assert!(texts[3].contains("Schema"));
        assert!(texts[3].contains("Initial tables"));
        assert!(texts[4].contains("Routes"));
        // Second workstream stays collapsed.
        assert!(texts[5].contains("▸ Frontend"));
        assert!(!texts.iter().any(|t| t.contains("Screens")));
    }

    #[test]
    fn fold_state_is_keyed_by_message_index() {
        let plan = sample_plan();
        let mut expanded = HashSet::new();
        expanded.insert((1, 0));
        let view = PlanView {
            expanded: &expanded,
            focused: None,
        };
        // Same plan rendered for a different message stays collapsed.
        let lines = render_plan_panel(2, &plan.workstreams, &view);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn singular_header_for_single_workstream() {
        let plan = ProjectPlan {
            workstreams: vec![Workstream {
                title: "Only".into(),
                description: "d".into(),
                deliverables: vec![],
            }],
        };
        let expanded = HashSet::new();
        let view = PlanView {
            expanded: &expanded,
            focused: None,
        };
        let lines = render_plan_panel(0, &plan.workstreams, &view);
        assert!(text_of(&lines[0]).contains("(1 workstream)"));
    }
}
