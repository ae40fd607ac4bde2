//! Lightweight markdown to ratatui conversion for chat prose.
//!
//! Handles headers, bullet and numbered lists, blockquotes, code fences,
//! and inline bold/code. Not CommonMark, just what model replies use.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

pub fn markdown_to_lines(input: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code_block = false;

    for raw_line in input.lines() {
        if raw_line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            lines.push(Line::from(Span::styled(
                if in_code_block { "  ╭───" } else { "  ╰───" },
                Style::default().fg(Color::DarkGray),
            )));
            continue;
        }

        if in_code_block {
            lines.push(Line::from(vec![
                Span::styled("  │ ", Style::default().fg(Color::DarkGray)),
                Span::styled(raw_line.to_string(), Style::default().fg(Color::Yellow)),
            ]));
            continue;
        }

        let trimmed = raw_line.trim();

        if trimmed.is_empty() {
            lines.push(Line::from(""));
            continue;
        }

        // Headers: weight by level, all cyan.
        if let Some((level, rest)) = header_level(trimmed) {
            let mut style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
            if level <= 2 {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
            lines.push(Line::from(Span::styled(rest.to_string(), style)));
            continue;
        }

        // Blockquote
        if let Some(rest) = trimmed.strip_prefix("> ") {
            let mut spans = vec![Span::styled("  ┃ ", Style::default().fg(Color::DarkGray))];
            spans.extend(inline_spans(rest));
            lines.push(Line::from(spans));
            continue;
        }

        // Bullet list
        if let Some(rest) = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
        {
            let mut spans = vec![Span::styled("  • ", Style::default().fg(Color::DarkGray))];
            spans.extend(inline_spans(rest));
            lines.push(Line::from(spans));
            continue;
        }

        // Numbered list
        if let Some((number, rest)) = split_numbered_item(trimmed) {
            let mut spans = vec![Span::styled(
                format!("  {number}. "),
                Style::default().fg(Color::DarkGray),
            )];
            spans.extend(inline_spans(rest));
            lines.push(Line::from(spans));
            continue;
        }

        // Plain paragraph line
        let mut spans = vec![Span::raw("  ".to_string())];
        spans.extend(inline_spans(trimmed));
        lines.push(Line::from(spans));
    }

    lines
}

fn header_level(line: &str) -> Option<(usize, &str)> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 4 {
        return None;
    }
    line.get(hashes..)
        .and_then(|rest| rest.strip_prefix(' '))
        .map(|rest| (hashes, rest))
}

fn split_numbered_item(line: &str) -> Option<(&str, &str)> {
    let dot = line.find(". ")?;
    let number = &line[..dot];
    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((number, &line[dot + 2..]))
}

/// Inline styling: `code` spans first, then **bold** inside the remainder.
/// Unterminated markers render literally.
fn inline_spans(input: &str) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut rest = input;

    while let Some(open) = rest.find('`') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('`') else {
            break;
        };
        push_bold_aware(&mut spans, &rest[..open]);
        spans.push(Span::styled(
            after[..close].to_string(),
            Style::default().fg(Color::Yellow),
        ));
        rest = &after[close + 1..];
    }
    push_bold_aware(&mut spans, rest);

    if spans.is_empty() {
        spans.push(Span::raw(String::new()));
    }
    spans
}

fn push_bold_aware(spans: &mut Vec<Span<'static>>, mut rest: &str) {
    while let Some(open) = rest.find("**") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("**") else {
            break;
        };
        if !rest[..open].is_empty() {
            spans.push(Span::raw(rest[..open].to_string()));
        }
        spans.push(Span::styled(
            after[..close].to_string(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ));
        rest = &after[close + 2..];
    }
    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn headers_and_paragraphs() {
        let lines = markdown_to_lines("## Title\n\nbody text");
        assert_eq!(text_of(&lines[0]), "Title");
        assert_eq!(text_of(&lines[1]), "");
        assert_eq!(text_of(&lines[2]), "  body text");
    }

    #[test]
    fn code_fences_toggle() {
        let lines = markdown_to_lines("```\nlet x = 1;\n```");
        assert_eq!(lines.len(), 3);
        assert!(text_of(&lines[1]).contains("let x = 1;"));
    }

    #[test]
    fn inline_code_and_bold_split() {
        let lines = markdown_to_lines("use `extract` for **all** input");
        let text = text_of(&lines[0]);
        assert_eq!(text, "  use extract for all input");
        // code span styled separately
        assert!(lines[0].spans.len() >= 4);
    }

    #[test]
    fn unterminated_markers_render_literally() {
        let lines = markdown_to_lines("a `broken and **bold");
        assert_eq!(text_of(&lines[0]), "  a `broken and **bold");
    }

    #[test]
    fn list_items_get_markers() {
        let lines = markdown_to_lines("- first\n2. second");
        assert_eq!(text_of(&lines[0]), "  • first");
        assert_eq!(text_of(&lines[1]), "  2. second");
    }
}
