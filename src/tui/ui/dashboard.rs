use crate::registry::Status;
use crate::tui::app::{App, Row, StatusLevel};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Service table
            Constraint::Length(8), // Activity panel
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    draw_header(f, app, chunks[0]);
    draw_service_table(f, app, chunks[1]);
    draw_activity_panel(f, app, chunks[2]);
    draw_status_bar(f, app, chunks[3]);
}

pub fn status_color(status: Status) -> Color {
    match status {
        Status::Running => Color::Green,
        Status::Stopped => Color::Red,
        Status::Loading => Color::Cyan,
        Status::Building => Color::Yellow,
        Status::Error => Color::Red,
        Status::Unknown => Color::DarkGray,
        Status::Other => Color::Yellow,
    }
}

fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Running => "✓",
        Status::Stopped => "○",
        Status::Loading | Status::Building => "⋯",
        Status::Error => "✗",
        Status::Unknown => "?",
        Status::Other => "~",
    }
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let running = app
        .rows
        .iter()
        .filter(|r| r.status == Status::Running)
        .count();
    let total = app.rows.len();
    let error_count = app.snapshot.parse_errors().len();

    let mut second_line = vec![
        Span::styled("Running: ", Style::default().fg(Color::Green)),
        Span::raw(format!("{}/{} ", running, total)),
        Span::styled(
            format!("| {} ", app.dashboard.root().display()),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if error_count > 0 {
        second_line.push(Span::styled(
            format!("| {} definition error(s) - press E ", error_count),
            Style::default().fg(Color::Red),
        ));
    }
    second_line.push(Span::styled(
        "| Press ? for help",
        Style::default().fg(Color::DarkGray),
    ));

    let text = vec![
        Line::from(vec![
            Span::styled("dcman ", Style::default().fg(Color::Cyan)),
            Span::styled("v0.3.0", Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(second_line),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_service_table(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let color = status_color(row.status);
            let line = row_line(row, color);

            let mut style = Style::default();
            if idx == app.selected {
                style = style.bg(Color::DarkGray).add_modifier(Modifier::BOLD);
            }

            ListItem::new(line).style(style)
        })
        .collect();

    let block = Block::default()
        .title(" Services (↑↓ navigate, Enter toggle) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    f.render_widget(List::new(items).block(block), area);
}

fn row_line(row: &Row, color: Color) -> Line<'_> {
    // A running command overrides the stored status label
    let status_label = match row.in_flight {
        Some(kind) => format!("{}...", kind),
        None => row.status.to_string(),
    };

    let mut spans = vec![
        Span::styled(
            format!(" {} ", status_icon(row.status)),
            Style::default().fg(color),
        ),
        Span::styled(
            format!("{:<24}", row.project),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("{:<24}", row.service),
            Style::default().fg(Color::White),
        ),
        Span::styled(format!("{:<12}", status_label), Style::default().fg(color)),
        Span::styled(
            format!(
                "{:<14}",
                row.container_id.as_deref().map(short_id).unwrap_or("-")
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    if let Some(ref err) = row.last_error {
        spans.push(Span::styled(
            truncated(err, 40),
            Style::default().fg(Color::Red),
        ));
    }

    Line::from(spans)
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn truncated(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() > max {
        let cut: String = first_line.chars().take(max).collect();
        format!("{}…", cut)
    } else {
        first_line.to_string()
    }
}

fn draw_activity_panel(f: &mut Frame, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = app
        .activity
        .iter()
        .rev()
        .take(visible)
        .rev()
        .map(|(ts, line)| {
            Line::from(vec![
                Span::styled(
                    format!("{} ", ts.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(line.as_str()),
            ])
        })
        .collect();

    let block = Block::default()
        .title(" Command Output ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    if let Some(ref msg) = app.status_message {
        let color = match msg.level {
            StatusLevel::Info => Color::Blue,
            StatusLevel::Success => Color::Green,
            StatusLevel::Warning => Color::Yellow,
            StatusLevel::Error => Color::Red,
        };

        let paragraph = Paragraph::new(msg.text.as_str()).style(
            Style::default()
                .fg(color)
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        );

        f.render_widget(paragraph, area);
        return;
    }

    let shortcuts = vec![
        Span::styled("[s]", Style::default().fg(Color::Cyan)),
        Span::raw("tart "),
        Span::styled("[t]", Style::default().fg(Color::Cyan)),
        Span::raw("stop "),
        Span::styled("[e]", Style::default().fg(Color::Cyan)),
        Span::raw("restart "),
        Span::styled("[b]", Style::default().fg(Color::Cyan)),
        Span::raw("uild "),
        Span::styled("[l]", Style::default().fg(Color::Cyan)),
        Span::raw("ogs "),
        Span::styled("[r]", Style::default().fg(Color::Cyan)),
        Span::raw("efresh "),
        Span::styled("[R]", Style::default().fg(Color::Cyan)),
        Span::raw("escan "),
        Span::styled("[q]", Style::default().fg(Color::Cyan)),
        Span::raw("uit"),
    ];

    let paragraph =
        Paragraph::new(Line::from(shortcuts)).style(Style::default().bg(Color::DarkGray));

    f.render_widget(paragraph, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_cuts_long_ids_to_twelve_chars() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn short_id_handles_multibyte_input() {
        // Container ids are hex in practice, but arbitrary text must not
        // panic on a char boundary.
        let id = "日本語のテキストがここにある";
        assert_eq!(short_id(id).chars().count(), 12);
    }

    #[test]
    fn truncated_keeps_first_line_and_bounds_length() {
        assert_eq!(truncated("short", 40), "short");
        assert_eq!(truncated("first\nsecond", 40), "first");
        let long = "x".repeat(50);
        assert_eq!(truncated(&long, 40).chars().count(), 41); // 40 + ellipsis
    }
}
