use crate::registry::ServiceKey;
use crate::tui::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App, area: Rect, key: &ServiceKey) {
    let visible = area.height.saturating_sub(2) as usize;
    let total = app.log_lines.len();

    // Scroll offset counts lines from the bottom; 0 follows the tail.
    let end = total.saturating_sub(app.log_scroll);
    let start = end.saturating_sub(visible);

    let lines: Vec<Line> = app
        .log_lines
        .iter()
        .skip(start)
        .take(end - start)
        .map(|line| Line::raw(line.as_str()))
        .collect();

    let position = if app.log_scroll == 0 {
        "follow".to_string()
    } else {
        format!("-{}", app.log_scroll)
    };

    let block = Block::default()
        .title(format!(" Logs: {} ({}) [Esc to close] ", key, position))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    f.render_widget(Paragraph::new(lines).block(block), area);
}
