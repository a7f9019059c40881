use crate::tui::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let mut lines = Vec::new();

    for project in &app.snapshot.projects {
        if project.parse_errors.is_empty() && project.poll_error.is_none() {
            continue;
        }

        lines.push(Line::from(Span::styled(
            project.name.clone(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )));
        for err in &project.parse_errors {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  {}: ", err.path.display()),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(err.message.clone(), Style::default().fg(Color::Red)),
            ]));
        }
        if let Some(ref err) = project.poll_error {
            lines.push(Line::from(vec![
                Span::styled("  status poll: ", Style::default().fg(Color::DarkGray)),
                Span::styled(err.clone(), Style::default().fg(Color::Red)),
            ]));
        }
        lines.push(Line::from(""));
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No definition or polling errors.",
            Style::default().fg(Color::Green),
        )));
    }

    let block = Block::default()
        .title(" Errors [Esc to close] ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    f.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        area,
    );
}
