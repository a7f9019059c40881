use crate::tui::app::{App, View};
use ratatui::Frame;

pub mod dashboard;
pub mod errors;
pub mod logs;

pub fn draw(f: &mut Frame, app: &App) {
    if app.show_help {
        draw_help(f, app);
        return;
    }

    match &app.view {
        View::Dashboard => dashboard::draw(f, app, f.size()),
        View::Logs(key) => logs::draw(f, app, f.size(), key),
        View::Errors => errors::draw(f, app, f.size()),
    }
}

fn draw_help(f: &mut Frame, _app: &App) {
    use ratatui::{
        layout::{Alignment, Constraint, Direction, Layout},
        style::{Color, Modifier, Style},
        text::{Line, Span},
        widgets::{Block, Borders, Paragraph, Wrap},
    };

    let area = f.size();

    let text = vec![
        Line::from(vec![Span::styled(
            "dcman - Keyboard Shortcuts",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )]),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Global",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )]),
        Line::from("  q       Quit"),
        Line::from("  ?       Toggle this help"),
        Line::from("  Esc     Back to dashboard / Close"),
        Line::from("  Ctrl+C  Force quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Dashboard",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )]),
        Line::from("  ↑/k     Select previous service"),
        Line::from("  ↓/j     Select next service"),
        Line::from("  Enter   Toggle service (start/stop)"),
        Line::from("  s       Start selected service"),
        Line::from("  t       Stop selected service"),
        Line::from("  e       Restart selected service"),
        Line::from("  b       Build selected service"),
        Line::from("  l       Tail logs for selected service"),
        Line::from("  r       Refresh all statuses"),
        Line::from("  R       Re-scan the directory tree"),
        Line::from("  E       Show definition errors"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Logs View",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )]),
        Line::from("  ↑/↓     Scroll logs"),
        Line::from("  PgUp/Dn Page scroll"),
        Line::from("  End/G   Jump to end (follow)"),
        Line::from("  Esc/l   Close and stop the tail"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press ? or Esc to close",
            Style::default().fg(Color::DarkGray),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue));

    let paragraph = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Left);

    // Center the help box
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(10),
            Constraint::Percentage(80),
            Constraint::Percentage(10),
        ])
        .split(area);

    let h_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(10),
            Constraint::Percentage(80),
            Constraint::Percentage(10),
        ])
        .split(chunks[1]);

    f.render_widget(paragraph, h_chunks[1]);
}
