use crate::core::Dashboard;
use crate::executor::CommandStream;
use crate::logs::LogStream;
use crate::registry::{CommandKind, ServiceKey, Snapshot, Status};
use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::watch;

const ACTIVITY_BUFFER_SIZE: usize = 200;
const LOG_BUFFER_SIZE: usize = 1000;
const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub level: StatusLevel,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, Copy)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Dashboard,
    Logs(ServiceKey),
    Errors,
}

/// One row of the dashboard table: a service with its project context.
#[derive(Debug, Clone)]
pub struct Row {
    pub project: String,
    pub key: ServiceKey,
    pub service: String,
    pub status: Status,
    pub in_flight: Option<CommandKind>,
    pub last_error: Option<String>,
    pub container_id: Option<String>,
}

pub struct App {
    pub dashboard: Dashboard,

    /// Latest registry snapshot and its flattened table rows
    pub snapshot: Snapshot,
    pub rows: Vec<Row>,
    snapshot_rx: watch::Receiver<Snapshot>,

    /// Current view
    pub view: View,

    /// Selected row index
    pub selected: usize,

    /// Show help overlay
    pub show_help: bool,

    /// Transient status bar message
    pub status_message: Option<StatusMessage>,

    /// Output of in-flight lifecycle commands
    command_streams: Vec<CommandStream>,
    pub activity: VecDeque<(DateTime<Utc>, String)>,

    /// Active log tail, if any
    log_stream: Option<LogStream>,
    pub log_lines: VecDeque<String>,

    /// Scroll offset from the bottom of the log view (0 = follow)
    pub log_scroll: usize,

    /// Terminal size
    pub terminal_width: u16,
    pub terminal_height: u16,
}

impl App {
    pub fn new(dashboard: Dashboard) -> Self {
        let snapshot_rx = dashboard.subscribe();
        let snapshot = dashboard.snapshot();
        let rows = flatten(&snapshot);

        Self {
            dashboard,
            snapshot,
            rows,
            snapshot_rx,
            view: View::Dashboard,
            selected: 0,
            show_help: false,
            status_message: None,
            command_streams: Vec::new(),
            activity: VecDeque::new(),
            log_stream: None,
            log_lines: VecDeque::new(),
            log_scroll: 0,
            terminal_width: 80,
            terminal_height: 24,
        }
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.rows.get(self.selected)
    }

    pub fn on_resize(&mut self, width: u16, height: u16) {
        self.terminal_width = width;
        self.terminal_height = height;
    }

    pub fn on_tick(&mut self) {
        self.refresh_snapshot();
        self.drain_command_streams();
        self.drain_log_stream();

        if let Some(ref msg) = self.status_message {
            if Instant::now() >= msg.expires_at {
                self.status_message = None;
            }
        }
    }

    fn refresh_snapshot(&mut self) {
        if self.snapshot_rx.has_changed().unwrap_or(false) {
            self.snapshot = self.snapshot_rx.borrow_and_update().clone();
            self.rows = flatten(&self.snapshot);
            if self.selected >= self.rows.len() {
                self.selected = self.rows.len().saturating_sub(1);
            }
        }
    }

    fn drain_command_streams(&mut self) {
        let mut lines = Vec::new();
        let mut finished = Vec::new();

        self.command_streams.retain_mut(|stream| {
            let mut out = Vec::new();
            let alive = stream.drain_into(&mut out);
            for line in out {
                lines.push(format!("[{}] {}", stream.key, line));
            }
            if !alive {
                finished.push((stream.key.clone(), stream.kind));
            }
            alive
        });

        for line in lines {
            self.push_activity(line);
        }
        for (key, kind) in finished {
            self.set_message(format!("{} on {} finished", kind, key), StatusLevel::Info);
        }
    }

    fn drain_log_stream(&mut self) {
        let Some(ref mut stream) = self.log_stream else {
            return;
        };

        let mut out = Vec::new();
        let alive = stream.drain_into(&mut out);
        for line in out {
            if self.log_lines.len() == LOG_BUFFER_SIZE {
                self.log_lines.pop_front();
            }
            self.log_lines.push_back(line);
        }

        if !alive {
            let key = stream.key.clone();
            self.log_stream = None;
            self.set_message(format!("Log stream for {} ended", key), StatusLevel::Info);
        }
    }

    fn push_activity(&mut self, line: String) {
        if self.activity.len() == ACTIVITY_BUFFER_SIZE {
            self.activity.pop_front();
        }
        self.activity.push_back((Utc::now(), line));
    }

    pub fn set_message(&mut self, text: String, level: StatusLevel) {
        self.status_message = Some(StatusMessage {
            text,
            level,
            expires_at: Instant::now() + STATUS_MESSAGE_TTL,
        });
    }

    /// Handle a key press. Returns `false` when the user quits.
    pub async fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return false;
        }

        if self.show_help {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q')) {
                self.show_help = false;
            }
            return true;
        }

        match key.code {
            KeyCode::Char('q') => return false,
            KeyCode::Char('?') => {
                self.show_help = true;
                return true;
            }
            _ => {}
        }

        match self.view.clone() {
            View::Dashboard => self.handle_dashboard_key(key).await,
            View::Logs(_) => self.handle_logs_key(key),
            View::Errors => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('E')) {
                    self.view = View::Dashboard;
                }
            }
        }

        true
    }

    async fn handle_dashboard_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                if self.selected > 0 {
                    self.selected -= 1;
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.rows.len() {
                    self.selected += 1;
                }
            }
            KeyCode::Char('r') => {
                self.dashboard.request_refresh(None);
                self.set_message("Refreshing statuses...".into(), StatusLevel::Info);
            }
            KeyCode::Char('R') => {
                self.dashboard.rediscover();
                self.set_message("Re-scanning projects...".into(), StatusLevel::Info);
            }
            KeyCode::Char('s') => self.issue_command(CommandKind::Start).await,
            KeyCode::Char('t') => self.issue_command(CommandKind::Stop).await,
            KeyCode::Char('e') => self.issue_command(CommandKind::Restart).await,
            KeyCode::Char('b') => self.issue_command(CommandKind::Build).await,
            KeyCode::Enter | KeyCode::Char(' ') => self.toggle_selected().await,
            KeyCode::Char('l') => self.open_log_stream(),
            KeyCode::Char('E') => self.view = View::Errors,
            KeyCode::Esc => self.status_message = None,
            _ => {}
        }
    }

    fn handle_logs_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('l') => {
                self.close_log_stream();
                self.view = View::Dashboard;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.log_scroll = (self.log_scroll + 1).min(self.log_lines.len());
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.log_scroll = self.log_scroll.saturating_sub(1);
            }
            KeyCode::PageUp => {
                let page = self.terminal_height.saturating_sub(4) as usize;
                self.log_scroll = (self.log_scroll + page).min(self.log_lines.len());
            }
            KeyCode::PageDown => {
                let page = self.terminal_height.saturating_sub(4) as usize;
                self.log_scroll = self.log_scroll.saturating_sub(page);
            }
            KeyCode::End | KeyCode::Char('G') => self.log_scroll = 0,
            _ => {}
        }
    }

    /// Start the selected service if it is down, stop it if it is up.
    /// Refused while a command is already running on it.
    async fn toggle_selected(&mut self) {
        let Some(row) = self.selected_row() else {
            return;
        };

        if row.in_flight.is_some() {
            self.set_message(
                format!("{} already has a command in progress", row.key),
                StatusLevel::Warning,
            );
            return;
        }

        let kind = match row.status {
            Status::Running => CommandKind::Stop,
            _ => CommandKind::Start,
        };
        self.issue_command(kind).await;
    }

    async fn issue_command(&mut self, kind: CommandKind) {
        let Some(row) = self.selected_row() else {
            return;
        };
        let key = row.key.clone();

        match self.dashboard.request_command(key.clone(), kind).await {
            Ok(stream) => {
                self.command_streams.push(stream);
                self.set_message(format!("{} {}...", kind, key), StatusLevel::Info);
            }
            Err(e) => {
                self.set_message(e.to_string(), StatusLevel::Error);
            }
        }
    }

    fn open_log_stream(&mut self) {
        let Some(row) = self.selected_row() else {
            return;
        };
        let key = row.key.clone();

        // Replacing an existing tail cancels it
        self.close_log_stream();

        match self.dashboard.request_log_stream(key.clone()) {
            Ok(stream) => {
                self.log_lines.clear();
                self.log_scroll = 0;
                self.log_stream = Some(stream);
                self.view = View::Logs(key);
            }
            Err(e) => {
                self.set_message(e.to_string(), StatusLevel::Error);
            }
        }
    }

    /// Cancel the active log tail, if any. The driver task terminates the
    /// external process in the background.
    pub fn close_log_stream(&mut self) {
        if let Some(stream) = self.log_stream.take() {
            stream.cancel();
        }
    }
}

fn flatten(snapshot: &Snapshot) -> Vec<Row> {
    snapshot
        .rows()
        .map(|(project, service)| Row {
            project: project.name.clone(),
            key: service.key.clone(),
            service: service.name.clone(),
            status: service.status,
            in_flight: service.in_flight,
            last_error: service.last_error.clone(),
            container_id: service.container_id.clone(),
        })
        .collect()
}
