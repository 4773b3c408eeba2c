//! TUI Application - main event loop and terminal management
//!
//! This module contains the core TUI application logic including:
//! - Terminal setup and restoration
//! - The sync session driving the ticket list
//! - Event loop for keyboard input, session updates and detail fetches

use std::io::{self, stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::{
    ExecutableCommand,
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph},
};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use super::notifications::{ToastLevel, ToastManager};
use super::views::{TicketDetailView, TicketListView};
use crate::models::{CategoryCounts, Ticket};
use crate::notify::Notifier;
use crate::session::{SessionConfig, SessionUpdate, SyncSession};
use crate::sync::connection::{ConnectionMonitor, ConnectionState};
use crate::sync::engine::SyncEngine;
use crate::Result;

/// How often keyboard input is polled
const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Log file name inside the log directory
const LOG_FILE_NAME: &str = "tui.log";

type DetailResult = (String, Result<Ticket>);

/// Side effects a key press asks the event loop to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Fetch the ticket's full history
    OpenDetail(String),
    /// Clear one ticket's badge
    Dismiss(String),
    /// Clear every badge
    DismissAll,
}

/// TUI Application state
pub struct TuiApp {
    list: TicketListView,
    detail: TicketDetailView,
    toasts: ToastManager,
    connection: ConnectionState,
    unread: usize,
    counts: CategoryCounts,
    loading: bool,
    /// The session has nothing left to deliver
    session_closed: bool,
    should_quit: bool,
}

impl Default for TuiApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TuiApp {
    pub fn new() -> Self {
        Self {
            list: TicketListView::new(),
            detail: TicketDetailView::new(),
            toasts: ToastManager::new(),
            connection: ConnectionState::Disconnected,
            unread: 0,
            counts: CategoryCounts::default(),
            loading: true,
            session_closed: false,
            should_quit: false,
        }
    }

    /// Handle keyboard events
    fn handle_key(&mut self, key: KeyCode) -> Option<Action> {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('j') | KeyCode::Down => self.list.select_next(),
            KeyCode::Char('k') | KeyCode::Up => self.list.select_previous(),
            KeyCode::Char('g') | KeyCode::Home => self.list.select_first(),
            KeyCode::Char('G') | KeyCode::End => self.list.select_last(),
            KeyCode::PageDown => self.detail.scroll_down(),
            KeyCode::PageUp => self.detail.scroll_up(),
            KeyCode::Enter => {
                let id = self.list.selected_item()?.ticket.id.clone();
                self.detail.start_loading(&id);
                return Some(Action::OpenDetail(id));
            }
            KeyCode::Char('d') => {
                let id = self.list.selected_item()?.ticket.id.clone();
                return Some(Action::Dismiss(id));
            }
            KeyCode::Char('D') => {
                self.toasts.dismiss_all();
                return Some(Action::DismissAll);
            }
            _ => {}
        }
        None
    }

    /// Turn a session update into toasts.
    fn apply_update(&mut self, update: &SessionUpdate, now: Instant) {
        match update {
            SessionUpdate::Event(outcome) => {
                if let Some(request) = outcome.notification() {
                    self.toasts.push_request(request, now);
                }
            }
            SessionUpdate::Snapshot {
                error: Some(error), ..
            } => {
                self.toasts
                    .push(ToastLevel::Error, "Could not load tickets", error, now);
            }
            SessionUpdate::Closed => {
                self.session_closed = true;
                self.toasts.push(
                    ToastLevel::Info,
                    "Live updates stopped",
                    "The event stream will not reconnect",
                    now,
                );
            }
            _ => {}
        }
    }

    /// Copy the engine's current view into the widgets.
    fn sync(&mut self, engine: &SyncEngine, monitor: &ConnectionMonitor) {
        self.list.update_items(engine.view());
        self.unread = engine.unread_count();
        self.counts = engine.category_counts();
        self.loading = engine.is_loading();
        self.connection = monitor.state().clone();
    }

    /// Render the UI
    fn render(&mut self, frame: &mut Frame) {
        let area = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Title bar
                Constraint::Min(5),    // Main content
                Constraint::Length(3), // Status bar
            ])
            .split(area);

        self.render_title_bar(frame, chunks[0]);

        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);
        self.list.render(frame, panes[0], self.loading);
        self.detail.render(frame, panes[1]);

        self.render_status_bar(frame, chunks[2]);
        self.render_toasts(frame, area);
    }

    /// Render the title bar with counts and connection status
    fn render_title_bar(&self, frame: &mut Frame, area: Rect) {
        let (indicator, color) = match &self.connection {
            ConnectionState::Connected => ("●", Color::Green),
            ConnectionState::Connecting { .. } => ("○", Color::Yellow),
            ConnectionState::Disconnected => ("✗", Color::Red),
        };

        let summary = format!(
            " Ticketwatch | {} tickets | {} unread | bug {} feature {} support {} question {}",
            self.counts.total,
            self.unread,
            self.counts.bugs,
            self.counts.feature_requests,
            self.counts.support,
            self.counts.questions
        );
        let status = format!("[{}] {}", indicator, self.connection.label());
        let padding = area
            .width
            .saturating_sub(summary.chars().count() as u16 + status.chars().count() as u16 + 3);

        let unread_style = if self.unread > 0 {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };

        let title = Paragraph::new(Line::from(vec![
            Span::styled(summary, unread_style),
            Span::raw(" ".repeat(padding as usize)),
            Span::styled(status, Style::default().fg(color)),
        ]))
        .block(Block::default().borders(Borders::ALL));

        frame.render_widget(title, area);
    }

    /// Render the status bar with keybindings
    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let status = Paragraph::new(
            " j/k:Navigate  g/G:Top/Bottom  Enter:Detail  PgUp/PgDn:Scroll  d:Dismiss  D:Dismiss All  q:Quit",
        )
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL));
        frame.render_widget(status, area);
    }

    /// Stack toasts in the top-right corner
    fn render_toasts(&self, frame: &mut Frame, area: Rect) {
        const TOAST_WIDTH: u16 = 44;
        const TOAST_HEIGHT: u16 = 3;

        let width = TOAST_WIDTH.min(area.width);
        let x = area.right().saturating_sub(width + 1);
        let mut y = area.y + 3;

        for toast in self.toasts.visible() {
            if y + TOAST_HEIGHT > area.bottom() {
                break;
            }
            let rect = Rect::new(x, y, width, TOAST_HEIGHT);
            let style = Style::default().fg(toast.level.color());
            let body = Paragraph::new(toast.message.as_str()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(style)
                    .title(format!(" {} {} ", toast.level.icon(), toast.title)),
            );
            frame.render_widget(Clear, rect);
            frame.render_widget(body, rect);
            y += TOAST_HEIGHT;
        }

        let overflow = self.toasts.overflow_count();
        if overflow > 0 && y < area.bottom() {
            let rect = Rect::new(x, y, width, 1);
            frame.render_widget(Clear, rect);
            frame.render_widget(
                Paragraph::new(format!("+{} more", overflow))
                    .style(Style::default().fg(Color::DarkGray))
                    .alignment(Alignment::Right),
                rect,
            );
        }
    }
}

/// Setup the terminal for TUI mode
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    Terminal::new(backend)
}

/// Restore the terminal to normal mode
fn restore_terminal() -> io::Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

/// Directory for the TUI log file.
fn log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ticketwatch")
}

/// Route logs to a file while the dashboard owns the terminal.
fn init_file_logging(level: &str) -> Option<WorkerGuard> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir).ok()?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, LOG_FILE_NAME));

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .try_init()
        .ok()?;
    Some(guard)
}

/// Run the live dashboard until the user quits.
///
/// # Errors
/// Returns an error if the session cannot start or the terminal fails.
pub async fn run_tui(
    config: SessionConfig,
    notifier: Box<dyn Notifier>,
    log_level: &str,
) -> Result<()> {
    let _log_guard = init_file_logging(log_level);

    let mut session = SyncSession::start(config, notifier)?;
    let mut app = TuiApp::new();
    let mut terminal = setup_terminal()?;

    let result = event_loop(&mut terminal, &mut app, &mut session).await;

    session.shutdown().await;
    restore_terminal()?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
    session: &mut SyncSession,
) -> Result<()> {
    let (detail_tx, mut detail_rx) = mpsc::unbounded_channel::<DetailResult>();

    loop {
        app.toasts.cleanup(Instant::now());
        app.sync(session.engine(), session.connection());
        terminal.draw(|f| app.render(f))?;

        tokio::select! {
            // Check for keyboard events
            _ = tokio::time::sleep(INPUT_POLL_INTERVAL) => {
                while event::poll(Duration::ZERO)? {
                    if let Event::Key(key) = event::read()? {
                        if key.kind == KeyEventKind::Press {
                            if let Some(action) = app.handle_key(key.code) {
                                perform(action, session, &detail_tx);
                            }
                        }
                    }
                }
            }
            update = session.next_update(), if !app.session_closed => {
                app.apply_update(&update, Instant::now());
            }
            Some((id, result)) = detail_rx.recv() => {
                app.detail.set_result(&id, result);
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn perform(
    action: Action,
    session: &mut SyncSession,
    detail_tx: &mpsc::UnboundedSender<DetailResult>,
) {
    match action {
        Action::OpenDetail(id) => {
            let api = session.api().clone();
            let tx = detail_tx.clone();
            tokio::spawn(async move {
                let result = api.fetch_ticket(&id).await;
                if let Err(e) = &result {
                    tracing::warn!(%id, error = %e, "detail fetch failed");
                }
                // The loop may have exited; nothing to deliver to then.
                let _ = tx.send((id, result));
            });
        }
        Action::Dismiss(id) => {
            session.engine_mut().dismiss(&id);
        }
        Action::DismissAll => {
            let cleared = session.engine_mut().dismiss_all();
            tracing::debug!(cleared, "dismissed all badges");
        }
    }
}
