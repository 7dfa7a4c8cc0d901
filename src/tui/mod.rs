// src/tui/mod.rs
use crate::config::{AppConfig, LoggingConfig};
use crate::core::buyback::BuybackMonitor;
use crate::core::sink::UiFeed;
use crate::core::spike::SpikeScanner;
use crate::core::worker::WorkerState;
use crate::storage::export::{alerts_to_csv, append_alert_csv};
use crate::storage::positions::{parse_positions_text, save_positions, PositionDefaults};
use crate::storage::presets::TickerUniverse;
use crate::types::{Alert, AlertKind, MonitorKind, MonitorSnapshot, TrackedContract, UiEvent};
use chrono::{NaiveDate, Utc};
use crossterm::{
    event::{
        self, DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
        Event, KeyCode, KeyEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Terminal,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{io, time::Duration};
use tracing::{error, info, warn};

pub const ALERT_HISTORY: usize = 40;
pub const LOG_HISTORY: usize = 200;

const HELP: &str = "Keys: [s] spike  [b] buyback  [a/r/R] add/remove/clear tickers  \
[p] paste positions  [↑↓ x/X] remove/clear positions  [w] save  [e] export  [q] quit";

/// Handles the event loop needs to start, stop and edit the monitors.
pub struct Monitors {
    pub spike: Arc<SpikeScanner>,
    pub buyback: Arc<BuybackMonitor>,
    pub universe: TickerUniverse,
    pub config: AppConfig,
}

fn symbols(input: &str) -> impl Iterator<Item = &str> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

impl Monitors {
    fn add_tickers(&self, input: &str) -> String {
        let added = symbols(input).filter(|s| self.universe.add(s)).count();
        format!("Added {} tickers ({} total)", added, self.universe.len())
    }

    fn remove_tickers(&self, input: &str) -> String {
        let removed = symbols(input).filter(|s| self.universe.remove(s)).count();
        format!("Removed {} tickers ({} total)", removed, self.universe.len())
    }

    fn clear_tickers(&self) -> String {
        self.universe.clear();
        "Ticker list cleared".to_string()
    }

    /// Rows may be split by newlines or `;`. Returns the lines to log.
    fn import_positions(&self, text: &str, today: NaiveDate) -> Vec<String> {
        let defaults = PositionDefaults::from(&self.config.buyback);
        let parsed = parse_positions_text(&text.replace(';', "\n"), &defaults, today);

        let mut lines: Vec<String> = parsed
            .rejected
            .iter()
            .map(|e| format!("Position skipped: {}", e))
            .collect();
        lines.push(format!("Added {} positions", parsed.positions.len()));
        self.buyback.add_positions(parsed.positions);
        lines
    }

    fn remove_position_at(&self, index: usize) -> Option<String> {
        let position = self.buyback.positions().into_iter().nth(index)?;
        self.buyback.remove_position(&position.key);
        Some(format!("Removed position {}", position.key))
    }

    fn clear_positions(&self) -> String {
        self.buyback.clear_positions();
        "All positions cleared".to_string()
    }

    fn positions_path(&self) -> PathBuf {
        self.config
            .buyback
            .positions_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("positions.csv"))
    }

    fn save_positions(&self) -> String {
        let path = self.positions_path();
        let positions = self.buyback.positions();
        match save_positions(&path, &positions) {
            Ok(()) => format!("Saved {} positions to {}", positions.len(), path.display()),
            Err(e) => {
                error!(error = %e, "Failed to save positions");
                format!("Save failed: {:#}", e)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    AddTickers,
    RemoveTickers,
    PastePositions,
}

impl Prompt {
    fn title(self) -> &'static str {
        match self {
            Self::AddTickers => "Add tickers (comma or space separated) [Enter] ok [Esc] cancel",
            Self::RemoveTickers => "Remove tickers [Enter] ok [Esc] cancel",
            Self::PastePositions => {
                "Positions: ticker,type,strike,expiration,credit,qty (';' between rows) [Enter] ok [Esc] cancel"
            }
        }
    }
}

pub struct App {
    pub recent_alerts: VecDeque<Alert>,
    /// Everything received this session, for export.
    pub session_alerts: Vec<Alert>,
    pub logs: VecDeque<String>,
    pub spike_status: Option<MonitorSnapshot>,
    pub buyback_status: Option<MonitorSnapshot>,
    pub prompt: Option<Prompt>,
    pub input: String,
    /// Index into the sorted position list.
    pub selected: usize,
    pub tracked_by_ticker: BTreeMap<String, usize>,
    refresh_tracked: bool,
    alerts_csv: Option<PathBuf>,
    export_dir: PathBuf,
}

impl App {
    pub fn new(logging: &LoggingConfig) -> Self {
        Self {
            recent_alerts: VecDeque::with_capacity(ALERT_HISTORY),
            session_alerts: Vec::new(),
            logs: VecDeque::with_capacity(LOG_HISTORY),
            spike_status: None,
            buyback_status: None,
            prompt: None,
            input: String::new(),
            selected: 0,
            tracked_by_ticker: BTreeMap::new(),
            refresh_tracked: false,
            alerts_csv: logging.alerts_csv.clone(),
            export_dir: logging.directory.clone(),
        }
    }

    pub fn push_log(&mut self, line: String) {
        self.logs.push_back(format!("{} {}", Utc::now().format("%H:%M:%S"), line));
        if self.logs.len() > LOG_HISTORY {
            self.logs.pop_front();
        }
    }

    pub fn on_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Alert(alert) => {
                if let Some(path) = &self.alerts_csv {
                    if let Err(e) = append_alert_csv(path, &alert) {
                        error!(error = %e, "Failed to append alert CSV");
                    }
                }
                self.session_alerts.push(alert.clone());
                self.recent_alerts.push_back(alert);
                if self.recent_alerts.len() > ALERT_HISTORY {
                    self.recent_alerts.pop_front();
                }
            }
            UiEvent::Snapshot(snapshot) => match snapshot.monitor {
                MonitorKind::Spike => {
                    self.spike_status = Some(snapshot);
                    self.refresh_tracked = true;
                }
                MonitorKind::Buyback => self.buyback_status = Some(snapshot),
            },
            UiEvent::Log(msg) => self.push_log(msg),
        }
    }

    /// Writes every alert of this session to `path`.
    pub fn export(&self, path: &Path) -> anyhow::Result<usize> {
        std::fs::write(path, alerts_to_csv(&self.session_alerts)?)?;
        Ok(self.session_alerts.len())
    }

    /// Exports into the log directory under a timestamped name.
    pub fn export_session(&self) -> anyhow::Result<(PathBuf, usize)> {
        std::fs::create_dir_all(&self.export_dir)?;
        let path = self
            .export_dir
            .join(format!("alerts_{}.csv", Utc::now().format("%Y%m%d_%H%M%S")));
        let count = self.export(&path)?;
        Ok((path, count))
    }

    /// Returns false when the user asked to quit.
    pub fn handle_key(&mut self, code: KeyCode, monitors: &Monitors) -> bool {
        if let Some(prompt) = self.prompt {
            self.handle_prompt_key(prompt, code, monitors);
            return true;
        }

        match code {
            KeyCode::Char('q') => return false,
            KeyCode::Char('s') => toggle_spike(monitors),
            KeyCode::Char('b') => toggle_buyback(monitors),
            KeyCode::Char('a') => self.open_prompt(Prompt::AddTickers),
            KeyCode::Char('r') => self.open_prompt(Prompt::RemoveTickers),
            KeyCode::Char('R') => {
                let line = monitors.clear_tickers();
                self.push_log(line);
            }
            KeyCode::Char('p') => self.open_prompt(Prompt::PastePositions),
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                let last = monitors.buyback.positions().len().saturating_sub(1);
                self.selected = (self.selected + 1).min(last);
            }
            KeyCode::Char('x') => {
                if let Some(line) = monitors.remove_position_at(self.selected) {
                    self.push_log(line);
                    self.selected = self.selected.saturating_sub(1);
                }
            }
            KeyCode::Char('X') => {
                let line = monitors.clear_positions();
                self.push_log(line);
                self.selected = 0;
            }
            KeyCode::Char('w') => {
                let line = monitors.save_positions();
                self.push_log(line);
            }
            KeyCode::Char('e') => {
                let line = match self.export_session() {
                    Ok((path, n)) => format!("Exported {} alerts to {}", n, path.display()),
                    Err(e) => format!("Export failed: {}", e),
                };
                self.push_log(line);
            }
            _ => {}
        }
        true
    }

    /// Bracketed paste while a prompt is open lands in the input line.
    pub fn handle_paste(&mut self, text: &str) {
        if self.prompt.is_some() {
            self.input.push_str(text);
        }
    }

    fn open_prompt(&mut self, prompt: Prompt) {
        self.prompt = Some(prompt);
        self.input.clear();
    }

    fn handle_prompt_key(&mut self, prompt: Prompt, code: KeyCode, monitors: &Monitors) {
        match code {
            KeyCode::Esc => self.prompt = None,
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Enter => {
                self.prompt = None;
                let input = std::mem::take(&mut self.input);
                let lines = match prompt {
                    Prompt::AddTickers => vec![monitors.add_tickers(&input)],
                    Prompt::RemoveTickers => vec![monitors.remove_tickers(&input)],
                    Prompt::PastePositions => {
                        monitors.import_positions(&input, Utc::now().date_naive())
                    }
                };
                for line in lines {
                    info!("{}", line);
                    self.push_log(line);
                }
            }
            _ => {}
        }
    }

    fn refresh_tracked(&mut self, spike: &SpikeScanner) {
        if std::mem::take(&mut self.refresh_tracked) {
            self.tracked_by_ticker = count_by_ticker(&spike.snapshot());
        }
    }
}

fn count_by_ticker(records: &[TrackedContract]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.key.ticker.clone()).or_insert(0) += 1;
    }
    counts
}

fn toggle_spike(monitors: &Monitors) {
    let scanner = monitors.spike.clone();
    let config = monitors.config.spike.clone();
    let universe = monitors.universe.clone();
    tokio::spawn(async move {
        let result = match scanner.state() {
            WorkerState::Running => scanner.stop().await,
            _ => scanner.start(config, universe),
        };
        if let Err(e) = result {
            warn!(error = %e, "Spike toggle rejected");
        }
    });
}

fn toggle_buyback(monitors: &Monitors) {
    let monitor = monitors.buyback.clone();
    let config = monitors.config.buyback.clone();
    tokio::spawn(async move {
        let result = match monitor.state() {
            WorkerState::Running => monitor.stop().await,
            _ => monitor.start(config),
        };
        if let Err(e) = result {
            warn!(error = %e, "Buyback toggle rejected");
        }
    });
}

pub async fn run(mut rx: UiFeed, monitors: Monitors) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(&monitors.config.logging);
    app.push_log(HELP.to_string());

    loop {
        terminal.draw(|f| ui(f, &app, &monitors))?;

        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if !app.handle_key(key.code, &monitors) {
                        break;
                    }
                }
                Event::Paste(text) => app.handle_paste(&text),
                _ => {}
            }
        }

        while let Some(event) = rx.try_recv() {
            app.on_event(event);
        }
        app.refresh_tracked(&monitors.spike);
    }

    app.push_log("Stopping monitors...".to_string());
    terminal.draw(|f| ui(f, &app, &monitors))?;
    // NotRunning is expected for a monitor that was never started
    let _ = monitors.spike.stop().await;
    let _ = monitors.buyback.stop().await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    Ok(())
}

fn state_span(label: &str, state: WorkerState) -> Span<'static> {
    let (text, color) = match state {
        WorkerState::Running => ("RUNNING", Color::Green),
        WorkerState::Stopping => ("STOPPING", Color::Yellow),
        WorkerState::Idle => ("IDLE", Color::DarkGray),
    };
    Span::styled(
        format!("{}: {}", label, text),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )
}

fn status_text(status: &Option<MonitorSnapshot>) -> String {
    match status {
        Some(s) => format!(
            " (cycle {}, {} tracked, {} alerts, {} skipped)",
            s.cycle, s.tracked, s.alerts, s.skipped
        ),
        None => String::new(),
    }
}

fn alert_color(kind: AlertKind) -> Color {
    match kind {
        AlertKind::Spike => Color::Magenta,
        AlertKind::Capture => Color::Green,
        AlertKind::Floor => Color::Cyan,
        AlertKind::FastDrop => Color::Yellow,
        AlertKind::Spread => Color::DarkGray,
    }
}

fn ui(f: &mut ratatui::Frame, app: &App, monitors: &Monitors) {
    let mut constraints = vec![
        Constraint::Length(4),
        Constraint::Min(10),
        Constraint::Length(10),
    ];
    if app.prompt.is_some() {
        constraints.push(Constraint::Length(3));
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(constraints)
        .split(f.size());

    let positions = monitors.buyback.positions();
    let header = Paragraph::new(vec![
        Line::from(vec![
            state_span("Spike", monitors.spike.state()),
            Span::raw(status_text(&app.spike_status)),
            Span::raw(format!(" | tickers: {}", monitors.universe.len())),
        ]),
        Line::from(vec![
            state_span("Buyback", monitors.buyback.state()),
            Span::raw(status_text(&app.buyback_status)),
            Span::raw(format!(" | positions: {}", positions.len())),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Option Sentinel"));
    f.render_widget(header, chunks[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(30),
            Constraint::Percentage(15),
        ])
        .split(chunks[1]);

    let alerts: Vec<ListItem> = app
        .recent_alerts
        .iter()
        .rev()
        .map(|a| {
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} ", a.timestamp.format("%H:%M:%S"))),
                Span::styled(a.message.as_str(), Style::default().fg(alert_color(a.kind))),
            ]))
        })
        .collect();

    let alerts_list = List::new(alerts).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Alerts ({} this session)", app.session_alerts.len())),
    );
    f.render_widget(alerts_list, middle[0]);

    let position_items: Vec<ListItem> = positions
        .iter()
        .map(|p| {
            let mid = p
                .last_known_mid
                .map(|m| format!("{:.2}", m))
                .unwrap_or_else(|| "-".to_string());
            ListItem::new(format!(
                "{} x{} cr {:.2} mid {}",
                p.key, p.quantity, p.credit_received, mid
            ))
        })
        .collect();
    let mut position_state = ListState::default();
    if !positions.is_empty() {
        position_state.select(Some(app.selected.min(positions.len() - 1)));
    }
    let positions_list = List::new(position_items)
        .block(Block::default().borders(Borders::ALL).title("Positions"))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(positions_list, middle[1], &mut position_state);

    let tickers: Vec<ListItem> = monitors
        .universe
        .snapshot()
        .into_iter()
        .map(|t| match app.tracked_by_ticker.get(&t) {
            Some(n) => ListItem::new(format!("{} ({})", t, n)),
            None => ListItem::new(t),
        })
        .collect();
    let tickers_list =
        List::new(tickers).block(Block::default().borders(Borders::ALL).title("Tickers"));
    f.render_widget(tickers_list, middle[2]);

    let logs: Vec<ListItem> = app
        .logs
        .iter()
        .rev()
        .map(|s| ListItem::new(Line::from(Span::raw(s.as_str()))))
        .collect();

    let logs_list = List::new(logs).block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(logs_list, chunks[2]);

    if let Some(prompt) = app.prompt {
        let input = Paragraph::new(app.input.replace('\n', "; "))
            .block(Block::default().borders(Borders::ALL).title(prompt.title()));
        f.render_widget(input, chunks[3]);
    }
}
