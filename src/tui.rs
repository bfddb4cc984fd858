use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};

use crate::app::{App, ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::domain::{CatalogItem, DownloadTarget};
use crate::error::KitapError;
use crate::grouping::CategoryGroup;
use crate::http::HttpClient;
use crate::images::CoverSource;
use crate::launcher::{ClipboardSink, Launcher};
use crate::lifecycle::{self, AcquireOutcome, DownloadState};

type CrosstermTerminal = Terminal<CrosstermBackend<io::Stdout>>;

const EVENTS_MAX: usize = 6;
const LOGS_MAX: usize = 200;
const PREVIEW_COLS: u32 = 20;
const PREVIEW_ROWS: u32 = 10;
const HINTS: &[&str] = &[
    "Tip: left/right switch category, up/down pick an item",
    "Tip: Enter downloads, o launches, b deletes and returns",
    "Tip: s syncs the catalog from the remote copy",
    "Tip: F4 toggles the log view",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Fetch,
    Open,
    Store,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Fetch => "Fetch",
            Phase::Open => "Open",
            Phase::Store => "Store",
        }
    }

    fn index(self) -> usize {
        match self {
            Phase::Resolve => 0,
            Phase::Fetch => 1,
            Phase::Open => 2,
            Phase::Store => 3,
        }
    }
}

#[derive(Debug, Clone)]
struct CoverPreview {
    lines: Vec<Line<'static>>,
    source: CoverSource,
    width: u32,
    height: u32,
}

struct Prompt {
    question: String,
    reply: mpsc::Sender<bool>,
}

struct JobReport {
    message: String,
    reload: bool,
}

impl JobReport {
    fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            reload: false,
        }
    }
}

struct ViewState {
    status: String,
    phase: Phase,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    started: Instant,
    busy: Option<&'static str>,
    finished: bool,
    catalog_path: String,
    warning: Option<String>,
    total_items: usize,
    groups: Vec<CategoryGroup>,
    tab: usize,
    selected: usize,
    previews: HashMap<String, CoverPreview>,
    pending_covers: HashSet<String>,
    hold_phase: lifecycle::Phase,
    held: Option<DownloadState>,
    prompt: Option<Prompt>,
    show_logs: bool,
    hint_index: usize,
    last_hint_update: Instant,
}

impl ViewState {
    fn current_group(&self) -> Option<&CategoryGroup> {
        self.groups.get(self.tab)
    }

    fn current_item(&self) -> Option<&CatalogItem> {
        self.current_group()
            .and_then(|group| group.items.get(self.selected))
    }

    fn move_tab(&mut self, delta: isize) {
        if self.groups.is_empty() {
            return;
        }
        let len = self.groups.len() as isize;
        self.tab = (self.tab as isize + delta).rem_euclid(len) as usize;
        self.selected = 0;
    }

    fn move_selection(&mut self, delta: isize) {
        let Some(len) = self.current_group().map(|group| group.items.len()) else {
            return;
        };
        if len == 0 {
            return;
        }
        self.selected = (self.selected as isize + delta).clamp(0, len as isize - 1) as usize;
    }

    fn record(&mut self, message: String) {
        self.status = message.clone();
        push_event(&mut self.events, message.clone());
        push_log(&mut self.logs, format!("[{}] {message}", timestamp()));
    }
}

pub struct Tui {
    kind: ProgressSinkKind,
    state: Arc<Mutex<ViewState>>,
    log_scroll: u16,
}

struct TuiProgress {
    state: Arc<Mutex<ViewState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        if let Ok(mut state) = self.state.lock() {
            let message = event.message.trim().to_string();
            if let Some((phase, payload)) = parse_phase(&message) {
                state.phase = phase;
                state.status = payload.to_string();
            } else {
                state.status = message.clone();
            }
            let line = match event.elapsed {
                Some(elapsed) => format!("{message} ({} ms)", elapsed.as_millis()),
                None => message,
            };
            push_event(&mut state.events, line.clone());
            push_log(&mut state.logs, format!("[{}] {line}", timestamp()));
        }
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(ViewState {
                status: "ready".to_string(),
                phase: Phase::Resolve,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                started: Instant::now(),
                busy: None,
                finished: false,
                catalog_path: String::new(),
                warning: None,
                total_items: 0,
                groups: Vec::new(),
                tab: 0,
                selected: 0,
                previews: HashMap::new(),
                pending_covers: HashSet::new(),
                hold_phase: lifecycle::Phase::Idle,
                held: None,
                prompt: None,
                show_logs: false,
                hint_index: 0,
                last_hint_update: Instant::now(),
            })),
            log_scroll: 0,
        }
    }

    /// Runs `f` on a worker thread while drawing its progress.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, KitapError> + Send + 'static,
        R: Send + 'static,
    {
        if let Ok(mut state) = self.lock() {
            state.busy = Some(kind_label(self.kind));
        }
        let mut terminal = enter_terminal()?;

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        loop {
            self.rotate_hint();
            if let Ok(state) = self.lock() {
                terminal
                    .draw(|frame| draw_progress(frame, self.kind, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                if let Ok(mut state) = self.lock() {
                    state.busy = None;
                    state.finished = true;
                }
                leave_terminal()?;
                handle.join().ok();
                return result.map_err(miette::Report::new);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press
                        && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                    {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        leave_terminal()?;
        Err(miette::Report::msg("aborted"))
    }

    pub fn confirm(&mut self, question: &str) -> miette::Result<bool> {
        let mut terminal = enter_terminal()?;

        let confirmed = loop {
            terminal
                .draw(|frame| {
                    let area = frame.area();
                    draw_confirm(frame, question, area);
                })
                .into_diagnostic()?;

            if event::poll(Duration::from_millis(100)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if let Some(answer) = confirm_answer(key) {
                        break answer;
                    }
                }
            }
        };

        leave_terminal()?;
        Ok(confirmed)
    }

    /// Interactive catalog browser. Returns when the user quits.
    pub fn browse<H, L, C>(&mut self, app: Arc<App<H, L, C>>) -> miette::Result<()>
    where
        H: HttpClient + Clone + 'static,
        L: Launcher + 'static,
        C: ClipboardSink + 'static,
    {
        self.reload(&app);
        let mut terminal = enter_terminal()?;

        let mut tick = 0usize;
        loop {
            self.rotate_hint();
            self.request_cover(&app);
            if let Ok(state) = self.lock() {
                let log_scroll = self.log_scroll;
                terminal
                    .draw(|frame| draw_browser(frame, &state, tick, log_scroll))
                    .into_diagnostic()?;
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_browse_key(key, &app) {
                        break;
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }

        leave_terminal()
    }

    fn handle_browse_key<H, L, C>(&mut self, key: KeyEvent, app: &Arc<App<H, L, C>>) -> bool
    where
        H: HttpClient + Clone + 'static,
        L: Launcher + 'static,
        C: ClipboardSink + 'static,
    {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        let shared = self.state.clone();
        let Ok(mut state) = shared.lock() else {
            return true;
        };

        if state.prompt.is_some() {
            if let Some(answer) = confirm_answer(key) {
                if let Some(prompt) = state.prompt.take() {
                    let _ = prompt.reply.send(answer);
                }
            }
            return false;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::F(4) => state.show_logs = !state.show_logs,
            KeyCode::PageUp => {
                self.log_scroll = self.log_scroll.saturating_add(5);
            }
            KeyCode::PageDown => {
                self.log_scroll = self.log_scroll.saturating_sub(5);
            }
            KeyCode::Left => state.move_tab(-1),
            KeyCode::Right | KeyCode::Tab => state.move_tab(1),
            KeyCode::Up => state.move_selection(-1),
            KeyCode::Down => state.move_selection(1),
            code => {
                if let Some(label) = state.busy {
                    state.status = format!("busy: {label}");
                    return false;
                }
                let selected = state.current_item().cloned();
                drop(state);
                self.dispatch(code, selected, app);
            }
        }
        false
    }

    fn dispatch<H, L, C>(
        &mut self,
        code: KeyCode,
        selected: Option<CatalogItem>,
        app: &Arc<App<H, L, C>>,
    ) where
        H: HttpClient + Clone + 'static,
        L: Launcher + 'static,
        C: ClipboardSink + 'static,
    {
        match code {
            KeyCode::Enter | KeyCode::Char('d') => {
                let Some(item) = selected else {
                    self.note("no item selected");
                    return;
                };
                self.spawn_job(app, "download", move |app, sink| {
                    Ok(JobReport::message(describe_acquire(
                        &app.acquire(&item, sink)?,
                    )))
                });
            }
            KeyCode::Char('o') => self.spawn_job(app, "launch", |app, sink| {
                sink.event(ProgressEvent::message("phase=Open; launching download"));
                let path = app.launch()?;
                Ok(JobReport::message(format!("launched {path}")))
            }),
            KeyCode::Char('f') => self.spawn_job(app, "open folder", |app, _sink| {
                app.open_folder()?;
                Ok(JobReport::message(format!(
                    "opened {}",
                    app.store().download_dir()
                )))
            }),
            KeyCode::Char('b') | KeyCode::Backspace => {
                self.spawn_job(app, "return", |app, _sink| {
                    let outcome = app.return_to_catalog()?;
                    Ok(JobReport::message(match (outcome.path, outcome.removed) {
                        (Some(path), true) => format!("deleted {path}"),
                        (Some(path), false) => format!("{path} was already gone"),
                        (None, _) => "nothing to delete".to_string(),
                    }))
                })
            }
            KeyCode::Char('s') => self.spawn_job(app, "sync", |app, sink| {
                let prompt_state = sink.state.clone();
                let result = app.sync_catalog(sink, move |conflict| {
                    let remote = conflict
                        .remote_items
                        .map(|count| format!("{count} items"))
                        .unwrap_or_else(|| "unparseable".to_string());
                    ask(
                        &prompt_state,
                        format!(
                            "Remote catalog differs (local {} bytes, remote {} bytes, {remote}). Overwrite local copy?",
                            conflict.local_bytes, conflict.remote_bytes
                        ),
                    )
                })?;
                Ok(JobReport {
                    message: result.outcome.to_string(),
                    reload: true,
                })
            }),
            KeyCode::Char('r') => {
                self.reload(app);
                self.note("catalog reloaded");
            }
            _ => {}
        }
    }

    fn spawn_job<H, L, C, F>(&mut self, app: &Arc<App<H, L, C>>, label: &'static str, job: F)
    where
        H: HttpClient + Clone + 'static,
        L: Launcher + 'static,
        C: ClipboardSink + 'static,
        F: FnOnce(&App<H, L, C>, &TuiProgress) -> Result<JobReport, KitapError> + Send + 'static,
    {
        if let Ok(mut state) = self.lock() {
            state.busy = Some(label);
            state.finished = false;
            if label == "download" {
                state.hold_phase = lifecycle::Phase::Downloading;
            }
        }
        let app = Arc::clone(app);
        let state = self.state.clone();
        thread::spawn(move || {
            let sink = TuiProgress {
                state: state.clone(),
            };
            let result = job(&*app, &sink);
            let hold_phase = app.phase();
            let held = app.download_state();
            let reload = match &result {
                Ok(report) if report.reload => Some(load_view(&app)),
                _ => None,
            };
            if let Ok(mut state) = state.lock() {
                state.busy = None;
                state.finished = true;
                state.hold_phase = hold_phase;
                state.held = held;
                if let Some(view) = reload {
                    apply_view(&mut state, view);
                }
                match result {
                    Ok(report) => state.record(report.message),
                    Err(err) => state.record(format!("{label} failed: {err}")),
                }
            }
        });
    }

    fn reload<H, L, C>(&mut self, app: &App<H, L, C>)
    where
        H: HttpClient + Clone,
        L: Launcher,
        C: ClipboardSink,
    {
        let view = load_view(app);
        if let Ok(mut state) = self.lock() {
            apply_view(&mut state, view);
        }
    }

    fn request_cover<H, L, C>(&mut self, app: &Arc<App<H, L, C>>)
    where
        H: HttpClient + Clone + 'static,
        L: Launcher + 'static,
        C: ClipboardSink + 'static,
    {
        let item = {
            let Ok(mut state) = self.lock() else {
                return;
            };
            let Some(item) = state.current_item().cloned() else {
                return;
            };
            let key = item.cover_image_url.clone();
            if state.previews.contains_key(&key) || state.pending_covers.contains(&key) {
                return;
            }
            state.pending_covers.insert(key);
            item
        };
        let app = Arc::clone(app);
        let state = self.state.clone();
        thread::spawn(move || {
            let cover = app.cover(&item);
            let preview = CoverPreview {
                lines: cover_lines(&cover.bitmap),
                source: cover.source,
                width: cover.bitmap.width(),
                height: cover.bitmap.height(),
            };
            if let Ok(mut state) = state.lock() {
                state.pending_covers.remove(&item.cover_image_url);
                state.previews.insert(item.cover_image_url.clone(), preview);
            }
        });
    }

    fn note(&mut self, message: &str) {
        if let Ok(mut state) = self.lock() {
            state.record(message.to_string());
        }
    }

    fn rotate_hint(&self) {
        if let Ok(mut state) = self.lock() {
            if state.last_hint_update.elapsed() > Duration::from_secs(6) {
                state.hint_index = (state.hint_index + 1) % HINTS.len();
                state.last_hint_update = Instant::now();
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ViewState>, ()> {
        self.state.lock().map_err(|_| ())
    }
}

struct LoadedView {
    catalog_path: String,
    warning: Option<String>,
    total_items: usize,
    groups: Vec<CategoryGroup>,
}

fn load_view<H, L, C>(app: &App<H, L, C>) -> LoadedView
where
    H: HttpClient + Clone,
    L: Launcher,
    C: ClipboardSink,
{
    let (snapshot, warning) = app.load_catalog();
    LoadedView {
        catalog_path: app.store().catalog_path().to_string(),
        warning,
        total_items: snapshot.len(),
        groups: app.groups(&snapshot).into_vec(),
    }
}

fn apply_view(state: &mut ViewState, view: LoadedView) {
    let previous = state.current_group().map(|group| group.key.clone());
    state.catalog_path = view.catalog_path;
    if let Some(warning) = &view.warning {
        push_log(&mut state.logs, format!("[{}] {warning}", timestamp()));
    }
    state.warning = view.warning;
    state.total_items = view.total_items;
    state.groups = view.groups;
    state.tab = previous
        .and_then(|key| state.groups.iter().position(|group| group.key == key))
        .unwrap_or(0);
    let len = state
        .current_group()
        .map(|group| group.items.len())
        .unwrap_or(0);
    state.selected = state.selected.min(len.saturating_sub(1));
}

/// Blocks the calling worker until the browser answers the prompt.
fn ask(state: &Arc<Mutex<ViewState>>, question: String) -> bool {
    let (tx, rx) = mpsc::channel();
    match state.lock() {
        Ok(mut state) => {
            state.prompt = Some(Prompt {
                question,
                reply: tx,
            })
        }
        Err(_) => return false,
    }
    rx.recv().unwrap_or(false)
}

fn confirm_answer(key: KeyEvent) -> Option<bool> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => Some(true),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(false),
        _ => None,
    }
}

fn describe_acquire(outcome: &AcquireOutcome) -> String {
    match outcome {
        AcquireOutcome::OpenedLink { target } => format!("opened {target}"),
        AcquireOutcome::Saved {
            path,
            bytes,
            unlock_key,
            copied_to_clipboard,
        } => match (unlock_key, copied_to_clipboard) {
            (Some(key), true) => format!(
                "saved {path} ({}), key {key} copied to clipboard",
                bytes_to_human(*bytes)
            ),
            (Some(key), false) => format!("saved {path} ({}), key {key}", bytes_to_human(*bytes)),
            (None, _) => format!("saved {path} ({})", bytes_to_human(*bytes)),
        },
    }
}

fn enter_terminal() -> miette::Result<CrosstermTerminal> {
    let mut stdout = io::stdout();
    enable_raw_mode().into_diagnostic()?;
    stdout.execute(EnterAlternateScreen).into_diagnostic()?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).into_diagnostic()?;
    terminal.clear().into_diagnostic()?;
    Ok(terminal)
}

fn leave_terminal() -> miette::Result<()> {
    disable_raw_mode().into_diagnostic()?;
    let mut stdout = io::stdout();
    stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
    Ok(())
}

fn draw_progress(frame: &mut ratatui::Frame, kind: ProgressSinkKind, state: &ViewState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(2),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(state, kind, tick), chunks[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[1]);
    frame.render_widget(draw_status_panel(state), main[0]);
    frame.render_widget(draw_logs_view(state, 0), main[1]);

    let footer = Paragraph::new(Line::from(Span::styled(
        "q cancel",
        Style::default().fg(Color::DarkGray),
    )))
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[2]);
}

fn draw_browser(frame: &mut ratatui::Frame, state: &ViewState, tick: usize, log_scroll: u16) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(2),
            Constraint::Min(10),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(state, ProgressSinkKind::Browse, tick), chunks[0]);
    draw_tabs(frame, state, chunks[1]);

    if state.show_logs {
        frame.render_widget(draw_logs_view(state, log_scroll), chunks[2]);
    } else {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(chunks[2]);
        draw_item_list(frame, state, body[0]);
        draw_details(frame, state, body[1]);
    }

    frame.render_widget(draw_footer(state), chunks[3]);

    if let Some(prompt) = &state.prompt {
        let area = centered(frame.area(), 70, 7);
        frame.render_widget(Clear, area);
        draw_confirm(frame, &prompt.question, area);
    }
}

fn draw_header(state: &ViewState, kind: ProgressSinkKind, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let hold_color = match state.hold_phase {
        lifecycle::Phase::Idle => Color::Gray,
        lifecycle::Phase::Downloading => Color::Cyan,
        lifecycle::Phase::Downloaded => Color::Yellow,
        lifecycle::Phase::Launched => Color::Green,
    };
    let header_line = Line::from(vec![
        Span::styled(
            "E-KITAP",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled(kind_label(kind), Style::default().fg(Color::Cyan)),
        Span::raw("   State: "),
        Span::styled(
            format!("{:?}", state.hold_phase),
            Style::default().fg(hold_color),
        ),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    let catalog_line = match &state.warning {
        Some(warning) => Line::from(Span::styled(
            format!("Catalog: {} · {warning}", state.catalog_path),
            Style::default().fg(Color::Yellow),
        )),
        None => Line::from(Span::styled(
            format!(
                "Catalog: {} · {} items · {} categories",
                state.catalog_path,
                state.total_items,
                state.groups.len()
            ),
            Style::default().fg(Color::Gray),
        )),
    };
    Paragraph::new(vec![header_line, catalog_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_tabs(frame: &mut ratatui::Frame, state: &ViewState, area: Rect) {
    if state.groups.is_empty() {
        let empty = Paragraph::new(Line::from(Span::styled(
            "no categories",
            Style::default().fg(Color::DarkGray),
        )));
        frame.render_widget(empty, area);
        return;
    }
    let titles = state
        .groups
        .iter()
        .map(|group| Line::from(format!("{} ({})", group.key, group.items.len())))
        .collect::<Vec<_>>();
    let tabs = Tabs::new(titles)
        .select(state.tab)
        .style(Style::default().fg(Color::Gray))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn draw_item_list(frame: &mut ratatui::Frame, state: &ViewState, area: Rect) {
    let items = state
        .current_group()
        .map(|group| {
            group
                .items
                .iter()
                .map(|item| {
                    let marker = match item.target() {
                        Some(DownloadTarget::Link { .. }) => "↗",
                        Some(DownloadTarget::File { .. }) => " ",
                        None => "-",
                    };
                    ListItem::new(format!("{marker} {}", item.name))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let list = List::new(items)
        .block(Block::default().borders(Borders::RIGHT))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");
    let mut list_state = ListState::default().with_selected(Some(state.selected));
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_details(frame: &mut ratatui::Frame, state: &ViewState, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(PREVIEW_COLS as u16 + 2),
            Constraint::Min(20),
        ])
        .split(area);

    let Some(item) = state.current_item() else {
        let empty = Paragraph::new(Line::from("catalog is empty")).alignment(Alignment::Center);
        frame.render_widget(empty, area);
        return;
    };

    let preview = state.previews.get(&item.cover_image_url);
    let cover = match preview {
        Some(preview) => Paragraph::new(preview.lines.clone()),
        None => Paragraph::new(Line::from(Span::styled(
            "loading cover...",
            Style::default().fg(Color::DarkGray),
        ))),
    };
    frame.render_widget(cover.block(Block::default().borders(Borders::NONE)), columns[0]);

    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::Gray));
    let kind = match item.target() {
        Some(DownloadTarget::Link { target }) => format!("link to {target}"),
        Some(DownloadTarget::File { .. }) => "file download".to_string(),
        None => "no download".to_string(),
    };
    let mut lines = vec![
        Line::from(Span::styled(
            item.name.clone(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![label("Publisher: "), Span::raw(item.publisher.clone())]),
        Line::from(vec![label("Category: "), Span::raw(item.category.clone())]),
        Line::from(vec![label("Kind: "), Span::raw(kind)]),
        Line::from(vec![
            label("Unlock key: "),
            Span::styled(
                item.unlock_key().unwrap_or("none").to_string(),
                Style::default().fg(Color::Yellow),
            ),
        ]),
    ];
    if let Some(preview) = preview {
        lines.push(Line::from(vec![
            label("Cover: "),
            Span::raw(format!(
                "{:?} {}x{}",
                preview.source, preview.width, preview.height
            )),
        ]));
    }
    if let Some(held) = state.held.as_ref().filter(|held| held.item.name == item.name) {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            label("Saved: "),
            Span::raw(
                held.saved_path
                    .as_ref()
                    .map(|path| path.to_string())
                    .unwrap_or_default(),
            ),
        ]));
        lines.push(Line::from(Span::styled(
            if held.launched {
                "launched · b to delete and return"
            } else {
                "o launch · f open folder · b delete and return"
            },
            Style::default().fg(Color::Green),
        )));
    }
    let details = Paragraph::new(lines).wrap(Wrap { trim: true });
    frame.render_widget(details, columns[1]);
}

fn draw_footer(state: &ViewState) -> Paragraph<'static> {
    let status_color = if state.busy.is_some() {
        Color::Cyan
    } else {
        Color::White
    };
    let status = match state.busy {
        Some(label) => format!("{label}: {}", state.status),
        None => state.status.clone(),
    };
    Paragraph::new(vec![
        Line::from(Span::styled(status, Style::default().fg(status_color))),
        Line::from(vec![
            Span::styled(
                "enter download  o launch  f folder  b back  s sync  r reload  q quit   ",
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(HINTS[state.hint_index], Style::default().fg(Color::DarkGray)),
        ]),
    ])
    .block(Block::default().borders(Borders::TOP))
}

fn draw_status_panel(state: &ViewState) -> Paragraph<'static> {
    let progress = phase_progress(state.phase, state.started.elapsed());
    let phase_color = if state.busy.is_some() {
        Color::Cyan
    } else if state.finished {
        Color::Green
    } else {
        Color::Yellow
    };
    let mut lines = vec![
        Line::from(Span::styled(
            "STATUS / PROGRESS",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{:<7} ", state.phase.label()),
                Style::default().fg(phase_color),
            ),
            Span::raw(progress_bar(progress)),
            Span::raw(format!(" {:>3}%", progress)),
        ]),
        Line::from(vec![
            Span::styled("Status: ", Style::default().fg(Color::Gray)),
            Span::raw(state.status.clone()),
        ]),
        Line::from(Span::styled(
            "Recent events:",
            Style::default().fg(Color::Gray),
        )),
    ];
    for event in state.events.iter().rev().take(3) {
        lines.push(Line::from(format!("- {event}")));
    }
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_logs_view(state: &ViewState, scroll: u16) -> Paragraph<'static> {
    let total = state.logs.len();
    let visible = 12usize;
    let start = total.saturating_sub(scroll as usize + visible);
    let mut lines = Vec::with_capacity(visible + 1);
    lines.push(Line::from(Span::styled(
        "LOGS (PgUp/PgDown)",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )));
    for line in state.logs.iter().skip(start).take(visible) {
        lines.push(Line::from(line.clone()));
    }
    Paragraph::new(lines).wrap(Wrap { trim: true })
}

fn draw_confirm(frame: &mut ratatui::Frame, question: &str, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title("Confirm");
    let text = Paragraph::new(vec![
        Line::from(question.to_string()),
        Line::from(""),
        Line::from("Press y to confirm, n to cancel."),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(block);
    frame.render_widget(text, area);
}

fn centered(area: Rect, width_percent: u16, height: u16) -> Rect {
    let width = area.width.saturating_mul(width_percent) / 100;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

/// Renders the cover with upper half blocks, two pixel rows per text row.
fn cover_lines(bitmap: &RgbaImage) -> Vec<Line<'static>> {
    let small = imageops::resize(bitmap, PREVIEW_COLS, PREVIEW_ROWS * 2, FilterType::Triangle);
    (0..PREVIEW_ROWS)
        .map(|row| {
            let spans = (0..PREVIEW_COLS)
                .map(|col| {
                    let top = small.get_pixel(col, row * 2);
                    let bottom = small.get_pixel(col, row * 2 + 1);
                    Span::styled(
                        "▀",
                        Style::default()
                            .fg(Color::Rgb(top[0], top[1], top[2]))
                            .bg(Color::Rgb(bottom[0], bottom[1], bottom[2])),
                    )
                })
                .collect::<Vec<_>>();
            Line::from(spans)
        })
        .collect()
}

fn kind_label(kind: ProgressSinkKind) -> &'static str {
    match kind {
        ProgressSinkKind::Browse => "Browse",
        ProgressSinkKind::Fetch => "Fetch",
        ProgressSinkKind::Sync => "Sync",
        ProgressSinkKind::Covers => "Covers",
    }
}

fn phase_progress(phase: Phase, elapsed: Duration) -> u8 {
    let base = ((phase.index() + 1) as f64 / 4.0) * 100.0;
    let wobble = (elapsed.as_millis() % 500) as f64 / 500.0 * 4.0;
    (base + wobble).min(100.0) as u8
}

fn progress_bar(percent: u8) -> String {
    let total = 10;
    let filled = (percent as usize * total) / 100;
    let mut out = String::from("[");
    for i in 0..total {
        out.push(if i < filled { '#' } else { '.' });
    }
    out.push(']');
    out
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let (head, rest) = message.split_once(';')?;
    let phase = match head.strip_prefix("phase=")? {
        "Resolve" => Phase::Resolve,
        "Fetch" => Phase::Fetch,
        "Open" => Phase::Open,
        "Store" => Phase::Store,
        _ => return None,
    };
    Some((phase, rest.trim()))
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn push_log(buffer: &mut VecDeque<String>, item: String) {
    buffer.push_back(item);
    while buffer.len() > LOGS_MAX {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs();
    let mins = (secs / 60) % 60;
    let hours = (secs / 3600) % 24;
    let seconds = secs % 60;
    format!("{hours:02}:{mins:02}:{seconds:02}")
}

pub(crate) fn bytes_to_human(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.1} GB", value / GB)
    } else if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}
