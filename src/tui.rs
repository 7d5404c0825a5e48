use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::db::KeyValueStore;
use crate::filters::{toggle_option, SearchFilters, EXPERIENCE_LEVELS, INDUSTRIES, REGIONS};
use crate::marks::Marks;
use crate::models::{Job, LoadingState};
use crate::provider::{fetch_with_timeout, FetchError, JobSource};
use crate::search::{SearchController, SearchTicket};
use crate::views::JobViews;

type SearchReply = (SearchTicket, Result<Vec<Job>, FetchError>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Jobs,
    Saved,
    Applied,
}

impl Pane {
    fn next(self) -> Self {
        match self {
            Pane::Jobs => Pane::Saved,
            Pane::Saved => Pane::Applied,
            Pane::Applied => Pane::Jobs,
        }
    }

    fn prev(self) -> Self {
        match self {
            Pane::Jobs => Pane::Applied,
            Pane::Saved => Pane::Jobs,
            Pane::Applied => Pane::Saved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterField {
    Industry,
    Location,
    Experience,
}

impl FilterField {
    fn label(self) -> &'static str {
        match self {
            FilterField::Industry => "產業類別",
            FilterField::Location => "工作地區",
            FilterField::Experience => "工作年資",
        }
    }

    fn options(self) -> &'static [&'static str] {
        match self {
            FilterField::Industry => INDUSTRIES,
            FilterField::Location => REGIONS,
            FilterField::Experience => EXPERIENCE_LEVELS,
        }
    }

    fn selected(self, filters: &SearchFilters) -> &[String] {
        match self {
            FilterField::Industry => &filters.industries,
            FilterField::Location => &filters.locations,
            FilterField::Experience => &filters.experience_levels,
        }
    }

    fn replace(self, filters: SearchFilters, values: Vec<String>) -> SearchFilters {
        match self {
            FilterField::Industry => filters.with_industries(values),
            FilterField::Location => filters.with_locations(values),
            FilterField::Experience => filters.with_experience_levels(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Normal,
    EditTitle(String),
    Pick { field: FilterField, cursor: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    None,
    Search,
    Quit,
}

struct AppState<S: KeyValueStore> {
    controller: SearchController,
    marks: Marks<S>,
    filters: SearchFilters,
    pane: Pane,
    selected: usize,
    scroll_offset: u16,
    mode: Mode,
}

impl<S: KeyValueStore> AppState<S> {
    fn new(marks: Marks<S>) -> Self {
        Self {
            controller: SearchController::new(),
            marks,
            filters: SearchFilters::default(),
            pane: Pane::Jobs,
            selected: 0,
            scroll_offset: 0,
            mode: Mode::Normal,
        }
    }

    fn views(&self) -> JobViews<'_> {
        JobViews::build(self.controller.jobs(), self.marks.saved(), self.marks.applied())
    }

    fn pane_jobs(&self) -> Vec<&Job> {
        let views = self.views();
        match self.pane {
            Pane::Jobs if self.controller.state() == LoadingState::Success => views.visible,
            Pane::Jobs => Vec::new(),
            Pane::Saved => views.saved,
            Pane::Applied => views.applied,
        }
    }

    fn current_job(&self) -> Option<&Job> {
        self.pane_jobs().get(self.selected).copied()
    }

    fn clamp_selection(&mut self) {
        let len = self.pane_jobs().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    fn next(&mut self) {
        let len = self.pane_jobs().len();
        if len > 0 && self.selected < len - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn switch_pane(&mut self, pane: Pane) {
        self.pane = pane;
        self.selected = 0;
        self.scroll_offset = 0;
    }

    fn toggle_saved(&mut self) {
        let Some(id) = self.current_job().map(|job| job.id.clone()) else { return };
        let saved = self.marks.toggle_saved(&id);
        info!(id = %id, saved, "toggled saved");
        self.clamp_selection();
    }

    fn toggle_applied(&mut self) {
        let Some(id) = self.current_job().map(|job| job.id.clone()) else { return };
        let applied = self.marks.toggle_applied(&id);
        info!(id = %id, applied, "toggled applied");
        self.clamp_selection();
    }

    fn apply_reply(&mut self, (ticket, outcome): SearchReply) {
        if self.controller.complete(ticket, outcome) {
            debug!(state = %self.controller.state(), "search reply applied");
            self.selected = 0;
            self.scroll_offset = 0;
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> Action {
        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => self.handle_normal_key(code),
            Mode::EditTitle(mut buffer) => match code {
                KeyCode::Enter => {
                    self.filters = self.filters.clone().with_job_title(buffer);
                    Action::Search
                }
                KeyCode::Esc => Action::None,
                KeyCode::Backspace => {
                    buffer.pop();
                    self.mode = Mode::EditTitle(buffer);
                    Action::None
                }
                KeyCode::Char(c) => {
                    buffer.push(c);
                    self.mode = Mode::EditTitle(buffer);
                    Action::None
                }
                _ => {
                    self.mode = Mode::EditTitle(buffer);
                    Action::None
                }
            },
            Mode::Pick { field, cursor } => {
                let options = field.options();
                match code {
                    KeyCode::Esc | KeyCode::Enter => return Action::None,
                    KeyCode::Down | KeyCode::Char('j') => {
                        let cursor = (cursor + 1).min(options.len() - 1);
                        self.mode = Mode::Pick { field, cursor };
                    }
                    KeyCode::Up | KeyCode::Char('k') => {
                        self.mode = Mode::Pick {
                            field,
                            cursor: cursor.saturating_sub(1),
                        };
                    }
                    KeyCode::Char(' ') => {
                        let values = toggle_option(field.selected(&self.filters), options[cursor]);
                        self.filters = field.replace(self.filters.clone(), values);
                        self.mode = Mode::Pick { field, cursor };
                    }
                    _ => self.mode = Mode::Pick { field, cursor },
                }
                Action::None
            }
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            KeyCode::Down | KeyCode::Char('j') => self.next(),
            KeyCode::Up | KeyCode::Char('k') => self.prev(),
            KeyCode::Char('J') | KeyCode::PageDown => {
                self.scroll_offset = self.scroll_offset.saturating_add(3)
            }
            KeyCode::Char('K') | KeyCode::PageUp => {
                self.scroll_offset = self.scroll_offset.saturating_sub(3)
            }
            KeyCode::Tab => self.switch_pane(self.pane.next()),
            KeyCode::BackTab => self.switch_pane(self.pane.prev()),
            KeyCode::Char('s') => self.toggle_saved(),
            KeyCode::Char('a') => self.toggle_applied(),
            KeyCode::Enter | KeyCode::Char('r') => return Action::Search,
            KeyCode::Char('/') => self.mode = Mode::EditTitle(self.filters.job_title.clone()),
            KeyCode::Char('i') => self.open_picker(FilterField::Industry),
            KeyCode::Char('l') => self.open_picker(FilterField::Location),
            KeyCode::Char('e') => self.open_picker(FilterField::Experience),
            KeyCode::Char('c') => self.filters = SearchFilters::default(),
            _ => {}
        }
        Action::None
    }

    fn open_picker(&mut self, field: FilterField) {
        self.mode = Mode::Pick { field, cursor: 0 };
    }
}

fn spawn_search<S: KeyValueStore>(
    state: &mut AppState<S>,
    handle: &Handle,
    source: &Arc<dyn JobSource>,
    timeout: Duration,
    tx: &UnboundedSender<SearchReply>,
) {
    let ticket = state.controller.begin(&state.filters);
    state.switch_pane(Pane::Jobs);
    debug!(seq = ticket.seq(), source = source.name(), "dispatching search");

    let source = Arc::clone(source);
    let filters = state.filters.clone();
    let tx = tx.clone();
    handle.spawn(async move {
        let outcome = fetch_with_timeout(source, filters, timeout).await;
        // The receiver is gone only after the UI has exited.
        let _ = tx.send((ticket, outcome));
    });
}

/// Builds the browser state and fires the single browse-all search the UI
/// starts with.
fn open_session<S: KeyValueStore>(
    marks: Marks<S>,
    handle: &Handle,
    source: &Arc<dyn JobSource>,
    timeout: Duration,
) -> (AppState<S>, UnboundedSender<SearchReply>, UnboundedReceiver<SearchReply>) {
    let mut state = AppState::new(marks);
    let (tx, rx) = unbounded_channel();
    spawn_search(&mut state, handle, source, timeout, &tx);
    (state, tx, rx)
}

pub fn run_browse<S: KeyValueStore>(
    marks: Marks<S>,
    source: Arc<dyn JobSource>,
    timeout: Duration,
    handle: Handle,
) -> Result<()> {
    let (mut state, tx, mut rx) = open_session(marks, &handle, &source, timeout);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, &mut rx, |state| {
        spawn_search(state, &handle, &source, timeout, &tx)
    });

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop<S: KeyValueStore>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState<S>,
    rx: &mut UnboundedReceiver<SearchReply>,
    mut search: impl FnMut(&mut AppState<S>),
) -> Result<()> {
    let mut list_state = ListState::default();
    let mut tick: usize = 0;

    loop {
        while let Ok(reply) = rx.try_recv() {
            state.apply_reply(reply);
        }

        list_state.select(Some(state.selected));
        terminal.draw(|frame| draw(frame, state, &mut list_state, tick))?;
        tick = tick.wrapping_add(1);

        if !event::poll(Duration::from_millis(150))? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match state.handle_key(key.code) {
                Action::Quit => break,
                Action::Search => search(state),
                Action::None => {}
            }
        }
    }
    Ok(())
}

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

fn draw<S: KeyValueStore>(
    frame: &mut Frame,
    state: &AppState<S>,
    list_state: &mut ListState,
    tick: usize,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, state, rows[0], tick);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    let jobs = state.pane_jobs();
    let show_placeholder = state.pane == Pane::Jobs && state.controller.state() != LoadingState::Success;

    if show_placeholder {
        let placeholder = Paragraph::new(status_text(state, tick))
            .block(Block::default().borders(Borders::ALL).title(pane_title(state)))
            .wrap(Wrap { trim: false });
        frame.render_widget(placeholder, body[0]);
    } else if jobs.is_empty() {
        let empty = match state.pane {
            Pane::Jobs => "目前沒有匹配的職缺\n請嘗試更換關鍵字或擴大搜尋條件",
            Pane::Saved => "尚無儲存職缺",
            Pane::Applied => "尚無應徵記錄",
        };
        let empty = Paragraph::new(empty)
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL).title(pane_title(state)));
        frame.render_widget(empty, body[0]);
    } else {
        let items: Vec<ListItem> = jobs
            .iter()
            .map(|job| {
                let saved = if state.marks.is_saved(&job.id) { "*" } else { " " };
                let applied = if state.marks.is_applied(&job.id) { "+" } else { " " };
                ListItem::new(format!(
                    "{}{} {} | {}",
                    saved,
                    applied,
                    truncate(&job.title, 28),
                    truncate(&job.company, 16)
                ))
            })
            .collect();

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(pane_title(state)))
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, body[0], list_state);
    }

    let detail = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" 職缺詳情 "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail, body[1]);

    let help = match state.mode {
        Mode::Normal => {
            " j/k:move J/K:scroll Tab:pane /:title i/l/e:filters c:clear Enter/r:search s:save a:apply q:quit"
        }
        Mode::EditTitle(_) => " type the job title  Enter:search  Esc:cancel",
        Mode::Pick { .. } => " j/k:move  Space:toggle  Enter/Esc:close",
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        rows[2],
    );

    if let Mode::Pick { field, cursor } = state.mode {
        draw_picker(frame, state, field, cursor);
    }
}

fn draw_header<S: KeyValueStore>(frame: &mut Frame, state: &AppState<S>, area: Rect, tick: usize) {
    let filters = &state.filters;
    let title_line = match &state.mode {
        Mode::EditTitle(buffer) => Line::from(vec![
            Span::styled("職稱: ", Style::default().fg(Color::Yellow)),
            Span::raw(format!("{}_", buffer)),
        ]),
        _ if filters.job_title.is_empty() => Line::from(Span::styled(
            "職稱: 輸入欲搜尋的職稱範疇 (例如: 前端工程師, 產品經理...)",
            Style::default().fg(Color::DarkGray),
        )),
        _ => Line::from(format!("職稱: {}", filters.job_title)),
    };

    let filter_line = Line::from(
        [FilterField::Industry, FilterField::Location, FilterField::Experience]
            .iter()
            .map(|field| {
                let selected = field.selected(filters);
                let value = if selected.is_empty() {
                    "不限".to_string()
                } else {
                    selected.join(", ")
                };
                format!("{}: {}", field.label(), value)
            })
            .collect::<Vec<_>>()
            .join("   "),
    );

    let views = state.views();
    let (label, color) = match state.controller.state() {
        LoadingState::Idle => ("待命".to_string(), Color::DarkGray),
        LoadingState::Loading => (format!("搜尋中 {}", SPINNER[tick % SPINNER.len()]), Color::Yellow),
        LoadingState::Success => ("完成".to_string(), Color::Green),
        LoadingState::Error => ("錯誤".to_string(), Color::Red),
    };
    let mut status_spans = vec![
        Span::styled(format!("[{}]", label), Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            "  職缺 {}  已儲存 {}  已應徵 {}",
            if state.controller.state() == LoadingState::Success {
                views.visible.len()
            } else {
                0
            },
            state.marks.saved().len(),
            state.marks.applied().len()
        )),
    ];
    if let Some(at) = state.controller.completed_at() {
        status_spans.push(Span::styled(
            format!("  更新於 {}", at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let header = Paragraph::new(vec![title_line, filter_line, Line::from(status_spans)])
        .block(Block::default().borders(Borders::BOTTOM).title(" Taiwan Job Hub "));
    frame.render_widget(header, area);
}

fn draw_picker<S: KeyValueStore>(frame: &mut Frame, state: &AppState<S>, field: FilterField, cursor: usize) {
    let options = field.options();
    let selected = field.selected(&state.filters);
    let area = centered(frame.area(), 40, options.len() as u16 + 2);

    let items: Vec<ListItem> = options
        .iter()
        .map(|opt| {
            let mark = if selected.iter().any(|s| s == opt) { "[x]" } else { "[ ]" };
            ListItem::new(format!("{} {}", mark, opt))
        })
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", field.label())))
        .highlight_style(Style::default().bg(Color::Blue).add_modifier(Modifier::BOLD));

    let mut picker_state = ListState::default();
    picker_state.select(Some(cursor));
    frame.render_widget(Clear, area);
    frame.render_stateful_widget(list, area, &mut picker_state);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn pane_title<S: KeyValueStore>(state: &AppState<S>) -> String {
    let tab = |pane: Pane, label: &str| {
        if state.pane == pane {
            format!("[{}]", label)
        } else {
            label.to_string()
        }
    };
    format!(
        " {} {} {} ",
        tab(Pane::Jobs, "精選職缺"),
        tab(Pane::Saved, "已儲存"),
        tab(Pane::Applied, "應徵歷史")
    )
}

fn status_text<S: KeyValueStore>(state: &AppState<S>, tick: usize) -> Text<'static> {
    match state.controller.state() {
        LoadingState::Loading | LoadingState::Idle => Text::from(vec![
            Line::from(Span::styled(
                format!("{} AI 正在各平台搜尋與分析...", SPINNER[tick % SPINNER.len()]),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("尋找符合「{}」的職缺", state.filters.summary())),
        ]),
        LoadingState::Error => Text::from(vec![
            Line::from(Span::styled(
                "搜尋遇到一點困難",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(state.controller.error().unwrap_or_default().to_string()),
            Line::from(""),
            Line::from(Span::styled("按 r 再試一次", Style::default().fg(Color::Yellow))),
        ]),
        LoadingState::Success => Text::raw(""),
    }
}

fn build_detail<S: KeyValueStore>(state: &AppState<S>) -> Text<'static> {
    let Some(job) = state.current_job() else {
        return Text::raw("");
    };

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let dim = Style::default().fg(Color::DarkGray);
    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(Span::styled(job.title.clone(), bold)));
    lines.push(Line::from(Span::styled(job.company.clone(), Style::default().fg(Color::Cyan))));

    let mut flags = vec![Span::styled(format!("[{}]", job.source), Style::default().fg(Color::Magenta))];
    if state.marks.is_saved(&job.id) {
        flags.push(Span::styled(" 已儲存", Style::default().fg(Color::Blue)));
    }
    if state.marks.is_applied(&job.id) {
        flags.push(Span::styled(" 已應徵", Style::default().fg(Color::Green)));
    }
    if let Some(posted) = &job.posted_at {
        flags.push(Span::styled(format!(" {}", posted), dim));
    }
    lines.push(Line::from(flags));

    for (label, value) in [
        ("地點", &job.location),
        ("薪資", &job.salary),
        ("年資", &job.experience),
        ("產業", &job.industry),
    ] {
        if !value.is_empty() {
            lines.push(Line::from(format!("{}: {}", label, value)));
        }
    }
    lines.push(Line::from(Span::styled(job.link.clone(), Style::default().fg(Color::Blue))));
    lines.push(Line::from(""));

    push_section(&mut lines, "職缺描述", Some(&job.description));

    if !job.requirements.is_empty() {
        lines.push(Line::from(Span::styled("條件要求", bold)));
        for req in &job.requirements {
            for (i, line) in textwrap::wrap(req, 66).iter().enumerate() {
                let bullet = if i == 0 { "  - " } else { "    " };
                lines.push(Line::from(format!("{}{}", bullet, line)));
            }
        }
        lines.push(Line::from(""));
    }

    if let Some(mentors) = job.linked_in_employees.as_ref().filter(|m| !m.is_empty()) {
        lines.push(Line::from(Span::styled("LinkedIn 職涯導師", bold)));
        for mentor in mentors {
            lines.push(Line::from(format!("  {} - {}", mentor.name, mentor.role)));
            lines.push(Line::from(Span::styled(format!("    {}", mentor.url), dim)));
        }
        lines.push(Line::from(""));
    }

    push_section(&mut lines, "導師特質分析", job.mentor_analysis.as_ref());
    push_section(&mut lines, "公司評價", job.company_reviews.as_ref());

    Text::from(lines)
}

fn push_section(lines: &mut Vec<Line<'static>>, heading: &str, body: Option<&String>) {
    let Some(body) = body.filter(|b| !b.trim().is_empty()) else { return };
    lines.push(Line::from(Span::styled(
        heading.to_string(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for line in textwrap::fill(body, 70).lines() {
        lines.push(Line::from(format!("  {}", line)));
    }
    lines.push(Line::from(""));
}

/// Truncates on character boundaries so CJK titles never split mid-glyph.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
