use std::{future::Future, io, thread, time::Duration};

use anyhow::{Context, Result};
use bgcat_core::{Boardgame, CatalogClient, CatalogError};
use chrono::{DateTime, Local};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::{spawn, sync::mpsc};
use tracing::{error, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);
const MAX_FIELD_LEN: usize = 64;

// Values the create form starts with.
const DEFAULT_NAME: &str = "name";
const DEFAULT_PUBLISHER: &str = "pubs";
const DEFAULT_PLAYERS: i32 = 3;

#[derive(Debug, Clone)]
struct Theme {
    primary_fg: Color,
    accent: Color,
    muted: Color,
    selection_bg: Color,
    success: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            success: Color::Green,
            danger: Color::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormField {
    Name,
    Publisher,
    Players,
}

impl FormField {
    const ALL: [FormField; 3] = [FormField::Name, FormField::Publisher, FormField::Players];

    fn label(self) -> &'static str {
        match self {
            FormField::Name => "Name",
            FormField::Publisher => "Publisher",
            FormField::Players => "Players",
        }
    }

    fn next(self) -> Self {
        match self {
            FormField::Name => FormField::Publisher,
            FormField::Publisher => FormField::Players,
            FormField::Players => FormField::Name,
        }
    }

    fn previous(self) -> Self {
        match self {
            FormField::Name => FormField::Players,
            FormField::Publisher => FormField::Name,
            FormField::Players => FormField::Publisher,
        }
    }
}

/// Modal form collecting the fields of a new record.
#[derive(Debug, Clone)]
struct CreateForm {
    name: String,
    publisher: String,
    players: String,
    focus: FormField,
}

impl CreateForm {
    fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            publisher: DEFAULT_PUBLISHER.to_string(),
            players: DEFAULT_PLAYERS.to_string(),
            focus: FormField::Name,
        }
    }

    fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Name => &self.name,
            FormField::Publisher => &self.publisher,
            FormField::Players => &self.players,
        }
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            FormField::Name => &mut self.name,
            FormField::Publisher => &mut self.publisher,
            FormField::Players => &mut self.players,
        }
    }

    fn insert(&mut self, ch: char) {
        if ch.is_control() {
            return;
        }
        if self.focus == FormField::Players && !ch.is_ascii_digit() {
            return;
        }
        let input = self.focused_mut();
        if input.chars().count() >= MAX_FIELD_LEN {
            return;
        }
        input.push(ch);
    }

    fn backspace(&mut self) {
        self.focused_mut().pop();
    }

    fn clear_field(&mut self) {
        self.focused_mut().clear();
    }

    fn focus_next(&mut self) {
        self.focus = self.focus.next();
    }

    fn focus_previous(&mut self) {
        self.focus = self.focus.previous();
    }

    /// Build the record to post. Whatever was typed is sent as-is.
    fn to_boardgame(&self) -> Boardgame {
        let players = self.players.parse::<i32>().unwrap_or(0);
        Boardgame::new(self.name.trim(), self.publisher.trim(), players)
    }
}

enum AppEvent {
    Input(Event),
    Tick,
    Listed(Result<Vec<Boardgame>, CatalogError>),
    Fetched(Result<Boardgame, CatalogError>),
    Created(Result<Boardgame, CatalogError>),
    Deleted(u64, Result<Option<Boardgame>, CatalogError>),
}

/// Terminal front-end for the board-game catalog.
pub struct CatalogApp {
    client: CatalogClient,
    state: UiState,
    form: Option<CreateForm>,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    in_flight: usize,
    theme: Theme,
}

impl CatalogApp {
    pub fn new(client: CatalogClient) -> Self {
        Self {
            client,
            state: UiState::default(),
            form: None,
            event_tx: None,
            in_flight: 0,
            theme: Theme::default(),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);
        self.request_list();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.state.should_quit {
                break;
            }
            let maybe_event = event_rx.recv().await;
            if !self.process_app_event(maybe_event) || self.state.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn spawn_request<F>(&mut self, status: impl Into<String>, request: F)
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let Some(sender) = self.event_tx.clone() else {
            warn!("request dropped: event loop not running");
            return;
        };
        self.in_flight += 1;
        self.state.set_status(status);
        spawn(async move {
            let event = request.await;
            let _ = sender.send(event).await;
        });
    }

    fn request_list(&mut self) {
        let client = self.client.clone();
        self.spawn_request("Loading catalog…", async move {
            AppEvent::Listed(client.get_all().await)
        });
    }

    fn request_details(&mut self) {
        let Some(id) = self.state.current_game().and_then(|game| game.boardgame_id) else {
            self.state
                .set_status("Selected record has no id to fetch".to_string());
            return;
        };
        let client = self.client.clone();
        self.spawn_request(format!("Fetching #{id}…"), async move {
            AppEvent::Fetched(client.get(id).await)
        });
    }

    fn request_delete(&mut self) {
        let Some(id) = self.state.current_game().and_then(|game| game.boardgame_id) else {
            self.state
                .set_status("Selected record has no id to delete".to_string());
            return;
        };
        let client = self.client.clone();
        self.spawn_request(format!("Deleting #{id}…"), async move {
            AppEvent::Deleted(id, client.delete(id).await)
        });
    }

    fn submit_form(&mut self) {
        let Some(form) = self.form.take() else {
            return;
        };
        let boardgame = form.to_boardgame();
        info!(name = %boardgame.name, publisher = %boardgame.publisher, "submitting new boardgame");
        let client = self.client.clone();
        self.spawn_request(format!("Creating {}…", boardgame.name), async move {
            AppEvent::Created(client.create(&boardgame).await)
        });
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    self.state.set_status(format!("Error: {err}"));
                }
                true
            }
            Some(AppEvent::Tick) => true,
            Some(AppEvent::Listed(result)) => {
                self.finish_request();
                match result {
                    Ok(games) => {
                        info!(total = games.len(), "catalog loaded");
                        let total = games.len();
                        self.state.set_games(games);
                        self.state.last_refresh = Some(Local::now());
                        self.state.set_status(format!("Loaded {total} games"));
                    }
                    Err(err) => self.report_failure("Loading catalog", &err),
                }
                true
            }
            Some(AppEvent::Fetched(result)) => {
                self.finish_request();
                match result {
                    Ok(game) => {
                        let status = format!("Fetched {}", game.name);
                        self.state.upsert(game);
                        self.state.set_status(status);
                    }
                    Err(err) => self.report_failure("Fetching record", &err),
                }
                true
            }
            Some(AppEvent::Created(result)) => {
                self.finish_request();
                match result {
                    Ok(game) => {
                        let id = game
                            .boardgame_id
                            .map(|id| format!("#{id}"))
                            .unwrap_or_else(|| "no id".to_string());
                        info!(name = %game.name, id = %id, "boardgame created");
                        let status = format!("Created {} ({}) as {id}", game.name, game.publisher);
                        self.state.upsert(game);
                        self.state.set_status(status);
                    }
                    Err(err) => self.report_failure("Creating record", &err),
                }
                true
            }
            Some(AppEvent::Deleted(id, result)) => {
                self.finish_request();
                match result {
                    Ok(echoed) => {
                        info!(id, "boardgame deleted");
                        self.state.remove(id);
                        let status = match echoed {
                            Some(game) => format!("Deleted {} (#{id})", game.name),
                            None => format!("Deleted #{id}"),
                        };
                        self.state.set_status(status);
                    }
                    Err(err) => self.report_failure("Deleting record", &err),
                }
                true
            }
            None => false,
        }
    }

    fn finish_request(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn report_failure(&mut self, action: &str, err: &CatalogError) {
        error!(?err, "{action} failed");
        self.state.set_status(describe_failure(action, err));
        self.state.status_is_error = true;
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        let Event::Key(key) = event else {
            return Ok(());
        };
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.state.should_quit = true;
            return Ok(());
        }
        if self.form.is_some() {
            self.handle_form_key(key);
        } else {
            self.handle_browse_key(key);
        }
        Ok(())
    }

    fn handle_browse_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.state.should_quit = true,
            KeyCode::Down | KeyCode::Char('j') => self.state.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.state.move_cursor(-1),
            KeyCode::PageDown => self.state.move_cursor(self.state.page_size()),
            KeyCode::PageUp => self.state.move_cursor(-self.state.page_size()),
            KeyCode::Home | KeyCode::Char('g') => self.state.move_to(0),
            KeyCode::End | KeyCode::Char('G') => self.state.move_to_end(),
            KeyCode::Char('r') => self.request_list(),
            KeyCode::Enter => self.request_details(),
            KeyCode::Char('d') => self.request_delete(),
            KeyCode::Char('n') => {
                self.form = Some(CreateForm::new());
                self.state
                    .set_status("New boardgame: Tab to switch field, Enter to submit".to_string());
            }
            _ => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => {
                self.form = None;
                self.state.set_status("Creation cancelled".to_string());
            }
            KeyCode::Enter => self.submit_form(),
            KeyCode::Tab | KeyCode::Down => form.focus_next(),
            KeyCode::BackTab | KeyCode::Up => form.focus_previous(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                form.clear_field()
            }
            KeyCode::Char(ch) => form.insert(ch),
            _ => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.size();
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(4),
            ])
            .split(area);

        self.render_header(frame, layout[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(layout[1]);
        self.render_game_list(frame, body[0]);
        self.render_game_details(frame, body[1]);
        self.render_status(frame, layout[2]);

        if let Some(form) = &self.form {
            self.render_form(frame, form);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let title = Line::from(vec![
            Span::styled(
                "Board Game Catalog",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {}", self.client.base_url()),
                Style::default().fg(self.theme.muted),
            ),
        ]);
        let paragraph = Paragraph::new(title)
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, area);
    }

    fn render_game_list(&mut self, frame: &mut Frame, area: Rect) {
        self.state.list_height = area.height.saturating_sub(2) as usize;
        self.state.ensure_cursor_visible();

        let mut list_state = ListState::default();
        let games = self.state.visible_games();
        if !games.is_empty() {
            let selected = self
                .state
                .cursor
                .saturating_sub(self.state.offset)
                .min(games.len().saturating_sub(1));
            list_state.select(Some(selected));
        }

        let items: Vec<ListItem> = games
            .iter()
            .enumerate()
            .map(|(idx, game)| {
                let is_selected = self.state.cursor == self.state.offset + idx;
                let marker = if is_selected {
                    Span::styled(
                        "▶ ",
                        Style::default()
                            .fg(self.theme.accent)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    Span::raw("  ")
                };
                let summary = game.summary();
                ListItem::new(Line::from(vec![
                    marker,
                    Span::styled(
                        summary.name,
                        Style::default()
                            .fg(self.theme.primary_fg)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!(" · {} · {}p", summary.publisher, summary.player_number),
                        Style::default().fg(self.theme.muted),
                    ),
                ]))
            })
            .collect();

        let title = format!("Boardgames ({})", self.state.games.len());
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut list_state);
    }

    fn render_game_details(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Details");
        let Some(game) = self.state.current_game() else {
            let paragraph = Paragraph::new("No boardgames in the catalog").block(block);
            frame.render_widget(paragraph, area);
            return;
        };

        let mut lines = vec![
            Line::from(Span::styled(
                game.name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("Publisher: {}", game.publisher)),
            Line::from(format!("Players: {}", game.player_number)),
            Line::from(format!(
                "Id: {}",
                game.boardgame_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unassigned".to_string())
            )),
        ];
        if let Some(parent) = game.parent_id {
            lines.push(Line::from(format!("Expansion of: #{parent}")));
        }
        lines.extend([
            Line::from(format!(
                "Tags: {}",
                join_names(game.tags.iter().map(|tag| tag.name.as_str()))
            )),
            Line::from(format!(
                "Categories: {}",
                join_names(game.categories.iter().map(|c| c.name.as_str()))
            )),
            Line::from(format!(
                "Mechanisms: {}",
                join_names(game.mechanisms.iter().map(|m| m.name.as_str()))
            )),
        ]);
        if game.has_expansions() {
            lines.push(Line::from("Expansions:"));
            for expansion in &game.expansions {
                lines.push(Line::from(Span::styled(
                    format!("  {}", expansion.summary()),
                    Style::default().fg(self.theme.muted),
                )));
            }
        }

        let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::ALL).title("Status");
        let colour = if self.state.status_is_error {
            self.theme.danger
        } else if self.in_flight > 0 {
            self.theme.accent
        } else {
            self.theme.success
        };
        let refreshed = self
            .state
            .last_refresh
            .map(|at| format!("Last refresh {}", at.format("%H:%M:%S")))
            .unwrap_or_else(|| "Not loaded yet".to_string());
        let help = "n new · Enter fetch · d delete · r refresh · q quit";
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                self.state.status.clone(),
                Style::default().fg(colour),
            )),
            Line::from(Span::styled(
                format!("{refreshed}  ·  {help}"),
                Style::default().fg(self.theme.muted),
            )),
        ])
        .block(block)
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_form(&self, frame: &mut Frame, form: &CreateForm) {
        let area = centered_rect(48, 9, frame.size());
        frame.render_widget(Clear, area);

        let mut lines = Vec::with_capacity(FormField::ALL.len() + 2);
        for field in FormField::ALL {
            let focused = form.focus == field;
            let label_style = if focused {
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(self.theme.muted)
            };
            let cursor = if focused { "▏" } else { "" };
            lines.push(Line::from(vec![
                Span::styled(format!("{:>10}: ", field.label()), label_style),
                Span::raw(format!("{}{cursor}", form.value(field))),
            ]));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Enter submit · Tab next · Esc cancel",
            Style::default().fg(self.theme.muted),
        )));

        let paragraph = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .title("New Boardgame"),
        );
        frame.render_widget(paragraph, area);
    }
}

fn describe_failure(action: &str, err: &CatalogError) -> String {
    match err.status() {
        Some(code) => format!("{action} failed ({} error, HTTP {code}): {err}", err.kind()),
        None => format!("{action} failed ({} error): {err}", err.kind()),
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let joined = names.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

struct UiState {
    games: Vec<Boardgame>,
    cursor: usize,
    offset: usize,
    list_height: usize,
    status: String,
    status_is_error: bool,
    last_refresh: Option<DateTime<Local>>,
    should_quit: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            games: Vec::new(),
            cursor: 0,
            offset: 0,
            list_height: 1,
            status: "Ready".to_string(),
            status_is_error: false,
            last_refresh: None,
            should_quit: false,
        }
    }
}

impl UiState {
    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.status_is_error = false;
    }

    fn set_games(&mut self, games: Vec<Boardgame>) {
        self.games = games;
        self.clamp_cursor();
    }

    /// Replace the record with the same id, or append it when unknown.
    fn upsert(&mut self, game: Boardgame) {
        let existing = game.boardgame_id.and_then(|id| {
            self.games
                .iter()
                .position(|candidate| candidate.boardgame_id == Some(id))
        });
        match existing {
            Some(index) => {
                self.games[index] = game;
                self.cursor = index;
            }
            None => {
                self.games.push(game);
                self.cursor = self.games.len() - 1;
            }
        }
    }

    fn remove(&mut self, id: u64) {
        self.games.retain(|game| game.boardgame_id != Some(id));
        self.clamp_cursor();
    }

    fn current_game(&self) -> Option<&Boardgame> {
        self.games.get(self.cursor)
    }

    fn page_size(&self) -> isize {
        self.list_height.max(1) as isize
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.games.is_empty() {
            self.cursor = 0;
            return;
        }
        let max = self.games.len() as isize - 1;
        self.cursor = (self.cursor as isize + delta).clamp(0, max) as usize;
    }

    fn move_to(&mut self, index: usize) {
        self.cursor = index;
        self.clamp_cursor();
    }

    fn move_to_end(&mut self) {
        self.cursor = self.games.len().saturating_sub(1);
    }

    fn clamp_cursor(&mut self) {
        if self.cursor >= self.games.len() {
            self.cursor = self.games.len().saturating_sub(1);
        }
    }

    fn ensure_cursor_visible(&mut self) {
        let height = self.list_height.max(1);
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + height {
            self.offset = self.cursor + 1 - height;
        }
        let max_offset = self.games.len().saturating_sub(height);
        self.offset = self.offset.min(max_offset);
    }

    fn visible_games(&self) -> &[Boardgame] {
        let start = self.offset.min(self.games.len());
        let end = (start + self.list_height.max(1)).min(self.games.len());
        &self.games[start..end]
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}
