use std::cell::Cell;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph, Wrap};
use ratatui::{Frame, Terminal};
use textwrap::wrap;
use tracing::{debug, info, warn};
use unicode_width::UnicodeWidthStr;

use crate::comments::{CommentsOverlay, SheetEvent, SheetState};
use crate::data::Services;
use crate::feed::{FeedController, FeedSettings, Outcome, PlaybackSwitch, ViewableItem};
use crate::model::{InteractionKind, User, Video};
use crate::player::Player;
use crate::profile::ProfileView;
use crate::session::Session;
use crate::storage::KnownUser;
use crate::task::Executor;

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_PANEL_FOCUSED_BG: Color = Color::Rgb(49, 50, 68);
const COLOR_PANEL_SELECTED_BG: Color = Color::Rgb(69, 71, 90);
const COLOR_BORDER_IDLE: Color = Color::Rgb(49, 50, 68);
const COLOR_BORDER_FOCUSED: Color = Color::Rgb(137, 180, 250);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_LIKED: Color = Color::Rgb(243, 139, 168);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Rows taken by one video card in the reel, separator included.
const CARD_HEIGHT: usize = 5;
/// Gesture distance of one terminal row, in sheet points.
const ROW_POINTS: f32 = 20.0;
/// Gesture distance of one terminal column. Cells are roughly twice as tall
/// as they are wide.
const COL_POINTS: f32 = 10.0;
const SHEET_HEIGHT_PERCENT: u16 = 65;
const PROFILE_HEADER_ROWS: u16 = 4;

pub enum StartScreen {
    Home,
    Video(String),
    Profile(String),
}

pub struct Options {
    pub status_message: String,
    pub services: Services,
    pub session: Arc<Session>,
    pub executor: Arc<dyn Executor>,
    pub settings: FeedSettings,
    pub player: Box<dyn Player>,
    pub start: StartScreen,
}

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

/// What to do once the viewer has signed in from the prompt.
#[derive(Clone, Debug)]
enum Pending {
    Like(String),
    Follow,
    Comment,
}

struct LoginPrompt {
    input: String,
    known: Vec<KnownUser>,
    selected: usize,
    pending: Option<Pending>,
    busy: bool,
    error: Option<String>,
}

struct Drag {
    column: u16,
    row: u16,
}

enum UiMessage {
    SignedIn {
        result: Result<User>,
        pending: Option<Pending>,
    },
}

pub struct Model {
    services: Services,
    session: Arc<Session>,
    executor: Arc<dyn Executor>,
    settings: FeedSettings,
    player: Box<dyn Player>,
    home: FeedController,
    home_scroll: usize,
    profile: Option<ProfileView>,
    profile_scroll: usize,
    comments: CommentsOverlay,
    comment_scroll: usize,
    login: Option<LoginPrompt>,
    drag: Option<Drag>,
    status_message: String,
    spinner: Spinner,
    needs_redraw: bool,
    reel_rows: Cell<u16>,
    sheet_area: Cell<Rect>,
    last_frame: Instant,
    tx: Sender<UiMessage>,
    rx: Receiver<UiMessage>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        let Options {
            status_message,
            services,
            session,
            executor,
            settings,
            player,
            start,
        } = options;

        let home_source = match &start {
            StartScreen::Video(video_id) => (services.single_video)(video_id.as_str()),
            _ => services.home.clone(),
        };
        let home = FeedController::new(
            home_source,
            services.interactions.clone(),
            session.clone(),
            executor.clone(),
            settings.clone(),
        );
        let comments =
            CommentsOverlay::new(services.comments.clone(), session.clone(), executor.clone());
        let (tx, rx) = unbounded();

        let mut model = Self {
            services,
            session,
            executor,
            settings,
            player,
            home,
            home_scroll: 0,
            profile: None,
            profile_scroll: 0,
            comments,
            comment_scroll: 0,
            login: None,
            drag: None,
            status_message,
            spinner: Spinner::new(),
            needs_redraw: true,
            reel_rows: Cell::new(0),
            sheet_area: Cell::new(Rect::default()),
            last_frame: Instant::now(),
            tx,
            rx,
        };
        model.home.fetch_next_page();
        if let StartScreen::Profile(user_id) = start {
            model.open_profile(&user_id);
        }
        model
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        self.player.stop();
        self.teardown();
        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }
            self.advance_sheet();

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
                // Row counts are only known after a draw.
                self.sync_visibility();
            }

            let timeout = if self.comments.sheet().is_animating() {
                Duration::from_millis(16)
            } else {
                tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or_else(|| Duration::from_millis(16))
            };

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => {
                        if let Err(err) = self.handle_mouse(mouse) {
                            self.status_message = format!("Error: {}", err);
                            self.mark_dirty();
                        }
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                if self.is_loading() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
                self.poll_player();
            }
        }

        Ok(())
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    fn teardown(&mut self) {
        if let Some(mut profile) = self.profile.take() {
            profile.teardown();
        }
        self.comments.teardown();
        self.home.teardown();
    }

    fn feed(&self) -> &FeedController {
        match &self.profile {
            Some(profile) => profile.feed(),
            None => &self.home,
        }
    }

    fn feed_mut(&mut self) -> &mut FeedController {
        match &mut self.profile {
            Some(profile) => profile.feed_mut(),
            None => &mut self.home,
        }
    }

    fn scroll(&self) -> usize {
        if self.profile.is_some() {
            self.profile_scroll
        } else {
            self.home_scroll
        }
    }

    fn set_scroll(&mut self, rows: usize) {
        if self.profile.is_some() {
            self.profile_scroll = rows;
        } else {
            self.home_scroll = rows;
        }
    }

    fn is_loading(&self) -> bool {
        self.feed().is_loading()
            || self.comments.is_loading()
            || self.comments.is_posting()
            || self.profile.as_ref().is_some_and(|profile| {
                profile.is_loading() || profile.is_follow_pending()
            })
            || self.login.as_ref().is_some_and(|login| login.busy)
    }

    fn active_video(&self) -> Option<Video> {
        self.feed().active_video().cloned()
    }

    fn poll_async(&mut self) -> bool {
        let mut changed = self.home.poll();
        if let Some(profile) = &mut self.profile {
            changed |= profile.poll();
        }
        changed |= self.comments.poll();

        if let Some(err) = self.home.take_error() {
            self.status_message = format!("Error: {err}");
            changed = true;
        }
        if let Some(err) = self.profile.as_mut().and_then(|profile| profile.take_error()) {
            self.status_message = format!("Error: {err}");
            changed = true;
        }

        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message);
            changed = true;
        }
        changed
    }

    fn handle_message(&mut self, message: UiMessage) {
        match message {
            UiMessage::SignedIn { result, pending } => match result {
                Ok(user) => {
                    self.login = None;
                    self.status_message = format!("Signed in as @{}.", user.handle);
                    self.after_session_change();
                    if let Some(pending) = pending {
                        self.resume(pending);
                    }
                }
                Err(err) => {
                    if let Some(login) = &mut self.login {
                        login.busy = false;
                        login.error = Some(format!("{err:#}"));
                    }
                }
            },
        }
    }

    fn resume(&mut self, pending: Pending) {
        match pending {
            Pending::Like(video_id) => {
                let outcome = self.feed_mut().toggle_like(&video_id);
                self.report(outcome, "Like sent.");
            }
            Pending::Follow => self.toggle_follow(),
            Pending::Comment => {
                let outcome = self.comments.post();
                self.report(outcome, "Posting comment…");
            }
        }
    }

    /// The recommended feed depends on the viewer, so it starts over.
    fn after_session_change(&mut self) {
        self.player.stop();
        self.home_scroll = 0;
        self.home.reset();
        if let Some(profile) = &mut self.profile {
            profile.load();
        }
        self.mark_dirty();
    }

    fn advance_sheet(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame);
        self.last_frame = now;
        if !self.comments.sheet().is_animating() {
            return;
        }
        if let Some(SheetEvent::Closed) = self.comments.tick(dt) {
            self.comment_scroll = 0;
        }
        self.mark_dirty();
    }

    fn poll_player(&mut self) {
        if let Some(status) = self.player.poll_exit() {
            self.status_message = match status {
                Ok(status) if status.success() => "Playback finished.".to_string(),
                Ok(status) => format!("Player exited with {status}."),
                Err(err) => format!("Player error: {err:#}"),
            };
            self.mark_dirty();
        }
    }

    /// Reports which cards are on screen and applies the resulting
    /// playback switch.
    fn sync_visibility(&mut self) {
        let rows = self.reel_rows.get() as usize;
        if rows == 0 {
            return;
        }
        let items = viewable_items(self.feed().videos().len(), self.scroll(), rows);
        if let Some(switch) = self.feed_mut().on_viewable_items_changed(&items) {
            self.apply_switch(switch);
            self.mark_dirty();
        }
    }

    fn apply_switch(&mut self, switch: PlaybackSwitch) {
        let next = switch
            .start
            .and_then(|index| self.feed().videos().get(index).cloned());
        match next {
            Some(video) => {
                if let Err(err) = self.player.start(&video) {
                    warn!(error = %format!("{err:#}"), video = %video.id, "playback failed");
                    self.status_message = format!("Cannot play {}: {err:#}", video.title);
                }
                if self.comments.sheet().is_visible() {
                    self.comments.bind(&video.id);
                    self.comment_scroll = 0;
                }
            }
            None => self.player.stop(),
        }
    }

    fn scroll_rows(&mut self, delta: isize) {
        let len = self.feed().videos().len();
        let max = len.saturating_sub(1) * CARD_HEIGHT;
        let next = self.scroll().saturating_add_signed(delta).min(max);
        if next != self.scroll() {
            self.set_scroll(next);
            self.mark_dirty();
        }
    }

    /// Snaps the reel to the card after (or before) the first one on screen.
    fn page(&mut self, delta: isize) {
        let current = self.scroll() / CARD_HEIGHT;
        let target = current.saturating_add_signed(delta);
        let len = self.feed().videos().len();
        if len == 0 {
            return;
        }
        let target = target.min(len - 1);
        self.set_scroll(target * CARD_HEIGHT);
        self.mark_dirty();
        if delta > 0 && target + 1 >= len && self.feed_mut().near_end(target) {
            self.status_message = "Loading more recipes…".to_string();
        }
    }

    fn report(&mut self, outcome: Outcome, dispatched: &str) {
        match outcome {
            Outcome::Dispatched => self.status_message = dispatched.to_string(),
            Outcome::LoginRequired => self.status_message = "Sign in first.".to_string(),
            Outcome::Ignored => {}
        }
        self.mark_dirty();
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        if self.login.is_some() {
            self.handle_login_key(code);
            return Ok(false);
        }
        if self.comments.sheet().is_visible() {
            return self.handle_comments_key(code);
        }

        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('h') => {
                if self.profile.is_some() {
                    self.close_profile();
                }
            }
            KeyCode::Down | KeyCode::Char('j') => self.page(1),
            KeyCode::Up | KeyCode::Char('k') => self.page(-1),
            KeyCode::PageDown => self.scroll_rows(1),
            KeyCode::PageUp => self.scroll_rows(-1),
            KeyCode::Char('g') | KeyCode::Home => {
                self.set_scroll(0);
                self.mark_dirty();
            }
            KeyCode::Char('l') => self.like_active(),
            KeyCode::Char('c') | KeyCode::Enter => self.open_comments(),
            KeyCode::Char('s') => self.share_active()?,
            KeyCode::Char('a') => {
                if let Some(owner) = self
                    .active_video()
                    .and_then(|video| video.owner_id.clone())
                {
                    self.open_profile(&owner);
                }
            }
            KeyCode::Char('p') => {
                if let Some(user_id) = self.session.current_user_id() {
                    self.open_profile(&user_id);
                } else {
                    self.open_login(None);
                }
            }
            KeyCode::Char('f') => self.toggle_follow(),
            KeyCode::Char('r') => {
                self.player.stop();
                self.set_scroll(0);
                self.feed_mut().reset();
                self.status_message = format!("Refreshing {}…", self.feed().label());
                self.mark_dirty();
            }
            KeyCode::Char('L') => self.open_login(None),
            KeyCode::Char('O') => {
                self.session.sign_out()?;
                self.status_message = "Signed out.".to_string();
                self.after_session_change();
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_comments_key(&mut self, code: KeyCode) -> Result<bool> {
        match code {
            KeyCode::Esc => self.comments.close(),
            KeyCode::Enter => {
                let outcome = self.comments.post();
                if outcome == Outcome::LoginRequired {
                    self.open_login(Some(Pending::Comment));
                } else {
                    self.report(outcome, "Posting comment…");
                }
            }
            KeyCode::Backspace => self.comments.pop_char(),
            KeyCode::Up => self.comment_scroll = self.comment_scroll.saturating_sub(1),
            KeyCode::Down => self.comment_scroll = self.comment_scroll.saturating_add(1),
            KeyCode::Char(ch) => self.comments.push_char(ch),
            _ => {}
        }
        self.mark_dirty();
        Ok(false)
    }

    fn handle_login_key(&mut self, code: KeyCode) {
        let Some(login) = &mut self.login else {
            return;
        };
        if login.busy {
            if code == KeyCode::Esc {
                self.login = None;
            }
            self.mark_dirty();
            return;
        }
        match code {
            KeyCode::Esc => {
                self.login = None;
                self.status_message = "Sign in cancelled.".to_string();
            }
            KeyCode::Up => login.selected = login.selected.saturating_sub(1),
            KeyCode::Down => {
                if login.selected + 1 < login.known.len() {
                    login.selected += 1;
                }
            }
            KeyCode::Tab => {
                if let Some(known) = login.known.get(login.selected) {
                    login.input = known.user_id.clone();
                }
            }
            KeyCode::Backspace => {
                login.input.pop();
            }
            KeyCode::Char(ch) => login.input.push(ch),
            KeyCode::Enter => {
                let user_id = if login.input.trim().is_empty() {
                    login
                        .known
                        .get(login.selected)
                        .map(|known| known.user_id.clone())
                        .unwrap_or_default()
                } else {
                    login.input.trim().to_string()
                };
                if user_id.is_empty() {
                    login.error = Some("Type a user id.".to_string());
                } else {
                    login.busy = true;
                    login.error = None;
                    let pending = login.pending.clone();
                    self.sign_in(user_id, pending);
                }
            }
            _ => {}
        }
        self.mark_dirty();
    }

    fn sign_in(&self, user_id: String, pending: Option<Pending>) {
        let session = self.session.clone();
        let users = self.services.users.clone();
        let tx = self.tx.clone();
        self.executor.spawn(Box::new(move || {
            let result = session.sign_in(users.as_ref(), &user_id);
            let _ = tx.send(UiMessage::SignedIn { result, pending });
        }));
    }

    fn open_login(&mut self, pending: Option<Pending>) {
        let known = match self.session.known_users() {
            Ok(known) => known,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "known users unavailable");
                Vec::new()
            }
        };
        self.login = Some(LoginPrompt {
            input: String::new(),
            known,
            selected: 0,
            pending,
            busy: false,
            error: None,
        });
        self.mark_dirty();
    }

    fn handle_mouse(&mut self, event: MouseEvent) -> Result<()> {
        if self.login.is_some() {
            return Ok(());
        }
        let sheet_visible = self.comments.sheet().is_visible();
        let sheet_area = self.sheet_area.get();
        let in_sheet = sheet_visible && contains(sheet_area, event.column, event.row);

        match event.kind {
            MouseEventKind::Down(MouseButton::Left) if in_sheet => {
                self.drag = Some(Drag {
                    column: event.column,
                    row: event.row,
                });
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let Some(drag) = &self.drag else {
                    return Ok(());
                };
                let dx = (event.column as f32 - drag.column as f32) * COL_POINTS;
                let dy = (event.row as f32 - drag.row as f32) * ROW_POINTS;
                let sheet = self.comments.sheet_mut();
                if sheet.state() != SheetState::Dragging && sheet.should_capture(dx, dy) {
                    sheet.begin_drag();
                }
                sheet.drag_to(dy);
                self.mark_dirty();
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if let Some(drag) = self.drag.take() {
                    let dy = (event.row as f32 - drag.row as f32) * ROW_POINTS;
                    self.comments.sheet_mut().release(dy);
                    self.mark_dirty();
                }
            }
            MouseEventKind::ScrollDown if in_sheet => {
                self.comment_scroll = self.comment_scroll.saturating_add(1);
                self.mark_dirty();
            }
            MouseEventKind::ScrollUp if in_sheet => {
                self.comment_scroll = self.comment_scroll.saturating_sub(1);
                self.mark_dirty();
            }
            MouseEventKind::ScrollDown if !sheet_visible => self.scroll_rows(1),
            MouseEventKind::ScrollUp if !sheet_visible => self.scroll_rows(-1),
            _ => {}
        }
        Ok(())
    }

    fn like_active(&mut self) {
        let Some(video) = self.active_video() else {
            return;
        };
        match self.feed_mut().toggle_like(&video.id) {
            Outcome::LoginRequired => self.open_login(Some(Pending::Like(video.id))),
            outcome => self.report(outcome, "Like sent."),
        }
    }

    fn open_comments(&mut self) {
        let Some(video) = self.active_video() else {
            return;
        };
        self.comment_scroll = 0;
        self.comments.open(&video.id);
        // Opening the sheet counts as engaging with the comments. Guests
        // still get to read them.
        match self
            .feed_mut()
            .record_interaction(InteractionKind::Comment, &video.id)
        {
            Outcome::Dispatched => {}
            Outcome::LoginRequired | Outcome::Ignored => {
                debug!(video = %video.id, "comment engagement not recorded");
            }
        }
        self.mark_dirty();
    }

    fn share_active(&mut self) -> Result<()> {
        let Some(video) = self.active_video() else {
            return Ok(());
        };
        let Some(shared) = self.feed_mut().share(&video.id) else {
            return Ok(());
        };
        let mut clipboard =
            arboard::Clipboard::new().map_err(|err| anyhow!("open clipboard: {}", err))?;
        clipboard
            .set_text(shared.link.message.clone())
            .map_err(|err| anyhow!("copy share link: {}", err))?;
        info!(video = %video.id, "share link copied");
        self.status_message = format!("Copied: {}", shared.link.url);
        self.mark_dirty();
        Ok(())
    }

    fn open_profile(&mut self, user_id: &str) {
        if self.profile.as_ref().is_some_and(|profile| profile.user_id() == user_id) {
            return;
        }
        if let Some(mut previous) = self.profile.take() {
            previous.teardown();
        }
        if self.profile.is_none() {
            self.home.blur();
        }
        self.player.stop();
        self.comments.close();
        let feed = FeedController::new(
            (self.services.user_videos)(user_id),
            self.services.interactions.clone(),
            self.session.clone(),
            self.executor.clone(),
            self.settings.clone(),
        );
        let mut profile = ProfileView::new(
            user_id,
            feed,
            self.services.users.clone(),
            self.session.clone(),
            self.executor.clone(),
        );
        profile.load();
        self.profile = Some(profile);
        self.profile_scroll = 0;
        self.status_message = "Loading profile…".to_string();
        self.mark_dirty();
    }

    fn close_profile(&mut self) {
        if let Some(mut profile) = self.profile.take() {
            profile.teardown();
        }
        self.player.stop();
        self.status_message = format!("Back to {}.", self.home.label());
        self.mark_dirty();
    }

    fn toggle_follow(&mut self) {
        let Some(profile) = &mut self.profile else {
            return;
        };
        match profile.toggle_follow() {
            Outcome::LoginRequired => self.open_login(Some(Pending::Follow)),
            Outcome::Dispatched => {
                self.status_message = "Updating follow…".to_string();
                self.mark_dirty();
            }
            Outcome::Ignored => {}
        }
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let full = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), full);

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(full);

        let status_text = if self.is_loading() {
            format!("{} {}", self.spinner.frame(), self.status_message)
                .trim()
                .to_string()
        } else {
            self.status_message.clone()
        };
        let status_line = Paragraph::new(status_text).style(
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .bg(COLOR_PANEL_FOCUSED_BG)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, layout[0]);

        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(layout[1]);

        let reel_area = if self.profile.is_some() {
            let split = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(PROFILE_HEADER_ROWS + 2), Constraint::Min(0)])
                .split(panes[0]);
            self.draw_profile_header(frame, split[0]);
            split[1]
        } else {
            panes[0]
        };
        self.draw_reel(frame, reel_area);
        self.draw_detail(frame, panes[1]);

        let footer = Paragraph::new(self.footer_text())
            .style(
                Style::default()
                    .fg(COLOR_TEXT_SECONDARY)
                    .bg(COLOR_PANEL_BG)
                    .add_modifier(Modifier::ITALIC),
            )
            .alignment(Alignment::Center);
        frame.render_widget(footer, layout[2]);

        if self.comments.sheet().is_visible() {
            self.draw_comments(frame, layout[1]);
        } else {
            self.sheet_area.set(Rect::default());
        }
        if self.login.is_some() {
            self.draw_login(frame, layout[1]);
        }
    }

    fn pane_block(title: String, focused: bool) -> Block<'static> {
        let border_style = if focused {
            Style::default().fg(COLOR_BORDER_FOCUSED)
        } else {
            Style::default().fg(COLOR_BORDER_IDLE)
        };
        let title_style = if focused {
            Style::default()
                .fg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        Block::default()
            .title(Span::styled(title, title_style))
            .borders(Borders::ALL)
            .border_style(border_style)
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::horizontal(1))
    }

    fn draw_profile_header(&self, frame: &mut Frame<'_>, area: Rect) {
        let Some(profile) = &self.profile else {
            return;
        };
        let block = Self::pane_block("Profile".to_string(), false);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let mut lines = Vec::new();
        match profile.user() {
            Some(user) => {
                lines.push(Line::from(vec![
                    Span::styled(
                        user.display_name().to_string(),
                        Style::default()
                            .fg(COLOR_TEXT_PRIMARY)
                            .add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("  @{}", user.handle),
                        Style::default().fg(COLOR_TEXT_SECONDARY),
                    ),
                ]));
                lines.push(Line::from(Span::styled(
                    format!(
                        "{} followers · {} following",
                        user.followers.len(),
                        user.following.len()
                    ),
                    Style::default().fg(COLOR_TEXT_SECONDARY),
                )));
                let follow = if profile.is_own_profile() {
                    Span::styled("This is you", Style::default().fg(COLOR_SUCCESS))
                } else if profile.is_follow_pending() {
                    Span::styled(
                        format!("{} …", self.spinner.frame()),
                        Style::default().fg(COLOR_ACCENT),
                    )
                } else if profile.is_following() {
                    Span::styled("[f] Unfollow", Style::default().fg(COLOR_TEXT_SECONDARY))
                } else {
                    Span::styled(
                        "[f] Follow",
                        Style::default()
                            .fg(COLOR_ACCENT)
                            .add_modifier(Modifier::BOLD),
                    )
                };
                lines.push(Line::from(follow));
            }
            None if profile.is_loading() => lines.push(Line::from(Span::styled(
                format!("{} Loading profile…", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            ))),
            None => lines.push(Line::from(Span::styled(
                format!("User {} not available.", profile.user_id()),
                Style::default().fg(COLOR_ERROR),
            ))),
        }
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn draw_reel(&self, frame: &mut Frame<'_>, area: Rect) {
        let feed = self.feed();
        let block = Self::pane_block(feed.label(), true);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        self.reel_rows.set(inner.height);

        let viewer = self.session.current_user_id();
        let width = inner.width;
        let active = feed.active_index();
        let mut lines: Vec<Line<'static>> = Vec::new();
        for (index, video) in feed.videos().iter().enumerate() {
            let mut card = video_card(
                video,
                feed.like_view(video),
                feed.is_like_pending(&video.id),
                active == Some(index),
                viewer.as_deref(),
            );
            if active == Some(index) {
                pad_lines_to_width(&mut card, width);
            }
            lines.extend(card);
        }

        if feed.is_loading() {
            lines.push(Line::from(Span::styled(
                format!("{} Loading recipes…", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            )));
        } else if feed.videos().is_empty() {
            lines.push(Line::from(Span::styled(
                "No recipes here yet. Press r to refresh.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        } else if feed.is_exhausted() {
            lines.push(Line::from(Span::styled(
                "You reached the end of the feed.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        }

        let visible: Vec<Line<'static>> = lines
            .into_iter()
            .skip(self.scroll())
            .take(inner.height as usize)
            .collect();
        frame.render_widget(Paragraph::new(visible), inner);
    }

    fn draw_detail(&self, frame: &mut Frame<'_>, area: Rect) {
        let block = Self::pane_block("Now playing".to_string(), false);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let feed = self.feed();
        let Some(video) = feed.active_video() else {
            let hint = Paragraph::new("Scroll the feed to start a recipe.")
                .style(Style::default().fg(COLOR_TEXT_SECONDARY))
                .wrap(Wrap { trim: true });
            frame.render_widget(hint, inner);
            return;
        };

        let width = inner.width.max(1) as usize;
        let mut lines = vec![
            Line::from(Span::styled(
                video.title.clone(),
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                format!("@{}", video.author_handle()),
                Style::default().fg(COLOR_ACCENT),
            )),
            Line::default(),
        ];
        for row in wrap(&video.description, width) {
            lines.push(Line::from(Span::styled(
                row.into_owned(),
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )));
        }
        lines.push(Line::default());

        let view = feed.like_view(video);
        let mut stats = vec![like_span(view.liked, view.count, Style::default())];
        stats.push(Span::styled(
            format!("  💬 {}", video.comments.len()),
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));
        if let Some(duration) = video.duration {
            stats.push(Span::styled(
                format!("  ⏱ {}", format_duration(duration)),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        }
        lines.push(Line::from(stats));
        if !video.tags.is_empty() {
            lines.push(Line::from(Span::styled(
                hashtags(&video.tags),
                Style::default().fg(COLOR_ACCENT),
            )));
        }
        lines.push(Line::default());
        let playback = match self.player.now_playing() {
            Some(id) if id == video.id => "▶ playing in external player",
            _ => "■ not playing",
        };
        lines.push(Line::from(Span::styled(
            playback,
            Style::default().fg(COLOR_TEXT_SECONDARY),
        )));
        lines.push(Line::from(Span::styled(
            video.url.clone(),
            Style::default()
                .fg(COLOR_TEXT_SECONDARY)
                .add_modifier(Modifier::DIM),
        )));

        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    }

    fn draw_comments(&self, frame: &mut Frame<'_>, body: Rect) {
        let sheet = self.comments.sheet();
        let offset_rows = (sheet.offset() / ROW_POINTS).round().max(0.0) as u16;
        let area = sheet_rect(body, offset_rows);
        self.sheet_area.set(area);
        if area.height == 0 {
            return;
        }

        let title = format!("Comments ({})", self.comments.comments().len());
        let block = Block::default()
            .title(Span::styled(
                title,
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
            .style(Style::default().bg(COLOR_PANEL_FOCUSED_BG))
            .padding(Padding::horizontal(1));
        let inner = block.inner(area);
        frame.render_widget(Clear, area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let parts = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(inner);

        let handle = Paragraph::new("━━━━━━")
            .alignment(Alignment::Center)
            .style(Style::default().fg(COLOR_TEXT_SECONDARY));
        frame.render_widget(handle, parts[0]);

        let width = parts[1].width.max(1) as usize;
        let now = Utc::now();
        let mut lines: Vec<Line<'static>> = Vec::new();
        if self.comments.is_loading() && self.comments.comments().is_empty() {
            lines.push(Line::from(Span::styled(
                format!("{} Loading comments…", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            )));
        } else if let Some(err) = self.comments.error() {
            lines.push(Line::from(Span::styled(
                err.to_string(),
                Style::default().fg(COLOR_ERROR),
            )));
        } else if self.comments.comments().is_empty() {
            lines.push(Line::from(Span::styled(
                "No comments yet. Be the first!",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        }
        for comment in self.comments.comments() {
            let when = comment
                .posted_at()
                .map(|at| relative_time(at, now))
                .unwrap_or_default();
            lines.push(Line::from(vec![
                Span::styled(
                    format!("@{}", comment.author_handle),
                    Style::default()
                        .fg(COLOR_ACCENT)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("  {when}"),
                    Style::default().fg(COLOR_TEXT_SECONDARY),
                ),
            ]));
            for row in wrap(&comment.text, width) {
                lines.push(Line::from(Span::styled(
                    row.into_owned(),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                )));
            }
            lines.push(Line::default());
        }
        let max_scroll = lines.len().saturating_sub(parts[1].height as usize);
        let visible: Vec<Line<'static>> = lines
            .into_iter()
            .skip(self.comment_scroll.min(max_scroll))
            .collect();
        frame.render_widget(Paragraph::new(visible), parts[1]);

        let composer = if self.comments.is_posting() {
            Line::from(Span::styled(
                format!("{} Sending…", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            ))
        } else if self.comments.draft().is_empty() && !self.session.is_signed_in() {
            Line::from(Span::styled(
                "Type a comment; you will be asked to sign in.",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ))
        } else {
            Line::from(vec![
                Span::styled("> ", Style::default().fg(COLOR_ACCENT)),
                Span::styled(
                    format!("{}▏", self.comments.draft()),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                ),
            ])
        };
        frame.render_widget(
            Paragraph::new(composer).style(Style::default().bg(COLOR_PANEL_SELECTED_BG)),
            parts[2],
        );
    }

    fn draw_login(&self, frame: &mut Frame<'_>, body: Rect) {
        let Some(login) = &self.login else {
            return;
        };
        let area = centered_rect(60, 60, body);
        frame.render_widget(Clear, area);
        let block = Block::default()
            .title(Span::styled(
                "Sign in",
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            ))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER_FOCUSED))
            .style(Style::default().bg(COLOR_PANEL_FOCUSED_BG))
            .padding(Padding::uniform(1));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let mut lines = vec![
            Line::from(Span::styled(
                "User id:",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            Line::from(Span::styled(
                format!("{}▏", login.input),
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .bg(COLOR_PANEL_SELECTED_BG),
            )),
            Line::default(),
        ];
        if login.busy {
            lines.push(Line::from(Span::styled(
                format!("{} Signing in…", self.spinner.frame()),
                Style::default().fg(COLOR_ACCENT),
            )));
        } else if let Some(err) = &login.error {
            lines.push(Line::from(Span::styled(
                err.clone(),
                Style::default().fg(COLOR_ERROR),
            )));
        }
        if !login.known.is_empty() {
            lines.push(Line::from(Span::styled(
                "Recent accounts (Tab to use):",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
            for (index, known) in login.known.iter().enumerate() {
                let selected = index == login.selected;
                let style = if selected {
                    Style::default()
                        .fg(COLOR_TEXT_PRIMARY)
                        .bg(COLOR_PANEL_SELECTED_BG)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(COLOR_TEXT_PRIMARY)
                };
                let marker = if selected { "›" } else { " " };
                lines.push(Line::from(Span::styled(
                    format!("{marker} @{}  {}", known.handle, known.user_id),
                    style,
                )));
            }
        }
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "Enter: sign in · Esc: cancel",
            Style::default()
                .fg(COLOR_TEXT_SECONDARY)
                .add_modifier(Modifier::ITALIC),
        )));
        frame.render_widget(Paragraph::new(lines), inner);
    }

    fn footer_text(&self) -> String {
        if self.login.is_some() {
            return "type a user id · ↑/↓ recent · Tab fill · Enter sign in · Esc cancel"
                .to_string();
        }
        if self.comments.sheet().is_visible() {
            return "type to comment · Enter send · ↑/↓ scroll · drag down or Esc to close"
                .to_string();
        }
        let who = match self.session.current_user() {
            Some(user) => format!("@{}", user.handle),
            None => "guest".to_string(),
        };
        if self.profile.is_some() {
            format!("{who} · j/k move · l like · c comments · s share · f follow · Esc back · q quit")
        } else {
            format!(
                "{who} · j/k move · l like · c comments · s share · a author · p me · r refresh · L sign in · O sign out · q quit"
            )
        }
    }
}

fn video_card(
    video: &Video,
    likes: crate::feed::LikeView,
    pending: bool,
    active: bool,
    viewer: Option<&str>,
) -> Vec<Line<'static>> {
    let background = if active {
        COLOR_PANEL_SELECTED_BG
    } else {
        COLOR_PANEL_BG
    };
    let base = Style::default().bg(background);
    let marker = if active { "▶ " } else { "  " };
    let title_style = if active {
        base.fg(COLOR_ACCENT).add_modifier(Modifier::BOLD)
    } else {
        base.fg(COLOR_TEXT_PRIMARY).add_modifier(Modifier::BOLD)
    };

    let when = video
        .created_at()
        .map(|at| format!(" · {}", relative_time(at, Utc::now())))
        .unwrap_or_default();
    let mine = viewer.is_some_and(|id| video.is_owned_by(id));
    let author = if mine {
        format!("@{} (you){when}", video.author_handle())
    } else {
        format!("@{}{when}", video.author_handle())
    };

    let mut stats = vec![Span::styled("  ", base), like_span(likes.liked, likes.count, base)];
    if pending {
        stats.push(Span::styled(" …", base.fg(COLOR_TEXT_SECONDARY)));
    }
    stats.push(Span::styled(
        format!("  💬 {}", video.comments.len()),
        base.fg(COLOR_TEXT_SECONDARY),
    ));
    if let Some(duration) = video.duration {
        stats.push(Span::styled(
            format!("  ⏱ {}", format_duration(duration)),
            base.fg(COLOR_TEXT_SECONDARY),
        ));
    }

    vec![
        Line::from(vec![
            Span::styled(marker, base.fg(COLOR_ACCENT)),
            Span::styled(video.title.clone(), title_style),
        ]),
        Line::from(Span::styled(
            format!("  {author}"),
            base.fg(COLOR_TEXT_SECONDARY),
        )),
        Line::from(stats),
        Line::from(Span::styled(
            format!("  {}", hashtags(&video.tags)),
            base.fg(COLOR_ACCENT),
        )),
        Line::default(),
    ]
}

fn like_span(liked: bool, count: usize, base: Style) -> Span<'static> {
    if liked {
        Span::styled(format!("♥ {count}"), base.fg(COLOR_LIKED))
    } else {
        Span::styled(format!("♡ {count}"), base.fg(COLOR_TEXT_SECONDARY))
    }
}

fn hashtags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn pad_lines_to_width(lines: &mut [Line<'static>], width: u16) {
    let width = width as usize;
    if width == 0 {
        return;
    }

    for line in lines {
        let mut current_width = 0usize;
        for span in &line.spans {
            current_width =
                current_width.saturating_add(UnicodeWidthStr::width(span.content.as_ref()));
        }
        if current_width >= width {
            continue;
        }
        let pad_style = Style::default().bg(COLOR_PANEL_SELECTED_BG);
        let padding = " ".repeat(width - current_width);
        line.spans.push(Span::styled(padding, pad_style));
    }
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x
        && column < area.x.saturating_add(area.width)
        && row >= area.y
        && row < area.y.saturating_add(area.height)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let percent_x = percent_x.min(100);
    let percent_y = percent_y.min(100);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage(100 - percent_x - (100 - percent_x) / 2),
        ])
        .split(area);
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage(100 - percent_y - (100 - percent_y) / 2),
        ])
        .split(horizontal[1]);
    vertical[1]
}

/// Cards of a reel scrolled down by `scroll` rows, with the share of each
/// card inside a viewport of `rows` rows. Cards fully off screen are left
/// out.
fn viewable_items(len: usize, scroll: usize, rows: usize) -> Vec<ViewableItem> {
    let mut items = Vec::new();
    let first = scroll / CARD_HEIGHT;
    for index in first..len {
        let top = index * CARD_HEIGHT;
        if top >= scroll + rows {
            break;
        }
        let bottom = top + CARD_HEIGHT;
        let shown_top = top.max(scroll);
        let shown_bottom = bottom.min(scroll + rows);
        let shown = shown_bottom.saturating_sub(shown_top);
        if shown == 0 {
            continue;
        }
        items.push(ViewableItem::new(
            index,
            shown as f32 / CARD_HEIGHT as f32,
        ));
    }
    items
}

/// Where the sheet sits inside `body` when it is `offset_rows` below its
/// open position. The part pushed past the bottom is cut off.
fn sheet_rect(body: Rect, offset_rows: u16) -> Rect {
    let height = (body.height as u32 * SHEET_HEIGHT_PERCENT as u32 / 100) as u16;
    let open_top = body.y + body.height - height;
    let top = open_top.saturating_add(offset_rows).min(body.y + body.height);
    Rect {
        x: body.x,
        y: top,
        width: body.width,
        height: body.y + body.height - top,
    }
}

fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86_399 => format!("{}h", secs / 3600),
        86_400..=604_799 => format!("{}d", secs / 86_400),
        _ => then.format("%d/%m/%Y").to_string(),
    }
}

fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn viewable_items_report_partial_cards() {
        let items = viewable_items(10, 0, 12);
        assert_eq!(
            items,
            vec![
                ViewableItem::new(0, 1.0),
                ViewableItem::new(1, 1.0),
                ViewableItem::new(2, 0.4),
            ]
        );

        let items = viewable_items(10, 2, 12);
        assert_eq!(items[0], ViewableItem::new(0, 0.6));
        assert!(!items[0].is_visible());
        assert!(items[1].is_visible());
    }

    #[test]
    fn viewable_items_stop_at_end_of_list() {
        let items = viewable_items(2, 5, 40);
        assert_eq!(items, vec![ViewableItem::new(1, 1.0)]);
        assert!(viewable_items(0, 0, 40).is_empty());
    }

    #[test]
    fn sheet_slides_down_with_offset() {
        let body = Rect::new(0, 1, 80, 40);
        let open = sheet_rect(body, 0);
        assert_eq!(open.height, 26);
        assert_eq!(open.y + open.height, 41);

        let dragged = sheet_rect(body, 10);
        assert_eq!(dragged.y, open.y + 10);
        assert_eq!(dragged.height, 16);

        let gone = sheet_rect(body, 100);
        assert_eq!(gone.height, 0);
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(relative_time(now, now), "just now");
        assert_eq!(
            relative_time(now - chrono::Duration::minutes(5), now),
            "5m"
        );
        assert_eq!(relative_time(now - chrono::Duration::hours(3), now), "3h");
        assert_eq!(relative_time(now - chrono::Duration::days(2), now), "2d");
        assert_eq!(
            relative_time(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(), now),
            "02/01/2024"
        );
    }

    #[test]
    fn durations_are_minutes_and_seconds() {
        assert_eq!(format_duration(45.0), "0:45");
        assert_eq!(format_duration(125.4), "2:05");
        assert_eq!(format_duration(-3.0), "0:00");
    }

    #[test]
    fn point_inside_rect() {
        let area = Rect::new(2, 3, 4, 2);
        assert!(contains(area, 2, 3));
        assert!(contains(area, 5, 4));
        assert!(!contains(area, 6, 4));
        assert!(!contains(area, 2, 5));
    }
}
