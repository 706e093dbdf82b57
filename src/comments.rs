use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use crate::data::CommentService;
use crate::feed::Outcome;
use crate::model::Comment;
use crate::session::Session;
use crate::task::Executor;

pub const SHEET_ANIMATION: Duration = Duration::from_millis(300);
/// Drag distance, in points, past which releasing the sheet dismisses it.
pub const DISMISS_DISTANCE: f32 = 100.0;
const CAPTURE_MIN_DY: f32 = 5.0;
const DEFAULT_SHEET_HEIGHT: f32 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetState {
    Closed,
    Opening,
    Open,
    Dragging,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetEvent {
    Opened,
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct Animation {
    from: f32,
    to: f32,
    elapsed: Duration,
    then: SheetState,
}

/// Bottom sheet that slides up over the feed and is dismissed by dragging
/// it down.
///
/// `offset` is how far the sheet sits below its open position, in points.
#[derive(Debug, Clone)]
pub struct Sheet {
    state: SheetState,
    offset: f32,
    height: f32,
    animation: Option<Animation>,
}

impl Default for Sheet {
    fn default() -> Self {
        Self {
            state: SheetState::Closed,
            offset: DEFAULT_SHEET_HEIGHT,
            height: DEFAULT_SHEET_HEIGHT,
            animation: None,
        }
    }
}

impl Sheet {
    pub fn state(&self) -> SheetState {
        self.state
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn is_visible(&self) -> bool {
        self.state != SheetState::Closed
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    pub fn set_height(&mut self, height: f32) {
        let height = height.max(1.0);
        if self.state == SheetState::Closed {
            self.offset = height;
        }
        self.height = height;
    }

    pub fn open(&mut self) {
        if self.state != SheetState::Closed {
            return;
        }
        self.state = SheetState::Opening;
        self.animate(0.0, SheetState::Open);
    }

    /// Dismisses the sheet without a gesture.
    pub fn close(&mut self) {
        if matches!(self.state, SheetState::Closed | SheetState::Closing) {
            return;
        }
        self.state = SheetState::Closing;
        self.animate(self.height, SheetState::Closed);
    }

    /// Whether a move of `(dx, dy)` from the press point should be taken as
    /// a sheet drag: mostly vertical and downwards.
    pub fn should_capture(&self, dx: f32, dy: f32) -> bool {
        self.state == SheetState::Open && dy > CAPTURE_MIN_DY && dx.abs() < dy.abs()
    }

    pub fn begin_drag(&mut self) -> bool {
        if self.state != SheetState::Open {
            return false;
        }
        self.animation = None;
        self.state = SheetState::Dragging;
        true
    }

    /// Follows the finger. The sheet never moves above its open position.
    pub fn drag_to(&mut self, dy: f32) {
        if self.state == SheetState::Dragging {
            self.offset = dy.max(0.0);
        }
    }

    pub fn release(&mut self, dy: f32) {
        if self.state != SheetState::Dragging {
            return;
        }
        self.offset = dy.max(0.0);
        if self.offset > DISMISS_DISTANCE {
            self.state = SheetState::Closing;
            self.animate(self.height, SheetState::Closed);
        } else {
            self.state = SheetState::Open;
            self.animate(0.0, SheetState::Open);
        }
    }

    /// Advances the running animation. Emits an event when the sheet
    /// finishes opening or closing.
    pub fn tick(&mut self, dt: Duration) -> Option<SheetEvent> {
        let mut animation = self.animation?;
        animation.elapsed += dt;
        if animation.elapsed >= SHEET_ANIMATION {
            self.offset = animation.to;
            self.animation = None;
            let before = self.state;
            self.state = animation.then;
            return match (before, animation.then) {
                (SheetState::Closing, SheetState::Closed) => Some(SheetEvent::Closed),
                (SheetState::Opening, SheetState::Open) => Some(SheetEvent::Opened),
                _ => None,
            };
        }
        let t = animation.elapsed.as_secs_f32() / SHEET_ANIMATION.as_secs_f32();
        let eased = 1.0 - (1.0 - t).powi(3);
        self.offset = animation.from + (animation.to - animation.from) * eased;
        self.animation = Some(animation);
        None
    }

    fn animate(&mut self, to: f32, then: SheetState) {
        self.animation = Some(Animation {
            from: self.offset,
            to,
            elapsed: Duration::ZERO,
            then,
        });
    }
}

enum CommentMessage {
    Loaded {
        generation: u64,
        result: Result<Vec<Comment>>,
    },
    Posted {
        generation: u64,
        result: Result<()>,
    },
}

/// Comment list and composer for one video, shown in a [`Sheet`].
pub struct CommentsOverlay {
    sheet: Sheet,
    service: Arc<dyn CommentService>,
    session: Arc<Session>,
    executor: Arc<dyn Executor>,
    target: Option<String>,
    comments: Vec<Comment>,
    loading: bool,
    draft: String,
    posting: bool,
    error: Option<String>,
    generation: u64,
    alive: Arc<AtomicBool>,
    tx: Sender<CommentMessage>,
    rx: Receiver<CommentMessage>,
}

impl CommentsOverlay {
    pub fn new(
        service: Arc<dyn CommentService>,
        session: Arc<Session>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            sheet: Sheet::default(),
            service,
            session,
            executor,
            target: None,
            comments: Vec::new(),
            loading: false,
            draft: String::new(),
            posting: false,
            error: None,
            generation: 0,
            alive: Arc::new(AtomicBool::new(true)),
            tx,
            rx,
        }
    }

    pub fn sheet(&self) -> &Sheet {
        &self.sheet
    }

    pub fn sheet_mut(&mut self) -> &mut Sheet {
        &mut self.sheet
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_posting(&self) -> bool {
        self.posting
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn push_char(&mut self, ch: char) {
        self.draft.push(ch);
    }

    pub fn pop_char(&mut self) {
        self.draft.pop();
    }

    /// Opens the sheet on `video_id`.
    pub fn open(&mut self, video_id: &str) {
        self.bind(video_id);
        self.sheet.open();
    }

    pub fn close(&mut self) {
        self.sheet.close();
    }

    /// Points the overlay at another video: the list and draft are dropped
    /// and comments are fetched again.
    pub fn bind(&mut self, video_id: &str) {
        if !self.is_alive() {
            return;
        }
        self.generation = self.generation.wrapping_add(1);
        self.target = Some(video_id.to_string());
        self.comments.clear();
        self.draft.clear();
        self.error = None;
        self.posting = false;
        self.refresh();
    }

    pub fn refresh(&mut self) {
        if !self.is_alive() {
            return;
        }
        let Some(video_id) = self.target.clone() else {
            return;
        };
        self.loading = true;
        let generation = self.generation;
        let service = self.service.clone();
        let tx = self.tx.clone();
        let alive = self.alive.clone();
        debug!(video = %video_id, "loading comments");
        self.executor.spawn(Box::new(move || {
            let result = service.comments(&video_id);
            if alive.load(Ordering::SeqCst) {
                let _ = tx.send(CommentMessage::Loaded { generation, result });
            }
        }));
    }

    pub fn can_post(&self) -> bool {
        self.is_alive() && self.target.is_some() && !self.posting && !self.draft.trim().is_empty()
    }

    pub fn post(&mut self) -> Outcome {
        if !self.can_post() {
            return Outcome::Ignored;
        }
        let Some(actor) = self.session.current_user_id() else {
            return Outcome::LoginRequired;
        };
        let Some(video_id) = self.target.clone() else {
            return Outcome::Ignored;
        };
        self.posting = true;
        self.error = None;
        let text = self.draft.trim().to_string();
        let generation = self.generation;
        let service = self.service.clone();
        let tx = self.tx.clone();
        let alive = self.alive.clone();
        self.executor.spawn(Box::new(move || {
            let result = service.post(&video_id, &actor, &text);
            if alive.load(Ordering::SeqCst) {
                let _ = tx.send(CommentMessage::Posted { generation, result });
            }
        }));
        Outcome::Dispatched
    }

    /// Applies finished requests. Returns whether anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.rx.try_recv() {
            if !self.is_alive() {
                continue;
            }
            changed |= self.handle_message(message);
        }
        changed
    }

    fn handle_message(&mut self, message: CommentMessage) -> bool {
        match message {
            CommentMessage::Loaded { generation, result } => {
                if generation != self.generation {
                    return false;
                }
                self.loading = false;
                match result {
                    Ok(comments) => self.comments = comments,
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "comments fetch failed");
                        self.error = Some("Could not load comments".into());
                    }
                }
            }
            CommentMessage::Posted { generation, result } => {
                if generation != self.generation {
                    return false;
                }
                self.posting = false;
                match result {
                    Ok(()) => {
                        self.draft.clear();
                        self.refresh();
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "comment post failed");
                        self.error = Some("Could not post comment".into());
                    }
                }
            }
        }
        true
    }

    pub fn tick(&mut self, dt: Duration) -> Option<SheetEvent> {
        self.sheet.tick(dt)
    }

    pub fn teardown(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.loading = false;
        self.posting = false;
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for CommentsOverlay {
    fn drop(&mut self) {
        self.teardown();
    }
}
