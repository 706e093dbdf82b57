use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use super::collection::VideoCollection;
use super::cursor::PageCursor;
use super::likes::{LikeLedger, LikeView};
use super::visibility::{PlaybackSwitch, ViewableItem, VisibilityTracker};
use crate::data::{FeedSource, InteractionService};
use crate::model::{Interaction, InteractionKind, LikerSet, Video};
use crate::session::Session;
use crate::task::Executor;

pub const DEFAULT_PREFETCH_DISTANCE: usize = 1;
pub const DEFAULT_SHARE_BASE_URL: &str = "https://irecipes.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Fetch the next page once the visible index is this close to the end.
    pub prefetch_distance: usize,
    pub share_base_url: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            prefetch_distance: DEFAULT_PREFETCH_DISTANCE,
            share_base_url: DEFAULT_SHARE_BASE_URL.to_string(),
        }
    }
}

/// Result of a user action that needs a signed-in actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Dispatched,
    /// Nobody is signed in; nothing was sent.
    LoginRequired,
    /// Unknown video or a torn-down controller.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shared {
    pub link: ShareLink,
    pub interaction: Outcome,
}

enum FeedMessage {
    Page {
        request_id: u64,
        result: Result<Option<Vec<Video>>>,
    },
    Likes {
        video_id: String,
        ticket: u64,
        result: Result<LikerSet>,
    },
}

/// Paged video list with a single active item, shared by the home feed,
/// profile grids and single-video pages.
///
/// All state lives on the caller's thread. Network work is handed to the
/// executor and comes back through [`FeedController::poll`].
pub struct FeedController {
    source: Arc<dyn FeedSource>,
    interactions: Arc<dyn InteractionService>,
    session: Arc<Session>,
    executor: Arc<dyn Executor>,
    settings: FeedSettings,
    cursor: PageCursor,
    videos: VideoCollection,
    tracker: VisibilityTracker,
    likes: LikeLedger,
    active_since: Option<Instant>,
    next_request_id: u64,
    alive: Arc<AtomicBool>,
    tx: Sender<FeedMessage>,
    rx: Receiver<FeedMessage>,
    last_error: Option<String>,
}

impl FeedController {
    pub fn new(
        source: Arc<dyn FeedSource>,
        interactions: Arc<dyn InteractionService>,
        session: Arc<Session>,
        executor: Arc<dyn Executor>,
        settings: FeedSettings,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            source,
            interactions,
            session,
            executor,
            settings,
            cursor: PageCursor::default(),
            videos: VideoCollection::default(),
            tracker: VisibilityTracker::default(),
            likes: LikeLedger::default(),
            active_since: None,
            next_request_id: 1,
            alive: Arc::new(AtomicBool::new(true)),
            tx,
            rx,
            last_error: None,
        }
    }

    pub fn label(&self) -> String {
        self.source.label()
    }

    pub fn videos(&self) -> &VideoCollection {
        &self.videos
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn is_loading(&self) -> bool {
        self.cursor.in_flight().is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.cursor.has_more()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.tracker.active()
    }

    pub fn active_video(&self) -> Option<&Video> {
        self.tracker.active().and_then(|index| self.videos.get(index))
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Like state as it should be drawn, speculation included.
    pub fn like_view(&self, video: &Video) -> LikeView {
        let actor = self.session.current_user_id();
        self.likes.view(video, actor.as_deref())
    }

    pub fn is_like_pending(&self, video_id: &str) -> bool {
        self.likes.is_pending(video_id)
    }

    /// Starts loading the next page. Returns `false` without doing anything
    /// while a fetch is running or once the source is exhausted.
    pub fn fetch_next_page(&mut self) -> bool {
        if !self.is_alive() {
            return false;
        }
        let request_id = self.next_request_id;
        let Some(page) = self.cursor.begin(request_id) else {
            return false;
        };
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let viewer = self.session.current_user_id();
        let source = self.source.clone();
        let tx = self.tx.clone();
        let alive = self.alive.clone();
        debug!(feed = %self.source.label(), page, request_id, "fetching page");

        self.executor.spawn(Box::new(move || {
            let result = source.load_page(page, viewer.as_deref());
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(FeedMessage::Page { request_id, result });
        }));
        true
    }

    /// Drops everything loaded so far and fetches page 1 again. Pages still
    /// in flight from before the reset are discarded when they arrive.
    pub fn reset(&mut self) -> bool {
        if let Some(switch) = self.tracker.clear() {
            self.finish_watch(switch);
        }
        self.videos.clear();
        self.likes.clear();
        self.cursor.reset();
        self.last_error = None;
        self.fetch_next_page()
    }

    /// Prefetch trigger for the list: `index` is the item currently shown.
    pub fn near_end(&mut self, index: usize) -> bool {
        let len = self.videos.len();
        if len > 0 && index.saturating_add(self.settings.prefetch_distance) + 1 < len {
            return false;
        }
        self.fetch_next_page()
    }

    /// Drops the active item while another screen covers the list. The
    /// next visibility update picks one again.
    pub fn blur(&mut self) -> Option<PlaybackSwitch> {
        let switch = self.tracker.clear()?;
        self.finish_watch(switch);
        Some(switch)
    }

    /// Updates the active item from the items on screen. The returned switch
    /// tells the player what to stop and what to start.
    pub fn on_viewable_items_changed(&mut self, items: &[ViewableItem]) -> Option<PlaybackSwitch> {
        if !self.is_alive() {
            return None;
        }
        let switch = self.tracker.update(items)?;
        self.finish_watch(switch);
        if let Some(index) = switch.start {
            self.near_end(index);
        }
        Some(switch)
    }

    fn finish_watch(&mut self, switch: PlaybackSwitch) {
        let started = self.active_since.take();
        if switch.start.is_some() {
            self.active_since = Some(Instant::now());
        }
        let (Some(stopped), Some(started)) = (switch.stop, started) else {
            return;
        };
        let Some(video) = self.videos.get(stopped) else {
            return;
        };
        let Some(actor) = self.session.current_user_id() else {
            return;
        };
        let watched = started.elapsed().as_secs_f64();
        let complete = video.duration.is_some_and(|total| total > 0.0 && watched >= total);
        self.dispatch(Interaction::watch(&actor, &video.id, watched, complete));
    }

    pub fn record_interaction(&mut self, kind: InteractionKind, video_id: &str) -> Outcome {
        if !self.is_alive() {
            return Outcome::Ignored;
        }
        let Some(actor) = self.session.current_user_id() else {
            return Outcome::LoginRequired;
        };
        self.dispatch(Interaction::new(kind, &actor, video_id));
        Outcome::Dispatched
    }

    fn dispatch(&self, interaction: Interaction) {
        let service = self.interactions.clone();
        self.executor.spawn(Box::new(move || {
            if let Err(err) = service.record(&interaction) {
                warn!(
                    error = %format!("{err:#}"),
                    kind = %interaction.kind,
                    video = %interaction.video_id,
                    "interaction not recorded"
                );
            }
        }));
    }

    /// Flips the viewer's like on `video_id`. The new state shows at once;
    /// the liker set is re-read from the API once the round trip finishes.
    pub fn toggle_like(&mut self, video_id: &str) -> Outcome {
        if !self.is_alive() {
            return Outcome::Ignored;
        }
        let Some(actor) = self.session.current_user_id() else {
            return Outcome::LoginRequired;
        };
        let Some(video) = self.videos.by_id(video_id) else {
            return Outcome::Ignored;
        };
        let liked = !self.likes.view(video, Some(&actor)).liked;
        let ticket = self.likes.speculate(video_id, liked);

        let service = self.interactions.clone();
        let tx = self.tx.clone();
        let alive = self.alive.clone();
        let video_id = video_id.to_string();
        let worker_actor = actor.clone();
        let worker_video = video_id.clone();
        self.executor.spawn(Box::new(move || {
            let sent = if liked {
                service.like(&worker_actor, &worker_video)
            } else {
                service.unlike(&worker_actor, &worker_video)
            };
            let result = sent.and_then(|_| service.likes(&worker_video));
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(FeedMessage::Likes {
                video_id: worker_video,
                ticket,
                result,
            });
        }));

        if liked {
            self.dispatch(Interaction::new(InteractionKind::Like, &actor, &video_id));
        }
        Outcome::Dispatched
    }

    /// Builds the share link for `video_id` and records the share when a
    /// viewer is signed in.
    pub fn share(&mut self, video_id: &str) -> Option<Shared> {
        if self.videos.by_id(video_id).is_none() {
            return None;
        }
        let link = share_link(&self.settings.share_base_url, video_id);
        let interaction = self.record_interaction(InteractionKind::Share, video_id);
        Some(Shared { link, interaction })
    }

    /// Applies finished background work. Returns whether anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.rx.try_recv() {
            if !self.is_alive() {
                continue;
            }
            self.handle_message(message);
            changed = true;
        }
        changed
    }

    fn handle_message(&mut self, message: FeedMessage) {
        match message {
            FeedMessage::Page { request_id, result } => {
                if !self.cursor.is_current(request_id) {
                    debug!(request_id, "dropping stale page");
                    return;
                }
                match result {
                    Ok(Some(videos)) if !videos.is_empty() => {
                        let stats = self.videos.merge_page(videos);
                        debug!(
                            page = self.cursor.page(),
                            appended = stats.appended,
                            duplicates = stats.duplicates,
                            "page merged"
                        );
                        self.cursor.advance();
                    }
                    Ok(Some(_)) => {
                        debug!(page = self.cursor.page(), "feed exhausted");
                        self.cursor.exhaust();
                    }
                    Ok(None) => {
                        warn!(page = self.cursor.page(), "feed page was not a video list");
                        self.cursor.exhaust();
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), page = self.cursor.page(), "feed fetch failed");
                        self.last_error = Some(format!("{err:#}"));
                        self.cursor.release();
                    }
                }
            }
            FeedMessage::Likes {
                video_id,
                ticket,
                result,
            } => {
                match result {
                    Ok(likes) => {
                        self.videos.replace_likes(&video_id, likes);
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), video = %video_id, "like round trip failed");
                        self.last_error = Some(format!("{err:#}"));
                    }
                }
                self.likes.settle(&video_id, ticket);
            }
        }
    }

    /// Stops applying background results. Requests already sent still run
    /// to completion.
    pub fn teardown(&mut self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            while self.rx.try_recv().is_ok() {}
            self.tracker.clear();
            self.active_since = None;
        }
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        self.teardown();
    }
}

pub fn share_link(base_url: &str, video_id: &str) -> ShareLink {
    let url = format!("{}/videos/{}", base_url.trim_end_matches('/'), video_id);
    ShareLink {
        message: format!("Gostei dessa receita, vamos fazer? {url}"),
        url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use anyhow::anyhow;
    use parking_lot::Mutex;

    use crate::data::SampleBackend;
    use crate::task::InlineExecutor;

    fn video(id: &str) -> Video {
        serde_json::from_value(serde_json::json!({ "_id": id, "duration": 30.0 })).unwrap()
    }

    fn videos(ids: &[&str]) -> Vec<Video> {
        ids.iter().map(|id| video(id)).collect()
    }

    #[derive(Default)]
    struct ScriptedFeed {
        pages: Mutex<VecDeque<Result<Option<Vec<Video>>>>>,
        requests: Mutex<Vec<(u32, Option<String>)>>,
    }

    impl ScriptedFeed {
        fn with(pages: Vec<Result<Option<Vec<Video>>>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<(u32, Option<String>)> {
            self.requests.lock().clone()
        }
    }

    impl FeedSource for ScriptedFeed {
        fn label(&self) -> String {
            "scripted".into()
        }

        fn load_page(&self, page: u32, viewer: Option<&str>) -> Result<Option<Vec<Video>>> {
            self.requests
                .lock()
                .push((page, viewer.map(str::to_string)));
            self.pages
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(Some(Vec::new())))
        }
    }

    #[derive(Default)]
    struct RecordingInteractions {
        likers: Mutex<LikerSet>,
        calls: Mutex<Vec<String>>,
        fail_likes: bool,
    }

    impl RecordingInteractions {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl InteractionService for RecordingInteractions {
        fn like(&self, user_id: &str, video_id: &str) -> Result<()> {
            self.calls.lock().push(format!("like {user_id} {video_id}"));
            if self.fail_likes {
                return Err(anyhow!("connection reset"));
            }
            let mut likers = self.likers.lock();
            *likers = likers.with_actor(user_id, true);
            Ok(())
        }

        fn unlike(&self, user_id: &str, video_id: &str) -> Result<()> {
            self.calls.lock().push(format!("unlike {user_id} {video_id}"));
            let mut likers = self.likers.lock();
            *likers = likers.with_actor(user_id, false);
            Ok(())
        }

        fn likes(&self, _video_id: &str) -> Result<LikerSet> {
            Ok(self.likers.lock().clone())
        }

        fn record(&self, interaction: &Interaction) -> Result<()> {
            self.calls
                .lock()
                .push(format!("record {} {}", interaction.kind, interaction.video_id));
            Ok(())
        }
    }

    fn signed_in() -> Arc<Session> {
        let session = Session::ephemeral();
        session
            .sign_in(&SampleBackend::new(), "sample-user-1")
            .unwrap();
        Arc::new(session)
    }

    fn controller(
        source: Arc<ScriptedFeed>,
        interactions: Arc<RecordingInteractions>,
        session: Arc<Session>,
    ) -> FeedController {
        FeedController::new(
            source,
            interactions,
            session,
            Arc::new(InlineExecutor),
            FeedSettings::default(),
        )
    }

    fn ids(controller: &FeedController) -> Vec<String> {
        controller.videos().iter().map(|v| v.id.clone()).collect()
    }

    #[test]
    fn first_page_fills_collection_and_advances() {
        let page: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        let page: Vec<&str> = page.iter().map(String::as_str).collect();
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&page)))]);
        let mut feed = controller(
            source.clone(),
            Arc::default(),
            Arc::new(Session::ephemeral()),
        );

        assert!(feed.fetch_next_page());
        assert!(feed.poll());
        assert_eq!(feed.videos().len(), 10);
        assert_eq!(feed.cursor().page(), 2);
        assert!(feed.cursor().has_more());
        assert!(!feed.is_loading());
        assert_eq!(source.requests(), vec![(1, None)]);
    }

    #[test]
    fn duplicates_are_dropped_but_page_advances() {
        let first: Vec<String> = (0..10).map(|i| format!("v{i}")).collect();
        let first: Vec<&str> = first.iter().map(String::as_str).collect();
        let source = ScriptedFeed::with(vec![
            Ok(Some(videos(&first))),
            Ok(Some(videos(&["v3", "v10", "v7"]))),
            Ok(Some(videos(&["v1", "v2"]))),
        ]);
        let mut feed = controller(source, Arc::default(), Arc::new(Session::ephemeral()));

        feed.fetch_next_page();
        feed.poll();
        feed.fetch_next_page();
        feed.poll();
        assert_eq!(feed.videos().len(), 11);
        assert_eq!(feed.cursor().page(), 3);
        assert_eq!(ids(&feed).last().map(String::as_str), Some("v10"));

        feed.fetch_next_page();
        feed.poll();
        assert_eq!(feed.videos().len(), 11);
        assert_eq!(feed.cursor().page(), 4);
        assert!(feed.cursor().has_more());
    }

    #[test]
    fn empty_page_exhausts_feed() {
        let source = ScriptedFeed::with(vec![
            Ok(Some(videos(&["a", "b"]))),
            Ok(Some(Vec::new())),
        ]);
        let mut feed = controller(
            source.clone(),
            Arc::default(),
            Arc::new(Session::ephemeral()),
        );
        feed.fetch_next_page();
        feed.poll();
        assert!(feed.near_end(1));
        feed.poll();

        assert!(feed.is_exhausted());
        assert_eq!(feed.videos().len(), 2);
        assert_eq!(feed.cursor().page(), 2);

        assert!(!feed.near_end(1));
        assert!(!feed.fetch_next_page());
        assert_eq!(source.requests().len(), 2);
    }

    #[test]
    fn malformed_page_counts_as_empty() {
        let source = ScriptedFeed::with(vec![Ok(None)]);
        let mut feed = controller(source, Arc::default(), Arc::new(Session::ephemeral()));
        feed.fetch_next_page();
        feed.poll();
        assert!(feed.is_exhausted());
        assert!(feed.videos().is_empty());
        assert_eq!(feed.cursor().page(), 1);
    }

    #[test]
    fn failed_fetch_is_retried_on_next_trigger() {
        let source = ScriptedFeed::with(vec![
            Err(anyhow!("timed out")),
            Ok(Some(videos(&["a"]))),
        ]);
        let mut feed = controller(
            source.clone(),
            Arc::default(),
            Arc::new(Session::ephemeral()),
        );
        feed.fetch_next_page();
        feed.poll();
        assert!(feed.take_error().unwrap().contains("timed out"));
        assert_eq!(feed.cursor().page(), 1);
        assert!(feed.cursor().has_more());
        assert!(!feed.is_loading());

        feed.near_end(0);
        feed.poll();
        assert_eq!(feed.videos().len(), 1);
        assert_eq!(
            source.requests().iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            vec![1, 1]
        );
    }

    #[test]
    fn concurrent_triggers_collapse_into_one_fetch() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a"])))]);
        let mut feed = controller(
            source.clone(),
            Arc::default(),
            Arc::new(Session::ephemeral()),
        );
        assert!(feed.fetch_next_page());
        assert!(!feed.near_end(0));
        assert!(!feed.fetch_next_page());
        feed.poll();
        assert_eq!(source.requests().len(), 1);
    }

    #[test]
    fn near_end_respects_prefetch_distance() {
        let source = ScriptedFeed::with(vec![
            Ok(Some(videos(&["a", "b", "c", "d"]))),
            Ok(Some(videos(&["e"]))),
        ]);
        let mut feed = controller(source, Arc::default(), Arc::new(Session::ephemeral()));
        feed.fetch_next_page();
        feed.poll();

        assert!(!feed.near_end(0));
        assert!(!feed.near_end(1));
        assert!(feed.near_end(2));
    }

    #[test]
    fn reset_discards_results_from_before() {
        let source = ScriptedFeed::with(vec![
            Ok(Some(videos(&["old1", "old2"]))),
            Ok(Some(videos(&["new1"]))),
        ]);
        let mut feed = controller(
            source.clone(),
            Arc::default(),
            Arc::new(Session::ephemeral()),
        );
        feed.fetch_next_page();
        assert!(feed.reset());
        feed.poll();

        assert_eq!(ids(&feed), vec!["new1".to_string()]);
        assert_eq!(feed.cursor().page(), 2);
        assert_eq!(
            source.requests().iter().map(|(p, _)| *p).collect::<Vec<_>>(),
            vec![1, 1]
        );
    }

    #[test]
    fn viewer_id_is_sent_with_page_requests() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a"])))]);
        let mut feed = controller(source.clone(), Arc::default(), signed_in());
        feed.fetch_next_page();
        assert_eq!(
            source.requests(),
            vec![(1, Some("sample-user-1".to_string()))]
        );
    }

    #[test]
    fn only_one_item_is_active() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a", "b", "c", "d", "e"])))]);
        let mut feed = controller(source, Arc::default(), Arc::new(Session::ephemeral()));
        feed.fetch_next_page();
        feed.poll();

        let switch = feed
            .on_viewable_items_changed(&[ViewableItem::new(0, 1.0), ViewableItem::new(1, 0.9)])
            .unwrap();
        assert_eq!(switch.start, Some(0));
        assert_eq!(feed.active_video().unwrap().id, "a");

        let switch = feed
            .on_viewable_items_changed(&[ViewableItem::new(1, 0.85)])
            .unwrap();
        assert_eq!(
            switch,
            PlaybackSwitch {
                stop: Some(0),
                start: Some(1)
            }
        );
        assert_eq!(feed.active_index(), Some(1));

        assert!(feed
            .on_viewable_items_changed(&[ViewableItem::new(2, 0.5)])
            .is_some());
        assert_eq!(feed.active_index(), None);
    }

    #[test]
    fn losing_focus_records_watch_for_signed_in_viewer() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a", "b", "c", "d"])))]);
        let interactions = Arc::new(RecordingInteractions::default());
        let mut feed = controller(source, interactions.clone(), signed_in());
        feed.fetch_next_page();
        feed.poll();

        feed.on_viewable_items_changed(&[ViewableItem::new(0, 1.0)]);
        assert!(interactions.calls().is_empty());
        feed.on_viewable_items_changed(&[ViewableItem::new(1, 1.0)]);
        assert_eq!(interactions.calls(), vec!["record watch a".to_string()]);
    }

    #[test]
    fn blur_releases_active_item_until_next_update() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a", "b"])))]);
        let interactions = Arc::new(RecordingInteractions::default());
        let mut feed = controller(source, interactions.clone(), signed_in());
        feed.fetch_next_page();
        feed.poll();

        feed.on_viewable_items_changed(&[ViewableItem::new(0, 1.0)]);
        let switch = feed.blur().unwrap();
        assert_eq!(switch.stop, Some(0));
        assert_eq!(feed.active_index(), None);
        assert!(feed.blur().is_none());
        assert_eq!(interactions.calls(), vec!["record watch a".to_string()]);

        let switch = feed
            .on_viewable_items_changed(&[ViewableItem::new(0, 1.0)])
            .unwrap();
        assert_eq!(switch.start, Some(0));
    }

    #[test]
    fn unauthenticated_actions_never_reach_the_api() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a", "b"])))]);
        let interactions = Arc::new(RecordingInteractions::default());
        let mut feed = controller(
            source,
            interactions.clone(),
            Arc::new(Session::ephemeral()),
        );
        feed.fetch_next_page();
        feed.poll();

        assert_eq!(feed.toggle_like("a"), Outcome::LoginRequired);
        assert_eq!(
            feed.record_interaction(InteractionKind::Comment, "a"),
            Outcome::LoginRequired
        );
        let shared = feed.share("a").unwrap();
        assert_eq!(shared.interaction, Outcome::LoginRequired);
        feed.on_viewable_items_changed(&[ViewableItem::new(0, 1.0)]);
        feed.on_viewable_items_changed(&[ViewableItem::new(1, 1.0)]);

        assert!(interactions.calls().is_empty());
        assert!(!feed.like_view(feed.videos().get(0).unwrap()).liked);
    }

    #[test]
    fn like_is_speculative_then_confirmed() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a"])))]);
        let interactions = Arc::new(RecordingInteractions::default());
        let mut feed = controller(source, interactions.clone(), signed_in());
        feed.fetch_next_page();
        feed.poll();

        assert_eq!(feed.toggle_like("a"), Outcome::Dispatched);
        let video = feed.videos().by_id("a").unwrap().clone();
        assert!(feed.like_view(&video).liked);
        assert!(feed.is_like_pending("a"));
        assert!(!video.likes.contains("sample-user-1"));

        feed.poll();
        let video = feed.videos().by_id("a").unwrap();
        assert!(video.likes.contains("sample-user-1"));
        assert!(!feed.is_like_pending("a"));
        assert_eq!(
            interactions.calls(),
            vec![
                "like sample-user-1 a".to_string(),
                "record like a".to_string()
            ]
        );
    }

    #[test]
    fn double_toggle_converges_on_last_read() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a"])))]);
        let interactions = Arc::new(RecordingInteractions::default());
        let mut feed = controller(source, interactions.clone(), signed_in());
        feed.fetch_next_page();
        feed.poll();

        feed.toggle_like("a");
        feed.toggle_like("a");
        let video = feed.videos().by_id("a").unwrap().clone();
        assert!(!feed.like_view(&video).liked);

        feed.poll();
        let video = feed.videos().by_id("a").unwrap().clone();
        assert!(!video.likes.contains("sample-user-1"));
        assert!(!feed.like_view(&video).liked);
        assert!(!feed.is_like_pending("a"));
        assert!(interactions
            .calls()
            .contains(&"unlike sample-user-1 a".to_string()));
    }

    #[test]
    fn failed_like_drops_speculation() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a"])))]);
        let interactions = Arc::new(RecordingInteractions {
            fail_likes: true,
            ..Default::default()
        });
        let mut feed = controller(source, interactions, signed_in());
        feed.fetch_next_page();
        feed.poll();

        feed.toggle_like("a");
        feed.poll();
        let video = feed.videos().by_id("a").unwrap().clone();
        assert!(!feed.like_view(&video).liked);
        assert!(feed.take_error().is_some());
    }

    #[test]
    fn share_builds_link() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["abc"])))]);
        let interactions = Arc::new(RecordingInteractions::default());
        let mut feed = controller(source, interactions.clone(), signed_in());
        feed.fetch_next_page();
        feed.poll();

        let shared = feed.share("abc").unwrap();
        assert_eq!(shared.link.url, "https://irecipes.com/videos/abc");
        assert!(shared.link.message.ends_with("https://irecipes.com/videos/abc"));
        assert_eq!(shared.interaction, Outcome::Dispatched);
        assert_eq!(interactions.calls(), vec!["record share abc".to_string()]);
        assert!(feed.share("missing").is_none());
    }

    #[test]
    fn teardown_ignores_late_results() {
        let source = ScriptedFeed::with(vec![Ok(Some(videos(&["a"])))]);
        let mut feed = controller(
            source.clone(),
            Arc::default(),
            Arc::new(Session::ephemeral()),
        );
        feed.fetch_next_page();
        feed.teardown();
        assert!(!feed.poll());
        assert!(feed.videos().is_empty());
        assert!(!feed.fetch_next_page());
        assert_eq!(source.requests().len(), 1);
    }

    #[test]
    fn share_link_trims_trailing_slash() {
        let link = share_link("https://example.com/", "v1");
        assert_eq!(link.url, "https://example.com/videos/v1");
    }
}
