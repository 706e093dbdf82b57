use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::data::UserService;
use crate::feed::{FeedController, Outcome};
use crate::model::{ProfileUpdate, User};
use crate::session::Session;
use crate::task::Executor;
use crate::upload::sniff_content_type;
use crate::validate;

enum ProfileMessage {
    Loaded(Result<User>),
    Followed {
        result: Result<User>,
        following: bool,
    },
}

/// A user's page: header, follow button and the grid of their videos.
pub struct ProfileView {
    user_id: String,
    user: Option<User>,
    loading: bool,
    follow_pending: bool,
    feed: FeedController,
    users: Arc<dyn UserService>,
    session: Arc<Session>,
    executor: Arc<dyn Executor>,
    error: Option<String>,
    alive: Arc<AtomicBool>,
    tx: Sender<ProfileMessage>,
    rx: Receiver<ProfileMessage>,
}

impl ProfileView {
    /// `feed` should list the videos owned by `user_id`.
    pub fn new(
        user_id: impl Into<String>,
        feed: FeedController,
        users: Arc<dyn UserService>,
        session: Arc<Session>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (tx, rx) = unbounded();
        Self {
            user_id: user_id.into(),
            user: None,
            loading: false,
            follow_pending: false,
            feed,
            users,
            session,
            executor,
            error: None,
            alive: Arc::new(AtomicBool::new(true)),
            tx,
            rx,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_follow_pending(&self) -> bool {
        self.follow_pending
    }

    pub fn feed(&self) -> &FeedController {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut FeedController {
        &mut self.feed
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.error.take().or_else(|| self.feed.take_error())
    }

    pub fn is_own_profile(&self) -> bool {
        self.session.current_user_id().as_deref() == Some(self.user_id.as_str())
    }

    pub fn is_following(&self) -> bool {
        match (&self.user, self.session.current_user_id()) {
            (Some(user), Some(actor)) => user.is_followed_by(&actor),
            _ => false,
        }
    }

    /// Fetches the profile and the first page of videos.
    pub fn load(&mut self) {
        self.loading = true;
        let users = self.users.clone();
        let user_id = self.user_id.clone();
        let tx = self.tx.clone();
        let alive = self.alive.clone();
        self.executor.spawn(Box::new(move || {
            let result = users.user(&user_id);
            if alive.load(Ordering::SeqCst) {
                let _ = tx.send(ProfileMessage::Loaded(result));
            }
        }));
        if self.feed.videos().is_empty() {
            self.feed.fetch_next_page();
        }
    }

    /// Follows or unfollows the profile owner depending on the current state.
    pub fn toggle_follow(&mut self) -> Outcome {
        let Some(actor) = self.session.current_user_id() else {
            return Outcome::LoginRequired;
        };
        if actor == self.user_id || self.follow_pending || self.user.is_none() {
            return Outcome::Ignored;
        }
        let following = !self.is_following();
        self.follow_pending = true;

        let users = self.users.clone();
        let target = self.user_id.clone();
        let tx = self.tx.clone();
        let alive = self.alive.clone();
        debug!(target = %target, following, "follow toggle");
        self.executor.spawn(Box::new(move || {
            let sent = if following {
                users.follow(&actor, &target)
            } else {
                users.unfollow(&actor, &target)
            };
            let result = sent.and_then(|()| users.user(&target));
            if alive.load(Ordering::SeqCst) {
                let _ = tx.send(ProfileMessage::Followed { result, following });
            }
        }));
        Outcome::Dispatched
    }

    /// Applies finished requests. Returns whether anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = self.feed.poll();
        while let Ok(message) = self.rx.try_recv() {
            if !self.alive.load(Ordering::SeqCst) {
                continue;
            }
            self.handle_message(message);
            changed = true;
        }
        changed
    }

    fn handle_message(&mut self, message: ProfileMessage) {
        match message {
            ProfileMessage::Loaded(result) => {
                self.loading = false;
                match result {
                    Ok(user) => self.user = Some(user),
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), user = %self.user_id, "profile fetch failed");
                        self.error = Some(format!("{err:#}"));
                    }
                }
            }
            ProfileMessage::Followed { result, following } => {
                self.follow_pending = false;
                match result {
                    Ok(user) => {
                        info!(target = %user.id, following, "follow updated");
                        self.user = Some(user);
                        // The viewer's own following list changed too.
                        if let Err(err) = self.session.refresh(self.users.as_ref()) {
                            warn!(error = %format!("{err:#}"), "session refresh failed");
                        }
                    }
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "follow request failed");
                        self.error = Some(format!("{err:#}"));
                    }
                }
            }
        }
    }

    pub fn teardown(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        while self.rx.try_recv().is_ok() {}
        self.feed.teardown();
    }
}

impl Drop for ProfileView {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Validates and saves a new name and handle for the signed-in user.
pub fn edit_profile(
    session: &Session,
    users: &dyn UserService,
    update: &ProfileUpdate,
) -> Result<User> {
    let user_id = session.require_user_id()?;
    let update = ProfileUpdate {
        name: update.name.trim().to_string(),
        handle: update.handle.trim().to_string(),
    };
    validate::profile_update(&update)?;
    let user = users
        .update(&user_id, &update)
        .with_context(|| format!("update profile of {user_id}"))?;
    session.set_user(user.clone())?;
    info!(user = %user.id, "profile updated");
    Ok(user)
}

/// Uploads an image file as the signed-in user's avatar.
pub fn upload_profile_image(session: &Session, users: &dyn UserService, path: &Path) -> Result<()> {
    let user_id = session.require_user_id()?;
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let content_type = sniff_content_type(path, &bytes);
    anyhow::ensure!(
        content_type.starts_with("image/"),
        "{} is not an image ({content_type})",
        path.display()
    );
    users.upload_profile_image(&user_id, bytes, content_type)?;
    if let Err(err) = session.refresh(users) {
        warn!(error = %format!("{err:#}"), "session refresh failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{InteractionService, SampleBackend, SampleFeed, SampleScope};
    use crate::feed::FeedSettings;
    use crate::task::InlineExecutor;
    use crate::validate::ValidationError;
    use tempfile::tempdir;

    fn view(backend: &Arc<SampleBackend>, session: &Arc<Session>, user_id: &str) -> ProfileView {
        let executor: Arc<dyn Executor> = Arc::new(InlineExecutor);
        let interactions: Arc<dyn InteractionService> = backend.clone();
        let feed = FeedController::new(
            Arc::new(SampleFeed::new(
                backend.clone(),
                SampleScope::User(user_id.to_string()),
            )),
            interactions,
            session.clone(),
            executor.clone(),
            FeedSettings::default(),
        );
        ProfileView::new(user_id, feed, backend.clone(), session.clone(), executor)
    }

    #[test]
    fn load_fetches_user_and_videos() {
        let backend = Arc::new(SampleBackend::new());
        let session = Arc::new(Session::ephemeral());
        let mut profile = view(&backend, &session, "sample-user-1");
        profile.load();
        assert!(profile.poll());

        assert_eq!(profile.user().unwrap().handle, "chef_ana");
        assert!(!profile.is_loading());
        assert!(!profile.feed().videos().is_empty());
        assert!(profile
            .feed()
            .videos()
            .iter()
            .all(|video| video.is_owned_by("sample-user-1")));
    }

    #[test]
    fn follow_needs_a_signed_in_viewer() {
        let backend = Arc::new(SampleBackend::new());
        let session = Arc::new(Session::ephemeral());
        let mut profile = view(&backend, &session, "sample-user-1");
        profile.load();
        profile.poll();
        assert_eq!(profile.toggle_follow(), Outcome::LoginRequired);
    }

    #[test]
    fn toggle_follow_round_trips() {
        let backend = Arc::new(SampleBackend::new());
        let session = Arc::new(Session::ephemeral());
        session
            .sign_in(backend.as_ref(), "sample-user-2")
            .unwrap();
        let mut profile = view(&backend, &session, "sample-user-1");
        profile.load();
        profile.poll();
        assert!(!profile.is_following());

        assert_eq!(profile.toggle_follow(), Outcome::Dispatched);
        profile.poll();
        assert!(profile.is_following());
        assert!(!profile.is_follow_pending());
        let me = session.current_user().unwrap();
        assert!(me.following.iter().any(|id| id == "sample-user-1"));

        assert_eq!(profile.toggle_follow(), Outcome::Dispatched);
        profile.poll();
        assert!(!profile.is_following());
    }

    #[test]
    fn own_profile_cannot_be_followed() {
        let backend = Arc::new(SampleBackend::new());
        let session = Arc::new(Session::ephemeral());
        session
            .sign_in(backend.as_ref(), "sample-user-1")
            .unwrap();
        let mut profile = view(&backend, &session, "sample-user-1");
        profile.load();
        profile.poll();
        assert!(profile.is_own_profile());
        assert_eq!(profile.toggle_follow(), Outcome::Ignored);
    }

    #[test]
    fn edit_profile_validates_and_updates_session() {
        let backend = SampleBackend::new();
        let session = Session::ephemeral();
        session.sign_in(&backend, "sample-user-1").unwrap();

        let err = edit_profile(
            &session,
            &backend,
            &ProfileUpdate {
                name: "Ana".into(),
                handle: "bad handle!".into(),
            },
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::InvalidHandle)
        );

        let user = edit_profile(
            &session,
            &backend,
            &ProfileUpdate {
                name: " Ana Maria ".into(),
                handle: "ana_maria".into(),
            },
        )
        .unwrap();
        assert_eq!(user.name, "Ana Maria");
        assert_eq!(session.current_user().unwrap().handle, "ana_maria");
    }

    #[test]
    fn profile_image_must_be_an_image() {
        let backend = SampleBackend::new();
        let session = Session::ephemeral();
        session.sign_in(&backend, "sample-user-1").unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "plain text").unwrap();

        let err = upload_profile_image(&session, &backend, &path).unwrap_err();
        assert!(format!("{err:#}").contains("is not an image"));
    }

    #[test]
    fn edit_profile_requires_sign_in() {
        let backend = SampleBackend::new();
        let session = Session::ephemeral();
        let err = edit_profile(
            &session,
            &backend,
            &ProfileUpdate {
                name: "Somebody".into(),
                handle: "somebody".into(),
            },
        )
        .unwrap_err();
        assert!(err.downcast_ref::<crate::session::SessionError>().is_some());
    }
}
