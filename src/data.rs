use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::api::{self, VideoPublish};
use crate::model::{
    Author, Comment, CommentRef, Interaction, LikerSet, NewUser, ProfileUpdate, User, Video,
};

/// Strategy behind a feed controller: which endpoint pages come from.
///
/// `Ok(None)` signals a response that was not a video list; the controller
/// treats it like an empty page.
pub trait FeedSource: Send + Sync {
    fn label(&self) -> String;
    fn load_page(&self, page: u32, viewer: Option<&str>) -> Result<Option<Vec<Video>>>;
}

pub trait InteractionService: Send + Sync {
    fn like(&self, user_id: &str, video_id: &str) -> Result<()>;
    fn unlike(&self, user_id: &str, video_id: &str) -> Result<()>;
    fn likes(&self, video_id: &str) -> Result<LikerSet>;
    fn record(&self, interaction: &Interaction) -> Result<()>;
}

pub trait CommentService: Send + Sync {
    fn comments(&self, video_id: &str) -> Result<Vec<Comment>>;
    fn post(&self, video_id: &str, user_id: &str, text: &str) -> Result<()>;
}

pub trait UserService: Send + Sync {
    fn user(&self, user_id: &str) -> Result<User>;
    fn update(&self, user_id: &str, update: &ProfileUpdate) -> Result<User>;
    fn follow(&self, user_id: &str, follow_id: &str) -> Result<()>;
    fn unfollow(&self, user_id: &str, follow_id: &str) -> Result<()>;
    fn upload_profile_image(&self, user_id: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<()>;
    fn create(&self, user: &NewUser) -> Result<User>;
}

pub trait UploadService: Send + Sync {
    fn upload_url(&self, filename: &str, content_type: &str) -> Result<String>;
    fn put(&self, upload_url: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    fn publish(&self, video: &VideoPublish) -> Result<()>;
}

pub struct RecommendedFeed {
    client: Arc<api::Client>,
}

impl RecommendedFeed {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedSource for RecommendedFeed {
    fn label(&self) -> String {
        "For you".into()
    }

    fn load_page(&self, page: u32, viewer: Option<&str>) -> Result<Option<Vec<Video>>> {
        self.client
            .recommended(viewer, page)
            .with_context(|| format!("fetch recommended page {page}"))
    }
}

/// All videos of one author. The endpoint is not paginated, so page 1 holds
/// everything and later pages are empty.
pub struct UserVideosFeed {
    client: Arc<api::Client>,
    user_id: String,
}

impl UserVideosFeed {
    pub fn new(client: Arc<api::Client>, user_id: impl Into<String>) -> Self {
        Self {
            client,
            user_id: user_id.into(),
        }
    }
}

impl FeedSource for UserVideosFeed {
    fn label(&self) -> String {
        format!("Videos of {}", self.user_id)
    }

    fn load_page(&self, page: u32, _viewer: Option<&str>) -> Result<Option<Vec<Video>>> {
        if page > 1 {
            return Ok(Some(Vec::new()));
        }
        self.client
            .user_videos(&self.user_id)
            .map(Some)
            .context("fetch user videos")
    }
}

pub struct SingleVideoFeed {
    client: Arc<api::Client>,
    video_id: String,
}

impl SingleVideoFeed {
    pub fn new(client: Arc<api::Client>, video_id: impl Into<String>) -> Self {
        Self {
            client,
            video_id: video_id.into(),
        }
    }
}

impl FeedSource for SingleVideoFeed {
    fn label(&self) -> String {
        format!("Video {}", self.video_id)
    }

    fn load_page(&self, page: u32, _viewer: Option<&str>) -> Result<Option<Vec<Video>>> {
        if page > 1 {
            return Ok(Some(Vec::new()));
        }
        self.client
            .video(&self.video_id)
            .map(|video| Some(vec![video]))
            .context("fetch video")
    }
}

pub struct ApiInteractionService {
    client: Arc<api::Client>,
}

impl ApiInteractionService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl InteractionService for ApiInteractionService {
    fn like(&self, user_id: &str, video_id: &str) -> Result<()> {
        self.client.like(user_id, video_id).context("post like")
    }

    fn unlike(&self, user_id: &str, video_id: &str) -> Result<()> {
        self.client.unlike(user_id, video_id).context("delete like")
    }

    fn likes(&self, video_id: &str) -> Result<LikerSet> {
        self.client.likes(video_id).context("fetch likes")
    }

    fn record(&self, interaction: &Interaction) -> Result<()> {
        self.client
            .record_interaction(interaction)
            .with_context(|| format!("record {} interaction", interaction.kind))
    }
}

pub struct ApiCommentService {
    client: Arc<api::Client>,
}

impl ApiCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for ApiCommentService {
    fn comments(&self, video_id: &str) -> Result<Vec<Comment>> {
        self.client.comments(video_id).context("fetch comments")
    }

    fn post(&self, video_id: &str, user_id: &str, text: &str) -> Result<()> {
        self.client
            .post_comment(video_id, user_id, text)
            .context("post comment")
    }
}

pub struct ApiUserService {
    client: Arc<api::Client>,
}

impl ApiUserService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl UserService for ApiUserService {
    fn user(&self, user_id: &str) -> Result<User> {
        self.client.user(user_id).context("fetch user")
    }

    fn update(&self, user_id: &str, update: &ProfileUpdate) -> Result<User> {
        self.client
            .update_user(user_id, update)
            .context("update profile")
    }

    fn follow(&self, user_id: &str, follow_id: &str) -> Result<()> {
        self.client.follow(user_id, follow_id).context("follow user")
    }

    fn unfollow(&self, user_id: &str, follow_id: &str) -> Result<()> {
        self.client
            .unfollow(user_id, follow_id)
            .context("unfollow user")
    }

    fn upload_profile_image(
        &self,
        user_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .upload_profile_image(user_id, bytes, content_type)
            .context("upload profile image")
    }

    fn create(&self, user: &NewUser) -> Result<User> {
        self.client.create_user(user).context("create user")
    }
}

pub struct ApiUploadService {
    client: Arc<api::Client>,
}

impl ApiUploadService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl UploadService for ApiUploadService {
    fn upload_url(&self, filename: &str, content_type: &str) -> Result<String> {
        self.client
            .request_upload_url(filename, content_type)
            .context("request upload url")
    }

    fn put(&self, upload_url: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_signed(upload_url, bytes, content_type)
            .context("upload video file")
    }

    fn publish(&self, video: &VideoPublish) -> Result<()> {
        self.client.publish_video(video).context("publish video")
    }
}

pub type FeedFactory = Arc<dyn Fn(&str) -> Arc<dyn FeedSource> + Send + Sync>;

/// Everything the screens need from a backend.
#[derive(Clone)]
pub struct Services {
    pub home: Arc<dyn FeedSource>,
    pub user_videos: FeedFactory,
    pub single_video: FeedFactory,
    pub interactions: Arc<dyn InteractionService>,
    pub comments: Arc<dyn CommentService>,
    pub users: Arc<dyn UserService>,
    /// `None` when the backend cannot take uploads.
    pub uploads: Option<Arc<dyn UploadService>>,
}

impl Services {
    pub fn api(client: Arc<api::Client>) -> Self {
        let for_user = client.clone();
        let for_video = client.clone();
        Self {
            home: Arc::new(RecommendedFeed::new(client.clone())),
            user_videos: Arc::new(move |user_id: &str| -> Arc<dyn FeedSource> {
                Arc::new(UserVideosFeed::new(for_user.clone(), user_id))
            }),
            single_video: Arc::new(move |video_id: &str| -> Arc<dyn FeedSource> {
                Arc::new(SingleVideoFeed::new(for_video.clone(), video_id))
            }),
            interactions: Arc::new(ApiInteractionService::new(client.clone())),
            comments: Arc::new(ApiCommentService::new(client.clone())),
            users: Arc::new(ApiUserService::new(client.clone())),
            uploads: Some(Arc::new(ApiUploadService::new(client))),
        }
    }

    pub fn sample(backend: Arc<SampleBackend>) -> Self {
        let for_user = backend.clone();
        let for_video = backend.clone();
        Self {
            home: Arc::new(SampleFeed::new(backend.clone(), SampleScope::Recommended)),
            user_videos: Arc::new(move |user_id: &str| -> Arc<dyn FeedSource> {
                Arc::new(SampleFeed::new(
                    for_user.clone(),
                    SampleScope::User(user_id.to_string()),
                ))
            }),
            single_video: Arc::new(move |video_id: &str| -> Arc<dyn FeedSource> {
                Arc::new(SampleFeed::new(
                    for_video.clone(),
                    SampleScope::Video(video_id.to_string()),
                ))
            }),
            interactions: backend.clone(),
            comments: backend.clone(),
            users: backend,
            uploads: None,
        }
    }
}

const SAMPLE_PAGE_SIZE: usize = 4;

#[derive(Default)]
struct SampleState {
    videos: Vec<Video>,
    likes: HashMap<String, LikerSet>,
    comments: HashMap<String, Vec<Comment>>,
    users: HashMap<String, User>,
}

/// In-process stand-in for the API, used by `--offline`.
pub struct SampleBackend {
    state: Mutex<SampleState>,
}

impl Default for SampleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBackend {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let users = sample_users();
        let mut videos = sample_videos(&users);
        videos.shuffle(&mut rng);

        let likes = videos
            .iter()
            .map(|video| (video.id.clone(), video.likes.clone()))
            .collect();
        let comments = videos
            .iter()
            .map(|video| {
                let list = video
                    .comments
                    .iter()
                    .filter_map(|entry| match entry {
                        CommentRef::Embedded(comment) => Some(comment.clone()),
                        CommentRef::Id(_) => None,
                    })
                    .collect();
                (video.id.clone(), list)
            })
            .collect();

        Self {
            state: Mutex::new(SampleState {
                videos,
                likes,
                comments,
                users: users
                    .into_iter()
                    .map(|user| (user.id.clone(), user))
                    .collect(),
            }),
        }
    }

    pub fn first_user_id(&self) -> Option<String> {
        let state = self.state.lock();
        let mut ids: Vec<&String> = state.users.keys().collect();
        ids.sort();
        ids.first().map(|id| id.to_string())
    }

    fn page(&self, page: u32, owner: Option<&str>) -> Vec<Video> {
        let state = self.state.lock();
        let matching: Vec<&Video> = state
            .videos
            .iter()
            .filter(|video| owner.map_or(true, |id| video.is_owned_by(id)))
            .collect();
        let start = (page.saturating_sub(1) as usize) * SAMPLE_PAGE_SIZE;
        matching
            .into_iter()
            .skip(start)
            .take(SAMPLE_PAGE_SIZE)
            .map(|video| {
                let mut video = video.clone();
                if let Some(likes) = state.likes.get(&video.id) {
                    video.likes = likes.clone();
                }
                video
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SampleScope {
    Recommended,
    User(String),
    Video(String),
}

pub struct SampleFeed {
    backend: Arc<SampleBackend>,
    scope: SampleScope,
}

impl SampleFeed {
    pub fn new(backend: Arc<SampleBackend>, scope: SampleScope) -> Self {
        Self { backend, scope }
    }
}

impl FeedSource for SampleFeed {
    fn label(&self) -> String {
        match &self.scope {
            SampleScope::Recommended => "Sample recipes".into(),
            SampleScope::User(id) => format!("Sample videos of {id}"),
            SampleScope::Video(id) => format!("Sample video {id}"),
        }
    }

    fn load_page(&self, page: u32, _viewer: Option<&str>) -> Result<Option<Vec<Video>>> {
        let videos = match &self.scope {
            SampleScope::Recommended => self.backend.page(page, None),
            SampleScope::User(id) => self.backend.page(page, Some(id)),
            SampleScope::Video(id) => {
                if page > 1 {
                    Vec::new()
                } else {
                    let state = self.backend.state.lock();
                    state
                        .videos
                        .iter()
                        .filter(|video| &video.id == id)
                        .cloned()
                        .collect()
                }
            }
        };
        Ok(Some(videos))
    }
}

impl InteractionService for SampleBackend {
    fn like(&self, user_id: &str, video_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state.likes.entry(video_id.to_string()).or_default();
        *entry = entry.with_actor(user_id, true);
        Ok(())
    }

    fn unlike(&self, user_id: &str, video_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let entry = state.likes.entry(video_id.to_string()).or_default();
        *entry = entry.with_actor(user_id, false);
        Ok(())
    }

    fn likes(&self, video_id: &str) -> Result<LikerSet> {
        Ok(self
            .state
            .lock()
            .likes
            .get(video_id)
            .cloned()
            .unwrap_or_default())
    }

    fn record(&self, _interaction: &Interaction) -> Result<()> {
        Ok(())
    }
}

impl CommentService for SampleBackend {
    fn comments(&self, video_id: &str) -> Result<Vec<Comment>> {
        Ok(self
            .state
            .lock()
            .comments
            .get(video_id)
            .cloned()
            .unwrap_or_default())
    }

    fn post(&self, video_id: &str, user_id: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        let handle = state
            .users
            .get(user_id)
            .map(|user| user.handle.clone())
            .unwrap_or_else(|| "user".into());
        state
            .comments
            .entry(video_id.to_string())
            .or_default()
            .push(Comment {
                id: None,
                author_id: user_id.to_string(),
                author_handle: handle,
                text: text.to_string(),
                timestamp: Some(chrono::Utc::now().to_rfc3339()),
            });
        Ok(())
    }
}

impl UserService for SampleBackend {
    fn user(&self, user_id: &str) -> Result<User> {
        self.state
            .lock()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow!(api::ApiError::NotFound(format!("user {user_id}"))))
    }

    fn update(&self, user_id: &str, update: &ProfileUpdate) -> Result<User> {
        let mut state = self.state.lock();
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| anyhow!(api::ApiError::NotFound(format!("user {user_id}"))))?;
        user.name = update.name.clone();
        user.handle = update.handle.clone();
        Ok(user.clone())
    }

    fn follow(&self, user_id: &str, follow_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(target) = state.users.get_mut(follow_id) {
            if !target.is_followed_by(user_id) {
                target.followers.push(user_id.to_string());
            }
        }
        if let Some(actor) = state.users.get_mut(user_id) {
            if !actor.following.iter().any(|id| id == follow_id) {
                actor.following.push(follow_id.to_string());
            }
        }
        Ok(())
    }

    fn unfollow(&self, user_id: &str, follow_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(target) = state.users.get_mut(follow_id) {
            target.followers.retain(|id| id != user_id);
        }
        if let Some(actor) = state.users.get_mut(user_id) {
            actor.following.retain(|id| id != follow_id);
        }
        Ok(())
    }

    fn upload_profile_image(
        &self,
        _user_id: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn create(&self, user: &NewUser) -> Result<User> {
        let mut state = self.state.lock();
        let id = format!("sample-user-{}", state.users.len() + 1);
        let created = User {
            id: id.clone(),
            handle: user.handle.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            avatar_url: None,
            birth_date: Some(user.birth_date.to_string()),
            followers: Vec::new(),
            following: Vec::new(),
            tastes: user.tastes.clone(),
        };
        state.users.insert(id, created.clone());
        Ok(created)
    }
}

fn sample_users() -> Vec<User> {
    [
        ("sample-user-1", "chef_ana", "Ana Souza"),
        ("sample-user-2", "bruno_bakes", "Bruno Lima"),
        ("sample-user-3", "carla_cozinha", "Carla Mendes"),
    ]
    .into_iter()
    .map(|(id, handle, name)| User {
        id: id.into(),
        handle: handle.into(),
        name: name.into(),
        email: format!("{handle}@example.com"),
        avatar_url: None,
        birth_date: None,
        followers: Vec::new(),
        following: Vec::new(),
        tastes: vec!["brazilian".into()],
    })
    .collect()
}

fn sample_videos(users: &[User]) -> Vec<Video> {
    const RECIPES: [(&str, &str, &[&str]); 10] = [
        ("Pão de queijo", "Cheese bread from tapioca flour, crisp outside and chewy inside.", &["snack", "gluten-free"]),
        ("Feijoada", "Black bean stew with pork, served with rice and orange slices.", &["stew", "brazilian"]),
        ("Brigadeiro", "Condensed milk and cocoa truffles rolled in sprinkles.", &["dessert", "chocolate"]),
        ("Moqueca", "Fish stew with coconut milk, peppers and dendê oil.", &["fish", "stew"]),
        ("Coxinha", "Shredded chicken croquettes shaped like drumsticks.", &["snack", "fried"]),
        ("Açaí bowl", "Frozen açaí blended thick, topped with banana and granola.", &["breakfast", "vegan"]),
        ("Farofa", "Toasted cassava flour with butter, onion and bacon.", &["side"]),
        ("Quindim", "Glossy coconut and egg yolk custard.", &["dessert"]),
        ("Escondidinho", "Cassava mash baked over dried beef.", &["baked", "brazilian"]),
        ("Caipirinha", "Lime, sugar and cachaça muddled over ice.", &["drink"]),
    ];

    RECIPES
        .iter()
        .enumerate()
        .map(|(i, (title, description, tags))| {
            let owner = &users[i % users.len()];
            let likers: Vec<&str> = users
                .iter()
                .take(i % (users.len() + 1))
                .map(|user| user.id.as_str())
                .collect();
            Video {
                id: format!("sample-video-{}", i + 1),
                title: (*title).into(),
                description: (*description).into(),
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
                url: format!("https://storage.googleapis.com/irecipes-videos/sample-{}.mp4", i + 1),
                duration: Some(30.0 + (i as f64) * 7.5),
                created_at: Some(format!("2024-03-{:02}T12:00:00Z", i + 1)),
                comments: vec![CommentRef::Embedded(Comment {
                    id: Some(format!("sample-comment-{}", i + 1)),
                    author_id: users[(i + 1) % users.len()].id.clone(),
                    author_handle: users[(i + 1) % users.len()].handle.clone(),
                    text: "Looks delicious!".into(),
                    timestamp: Some(format!("2024-03-{:02}T13:00:00Z", i + 1)),
                })],
                likes: LikerSet::from_ids(likers),
                owner_id: Some(owner.id.clone()),
                user: Some(Author {
                    id: Some(owner.id.clone()),
                    handle: owner.handle.clone(),
                    name: owner.name.clone(),
                    avatar_url: None,
                }),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_feed_pages_until_exhausted() {
        let backend = Arc::new(SampleBackend::new());
        let feed = SampleFeed::new(backend, SampleScope::Recommended);
        let mut seen = Vec::new();
        for page in 1.. {
            let videos = feed.load_page(page, None).unwrap().unwrap();
            if videos.is_empty() {
                break;
            }
            seen.extend(videos.into_iter().map(|video| video.id));
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn sample_feed_scopes_to_owner() {
        let backend = Arc::new(SampleBackend::new());
        let feed = SampleFeed::new(backend, SampleScope::User("sample-user-2".into()));
        let videos = feed.load_page(1, None).unwrap().unwrap();
        assert!(!videos.is_empty());
        assert!(videos.iter().all(|video| video.is_owned_by("sample-user-2")));
    }

    #[test]
    fn sample_likes_round_trip() {
        let backend = SampleBackend::new();
        backend.like("someone", "sample-video-1").unwrap();
        assert!(backend.likes("sample-video-1").unwrap().contains("someone"));
        backend.unlike("someone", "sample-video-1").unwrap();
        assert!(!backend.likes("sample-video-1").unwrap().contains("someone"));
    }

    #[test]
    fn sample_comments_append() {
        let backend = SampleBackend::new();
        let before = backend.comments("sample-video-3").unwrap().len();
        backend
            .post("sample-video-3", "sample-user-1", "Vou fazer hoje")
            .unwrap();
        let after = backend.comments("sample-video-3").unwrap();
        assert_eq!(after.len(), before + 1);
        assert_eq!(after.last().unwrap().author_handle, "chef_ana");
    }

    #[test]
    fn sample_follow_is_idempotent() {
        let backend = SampleBackend::new();
        backend.follow("sample-user-1", "sample-user-2").unwrap();
        backend.follow("sample-user-1", "sample-user-2").unwrap();
        let target = backend.user("sample-user-2").unwrap();
        assert_eq!(target.followers, vec!["sample-user-1".to_string()]);
        backend.unfollow("sample-user-1", "sample-user-2").unwrap();
        assert!(backend.user("sample-user-2").unwrap().followers.is_empty());
    }

    #[test]
    fn sample_services_scope_feeds() {
        let services = Services::sample(Arc::new(SampleBackend::new()));
        assert!(services.uploads.is_none());

        let user_feed = (services.user_videos)("sample-user-2");
        let page = user_feed.load_page(1, None).unwrap().unwrap();
        assert!(!page.is_empty());
        assert!(page.iter().all(|video| video.is_owned_by("sample-user-2")));

        let single = (services.single_video)("sample-video-4");
        let page = single.load_page(1, None).unwrap().unwrap();
        assert_eq!(page.len(), 1);
        assert!(single.load_page(2, None).unwrap().unwrap().is_empty());
    }
}
