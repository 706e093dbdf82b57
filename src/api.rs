use std::time::Duration;

use anyhow::{Context, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::model::{
    Comment, Interaction, InteractionPayload, LikerSet, NewUser, ProfileUpdate, User, Video,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api/v1/";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("api: unauthorized")]
    Unauthorized,
    #[error("api: not found: {0}")]
    NotFound(String),
    #[error("api: request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("api: server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("api: unexpected response: {0}")]
    Malformed(String),
}

/// Body of `POST videos/postVideo`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPublish {
    pub url: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub duration: Option<f64>,
    #[serde(rename = "userId")]
    pub user_id: String,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        anyhow::ensure!(
            !config.user_agent.trim().is_empty(),
            "api client user agent required"
        );
        let mut base = config
            .base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("api: parse base url {base}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()
                .context("api: build http client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// One page of the recommendation feed. `Ok(None)` means the server
    /// answered with JSON that is not a video list.
    pub fn recommended(&self, viewer: Option<&str>, page: u32) -> Result<Option<Vec<Video>>> {
        let page = page.to_string();
        let params = [("userId", viewer.unwrap_or("")), ("page", page.as_str())];
        let body: Value = self
            .send(self.get("interactions/recommended", &params)?)?
            .json()
            .context("api: decode recommended feed")?;
        Ok(decode_page(body))
    }

    pub fn video(&self, video_id: &str) -> Result<Video> {
        #[derive(Deserialize)]
        struct Envelope {
            video: Option<Video>,
        }
        let envelope: Envelope =
            self.get_json(self.get("videos/getVideo", &[("videoId", video_id)])?)?;
        envelope
            .video
            .ok_or_else(|| ApiError::NotFound(format!("video {video_id}")).into())
    }

    pub fn user_videos(&self, user_id: &str) -> Result<Vec<Video>> {
        let body: Value = self
            .send(self.get("videos/getUserVideos", &[("userId", user_id)])?)?
            .json()
            .context("api: decode user videos")?;
        decode_page(body)
            .ok_or_else(|| ApiError::Malformed("user videos payload".into()).into())
    }

    pub fn comments(&self, video_id: &str) -> Result<Vec<Comment>> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            comments: Option<Vec<Comment>>,
        }
        let path = format!("videos/getComments/{}", segment(video_id));
        let envelope: Envelope = self.get_json(self.get(&path, &[])?)?;
        Ok(envelope.comments.unwrap_or_default())
    }

    pub fn post_comment(&self, video_id: &str, user_id: &str, text: &str) -> Result<()> {
        anyhow::ensure!(!text.trim().is_empty(), "api: comment text is required");
        let body = serde_json::json!({
            "videoId": video_id,
            "userId": user_id,
            "comment": text,
        });
        self.send(self.post("videos/postComment")?.json(&body))?;
        Ok(())
    }

    pub fn likes(&self, video_id: &str) -> Result<LikerSet> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum LikesPayload {
            Envelope { likes: LikerSet },
            Bare(LikerSet),
        }
        let path = format!("videos/getLikes/{}", segment(video_id));
        let payload: LikesPayload = self.get_json(self.get(&path, &[])?)?;
        Ok(match payload {
            LikesPayload::Envelope { likes } | LikesPayload::Bare(likes) => likes,
        })
    }

    pub fn like(&self, user_id: &str, video_id: &str) -> Result<()> {
        let body = serde_json::json!({ "userId": user_id, "videoId": video_id });
        self.send(self.post("videos/postLike")?.json(&body))?;
        Ok(())
    }

    pub fn unlike(&self, user_id: &str, video_id: &str) -> Result<()> {
        let path = format!(
            "videos/deleteLike/{}/{}",
            segment(user_id),
            segment(video_id)
        );
        let url = self.url(&path, &[])?;
        self.send(self.http.delete(url))?;
        Ok(())
    }

    pub fn record_interaction(&self, interaction: &Interaction) -> Result<()> {
        let payload = InteractionPayload::from(interaction);
        self.send(self.post("interactions/videoInteraction")?.json(&payload))?;
        Ok(())
    }

    pub fn user(&self, user_id: &str) -> Result<User> {
        let path = format!("users/{}", segment(user_id));
        self.get_json(self.get(&path, &[])?)
    }

    pub fn update_user(&self, user_id: &str, update: &ProfileUpdate) -> Result<User> {
        let path = format!("users/{}", segment(user_id));
        let url = self.url(&path, &[])?;
        let payload: UserPayload = self.get_json(self.http.put(url).json(update))?;
        Ok(payload.into_user())
    }

    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let payload: UserPayload = self.get_json(self.post("users/")?.json(user))?;
        Ok(payload.into_user())
    }

    pub fn follow(&self, user_id: &str, follow_id: &str) -> Result<()> {
        let body = serde_json::json!({ "userId": user_id, "followId": follow_id });
        self.send(self.post("users/follow")?.json(&body))?;
        Ok(())
    }

    pub fn unfollow(&self, user_id: &str, follow_id: &str) -> Result<()> {
        let body = serde_json::json!({ "userId": user_id, "followId": follow_id });
        self.send(self.post("users/unfollow")?.json(&body))?;
        Ok(())
    }

    pub fn upload_profile_image(
        &self,
        user_id: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let path = format!("users/{}/uploadProfileImage", segment(user_id));
        let req = self
            .post(&path)?
            .header(CONTENT_TYPE, content_type)
            .timeout(UPLOAD_TIMEOUT)
            .body(bytes);
        self.send(req)?;
        Ok(())
    }

    /// Asks the API for a signed URL the video file can be PUT to.
    pub fn request_upload_url(&self, filename: &str, content_type: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(rename = "uploadUrl")]
            upload_url: Option<String>,
        }
        let body = serde_json::json!({ "filename": filename, "contentType": content_type });
        let envelope: Envelope = self.get_json(self.post("videos/uploadVideo")?.json(&body))?;
        envelope
            .upload_url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ApiError::Malformed("upload url missing".into()).into())
    }

    pub fn put_signed(&self, upload_url: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let url = Url::parse(upload_url).context("api: parse signed upload url")?;
        let req = self
            .http
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .timeout(UPLOAD_TIMEOUT)
            .body(bytes);
        self.send(req)?;
        Ok(())
    }

    pub fn publish_video(&self, video: &VideoPublish) -> Result<()> {
        self.send(self.post("videos/postVideo")?.json(video))?;
        Ok(())
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .with_context(|| format!("api: build url for {path}"))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<RequestBuilder> {
        Ok(self.http.get(self.url(path, params)?))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder> {
        Ok(self.http.post(self.url(path, &[])?))
    }

    fn get_json<T>(&self, req: RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let resp = self.send(req)?;
        let url = resp.url().to_string();
        resp.json()
            .with_context(|| format!("api: decode response from {url}"))
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req
            .header(USER_AGENT, self.user_agent.clone())
            .send()
            .context("api: send request")?;
        let status = resp.status();
        debug!(url = %resp.url(), status = status.as_u16(), "api response");
        if status.is_success() {
            return Ok(resp);
        }

        let url = resp.url().to_string();
        let body = resp.text().unwrap_or_default();
        let message = error_message(&body);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
            StatusCode::NOT_FOUND => ApiError::NotFound(if message.is_empty() {
                url
            } else {
                message
            }),
            s if s.is_server_error() => ApiError::Server {
                status: s.as_u16(),
                message,
            },
            s => ApiError::Rejected {
                status: s.as_u16(),
                message,
            },
        }
        .into())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserPayload {
    Envelope { user: User },
    Bare(User),
}

impl UserPayload {
    fn into_user(self) -> User {
        match self {
            UserPayload::Envelope { user } | UserPayload::Bare(user) => user,
        }
    }
}

fn segment(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_SEGMENT).to_string()
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Accepts both feed shapes the API produces: a bare list for signed-in
/// viewers, `{"videos": [...]}` otherwise. Entries that do not decode are
/// skipped.
pub fn decode_page(body: Value) -> Option<Vec<Video>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("videos") {
            Some(Value::Array(items)) => items,
            _ => return None,
        },
        _ => return None,
    };

    let mut videos = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<Video>(item) {
            Ok(video) => videos.push(video),
            Err(err) => warn!(error = %err, "skipping undecodable video entry"),
        }
    }
    Some(videos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_page_accepts_bare_and_enveloped_lists() {
        let bare = decode_page(json!([{"_id": "a"}, {"_id": "b"}])).unwrap();
        assert_eq!(bare.len(), 2);

        let wrapped = decode_page(json!({"videos": [{"_id": "c"}], "total_num_videos": 1})).unwrap();
        assert_eq!(wrapped[0].id, "c");
    }

    #[test]
    fn decode_page_rejects_other_shapes() {
        assert!(decode_page(json!({"error": "User not found"})).is_none());
        assert!(decode_page(Value::Null).is_none());
        assert!(decode_page(json!("nope")).is_none());
    }

    #[test]
    fn decode_page_skips_broken_entries() {
        let videos = decode_page(json!([{"_id": "a"}, {"title": "no id"}, 5])).unwrap();
        assert_eq!(videos.len(), 1);
    }

    #[test]
    fn path_segments_are_encoded() {
        assert_eq!(segment("abc-123"), "abc-123");
        assert_eq!(segment("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn error_message_prefers_json_error_field() {
        assert_eq!(error_message(r#"{"error": "boom"}"#), "boom");
        assert_eq!(error_message("  plain text "), "plain text");
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client = Client::new(ClientConfig {
            base_url: Some("http://example.test/api/v1".into()),
            user_agent: "test".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.base_url().as_str(), "http://example.test/api/v1/");
        let url = client.url("videos/getVideo", &[("videoId", "x y")]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://example.test/api/v1/videos/getVideo?videoId=x+y"
        );
    }
}
