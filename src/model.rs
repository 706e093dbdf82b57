use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Set of actor ids that liked a video.
///
/// Older API payloads report likes as a bare number. Those are kept as a
/// reported count until an authoritative read replaces the set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LikerSet {
    ids: BTreeSet<String>,
    reported: Option<u64>,
}

impl LikerSet {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            reported: None,
        }
    }

    pub fn reported(count: u64) -> Self {
        Self {
            ids: BTreeSet::new(),
            reported: Some(count),
        }
    }

    pub fn contains(&self, actor: &str) -> bool {
        self.ids.contains(actor)
    }

    pub fn count(&self) -> usize {
        let reported = self.reported.unwrap_or(0) as usize;
        self.ids.len().max(reported)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn is_authoritative(&self) -> bool {
        self.reported.is_none()
    }

    /// Copy of the set with `actor` added or removed.
    pub fn with_actor(&self, actor: &str, liked: bool) -> Self {
        let mut next = self.clone();
        if liked {
            if next.ids.insert(actor.to_string()) {
                if let Some(count) = next.reported.as_mut() {
                    *count += 1;
                }
            }
        } else if next.ids.remove(actor) {
            if let Some(count) = next.reported.as_mut() {
                *count = count.saturating_sub(1);
            }
        }
        next
    }
}

impl Serialize for LikerSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.ids.len()))?;
        for id in &self.ids {
            seq.serialize_element(id)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for LikerSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawLikes {
            Ids(Vec<ObjectId>),
            Count(u64),
            Missing,
        }

        Ok(match RawLikes::deserialize(deserializer)? {
            RawLikes::Ids(ids) => LikerSet::from_ids(ids.into_iter().map(|id| id.0)),
            RawLikes::Count(count) => LikerSet::reported(count),
            RawLikes::Missing => LikerSet::default(),
        })
    }
}

/// Identifier as the API serialises it: a plain string, or the extended JSON
/// `{"$oid": "..."}` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(pub String);

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Plain(String),
            Extended {
                #[serde(rename = "$oid")]
                oid: String,
            },
        }

        match RawId::deserialize(deserializer)? {
            RawId::Plain(id) | RawId::Extended { oid: id } => {
                if id.trim().is_empty() {
                    Err(de::Error::custom("empty object id"))
                } else {
                    Ok(ObjectId(id))
                }
            }
        }
    }
}

fn object_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    ObjectId::deserialize(deserializer).map(|id| id.0)
}

fn optional_object_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ObjectId>::deserialize(deserializer)?.map(|id| id.0))
}

fn object_id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ObjectId>>::deserialize(deserializer)?
        .unwrap_or_default()
        .into_iter()
        .map(|id| id.0)
        .collect())
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    #[serde(rename = "_id", deserialize_with = "object_id")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, rename = "createdAt", alias = "created_at")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<CommentRef>,
    #[serde(default)]
    pub likes: LikerSet,
    #[serde(
        default,
        rename = "user_id",
        alias = "userId",
        deserialize_with = "optional_object_id"
    )]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub user: Option<Author>,
}

impl Video {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }

    pub fn author_handle(&self) -> &str {
        self.user
            .as_ref()
            .map(|author| author.handle.as_str())
            .filter(|handle| !handle.is_empty())
            .unwrap_or("user")
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Author {
    #[serde(
        default,
        rename = "_id",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_object_id"
    )]
    pub id: Option<String>,
    #[serde(default, rename = "userName", deserialize_with = "null_as_default")]
    pub handle: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, rename = "profileImage")]
    pub avatar_url: Option<String>,
}

/// Entry of a video's comment list: either a bare comment id or the comment
/// embedded in the video document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommentRef {
    Id(String),
    Embedded(Comment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(
        default,
        rename = "_id",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_object_id"
    )]
    pub id: Option<String>,
    #[serde(default, rename = "userId", deserialize_with = "null_as_default")]
    pub author_id: String,
    #[serde(default, rename = "userName", deserialize_with = "null_as_default")]
    pub author_handle: String,
    #[serde(default, rename = "comment", deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl Comment {
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", deserialize_with = "object_id")]
    pub id: String,
    #[serde(default, rename = "userName", deserialize_with = "null_as_default")]
    pub handle: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(default, rename = "profileImage")]
    pub avatar_url: Option<String>,
    #[serde(default, rename = "birthDate")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "object_id_list")]
    pub followers: Vec<String>,
    #[serde(default, deserialize_with = "object_id_list")]
    pub following: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tastes: Vec<String>,
}

impl User {
    pub fn is_followed_by(&self, actor: &str) -> bool {
        self.followers.iter().any(|id| id == actor)
    }

    pub fn display_name(&self) -> &str {
        if !self.name.trim().is_empty() {
            &self.name
        } else if !self.handle.trim().is_empty() {
            &self.handle
        } else {
            &self.id
        }
    }
}

/// Registration payload sent to `POST users/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewUser {
    #[serde(rename = "userName")]
    pub handle: String,
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "birthDate")]
    pub birth_date: NaiveDate,
    #[serde(rename = "useTerms")]
    pub accepted_terms: bool,
    pub tastes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    #[serde(rename = "userName")]
    pub handle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Like,
    Comment,
    Share,
    Watch,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Like => "like",
            InteractionKind::Comment => "comment",
            InteractionKind::Share => "share",
            InteractionKind::Watch => "watch",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub actor_id: String,
    pub video_id: String,
    pub watched_secs: f64,
    pub watched_complete: bool,
}

impl Interaction {
    pub fn new(kind: InteractionKind, actor_id: &str, video_id: &str) -> Self {
        Self {
            kind,
            actor_id: actor_id.to_string(),
            video_id: video_id.to_string(),
            watched_secs: 0.0,
            watched_complete: false,
        }
    }

    pub fn watch(actor_id: &str, video_id: &str, watched_secs: f64, complete: bool) -> Self {
        Self {
            watched_secs,
            watched_complete: complete,
            ..Self::new(InteractionKind::Watch, actor_id, video_id)
        }
    }
}

/// Wire form of `POST interactions/videoInteraction`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionPayload<'a> {
    #[serde(rename = "userId")]
    pub user_id: &'a str,
    #[serde(rename = "videoId")]
    pub video_id: &'a str,
    #[serde(rename = "watchedTime")]
    pub watched_time: f64,
    pub liked: bool,
    pub commented: bool,
    pub shared: bool,
    #[serde(rename = "watchedComplete")]
    pub watched_complete: bool,
}

impl<'a> From<&'a Interaction> for InteractionPayload<'a> {
    fn from(interaction: &'a Interaction) -> Self {
        Self {
            user_id: &interaction.actor_id,
            video_id: &interaction.video_id,
            watched_time: interaction.watched_secs,
            liked: interaction.kind == InteractionKind::Like,
            commented: interaction.kind == InteractionKind::Comment,
            shared: interaction.kind == InteractionKind::Share,
            watched_complete: interaction.watched_complete,
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|naive| Utc.from_local_datetime(&naive).single())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_video_with_liker_list_and_author() {
        let video: Video = serde_json::from_str(
            r#"{
                "_id": "v1",
                "title": "Carbonara",
                "description": "Eggs, pecorino, guanciale.",
                "tags": ["pasta"],
                "url": "https://cdn.test/v1.mp4",
                "duration": 42.5,
                "createdAt": "2024-05-01 12:30:00",
                "comments": ["c1", {"userId": "u2", "userName": "bea", "comment": "yum"}],
                "likes": ["u1", "u2", "u1"],
                "user_id": "u9",
                "user": {"userName": "chef", "profileImage": "https://cdn.test/a.png"}
            }"#,
        )
        .unwrap();
        assert_eq!(video.id, "v1");
        assert_eq!(video.likes.count(), 2);
        assert!(video.likes.contains("u2"));
        assert_eq!(video.comments.len(), 2);
        assert!(matches!(video.comments[1], CommentRef::Embedded(_)));
        assert_eq!(video.author_handle(), "chef");
        assert!(video.is_owned_by("u9"));
        assert_eq!(
            video.created_at().unwrap().to_rfc3339(),
            "2024-05-01T12:30:00+00:00"
        );
    }

    #[test]
    fn legacy_like_count_is_kept_as_reported() {
        let video: Video =
            serde_json::from_str(r#"{"_id": {"$oid": "abc"}, "likes": 7, "duration": null}"#)
                .unwrap();
        assert_eq!(video.id, "abc");
        assert_eq!(video.likes.count(), 7);
        assert!(!video.likes.is_authoritative());
        assert!(!video.likes.contains("anyone"));
        assert_eq!(video.author_handle(), "user");
    }

    #[test]
    fn null_likes_decode_as_empty() {
        let video: Video = serde_json::from_str(r#"{"_id": "v2", "likes": null}"#).unwrap();
        assert_eq!(video.likes.count(), 0);
        assert!(video.likes.is_authoritative());

        let video: Video = serde_json::from_str(r#"{"_id": "v3"}"#).unwrap();
        assert_eq!(video.likes, LikerSet::default());
    }

    #[test]
    fn with_actor_adds_and_removes() {
        let likes = LikerSet::from_ids(["a", "b"]);
        let added = likes.with_actor("c", true);
        assert_eq!(added.count(), 3);
        let removed = added.with_actor("a", false);
        assert_eq!(removed.ids().collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(likes.with_actor("a", true), likes);
    }

    #[test]
    fn interaction_payload_flags_follow_kind() {
        let share = Interaction::new(InteractionKind::Share, "u1", "v1");
        let payload = serde_json::to_value(InteractionPayload::from(&share)).unwrap();
        assert_eq!(payload["shared"], true);
        assert_eq!(payload["liked"], false);
        assert_eq!(payload["userId"], "u1");

        let watch = Interaction::watch("u1", "v1", 12.0, true);
        let payload = serde_json::to_value(InteractionPayload::from(&watch)).unwrap();
        assert_eq!(payload["watchedTime"], 12.0);
        assert_eq!(payload["watchedComplete"], true);
    }

    #[test]
    fn user_follow_lists_tolerate_null() {
        let user: User = serde_json::from_str(
            r#"{"_id": "u1", "userName": "ana", "name": "", "followers": null, "following": ["u2"]}"#,
        )
        .unwrap();
        assert!(user.followers.is_empty());
        assert_eq!(user.following, vec!["u2".to_string()]);
        assert_eq!(user.display_name(), "ana");
    }
}
