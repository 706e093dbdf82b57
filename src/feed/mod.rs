//! Feed pagination, playback focus and like reconciliation.

mod collection;
mod controller;
mod cursor;
mod likes;
mod visibility;

pub use collection::{MergeStats, VideoCollection};
pub use controller::{
    share_link, FeedController, FeedSettings, Outcome, ShareLink, Shared,
    DEFAULT_PREFETCH_DISTANCE, DEFAULT_SHARE_BASE_URL,
};
pub use cursor::PageCursor;
pub use likes::{LikeLedger, LikeView};
pub use visibility::{PlaybackSwitch, ViewableItem, VisibilityTracker, VISIBLE_THRESHOLD};
