use std::collections::HashMap;

use crate::model::Video;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Speculation {
    ticket: u64,
    liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeView {
    pub liked: bool,
    pub count: usize,
}

/// Speculative like state layered over the authoritative liker sets kept in
/// the collection.
///
/// Every toggle takes a ticket. The displayed state follows the newest
/// speculation until the round trip holding that ticket settles; liker sets
/// are written to the collection as reads resolve, so the last read to
/// resolve is the one left standing.
#[derive(Debug, Default)]
pub struct LikeLedger {
    next_ticket: u64,
    pending: HashMap<String, Speculation>,
}

impl LikeLedger {
    pub fn speculate(&mut self, video_id: &str, liked: bool) -> u64 {
        self.next_ticket = self.next_ticket.wrapping_add(1);
        let ticket = self.next_ticket;
        self.pending
            .insert(video_id.to_string(), Speculation { ticket, liked });
        ticket
    }

    /// Ends the round trip `ticket`, successful or not. An older ticket
    /// leaves a newer speculation in place.
    pub fn settle(&mut self, video_id: &str, ticket: u64) {
        if self
            .pending
            .get(video_id)
            .is_some_and(|entry| entry.ticket == ticket)
        {
            self.pending.remove(video_id);
        }
    }

    pub fn speculation(&self, video_id: &str) -> Option<bool> {
        self.pending.get(video_id).map(|entry| entry.liked)
    }

    pub fn is_pending(&self, video_id: &str) -> bool {
        self.pending.contains_key(video_id)
    }

    pub fn view(&self, video: &Video, actor: Option<&str>) -> LikeView {
        let confirmed = actor.is_some_and(|actor| video.likes.contains(actor));
        match (self.speculation(&video.id), actor) {
            (Some(liked), Some(actor)) => LikeView {
                liked,
                count: video.likes.with_actor(actor, liked).count(),
            },
            _ => LikeView {
                liked: confirmed,
                count: video.likes.count(),
            },
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LikerSet;

    fn video(likes: LikerSet) -> Video {
        let mut video: Video = serde_json::from_value(serde_json::json!({ "_id": "v1" })).unwrap();
        video.likes = likes;
        video
    }

    #[test]
    fn speculation_flips_displayed_state() {
        let mut ledger = LikeLedger::default();
        let v = video(LikerSet::from_ids(["other"]));
        assert_eq!(
            ledger.view(&v, Some("me")),
            LikeView {
                liked: false,
                count: 1
            }
        );

        ledger.speculate("v1", true);
        assert_eq!(
            ledger.view(&v, Some("me")),
            LikeView {
                liked: true,
                count: 2
            }
        );
    }

    #[test]
    fn older_ticket_keeps_newer_speculation() {
        let mut ledger = LikeLedger::default();
        let first = ledger.speculate("v1", true);
        let second = ledger.speculate("v1", false);

        ledger.settle("v1", first);
        assert_eq!(ledger.speculation("v1"), Some(false));

        ledger.settle("v1", second);
        assert_eq!(ledger.speculation("v1"), None);
    }

    #[test]
    fn legacy_count_moves_with_speculation() {
        let mut ledger = LikeLedger::default();
        let v = video(LikerSet::reported(7));
        ledger.speculate("v1", true);
        assert_eq!(ledger.view(&v, Some("me")).count, 8);
        assert_eq!(ledger.view(&v, None).count, 7);
    }
}
