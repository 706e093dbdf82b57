use indexmap::IndexMap;

use crate::model::{LikerSet, Video};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub appended: usize,
    pub duplicates: usize,
}

/// Videos of a feed in arrival order, unique by id.
#[derive(Debug, Clone, Default)]
pub struct VideoCollection {
    items: IndexMap<String, Video>,
}

impl VideoCollection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Video> {
        self.items.get_index(index).map(|(_, video)| video)
    }

    pub fn by_id(&self, id: &str) -> Option<&Video> {
        self.items.get(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.items.get_index_of(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Video> {
        self.items.values()
    }

    /// Appends the page in server order, skipping ids already present
    /// (including repeats inside the page itself).
    pub fn merge_page(&mut self, page: Vec<Video>) -> MergeStats {
        let mut stats = MergeStats::default();
        for video in page {
            if self.items.contains_key(&video.id) {
                stats.duplicates += 1;
                continue;
            }
            self.items.insert(video.id.clone(), video);
            stats.appended += 1;
        }
        stats
    }

    pub fn replace_likes(&mut self, id: &str, likes: LikerSet) -> bool {
        match self.items.get_mut(id) {
            Some(video) => {
                video.likes = likes;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
