/// Minimum share of an item that must be on screen for it to count as visible.
pub const VISIBLE_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewableItem {
    pub index: usize,
    pub visible_fraction: f32,
}

impl ViewableItem {
    pub fn new(index: usize, visible_fraction: f32) -> Self {
        Self {
            index,
            visible_fraction,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible_fraction >= VISIBLE_THRESHOLD
    }
}

/// Playback change produced when the active item moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackSwitch {
    pub stop: Option<usize>,
    pub start: Option<usize>,
}

/// Chooses the single active item of a list.
#[derive(Debug, Clone, Default)]
pub struct VisibilityTracker {
    active: Option<usize>,
}

impl VisibilityTracker {
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Feeds the items on screen after the scroll position settled. The first
    /// visible one (in reported order) becomes active. Returns `None` when the
    /// active item did not change.
    pub fn update(&mut self, items: &[ViewableItem]) -> Option<PlaybackSwitch> {
        let next = items
            .iter()
            .find(|item| item.is_visible())
            .map(|item| item.index);
        self.set_active(next)
    }

    pub fn set_active(&mut self, next: Option<usize>) -> Option<PlaybackSwitch> {
        if next == self.active {
            return None;
        }
        let switch = PlaybackSwitch {
            stop: self.active,
            start: next,
        };
        self.active = next;
        Some(switch)
    }

    pub fn clear(&mut self) -> Option<PlaybackSwitch> {
        self.set_active(None)
    }
}
