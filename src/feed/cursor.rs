/// Paging state of one feed: the next page to ask for, whether the source
/// may have more, and the id of the fetch currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    page: u32,
    has_more: bool,
    in_flight: Option<u64>,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            page: 1,
            has_more: true,
            in_flight: None,
        }
    }
}

impl PageCursor {
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn can_fetch(&self) -> bool {
        self.has_more && self.in_flight.is_none()
    }

    /// Claims the cursor for `request_id`. Returns the page to fetch, or
    /// `None` when a fetch is already running or the feed is exhausted.
    pub fn begin(&mut self, request_id: u64) -> Option<u32> {
        if !self.can_fetch() {
            return None;
        }
        self.in_flight = Some(request_id);
        Some(self.page)
    }

    pub fn is_current(&self, request_id: u64) -> bool {
        self.in_flight == Some(request_id)
    }

    /// A non-empty page arrived; advance even when every item was a
    /// duplicate.
    pub fn advance(&mut self) {
        self.page = self.page.saturating_add(1);
        self.in_flight = None;
    }

    pub fn exhaust(&mut self) {
        self.has_more = false;
        self.in_flight = None;
    }

    /// The fetch failed; the same page is retried on the next trigger.
    pub fn release(&mut self) {
        self.in_flight = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
