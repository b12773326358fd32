// src/banner.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::poller::PollerSnapshot;

pub const AUTO_HIDE_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerChange {
    Shown,
    Hidden,
}

/// UI-local visibility of the "new content" banner.
/// - Shown when a snapshot carries a fresh result with new updates.
/// - Hidden on dismiss, on refresh, or `AUTO_HIDE_MS` after being shown.
/// - Never writes back to the poller.
#[derive(Debug, Clone)]
pub struct NotificationBanner {
    auto_hide: ChronoDuration,
    shown_at: Option<DateTime<Utc>>,
    message: Option<String>,
    seen_result_seq: u64,
    seen_refresh_seq: u64,
}

impl Default for NotificationBanner {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBanner {
    pub fn new() -> Self {
        Self::with_auto_hide_ms(AUTO_HIDE_MS)
    }

    /// `ms` < 0 is treated as 0 (hide on the next tick).
    pub fn with_auto_hide_ms(ms: i64) -> Self {
        Self {
            auto_hide: ChronoDuration::milliseconds(ms.max(0)),
            shown_at: None,
            message: None,
            seen_result_seq: 0,
            seen_refresh_seq: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.shown_at.is_some()
    }

    /// Banner text while visible.
    pub fn message(&self) -> Option<&str> {
        self.shown_at.and(self.message.as_deref())
    }

    /// Feed the latest poller snapshot observed at `now`.
    pub fn observe(&mut self, snap: &PollerSnapshot, now: DateTime<Utc>) -> Option<BannerChange> {
        let refreshed = snap.refresh_seq != self.seen_refresh_seq;
        let fresh_result = snap.result_seq != self.seen_result_seq;
        self.seen_refresh_seq = snap.refresh_seq;
        self.seen_result_seq = snap.result_seq;

        if refreshed && !(fresh_result && snap.has_new_updates) {
            return self.hide();
        }
        if fresh_result && snap.has_new_updates {
            let was_visible = self.is_visible();
            self.shown_at = Some(now);
            self.message = snap.summary.clone();
            return (!was_visible).then_some(BannerChange::Shown);
        }
        None
    }

    /// Apply the auto-hide timeout.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<BannerChange> {
        match self.shown_at {
            Some(ts) if now.signed_duration_since(ts) >= self.auto_hide => self.hide(),
            _ => None,
        }
    }

    pub fn dismiss(&mut self) -> Option<BannerChange> {
        self.hide()
    }

    /// Instant at which the banner hides itself, if visible.
    pub fn hides_at(&self) -> Option<DateTime<Utc>> {
        self.shown_at.map(|ts| ts + self.auto_hide)
    }

    fn hide(&mut self) -> Option<BannerChange> {
        self.shown_at.take().map(|_| {
            self.message = None;
            BannerChange::Hidden
        })
    }
}
