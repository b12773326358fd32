// src/lib.rs
// Public library surface for the watcher binary and integration tests.

pub mod banner;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod poller;
pub mod summary;
pub mod updates;

// ---- Re-exports for stable public API ----
pub use crate::banner::{BannerChange, NotificationBanner};
pub use crate::cache::{DataCache, InMemoryQueryCache};
pub use crate::config::NotifierConfig;
pub use crate::poller::{
    PollOptions, PollerPhase, PollerSnapshot, PollerState, RefreshReport, UpdatePoller,
};
pub use crate::updates::{
    Category, CategoryCounts, HttpUpdateSource, LatestTimestamps, UpdateCheckResult, UpdateSource,
};
