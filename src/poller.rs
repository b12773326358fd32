//! # Update poller
//! Periodically asks the backend whether new content exists since the last
//! cursor, keeps the latest answer, and offers a refresh action that
//! invalidates the cached collections.
//!
//! One poller per active view. `start` opens a polling session, `stop` ends it.
//! Every response is checked against the session and the cursor it was sent
//! with before it may touch state, so overlapping or late responses can never
//! rewind the cursor.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::{counter, gauge};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::DataCache;
use crate::summary::summarize;
use crate::updates::{Category, CategoryCounts, LatestTimestamps, UpdateCheckResult, UpdateSource};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(30_000);

pub type UpdateCallback = Arc<dyn Fn(&UpdateCheckResult) + Send + Sync>;

/// Options for one polling session.
#[derive(Clone)]
pub struct PollOptions {
    pub enabled: bool,
    pub interval: Duration,
    /// Per-check bound. `None` means "same as `interval`".
    pub request_timeout: Option<Duration>,
    pub on_new_updates: Option<UpdateCallback>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_INTERVAL,
            request_timeout: None,
            on_new_updates: None,
        }
    }
}

impl PollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// A zero interval falls back to [`DEFAULT_INTERVAL`].
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = if interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            interval
        };
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn on_new_updates<F>(mut self, f: F) -> Self
    where
        F: Fn(&UpdateCheckResult) + Send + Sync + 'static,
    {
        self.on_new_updates = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for PollOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollOptions")
            .field("enabled", &self.enabled)
            .field("interval", &self.interval)
            .field("request_timeout", &self.request_timeout)
            .field("on_new_updates", &self.on_new_updates.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerPhase {
    Idle,
    Checking,
    IdleWithResult,
    Stopped,
}

/// Cursor and last answer owned by one poller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollerState {
    pub last_checked: Option<DateTime<Utc>>,
    pub latest_result: Option<UpdateCheckResult>,
    pub is_polling: bool,
}

/// Read-only view published to the UI layer on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollerSnapshot {
    pub phase: PollerPhase,
    pub has_new_updates: bool,
    pub total_new: u64,
    pub categories: CategoryCounts,
    pub summary: Option<String>,
    pub is_polling: bool,
    pub last_checked: Option<DateTime<Utc>>,
    /// Bumped each time a successful check is applied.
    pub result_seq: u64,
    /// Bumped each time `refresh_data` completes.
    pub refresh_seq: u64,
}

impl Default for PollerSnapshot {
    fn default() -> Self {
        Self {
            phase: PollerPhase::Idle,
            has_new_updates: false,
            total_new: 0,
            categories: CategoryCounts::default(),
            summary: None,
            is_polling: false,
            last_checked: None,
            result_seq: 0,
            refresh_seq: 0,
        }
    }
}

/// Outcome of a refresh. Failures never stop the other invalidations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub invalidated: Vec<Category>,
    pub failed: Vec<(Category, String)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

struct Inner {
    state: PollerState,
    in_flight: usize,
    session: u64,
    stopped: bool,
    timer: Option<JoinHandle<()>>,
    on_new_updates: Option<UpdateCallback>,
    request_timeout: Duration,
    result_seq: u64,
    refresh_seq: u64,
}

impl Inner {
    fn phase(&self) -> PollerPhase {
        if self.stopped {
            PollerPhase::Stopped
        } else if self.in_flight > 0 {
            PollerPhase::Checking
        } else if self.state.latest_result.is_some() {
            PollerPhase::IdleWithResult
        } else {
            PollerPhase::Idle
        }
    }

    fn snapshot(&self) -> PollerSnapshot {
        let latest = self.state.latest_result.as_ref();
        PollerSnapshot {
            phase: self.phase(),
            has_new_updates: latest.map(|r| r.has_updates).unwrap_or(false),
            total_new: latest.map(|r| r.total_new).unwrap_or(0),
            categories: latest.map(|r| r.categories).unwrap_or_default(),
            summary: latest.and_then(summarize),
            is_polling: self.state.is_polling,
            last_checked: self.state.last_checked,
            result_seq: self.result_seq,
            refresh_seq: self.refresh_seq,
        }
    }
}

struct Shared {
    source: Arc<dyn UpdateSource>,
    cache: Arc<dyn DataCache>,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<PollerSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self) {
        let snap = self.lock().snapshot();
        self.snapshot_tx.send_replace(snap);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(h) = inner.timer.take() {
            h.abort();
        }
    }
}

/// Keeps `in_flight` honest even when a check is cancelled mid-request.
struct InFlightGuard {
    shared: Arc<Shared>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        {
            let mut inner = self.shared.lock();
            inner.in_flight = inner.in_flight.saturating_sub(1);
            inner.state.is_polling = inner.in_flight > 0;
        }
        self.shared.publish();
    }
}

#[derive(Clone)]
pub struct UpdatePoller {
    shared: Arc<Shared>,
}

impl UpdatePoller {
    pub fn new(source: Arc<dyn UpdateSource>, cache: Arc<dyn DataCache>) -> Self {
        let (snapshot_tx, _rx) = watch::channel(PollerSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                source,
                cache,
                inner: Mutex::new(Inner {
                    state: PollerState::default(),
                    in_flight: 0,
                    session: 0,
                    stopped: false,
                    timer: None,
                    on_new_updates: None,
                    request_timeout: DEFAULT_INTERVAL,
                    result_seq: 0,
                    refresh_seq: 0,
                }),
                snapshot_tx,
            }),
        }
    }

    /// Begin a polling session: one immediate check, then one every `interval`.
    ///
    /// Does nothing when `opts.enabled` is false. Calling `start` on a running
    /// poller replaces its schedule but stays in the same session, so the cursor
    /// and any check already in flight are kept. Calling it after `stop` begins
    /// a fresh session with empty state. Must be called inside a Tokio runtime.
    pub fn start(&self, opts: PollOptions) {
        if !opts.enabled {
            debug!(target: "updates", "poller start skipped: disabled");
            return;
        }

        let interval = if opts.interval.is_zero() {
            DEFAULT_INTERVAL
        } else {
            opts.interval
        };
        let mut inner = self.shared.lock();
        if let Some(h) = inner.timer.take() {
            h.abort();
        }
        if inner.stopped {
            inner.state = PollerState {
                is_polling: inner.in_flight > 0,
                ..PollerState::default()
            };
            inner.stopped = false;
            inner.session += 1;
        }
        inner.on_new_updates = opts.on_new_updates.clone();
        inner.request_timeout = opts.request_timeout.unwrap_or(interval);

        let session = inner.session;
        let weak = Arc::downgrade(&self.shared);
        inner.timer = Some(tokio::spawn(run_schedule(weak, session, interval)));
        drop(inner);

        info!(target: "updates", session, interval_ms = interval.as_millis() as u64, "poller started");
        self.shared.publish();
    }

    /// Cancel the schedule and end the session. Safe to call repeatedly.
    ///
    /// A request already in flight may finish, but its response is discarded.
    pub fn stop(&self) {
        let handle = {
            let mut inner = self.shared.lock();
            if inner.stopped && inner.timer.is_none() {
                return;
            }
            inner.stopped = true;
            inner.timer.take()
        };
        if let Some(h) = handle {
            h.abort();
        }
        info!(target: "updates", "poller stopped");
        self.shared.publish();
    }

    /// Run one check against the backend.
    ///
    /// Returns the result only if it was applied. Failures, timeouts, stale
    /// responses and checks after `stop` all yield `None` and leave the cursor
    /// where it was.
    pub async fn check_for_updates(&self) -> Option<UpdateCheckResult> {
        let (since, session, timeout) = {
            let mut inner = self.shared.lock();
            if inner.stopped {
                debug!(target: "updates", "check skipped: poller stopped");
                return None;
            }
            inner.in_flight += 1;
            inner.state.is_polling = true;
            (inner.state.last_checked, inner.session, inner.request_timeout)
        };
        self.shared.publish();
        let _guard = InFlightGuard {
            shared: self.shared.clone(),
        };

        let fut = self.shared.source.check_since(since);
        let outcome = match tokio::time::timeout(timeout, fut).await {
            Ok(r) => r,
            Err(_) => Err(anyhow!(
                "update check timed out after {} ms",
                timeout.as_millis()
            )),
        };

        match outcome {
            Ok(result) => self.apply(result.normalized(), since, session),
            Err(e) => {
                counter!("updates_check_errors_total").increment(1);
                warn!(
                    target: "updates",
                    source = self.shared.source.name(),
                    since = ?since,
                    "update check failed: {e:#}"
                );
                None
            }
        }
    }

    fn apply(
        &self,
        result: UpdateCheckResult,
        sent_since: Option<DateTime<Utc>>,
        session: u64,
    ) -> Option<UpdateCheckResult> {
        let mut inner = self.shared.lock();

        let reason = if inner.stopped || inner.session != session {
            Some("session ended")
        } else if inner.state.last_checked != sent_since {
            Some("cursor moved")
        } else if sent_since.is_some_and(|cur| result.checked_at < cur) {
            Some("checked_at precedes cursor")
        } else {
            None
        };
        if let Some(reason) = reason {
            drop(inner);
            counter!("updates_stale_responses_total").increment(1);
            debug!(
                target: "updates",
                reason,
                checked_at = %result.checked_at,
                "discarding stale update response"
            );
            return None;
        }

        inner.state.last_checked = Some(result.checked_at);
        inner.state.latest_result = Some(result.clone());
        inner.result_seq += 1;
        let callback = if result.has_updates {
            inner.on_new_updates.clone()
        } else {
            None
        };
        drop(inner);

        counter!("updates_checks_total").increment(1);
        counter!("updates_new_items_total").increment(result.total_new);
        gauge!("updates_last_checked_ts").set(result.checked_at.timestamp() as f64);
        self.shared.publish();

        if result.has_updates {
            info!(
                target: "updates",
                total_new = result.total_new,
                jobs = result.categories.jobs,
                learning = result.categories.learning,
                events = result.categories.events,
                research = result.categories.research,
                "new content available"
            );
        } else {
            debug!(target: "updates", checked_at = %result.checked_at, "no new content");
        }

        if let Some(cb) = callback {
            if catch_unwind(AssertUnwindSafe(|| (cb.as_ref())(&result))).is_err() {
                warn!(target: "updates", "on_new_updates callback panicked");
            }
        }
        Some(result)
    }

    /// Invalidate every tracked collection, then clear the latest result.
    ///
    /// Does not re-check; the next scheduled or manual check re-evaluates.
    pub async fn refresh_data(&self) -> RefreshReport {
        let outcomes = join_all(Category::ALL.iter().map(|c| {
            let cache = self.shared.cache.clone();
            let c = *c;
            async move { (c, cache.invalidate(c).await) }
        }))
        .await;

        let mut report = RefreshReport::default();
        for (c, res) in outcomes {
            match res {
                Ok(()) => {
                    counter!("updates_invalidations_total").increment(1);
                    report.invalidated.push(c);
                }
                Err(e) => {
                    counter!("updates_invalidation_errors_total").increment(1);
                    warn!(target: "updates", collection = %c, "invalidation failed: {e:#}");
                    report.failed.push((c, format!("{e:#}")));
                }
            }
        }

        {
            let mut inner = self.shared.lock();
            inner.state.latest_result = None;
            inner.refresh_seq += 1;
        }
        self.shared.publish();

        info!(
            target: "updates",
            invalidated = report.invalidated.len(),
            failed = report.failed.len(),
            "data refreshed"
        );
        report
    }

    /// Newest `created_at` per collection; `None` if the backend call fails.
    pub async fn latest_timestamps(&self) -> Option<LatestTimestamps> {
        match self.shared.source.latest_timestamps().await {
            Ok(l) => Some(l),
            Err(e) => {
                warn!(target: "updates", "latest timestamps failed: {e:#}");
                None
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollerSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> PollerSnapshot {
        self.shared.lock().snapshot()
    }

    pub fn state(&self) -> PollerState {
        self.shared.lock().state.clone()
    }

    pub fn phase(&self) -> PollerPhase {
        self.shared.lock().phase()
    }

    pub fn has_new_updates(&self) -> bool {
        self.snapshot().has_new_updates
    }

    pub fn total_new(&self) -> u64 {
        self.snapshot().total_new
    }

    pub fn summary(&self) -> Option<String> {
        self.snapshot().summary
    }

    pub fn is_polling(&self) -> bool {
        self.shared.lock().state.is_polling
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().state.last_checked
    }

    pub fn latest_result(&self) -> Option<UpdateCheckResult> {
        self.shared.lock().state.latest_result.clone()
    }

    fn session_is_live(&self, session: u64) -> bool {
        let inner = self.shared.lock();
        !inner.stopped && inner.session == session
    }
}

/// Ticker loop for one session. Holds only a weak handle so a dropped poller
/// ends its schedule.
async fn run_schedule(weak: Weak<Shared>, session: u64, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(shared) = weak.upgrade() else {
            break;
        };
        let poller = UpdatePoller { shared };
        if !poller.session_is_live(session) {
            break;
        }
        if poller.is_polling() {
            counter!("updates_skipped_ticks_total").increment(1);
            debug!(target: "updates", "tick skipped: check already in flight");
            continue;
        }
        poller.check_for_updates().await;
    }
}
