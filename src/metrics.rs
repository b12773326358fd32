use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe the `updates_*` series.
    ///
    /// Call before any poller runs: values recorded earlier are dropped.
    /// Repeated calls return the handle installed by the first one. Fails if a
    /// different recorder is already installed.
    pub fn init() -> Result<Self> {
        let handle = HANDLE.get_or_try_init(|| -> Result<PrometheusHandle> {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .context("prometheus: install recorder")?;
            describe_series();
            Ok(handle)
        })?;
        Ok(Self {
            handle: handle.clone(),
        })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// Series descriptions; must run after the recorder is installed.
fn describe_series() {
    describe_counter!("updates_checks_total", "Successful update checks.");
    describe_counter!(
        "updates_check_errors_total",
        "Update checks that failed or timed out."
    );
    describe_counter!(
        "updates_stale_responses_total",
        "Responses discarded by the cursor/session guard."
    );
    describe_counter!(
        "updates_skipped_ticks_total",
        "Scheduled ticks skipped because a check was in flight."
    );
    describe_counter!(
        "updates_new_items_total",
        "New items reported by applied update checks."
    );
    describe_counter!(
        "updates_invalidations_total",
        "Collection invalidations issued by refresh."
    );
    describe_counter!(
        "updates_invalidation_errors_total",
        "Collection invalidations that failed."
    );
    describe_gauge!(
        "updates_last_checked_ts",
        "Unix ts of the current poll cursor."
    );
}
