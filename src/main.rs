//! CAAFW update watcher: binary entrypoint
//! Polls the backend for new content, keeps the in-process query cache in
//! sync, and logs the notification banner as it would appear in the UI.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use caafw_updates::config::load_config_default;
use caafw_updates::metrics::Metrics;
use caafw_updates::{
    BannerChange, HttpUpdateSource, InMemoryQueryCache, NotificationBanner, PollerSnapshot,
    UpdatePoller,
};

/// Compact logs by default; JSON lines when UPDATES_LOG_JSON=1.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("caafw_updates=info,updates=info,warn"));

    let json = std::env::var("UPDATES_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn serve_metrics(metrics: Metrics, addr: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind metrics listener on {addr}"))?;
    info!(%addr, "serving /metrics");
    axum::serve(listener, metrics.router())
        .await
        .context("metrics server")
}

/// Mirror the UI banner: react to snapshots and hide after the auto-hide window.
async fn drive_banner(mut rx: watch::Receiver<PollerSnapshot>) {
    let mut banner = NotificationBanner::new();
    loop {
        let wait = banner
            .hides_at()
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO));

        let changed = match wait {
            Some(d) => tokio::select! {
                r = rx.changed() => Some(r),
                _ = tokio::time::sleep(d) => None,
            },
            None => Some(rx.changed().await),
        };

        let change = match changed {
            Some(Ok(())) => {
                let snap = rx.borrow_and_update().clone();
                banner.observe(&snap, Utc::now())
            }
            Some(Err(_)) => break,
            None => banner.tick(Utc::now()),
        };

        match change {
            Some(BannerChange::Shown) => {
                info!(message = banner.message().unwrap_or_default(), "banner shown")
            }
            Some(BannerChange::Hidden) => info!("banner hidden"),
            None => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default().context("load updates config")?;
    info!(
        base_url = %cfg.base_url,
        enabled = cfg.enabled,
        interval_ms = cfg.interval_ms,
        "updates config loaded"
    );

    // Recorder goes in before the poller exists so no series is lost.
    if let Some(addr) = cfg.metrics_addr.clone() {
        let metrics = Metrics::init()?;
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(metrics, addr).await {
                warn!("metrics exporter stopped: {e:#}");
            }
        });
    }

    let source = HttpUpdateSource::with_user_agent(
        cfg.base_url.clone(),
        cfg.request_timeout(),
        &cfg.user_agent,
    )?;
    let cache = Arc::new(InMemoryQueryCache::new());
    let poller = UpdatePoller::new(Arc::new(source), cache.clone());

    if let Some(latest) = poller.latest_timestamps().await {
        if let Some((category, ts)) = latest.newest() {
            info!(%category, newest = %ts, "latest content on backend");
        }
    }

    tokio::spawn(drive_banner(poller.subscribe()));

    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
    let opts = cfg.poll_options().on_new_updates(move |result| {
        let _ = notify_tx.send(result.total_new);
    });
    let auto_refresh = cfg.auto_refresh;
    poller.start(opts);

    loop {
        tokio::select! {
            Some(total) = notify_rx.recv() => {
                if !auto_refresh {
                    continue;
                }
                let report = poller.refresh_data().await;
                info!(
                    total_new = total,
                    jobs_generation = cache.generation(caafw_updates::Category::Jobs),
                    complete = report.is_complete(),
                    "collections refreshed"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    poller.stop();
    Ok(())
}
