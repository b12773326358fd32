// src/updates/client.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;

use super::types::{format_cursor, LatestTimestamps, UpdateCheckResult};

pub const DEFAULT_USER_AGENT: &str = concat!("caafw-updates/", env!("CARGO_PKG_VERSION"));

/// Backend that answers "is there new content since this cursor?".
#[async_trait::async_trait]
pub trait UpdateSource: Send + Sync {
    /// `since == None` lets the backend pick its own lookback window.
    async fn check_since(&self, since: Option<DateTime<Utc>>) -> Result<UpdateCheckResult>;

    async fn latest_timestamps(&self) -> Result<LatestTimestamps>;

    fn name(&self) -> &'static str;
}

/// REST implementation against `{base_url}/updates/check` and `{base_url}/updates/latest`.
#[derive(Clone)]
pub struct HttpUpdateSource {
    base_url: String,
    client: Client,
}

impl HttpUpdateSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Self::with_user_agent(base_url, timeout, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(
        base_url: impl Into<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout.min(Duration::from_secs(4)))
            .timeout(timeout)
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl UpdateSource for HttpUpdateSource {
    async fn check_since(&self, since: Option<DateTime<Utc>>) -> Result<UpdateCheckResult> {
        let url = format!("{}/updates/check", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(ts) = since {
            req = req.query(&[("since", format_cursor(ts))]);
        }

        let rsp = req
            .send()
            .await
            .context("request /updates/check")?
            .error_for_status()
            .context("/updates/check non-2xx")?;

        let result: UpdateCheckResult = rsp.json().await.context("parse /updates/check JSON")?;
        Ok(result.normalized())
    }

    async fn latest_timestamps(&self) -> Result<LatestTimestamps> {
        let url = format!("{}/updates/latest", self.base_url);
        self.client
            .get(&url)
            .send()
            .await
            .context("request /updates/latest")?
            .error_for_status()
            .context("/updates/latest non-2xx")?
            .json()
            .await
            .context("parse /updates/latest JSON")
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
