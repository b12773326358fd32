// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::poller::PollOptions;
use crate::updates::client::DEFAULT_USER_AGENT;

pub const ENV_CONFIG_PATH: &str = "UPDATES_CONFIG_PATH";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_INTERVAL_MS: u64 = 30_000;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_enabled() -> bool {
    true
}
fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// API root; `/updates/check` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Defaults to `interval_ms`.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Watcher only: refresh cached collections as soon as new content is reported.
    #[serde(default)]
    pub auto_refresh: bool,
    /// e.g. "127.0.0.1:9100"; metrics are not served when absent.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            enabled: default_enabled(),
            interval_ms: default_interval_ms(),
            request_timeout_ms: None,
            user_agent: default_user_agent(),
            auto_refresh: false,
            metrics_addr: None,
        }
    }
}

impl NotifierConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(self.interval_ms))
    }

    /// Poll options for this config (callback left unset).
    pub fn poll_options(&self) -> PollOptions {
        PollOptions::new()
            .enabled(self.enabled)
            .interval(self.interval())
            .request_timeout(self.request_timeout())
    }

    fn sanitize(mut self) -> Self {
        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if self.base_url.is_empty() {
            self.base_url = default_base_url();
        }
        if self.interval_ms == 0 {
            self.interval_ms = DEFAULT_INTERVAL_MS;
        }
        if self.request_timeout_ms == Some(0) {
            self.request_timeout_ms = None;
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
        self.metrics_addr = self
            .metrics_addr
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        self
    }

    /// Apply `UPDATES_*` environment overrides on top of file values.
    fn apply_env(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var("UPDATES_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = std::env::var("UPDATES_ENABLED") {
            self.enabled = parse_bool(&v)
                .ok_or_else(|| anyhow!("UPDATES_ENABLED must be 1/0/true/false, got {v:?}"))?;
        }
        if let Ok(v) = std::env::var("UPDATES_INTERVAL_MS") {
            self.interval_ms = v
                .trim()
                .parse()
                .with_context(|| format!("UPDATES_INTERVAL_MS={v:?}"))?;
        }
        if let Ok(v) = std::env::var("UPDATES_TIMEOUT_MS") {
            let ms: u64 = v
                .trim()
                .parse()
                .with_context(|| format!("UPDATES_TIMEOUT_MS={v:?}"))?;
            self.request_timeout_ms = Some(ms);
        }
        if let Ok(v) = std::env::var("UPDATES_AUTO_REFRESH") {
            self.auto_refresh = parse_bool(&v)
                .ok_or_else(|| anyhow!("UPDATES_AUTO_REFRESH must be 1/0/true/false, got {v:?}"))?;
        }
        if let Ok(v) = std::env::var("UPDATES_METRICS_ADDR") {
            self.metrics_addr = Some(v);
        }
        Ok(self)
    }
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<NotifierConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading updates config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let cfg = match ext.as_str() {
        "json" => serde_json::from_str::<NotifierConfig>(&content)
            .with_context(|| format!("parsing JSON config {}", path.display()))?,
        _ => toml::from_str::<NotifierConfig>(&content)
            .with_context(|| format!("parsing TOML config {}", path.display()))?,
    };
    Ok(cfg.sanitize())
}

/// Load config using env var + fallbacks, then env overrides:
/// 1) $UPDATES_CONFIG_PATH
/// 2) config/updates.toml
/// 3) config/updates.json
/// 4) built-in defaults
pub fn load_config_default() -> Result<NotifierConfig> {
    let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        load_config_from(&pb)?
    } else {
        let toml_p = PathBuf::from("config/updates.toml");
        let json_p = PathBuf::from("config/updates.json");
        if toml_p.exists() {
            load_config_from(&toml_p)?
        } else if json_p.exists() {
            load_config_from(&json_p)?
        } else {
            NotifierConfig::default()
        }
    };
    Ok(base.apply_env()?.sanitize())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
