// src/updates/types.rs
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Content collections tracked by the notifier, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Jobs,
    Learning,
    Events,
    Research,
}

impl Category {
    /// Fixed display order used for summaries and invalidation.
    pub const ALL: [Category; 4] = [
        Category::Jobs,
        Category::Learning,
        Category::Events,
        Category::Research,
    ];

    /// Cache key of the collection (same as the wire name).
    pub fn key(self) -> &'static str {
        match self {
            Category::Jobs => "jobs",
            Category::Learning => "learning",
            Category::Events => "events",
            Category::Research => "research",
        }
    }

    pub fn label(self, count: u64) -> &'static str {
        let plural = count > 1;
        match (self, plural) {
            (Category::Jobs, false) => "job",
            (Category::Jobs, true) => "jobs",
            (Category::Learning, false) => "learning resource",
            (Category::Learning, true) => "learning resources",
            (Category::Events, false) => "event",
            (Category::Events, true) => "events",
            (Category::Research, false) => "research paper",
            (Category::Research, true) => "research papers",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Per-collection counts of new items. Missing keys on the wire count as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    #[serde(default)]
    pub jobs: u64,
    #[serde(default)]
    pub learning: u64,
    #[serde(default)]
    pub events: u64,
    #[serde(default)]
    pub research: u64,
}

impl CategoryCounts {
    pub fn get(&self, c: Category) -> u64 {
        match c {
            Category::Jobs => self.jobs,
            Category::Learning => self.learning,
            Category::Events => self.events,
            Category::Research => self.research,
        }
    }

    pub fn total(&self) -> u64 {
        Category::ALL.iter().map(|c| self.get(*c)).sum()
    }

    /// `(category, count)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, u64)> + '_ {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

/// Snapshot returned by `GET /updates/check`.
///
/// Construct through [`UpdateCheckResult::new`] or [`UpdateCheckResult::normalized`]
/// so that `total_new == sum(categories)` and `has_updates == (total_new > 0)` hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheckResult {
    pub has_updates: bool,
    pub total_new: u64,
    #[serde(default)]
    pub categories: CategoryCounts,
    #[serde(deserialize_with = "de_cursor")]
    pub checked_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_opt_cursor")]
    pub since: Option<DateTime<Utc>>,
}

impl UpdateCheckResult {
    pub fn new(
        categories: CategoryCounts,
        checked_at: DateTime<Utc>,
        since: Option<DateTime<Utc>>,
    ) -> Self {
        let total_new = categories.total();
        Self {
            has_updates: total_new > 0,
            total_new,
            categories,
            checked_at,
            since,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total_new == self.categories.total() && self.has_updates == (self.total_new > 0)
    }

    /// Re-derive `total_new` and `has_updates` from the category counts.
    pub fn normalized(self) -> Self {
        if !self.is_consistent() {
            tracing::warn!(
                target: "updates",
                total_new = self.total_new,
                has_updates = self.has_updates,
                category_sum = self.categories.total(),
                "inconsistent update counts from backend; using category counts"
            );
        }
        Self::new(self.categories, self.checked_at, self.since)
    }
}

/// Payload of `GET /updates/latest`: newest `created_at` per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestTimestamps {
    pub timestamps: CategoryTimestamps,
    #[serde(default, deserialize_with = "de_opt_cursor")]
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTimestamps {
    #[serde(default, deserialize_with = "de_opt_cursor")]
    pub jobs: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_cursor")]
    pub learning: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_cursor")]
    pub events: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_cursor")]
    pub research: Option<DateTime<Utc>>,
}

impl LatestTimestamps {
    pub fn get(&self, c: Category) -> Option<DateTime<Utc>> {
        match c {
            Category::Jobs => self.timestamps.jobs,
            Category::Learning => self.timestamps.learning,
            Category::Events => self.timestamps.events,
            Category::Research => self.timestamps.research,
        }
    }

    /// Most recent timestamp across all collections, with its category.
    pub fn newest(&self) -> Option<(Category, DateTime<Utc>)> {
        Category::ALL
            .iter()
            .filter_map(|c| self.get(*c).map(|ts| (*c, ts)))
            .max_by_key(|(_, ts)| *ts)
    }
}

/// Parse a cursor as emitted by the backend.
///
/// Accepts RFC3339 (`2024-01-01T00:01:00Z`, `+00:00`) and naive ISO8601
/// (`2024-01-01T00:01:00.123456`), the latter interpreted as UTC.
pub fn parse_cursor(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Render a cursor for the `since` query parameter.
pub fn format_cursor(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn de_cursor<'de, D>(d: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    parse_cursor(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn de_opt_cursor<'de, D>(d: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_cursor(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
    }
}
