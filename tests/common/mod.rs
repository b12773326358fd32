// tests/common/mod.rs
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use caafw_updates::{
    Category, CategoryCounts, DataCache, LatestTimestamps, UpdateCheckResult, UpdateSource,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;

pub fn ts(min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, min, 0).unwrap()
}

pub fn counts(jobs: u64, learning: u64, events: u64, research: u64) -> CategoryCounts {
    CategoryCounts {
        jobs,
        learning,
        events,
        research,
    }
}

pub fn result_at(min: u32, c: CategoryCounts) -> UpdateCheckResult {
    UpdateCheckResult::new(c, ts(min), None)
}

pub enum Step {
    Reply(Result<UpdateCheckResult>),
    /// Resolves when the test sends on the paired sender.
    Gate(oneshot::Receiver<Result<UpdateCheckResult>>),
    Hang,
}

/// Source that replays a script and records the cursor of every call.
#[derive(Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Option<DateTime<Utc>>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, r: UpdateCheckResult) -> &Self {
        self.steps.lock().unwrap().push_back(Step::Reply(Ok(r)));
        self
    }

    pub fn fail(&self, msg: &str) -> &Self {
        self.steps
            .lock()
            .unwrap()
            .push_back(Step::Reply(Err(anyhow!(msg.to_string()))));
        self
    }

    pub fn gate(&self) -> oneshot::Sender<Result<UpdateCheckResult>> {
        let (tx, rx) = oneshot::channel();
        self.steps.lock().unwrap().push_back(Step::Gate(rx));
        tx
    }

    pub fn hang(&self) -> &Self {
        self.steps.lock().unwrap().push_back(Step::Hang);
        self
    }

    pub fn calls(&self) -> Vec<Option<DateTime<Utc>>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl UpdateSource for ScriptedSource {
    async fn check_since(&self, since: Option<DateTime<Utc>>) -> Result<UpdateCheckResult> {
        self.calls.lock().unwrap().push(since);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(r)) => r.map(|mut res| {
                res.since = since;
                res
            }),
            Some(Step::Gate(rx)) => rx.await.unwrap_or_else(|_| Err(anyhow!("gate dropped"))),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(anyhow!("script exhausted")),
        }
    }

    async fn latest_timestamps(&self) -> Result<LatestTimestamps> {
        Err(anyhow!("not scripted"))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Cache that records invalidations and can be told to fail some collections.
#[derive(Default)]
pub struct RecordingCache {
    pub calls: Mutex<Vec<Category>>,
    failing: Mutex<HashSet<Category>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, c: Category) {
        self.failing.lock().unwrap().insert(c);
    }

    pub fn calls(&self) -> Vec<Category> {
        let mut v = self.calls.lock().unwrap().clone();
        v.sort();
        v
    }
}

#[async_trait::async_trait]
impl DataCache for RecordingCache {
    async fn invalidate(&self, collection: Category) -> Result<()> {
        self.calls.lock().unwrap().push(collection);
        if self.failing.lock().unwrap().contains(&collection) {
            return Err(anyhow!("cache backend unavailable"));
        }
        Ok(())
    }
}
