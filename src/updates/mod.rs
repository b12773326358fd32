// src/updates/mod.rs
pub mod client;
pub mod types;

pub use client::{HttpUpdateSource, UpdateSource};
pub use types::{Category, CategoryCounts, LatestTimestamps, UpdateCheckResult};
