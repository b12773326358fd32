//! cache.rs: collaborator interface for the paginated-list query cache.
//!
//! The poller only ever marks collections stale; reads and refetches belong
//! to whoever owns the cache.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::updates::Category;

/// Query cache that can mark a collection stale.
///
/// Calls for different collections are independent and may run concurrently.
#[async_trait::async_trait]
pub trait DataCache: Send + Sync {
    async fn invalidate(&self, collection: Category) -> Result<()>;
}

/// In-process cache bookkeeping: one generation counter per collection.
///
/// Readers compare the generation they fetched at with [`generation`](Self::generation)
/// to know whether their page is stale.
#[derive(Debug, Default)]
pub struct InMemoryQueryCache {
    inner: Mutex<HashMap<Category, u64>>,
}

impl InMemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self, collection: Category) -> u64 {
        let map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        map.get(&collection).copied().unwrap_or(0)
    }

    pub fn is_stale(&self, collection: Category, fetched_at_generation: u64) -> bool {
        self.generation(collection) != fetched_at_generation
    }
}

#[async_trait::async_trait]
impl DataCache for InMemoryQueryCache {
    async fn invalidate(&self, collection: Category) -> Result<()> {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let slot = map.entry(collection).or_insert(0);
        *slot += 1;
        tracing::debug!(target: "updates", %collection, generation = *slot, "collection invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalidate_bumps_only_that_collection() {
        let cache = InMemoryQueryCache::new();
        let seen = cache.generation(Category::Jobs);
        cache.invalidate(Category::Jobs).await.unwrap();
        assert!(cache.is_stale(Category::Jobs, seen));
        assert_eq!(cache.generation(Category::Jobs), 1);
        assert_eq!(cache.generation(Category::Research), 0);
    }
}
