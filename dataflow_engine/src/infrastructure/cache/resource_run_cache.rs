// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Resource-Run Cache
//!
//! Returns a stable [`ResourceRunId`] for each `(run, resource_id)`, backed
//! by a single-flight pattern: concurrent callers for the same
//! `resource_id` share one in-flight resolution, so every observer receives
//! the same id even under a burst of concurrent first-sightings for the
//! same record.
//!
//! Resolution is a pure in-process coalescing concern; the corresponding
//! ResourceRun row is persisted by handing the new id off to the progress
//! tracker's batched `resource_start` stream (§4.3) rather than writing
//! through directly — the cache's job ends at "exactly one id was minted for
//! this resource", not at durability.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use dataflow_domain::value_objects::ResourceRunId;

/// Single-flight cache of `resource_id -> resource_run_id` for one run.
pub struct ResourceRunCache {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<Option<ResourceRunId>>>>>,
}

impl ResourceRunCache {
    pub fn new() -> Self {
        Self {
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    /// Returns the cached id for `resource_id`, or runs `create` exactly
    /// once across all concurrent callers and caches its result.
    ///
    /// `create` is only invoked by the caller that wins the race to acquire
    /// this resource id's per-key lock; every other concurrent (or later)
    /// caller observes the same id without re-running it.
    pub async fn get_or_create<F, Fut>(&self, resource_id: &str, create: F) -> ResourceRunId
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ResourceRunId>,
    {
        let key_lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(resource_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
                .clone()
        };

        let mut slot = key_lock.lock().await;
        if let Some(id) = *slot {
            return id;
        }
        let id = create().await;
        *slot = Some(id);
        id
    }

    /// Present for already-resolved lookups (e.g. by a retry loader that
    /// wants to check without risking a create). Returns `None` if this
    /// process has not resolved the resource yet.
    pub fn peek(&self, resource_id: &str) -> Option<ResourceRunId> {
        let locks = self.locks.lock();
        locks.get(resource_id).and_then(|lock| lock.try_lock().ok().and_then(|g| *g))
    }
}

impl Default for ResourceRunCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_callers_for_the_same_id_see_one_create() {
        let cache = Arc::new(ResourceRunCache::new());
        let create_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let create_count = create_count.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create("RR-001", || async move {
                        create_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                        ResourceRunId::new()
                    })
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        assert_eq!(create_count.load(Ordering::SeqCst), 1);
        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn distinct_resource_ids_get_distinct_runs() {
        let cache = ResourceRunCache::new();
        let a = cache.get_or_create("RR-001", || async { ResourceRunId::new() }).await;
        let b = cache.get_or_create("RR-002", || async { ResourceRunId::new() }).await;
        assert_ne!(a, b);
    }
}
