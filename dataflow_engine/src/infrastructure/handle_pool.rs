// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Storage-Handle Pool
//!
//! Guards concurrent access to storage handles with a counting semaphore,
//! the way the teacher's resource manager guards CPU/IO tokens. Rented by
//! the progress tracker's three flush paths and the artifact batcher's
//! flush path, each immediately before the storage/sink call it protects.
//! Rent blocks when the pool is at capacity and returns early if the
//! cancellation signal fires while waiting; return happens automatically
//! when the rented guard drops.

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

use dataflow_domain::PipelineError;

use crate::infrastructure::runtime::CancellationSignal;

/// A bounded pool of storage-handle permits.
#[derive(Debug)]
pub struct HandlePool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl HandlePool {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "constructing storage handle pool");
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rents one handle permit, suspending until one is free or the
    /// cancellation signal fires.
    pub async fn rent(&self, cancellation: &CancellationSignal) -> Result<HandleGuard<'_>, PipelineError> {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                Err(PipelineError::Cancelled("handle pool rent cancelled".into()))
            }
            acquired = self.semaphore.acquire() => {
                let permit = acquired.map_err(|_| {
                    PipelineError::invariant("handle pool semaphore closed unexpectedly")
                })?;
                Ok(HandleGuard { _permit: permit })
            }
        }
    }
}

/// A rented handle permit; releases back to the pool on drop.
pub struct HandleGuard<'a> {
    _permit: SemaphorePermit<'a>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rent_blocks_when_pool_is_at_capacity() {
        let pool = HandlePool::new(1);
        let cancellation = CancellationSignal::new();
        let first = pool.rent(&cancellation).await.unwrap();

        let pool2 = &pool;
        let cancellation2 = cancellation.clone();
        let mut second = Box::pin(pool2.rent(&cancellation2));
        assert!(futures::poll!(&mut second).is_pending());

        drop(first);
        assert!(second.await.is_ok());
    }

    #[tokio::test]
    async fn rent_observes_cancellation() {
        let pool = HandlePool::new(1);
        let cancellation = CancellationSignal::new();
        let _first = pool.rent(&cancellation).await.unwrap();
        cancellation.cancel();
        let result = pool.rent(&cancellation).await;
        assert!(result.is_err());
    }
}
