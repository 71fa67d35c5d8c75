// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact Batcher
//!
//! A channel-backed queue with a single consumer. Each enqueued request
//! carries a [`CompletionToken`]; the consumer forms batches of up to
//! `batch_size` or flushes every `flush_interval`, whichever comes first,
//! hands each batch to the sink, and resolves every token with the sink's
//! per-request outcome.
//!
//! Finalization order matters: `finalize` closes intake, drains and flushes
//! whatever remains, then the caller is expected to have awaited every
//! waiter it cared about — any token that somehow went unsignalled is a
//! batching bug, not a normal outcome.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use dataflow_domain::services::{ArtifactSaveRequest, ArtifactSink};
use dataflow_domain::PipelineError;

use crate::infrastructure::handle_pool::HandlePool;
use crate::infrastructure::runtime::CancellationSignal;

use super::completion_token::{completion_pair, CompletionToken, CompletionWaiter};

struct QueuedArtifact {
    request: ArtifactSaveRequest,
    token: CompletionToken,
}

pub struct ArtifactBatcher {
    tx: Mutex<Option<mpsc::UnboundedSender<QueuedArtifact>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl ArtifactBatcher {
    pub fn start(
        sink: Arc<dyn ArtifactSink>,
        batch_size: usize,
        flush_interval: Duration,
        handles: Arc<HandlePool>,
        cancellation: CancellationSignal,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(run_consumer(rx, sink, batch_size, flush_interval, handles, cancellation));
        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            consumer: Mutex::new(Some(consumer)),
        })
    }

    /// Enqueues an artifact-save request and returns a waiter the caller may
    /// await for durability, or drop to fire-and-forget.
    pub fn enqueue(&self, request: ArtifactSaveRequest) -> CompletionWaiter {
        let (token, waiter) = completion_pair();
        let queued = QueuedArtifact { request, token };
        let sent = self.tx.lock().as_ref().map(|tx| tx.send(queued));
        match sent {
            Some(Ok(())) => waiter,
            _ => {
                // Batcher already finalized; fail the request immediately
                // rather than silently drop it.
                let (token, waiter) = completion_pair();
                token.signal_err(PipelineError::invariant("artifact batcher already finalized"));
                waiter
            }
        }
    }

    /// Closes intake and awaits the consumer's final drain-and-flush.
    pub async fn finalize(&self) {
        self.tx.lock().take();
        if let Some(handle) = self.consumer.lock().take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "artifact batcher consumer panicked during finalize");
            }
        }
    }
}

async fn run_consumer(
    mut rx: mpsc::UnboundedReceiver<QueuedArtifact>,
    sink: Arc<dyn ArtifactSink>,
    batch_size: usize,
    flush_interval: Duration,
    handles: Arc<HandlePool>,
    cancellation: CancellationSignal,
) {
    let mut pending = Vec::new();
    loop {
        let timer = tokio::time::sleep(flush_interval);
        tokio::pin!(timer);
        tokio::select! {
            biased;
            maybe = rx.recv() => {
                match maybe {
                    Some(item) => pending.push(item),
                    None => {
                        flush(&sink, &mut pending, &handles, &cancellation).await;
                        break;
                    }
                }
            }
            _ = &mut timer => {
                flush(&sink, &mut pending, &handles, &cancellation).await;
                continue;
            }
        }
        while pending.len() < batch_size {
            match rx.try_recv() {
                Ok(item) => pending.push(item),
                Err(_) => break,
            }
        }
        if pending.len() >= batch_size {
            flush(&sink, &mut pending, &handles, &cancellation).await;
        }
    }
}

/// Rents a handle guard before talking to the sink. A rent failure (the
/// cancellation signal fired while waiting) still resolves every queued
/// token so no caller is left awaiting a write that will never happen.
async fn flush(sink: &Arc<dyn ArtifactSink>, pending: &mut Vec<QueuedArtifact>, handles: &HandlePool, cancellation: &CancellationSignal) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    debug!(count = batch.len(), "flushing artifact batch");
    match handles.rent(cancellation).await {
        Ok(guard) => {
            let (requests, tokens): (Vec<_>, Vec<_>) = batch.into_iter().map(|q| (q.request, q.token)).unzip();
            let results = sink.save_batch(requests).await;
            for (result, token) in results.into_iter().zip(tokens.into_iter()) {
                match result.outcome {
                    Ok(path) => token.signal_ok(path),
                    Err(err) => token.signal_err(err),
                }
            }
            drop(guard);
        }
        Err(err) => {
            warn!(error = %err, "artifact flush skipped: handle pool rent failed");
            for queued in batch {
                queued.token.signal_err(PipelineError::Cancelled("artifact batcher cancelled before flush".into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::artifacts::InMemoryArtifactSink;
    use dataflow_domain::value_objects::{ResourceRunId, StorageType};

    #[tokio::test]
    async fn enqueued_artifacts_resolve_after_flush() {
        let sink = Arc::new(InMemoryArtifactSink::new());
        let batcher = ArtifactBatcher::start(sink, 10, Duration::from_millis(20), Arc::new(HandlePool::new(4)), CancellationSignal::new());
        let waiter = batcher.enqueue(ArtifactSaveRequest {
            resource_run_id: ResourceRunId::new(),
            step_name: "normalize".into(),
            artifact_name: "out.json".into(),
            storage_type: StorageType::Memory,
            data: Some(b"{}".to_vec()),
            metadata: None,
        });
        assert!(waiter.wait().await.is_ok());
        batcher.finalize().await;
    }

    #[tokio::test]
    async fn finalize_flushes_remaining_items() {
        let sink = Arc::new(InMemoryArtifactSink::new());
        let batcher = ArtifactBatcher::start(sink, 100, Duration::from_secs(60), Arc::new(HandlePool::new(4)), CancellationSignal::new());
        let waiter = batcher.enqueue(ArtifactSaveRequest {
            resource_run_id: ResourceRunId::new(),
            step_name: "score".into(),
            artifact_name: "out_1.json".into(),
            storage_type: StorageType::Memory,
            data: None,
            metadata: None,
        });
        batcher.finalize().await;
        assert!(waiter.wait().await.is_ok());
    }
}
