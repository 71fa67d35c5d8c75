// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Tracker
//!
//! Owns three independent batching streams — resource starts, step
//! progress, and resource completions — each with its own consumer loop
//! that flushes on a batch-size threshold or a flush-interval deadline,
//! whichever comes first. Also maintains an in-memory mirror of every
//! resource's current status, used for finalization and for observers that
//! want a summary snapshot without round-tripping to storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use dataflow_domain::services::{
    CreateResourceRunUpdate, ResourceCompletionUpdate, StepProgressUpdate, StorageService,
};
use dataflow_domain::value_objects::{ResourceRunId, ResourceStatus, RunId, RunStatus, RunType, StepStatus};
use dataflow_domain::PipelineError;

use crate::infrastructure::cache::ResourceRunCache;
use crate::infrastructure::handle_pool::HandlePool;
use crate::infrastructure::runtime::CancellationSignal;

const DEFERRED_RETRY_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Default, Clone)]
struct ResourceMirror {
    status: Option<ResourceStatus>,
    next_sequence: u32,
}

/// Tuning for the three batching streams; mirrors §6.4's progress-tracker
/// keys.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTuning {
    pub resource_start_batch_size: usize,
    pub resource_start_flush_interval: Duration,
    pub step_progress_batch_size: usize,
    pub step_progress_flush_interval: Duration,
    pub resource_complete_batch_size: usize,
    pub resource_complete_flush_interval: Duration,
}

impl Default for ProgressTuning {
    fn default() -> Self {
        Self {
            resource_start_batch_size: 50,
            resource_start_flush_interval: Duration::from_secs(1),
            step_progress_batch_size: 100,
            step_progress_flush_interval: Duration::from_secs(5),
            resource_complete_batch_size: 100,
            resource_complete_flush_interval: Duration::from_secs(3),
        }
    }
}

pub struct ProgressTracker {
    storage: Arc<dyn StorageService>,
    run_id: RunId,
    cache: ResourceRunCache,
    resources: Mutex<HashMap<String, ResourceMirror>>,
    start_tx: Mutex<Option<mpsc::UnboundedSender<CreateResourceRunUpdate>>>,
    step_tx: Mutex<Option<mpsc::UnboundedSender<StepProgressUpdate>>>,
    complete_tx: Mutex<Option<mpsc::UnboundedSender<ResourceCompletionUpdate>>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl ProgressTracker {
    /// Ensures the PipelineRun row exists (create-if-absent, status=pending)
    /// and spawns the three consumer loops.
    #[instrument(skip(storage, configuration), fields(run_id = %run_id))]
    pub async fn init(
        storage: Arc<dyn StorageService>,
        run_id: RunId,
        category: &str,
        name: &str,
        run_type: RunType,
        parent_run_id: Option<RunId>,
        configuration: Option<serde_json::Value>,
        tuning: ProgressTuning,
        handles: Arc<HandlePool>,
        cancellation: CancellationSignal,
    ) -> Result<Arc<Self>, PipelineError> {
        storage
            .create_run(run_id, category, name, run_type, parent_run_id, configuration)
            .await?;

        let (start_tx, start_rx) = mpsc::unbounded_channel();
        let (step_tx, step_rx) = mpsc::unbounded_channel();
        let (complete_tx, complete_rx) = mpsc::unbounded_channel();

        let start_handle = tokio::spawn(run_resource_start_consumer(
            start_rx,
            storage.clone(),
            run_id,
            tuning.resource_start_batch_size,
            tuning.resource_start_flush_interval,
            handles.clone(),
            cancellation.clone(),
        ));
        let step_handle = tokio::spawn(run_step_progress_consumer(
            step_rx,
            storage.clone(),
            run_id,
            tuning.step_progress_batch_size,
            tuning.step_progress_flush_interval,
            handles.clone(),
            cancellation.clone(),
        ));
        let complete_handle = tokio::spawn(run_resource_complete_consumer(
            complete_rx,
            storage.clone(),
            run_id,
            tuning.resource_complete_batch_size,
            tuning.resource_complete_flush_interval,
            handles,
            cancellation,
        ));

        Ok(Arc::new(Self {
            storage,
            run_id,
            cache: ResourceRunCache::new(),
            resources: Mutex::new(HashMap::new()),
            start_tx: Mutex::new(Some(start_tx)),
            step_tx: Mutex::new(Some(step_tx)),
            complete_tx: Mutex::new(Some(complete_tx)),
            consumers: Mutex::new(vec![start_handle, step_handle, complete_handle]),
        }))
    }

    /// Resolves (creating if necessary) the resource-run id for
    /// `resource_id`, enqueueing a creation request on first sighting.
    pub async fn record_resource_start(&self, resource_id: &str, resource_type: &str) -> ResourceRunId {
        let resource_type = resource_type.to_string();
        let id = self
            .cache
            .get_or_create(resource_id, || async {
                let id = ResourceRunId::new();
                if let Some(tx) = self.start_tx.lock().as_ref() {
                    let _ = tx.send(CreateResourceRunUpdate {
                        resource_run_id: id,
                        resource_id: resource_id.to_string(),
                        resource_type: resource_type.clone(),
                    });
                }
                id
            })
            .await;
        self.resources
            .lock()
            .entry(resource_id.to_string())
            .or_insert_with(|| ResourceMirror {
                status: Some(ResourceStatus::Processing),
                next_sequence: 0,
            });
        id
    }

    /// Assigns the next sequence number for `resource_id` and enqueues an
    /// in-progress step row.
    pub fn record_step_start(&self, resource_run_id: ResourceRunId, resource_id: &str, step_name: &str) -> u32 {
        let sequence = {
            let mut resources = self.resources.lock();
            let mirror = resources.entry(resource_id.to_string()).or_default();
            let seq = mirror.next_sequence;
            mirror.next_sequence += 1;
            seq
        };
        self.enqueue_step(StepProgressUpdate {
            resource_run_id,
            step_name: step_name.to_string(),
            sequence,
            status: StepStatus::InProgress,
            duration_ms: None,
            error_message: None,
        });
        sequence
    }

    pub fn record_step_complete(&self, resource_run_id: ResourceRunId, step_name: &str, sequence: u32, duration_ms: i64) {
        self.enqueue_step(StepProgressUpdate {
            resource_run_id,
            step_name: step_name.to_string(),
            sequence,
            status: StepStatus::Completed,
            duration_ms: Some(duration_ms),
            error_message: None,
        });
    }

    pub fn record_step_failed(
        &self,
        resource_run_id: ResourceRunId,
        step_name: &str,
        sequence: u32,
        duration_ms: i64,
        error_message: impl Into<String>,
    ) {
        self.enqueue_step(StepProgressUpdate {
            resource_run_id,
            step_name: step_name.to_string(),
            sequence,
            status: StepStatus::Failed,
            duration_ms: Some(duration_ms),
            error_message: Some(error_message.into()),
        });
    }

    fn enqueue_step(&self, update: StepProgressUpdate) {
        if let Some(tx) = self.step_tx.lock().as_ref() {
            let _ = tx.send(update);
        }
    }

    /// Records the terminal outcome for a resource (or the aggregate
    /// outcome of a fanned-out resource's children).
    pub fn record_resource_complete(
        &self,
        resource_id: &str,
        resource_run_id: ResourceRunId,
        status: ResourceStatus,
        duration_ms: i64,
        error_message: Option<String>,
        error_step: Option<String>,
    ) {
        self.resources
            .lock()
            .entry(resource_id.to_string())
            .or_default()
            .status = Some(status);
        if let Some(tx) = self.complete_tx.lock().as_ref() {
            let _ = tx.send(ResourceCompletionUpdate {
                resource_run_id,
                status,
                duration_ms,
                error_message,
                error_step,
            });
        }
    }

    /// Whether every tracked resource has reached a terminal status.
    pub fn all_resources_terminal(&self) -> bool {
        self.resources
            .lock()
            .values()
            .all(|mirror| mirror.status.map(|s| s.is_terminal()).unwrap_or(false))
    }

    pub fn any_resource_failed(&self) -> bool {
        self.resources
            .lock()
            .values()
            .any(|mirror| mirror.status == Some(ResourceStatus::Failed))
    }

    /// Closes all three writer queues, awaits their drain, then writes the
    /// run's final status: completed if no incomplete resources remain,
    /// failed otherwise.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn finalize(&self, forced_failure: bool) -> Result<RunStatus, PipelineError> {
        self.start_tx.lock().take();
        self.step_tx.lock().take();
        self.complete_tx.lock().take();

        let handles = std::mem::take(&mut *self.consumers.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "progress consumer task panicked during finalize");
            }
        }

        let final_status = if forced_failure || self.any_resource_failed() || !self.all_resources_terminal() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        debug!(status = %final_status, "finalizing pipeline run");
        self.storage.complete_run(self.run_id, final_status).await?;
        Ok(final_status)
    }
}

async fn run_resource_start_consumer(
    mut rx: mpsc::UnboundedReceiver<CreateResourceRunUpdate>,
    storage: Arc<dyn StorageService>,
    run_id: RunId,
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
                        flush_resource_starts(&storage, run_id, &mut pending, &handles, &cancellation).await;
                        break;
                    }
                }
            }
            _ = &mut timer => {
                flush_resource_starts(&storage, run_id, &mut pending, &handles, &cancellation).await;
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
            flush_resource_starts(&storage, run_id, &mut pending, &handles, &cancellation).await;
        }
    }
}

async fn flush_resource_starts(
    storage: &Arc<dyn StorageService>,
    run_id: RunId,
    pending: &mut Vec<CreateResourceRunUpdate>,
    handles: &HandlePool,
    cancellation: &CancellationSignal,
) {
    if pending.is_empty() {
        return;
    }
    let guard = match handles.rent(cancellation).await {
        Ok(guard) => guard,
        Err(err) => {
            warn!(error = %err, "resource-start flush skipped: handle pool rent failed");
            return;
        }
    };
    let batch = std::mem::take(pending);
    debug!(count = batch.len(), "flushing resource-start batch");
    if let Err(err) = storage.create_resource_runs_batch(run_id, &batch).await {
        error!(error = %err, "resource-start flush failed");
    }
    drop(guard);
}

async fn run_step_progress_consumer(
    mut rx: mpsc::UnboundedReceiver<StepProgressUpdate>,
    storage: Arc<dyn StorageService>,
    run_id: RunId,
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
                        flush_step_progress(&storage, run_id, &mut pending, &handles, &cancellation).await;
                        break;
                    }
                }
            }
            _ = &mut timer => {
                flush_step_progress(&storage, run_id, &mut pending, &handles, &cancellation).await;
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
            flush_step_progress(&storage, run_id, &mut pending, &handles, &cancellation).await;
        }
    }
}

async fn flush_step_progress(
    storage: &Arc<dyn StorageService>,
    run_id: RunId,
    pending: &mut Vec<StepProgressUpdate>,
    handles: &HandlePool,
    cancellation: &CancellationSignal,
) {
    if pending.is_empty() {
        return;
    }
    let guard = match handles.rent(cancellation).await {
        Ok(guard) => guard,
        Err(err) => {
            warn!(error = %err, "step-progress flush skipped: handle pool rent failed");
            return;
        }
    };
    let batch = std::mem::take(pending);
    debug!(count = batch.len(), "flushing step-progress batch");
    match storage.update_step_progress_batch(run_id, &batch).await {
        Ok(deferred) if !deferred.is_empty() => {
            warn!(count = deferred.len(), "deferring step updates for unresolved resource runs");
            drop(guard);
            tokio::time::sleep(DEFERRED_RETRY_PAUSE).await;
            *pending = deferred;
        }
        Ok(_) => {}
        Err(err) => error!(error = %err, "step-progress flush failed"),
    }
}

async fn run_resource_complete_consumer(
    mut rx: mpsc::UnboundedReceiver<ResourceCompletionUpdate>,
    storage: Arc<dyn StorageService>,
    run_id: RunId,
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
                        flush_resource_completions(&storage, run_id, &mut pending, &handles, &cancellation).await;
                        break;
                    }
                }
            }
            _ = &mut timer => {
                flush_resource_completions(&storage, run_id, &mut pending, &handles, &cancellation).await;
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
            flush_resource_completions(&storage, run_id, &mut pending, &handles, &cancellation).await;
        }
    }
}

async fn flush_resource_completions(
    storage: &Arc<dyn StorageService>,
    run_id: RunId,
    pending: &mut Vec<ResourceCompletionUpdate>,
    handles: &HandlePool,
    cancellation: &CancellationSignal,
) {
    if pending.is_empty() {
        return;
    }
    let guard = match handles.rent(cancellation).await {
        Ok(guard) => guard,
        Err(err) => {
            warn!(error = %err, "resource-complete flush skipped: handle pool rent failed");
            return;
        }
    };
    let batch = std::mem::take(pending);
    debug!(count = batch.len(), "flushing resource-complete batch");
    if let Err(err) = storage.complete_resource_runs_batch(run_id, &batch).await {
        error!(error = %err, "resource-complete flush failed");
    }
    drop(guard);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryStorageService;

    async fn new_tracker() -> Arc<ProgressTracker> {
        let storage: Arc<dyn StorageService> = Arc::new(InMemoryStorageService::new());
        ProgressTracker::init(
            storage,
            RunId::new(),
            "test",
            "demo",
            RunType::Fresh,
            None,
            None,
            ProgressTuning {
                resource_start_batch_size: 2,
                resource_start_flush_interval: Duration::from_millis(50),
                step_progress_batch_size: 2,
                step_progress_flush_interval: Duration::from_millis(50),
                resource_complete_batch_size: 2,
                resource_complete_flush_interval: Duration::from_millis(50),
            },
            Arc::new(HandlePool::new(4)),
            CancellationSignal::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn repeated_resource_start_returns_the_same_id() {
        let tracker = new_tracker().await;
        let a = tracker.record_resource_start("RR-001", "record").await;
        let b = tracker.record_resource_start("RR-001", "record").await;
        assert_eq!(a, b);
        tracker.finalize(false).await.unwrap();
    }

    #[tokio::test]
    async fn sequence_numbers_increase_per_resource() {
        let tracker = new_tracker().await;
        let id = tracker.record_resource_start("RR-001", "record").await;
        let seq0 = tracker.record_step_start(id, "RR-001", "normalize");
        let seq1 = tracker.record_step_start(id, "RR-001", "score");
        assert!(seq1 > seq0);
        tracker.finalize(false).await.unwrap();
    }

    #[tokio::test]
    async fn finalize_marks_completed_when_everything_terminal() {
        let tracker = new_tracker().await;
        let id = tracker.record_resource_start("RR-001", "record").await;
        tracker.record_resource_complete("RR-001", id, ResourceStatus::Completed, 5, None, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        tracker.finalize(false).await.unwrap();
    }
}
