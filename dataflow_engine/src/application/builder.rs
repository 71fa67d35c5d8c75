// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Builder
//!
//! A generic, type-checked stage chain: each call to [`PipelineBuilder::transform`],
//! [`PipelineBuilder::transform_many`], or [`PipelineBuilder::batch`] changes
//! the builder's item type and eagerly spawns a worker pool wired to the
//! previous stage's channel, so stages genuinely run concurrently rather
//! than one item being pushed through the whole chain before the next is
//! admitted.
//!
//! `WithArtifact` is implemented as a lightweight pass-through tap
//! immediately after the stage it captures, rather than inlined into that
//! stage's own worker closure — functionally equivalent (it reads that
//! stage's output before any further transform sees it) and keeps every
//! stage's worker closure concerned with exactly one thing.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::info;

use dataflow_domain::services::ArtifactSaveRequest;
use dataflow_domain::value_objects::{ResourceRunId, ResourceStatus, RunId, RunStatus, StorageType};
use dataflow_domain::PipelineError;

use crate::infrastructure::runtime::{make_channel, spawn_worker_pool, CancellationSignal, Envelope, FanOutOutcome, StageReceiver};

use super::context::Context;
use super::source::Source;
use super::stage::{StageOptions, StageSpec};

/// The stage chain's current state: items of type `T` flow out of the
/// previously-spawned stage into `receiver`, tagged with the root resource
/// they trace back to.
pub struct PipelineBuilder<T> {
    context: Arc<Context>,
    receiver: StageReceiver<Envelope<T>>,
    handles: Vec<JoinHandle<()>>,
    last_step_name: String,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Starts a chain from a source: spawns a feeder task that assigns each
    /// item a resource id (via `resource_id_fn`), calls
    /// `RecordResourceStart`, registers it with the fan-out tracker, and
    /// pushes it into the first stage's channel.
    pub fn new(
        context: Arc<Context>,
        resource_type: impl Into<String>,
        mut source: Source<T>,
        resource_id_fn: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        let resource_type = resource_type.into();
        let (tx, rx) = make_channel::<Envelope<T>>(context.default_options.bounded_capacity);
        let feeder_context = context.clone();
        let cancellation = context.cancellation.clone();
        let handle = tokio::spawn(async move {
            loop {
                if cancellation.is_cancelled() {
                    break;
                }
                let Some(item) = source.next().await else { break };
                let resource_id = resource_id_fn(&item);
                let resource_run_id = feeder_context.tracker.record_resource_start(&resource_id, &resource_type).await;
                feeder_context.fan_out.register_root(&resource_id);
                let envelope = Envelope::new(resource_id, resource_run_id, item);
                if tx.send(envelope, &cancellation).await.is_err() {
                    break;
                }
            }
        });
        Self {
            context,
            receiver: rx,
            handles: vec![handle],
            last_step_name: "source".to_string(),
        }
    }

    /// The cancellation signal driving this pipeline, for an external caller
    /// to trigger mid-run.
    pub fn cancellation(&self) -> CancellationSignal {
        self.context.cancellation.clone()
    }

    /// Runs `f` over each item, producing one output item per input. A `Err`
    /// marks the resource failed and drops it from the chain without
    /// tearing down the rest of the pipeline.
    pub fn transform<U, F, Fut>(self, step_name: impl Into<String>, options: StageOptions, f: F) -> PipelineBuilder<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U, PipelineError>> + Send + 'static,
    {
        let step_name = step_name.into();
        info!(stage = %StageSpec::Transform, step_name = %step_name, "attaching stage");
        let context = self.context.clone();
        let concurrency = options.resolved_parallelism(context.default_options.max_degree_of_parallelism.unwrap_or(1));
        let capacity = options.resolved_capacity(context.default_options.bounded_capacity);
        let track_progress = options.enable_progress_tracking;
        let (tx, rx_out) = make_channel::<Envelope<U>>(capacity);
        let cancellation = context.cancellation.clone();
        let f = Arc::new(f);
        let work_context = context.clone();
        let work_step_name = step_name.clone();

        let handles = spawn_worker_pool(self.receiver, tx, concurrency, cancellation, move |envelope: Envelope<T>| {
            let f = f.clone();
            let context = work_context.clone();
            let step_name = work_step_name.clone();
            async move {
                let Envelope { root_resource_id, resource_run_id, item } = envelope;
                let sequence = track_progress.then(|| context.tracker.record_step_start(resource_run_id, &root_resource_id, &step_name));
                let start = Instant::now();
                match f(item).await {
                    Ok(out) => {
                        if let Some(sequence) = sequence {
                            context.tracker.record_step_complete(resource_run_id, &step_name, sequence, elapsed_ms(start));
                        }
                        Some(Envelope::new(root_resource_id, resource_run_id, out))
                    }
                    Err(err) => {
                        if let Some(sequence) = sequence {
                            context.tracker.record_step_failed(resource_run_id, &step_name, sequence, elapsed_ms(start), err.to_string());
                        }
                        complete_fanned_out_child(&context, &root_resource_id, resource_run_id, true, Some(err.to_string()), Some(step_name.clone()), elapsed_ms(start));
                        None
                    }
                }
            }
        });

        let mut all_handles = self.handles;
        all_handles.extend(handles);
        PipelineBuilder {
            context,
            receiver: rx_out,
            handles: all_handles,
            last_step_name: step_name,
        }
    }

    /// Runs `f` over each item, producing zero or more output items that all
    /// share the parent's `resource_run_id`. The root resource only
    /// completes once every child (tracked via `child_id_fn`, used purely
    /// for logging/debugging; lineage itself is carried by the shared
    /// `resource_run_id` and root resource id) reaches a terminal stage.
    pub fn transform_many<U, F, Fut>(
        self,
        step_name: impl Into<String>,
        options: StageOptions,
        child_id_fn: impl Fn(&U) -> String + Send + Sync + 'static,
        f: F,
    ) -> PipelineBuilder<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<U>, PipelineError>> + Send + 'static,
    {
        let step_name = step_name.into();
        info!(stage = %StageSpec::TransformMany, step_name = %step_name, "attaching stage");
        let context = self.context.clone();
        let concurrency = options.resolved_parallelism(context.default_options.max_degree_of_parallelism.unwrap_or(1));
        let capacity = options.resolved_capacity(context.default_options.bounded_capacity);
        let track_progress = options.enable_progress_tracking;
        let (tx, rx_out) = make_channel::<Envelope<U>>(capacity);
        let cancellation = context.cancellation.clone();
        let f = Arc::new(f);
        let child_id_fn = Arc::new(child_id_fn);

        let rx = Arc::new(AsyncMutex::new(self.receiver));
        let mut handles = self.handles;
        for _ in 0..concurrency.max(1) {
            let rx = rx.clone();
            let tx = tx.clone();
            let cancellation = cancellation.clone();
            let f = f.clone();
            let context = context.clone();
            let step_name = step_name.clone();
            let child_id_fn = child_id_fn.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if cancellation.is_cancelled() {
                        break;
                    }
                    let item = {
                        let mut guard = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancellation.cancelled() => None,
                            item = guard.recv() => item,
                        }
                    };
                    let Some(Envelope { root_resource_id, resource_run_id, item }) = item else { break };
                    let sequence = track_progress.then(|| context.tracker.record_step_start(resource_run_id, &root_resource_id, &step_name));
                    let start = Instant::now();
                    match f(item).await {
                        Ok(children) => {
                            if let Some(sequence) = sequence {
                                context.tracker.record_step_complete(resource_run_id, &step_name, sequence, elapsed_ms(start));
                            }
                            let extra = children.len().saturating_sub(1) as u64;
                            context.fan_out.register_additional_children(&root_resource_id, extra);
                            for child in children {
                                let _ = child_id_fn(&child);
                                let out = Envelope::new(root_resource_id.clone(), resource_run_id, child);
                                if tx.send(out, &cancellation).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(err) => {
                            if let Some(sequence) = sequence {
                                context.tracker.record_step_failed(resource_run_id, &step_name, sequence, elapsed_ms(start), err.to_string());
                            }
                            complete_fanned_out_child(
                                &context,
                                &root_resource_id,
                                resource_run_id,
                                true,
                                Some(err.to_string()),
                                Some(step_name.clone()),
                                elapsed_ms(start),
                            );
                        }
                    }
                }
            }));
        }

        PipelineBuilder {
            context,
            receiver: rx_out,
            handles,
            last_step_name: step_name,
        }
    }

    /// Attaches an artifact capture to the preceding stage's output: for
    /// every item, saves an artifact named by `artifact_name_fn` against
    /// that stage's step name, then forwards the item unchanged.
    pub fn with_artifact<F>(self, artifact_name_fn: F, storage_type: StorageType) -> PipelineBuilder<T>
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        info!(stage = %StageSpec::WithArtifact, step_name = %self.last_step_name, "attaching artifact capture");
        let context = self.context.clone();
        let cancellation = context.cancellation.clone();
        let (tx, rx_out) = make_channel::<Envelope<T>>(context.default_options.bounded_capacity);
        let name_fn = Arc::new(artifact_name_fn);
        let work_context = context.clone();
        let step_name = self.last_step_name.clone();

        let handles = spawn_worker_pool(self.receiver, tx, 1, cancellation, move |envelope: Envelope<T>| {
            let context = work_context.clone();
            let step_name = step_name.clone();
            let name_fn = name_fn.clone();
            async move {
                let artifact_name = name_fn(&envelope.item);
                let _ = context.artifacts.enqueue(ArtifactSaveRequest {
                    resource_run_id: envelope.resource_run_id,
                    step_name,
                    artifact_name,
                    storage_type,
                    data: None,
                    metadata: None,
                });
                Some(envelope)
            }
        });

        let mut all_handles = self.handles;
        all_handles.extend(handles);
        PipelineBuilder {
            context,
            receiver: rx_out,
            handles: all_handles,
            last_step_name: self.last_step_name,
        }
    }

    /// Groups consecutive items into fixed-size batches for a bulk terminal
    /// action (e.g. a bulk write). The last, possibly-short batch is
    /// flushed when the upstream channel closes.
    pub fn batch(self, size: usize) -> BatchedPipelineBuilder<T> {
        info!(stage = %StageSpec::Batch, size, "attaching stage");
        let size = size.max(1);
        let context = self.context.clone();
        let cancellation = context.cancellation.clone();
        let (tx, rx_out) = make_channel::<Vec<Envelope<T>>>(None);
        let mut rx = self.receiver;
        let mut handles = self.handles;

        handles.push(tokio::spawn(async move {
            let mut pending = Vec::with_capacity(size);
            loop {
                if cancellation.is_cancelled() {
                    break;
                }
                match rx.recv().await {
                    Some(item) => {
                        pending.push(item);
                        if pending.len() >= size {
                            let batch = std::mem::take(&mut pending);
                            if tx.send(batch, &cancellation).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => {
                        if !pending.is_empty() {
                            let batch = std::mem::take(&mut pending);
                            let _ = tx.send(batch, &cancellation).await;
                        }
                        break;
                    }
                }
            }
        }));

        BatchedPipelineBuilder {
            context,
            receiver: rx_out,
            handles,
            last_step_name: self.last_step_name,
        }
    }

    /// Terminal stage: runs `f` for its side effect and records the
    /// resource's (or fanned-out child's) completion.
    pub fn action<F, Fut>(self, step_name: impl Into<String>, options: StageOptions, f: F) -> TerminalPipeline
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let step_name = step_name.into();
        info!(stage = %StageSpec::Action, step_name = %step_name, "attaching stage");
        let context = self.context.clone();
        let concurrency = options.resolved_parallelism(context.default_options.max_degree_of_parallelism.unwrap_or(1));
        let track_progress = options.enable_progress_tracking;
        let cancellation = context.cancellation.clone();
        let f = Arc::new(f);
        let work_context = context.clone();
        let work_step_name = step_name.clone();

        let new_handles = spawn_sink_pool(self.receiver, concurrency, cancellation, move |envelope: Envelope<T>| {
            let f = f.clone();
            let context = work_context.clone();
            let step_name = work_step_name.clone();
            async move {
                let Envelope { root_resource_id, resource_run_id, item } = envelope;
                let sequence = track_progress.then(|| context.tracker.record_step_start(resource_run_id, &root_resource_id, &step_name));
                let start = Instant::now();
                match f(item).await {
                    Ok(()) => {
                        if let Some(sequence) = sequence {
                            context.tracker.record_step_complete(resource_run_id, &step_name, sequence, elapsed_ms(start));
                        }
                        complete_fanned_out_child(&context, &root_resource_id, resource_run_id, false, None, None, elapsed_ms(start));
                    }
                    Err(err) => {
                        if let Some(sequence) = sequence {
                            context.tracker.record_step_failed(resource_run_id, &step_name, sequence, elapsed_ms(start), err.to_string());
                        }
                        complete_fanned_out_child(
                            &context,
                            &root_resource_id,
                            resource_run_id,
                            true,
                            Some(err.to_string()),
                            Some(step_name.clone()),
                            elapsed_ms(start),
                        );
                    }
                }
            }
        });

        let mut handles = self.handles;
        handles.extend(new_handles);
        TerminalPipeline { context, handles }
    }
}

/// A stage chain that has been grouped into batches; only a terminal bulk
/// action can follow.
pub struct BatchedPipelineBuilder<T> {
    context: Arc<Context>,
    receiver: StageReceiver<Vec<Envelope<T>>>,
    handles: Vec<JoinHandle<()>>,
    last_step_name: String,
}

impl<T: Send + 'static> BatchedPipelineBuilder<T> {
    pub fn cancellation(&self) -> CancellationSignal {
        self.context.cancellation.clone()
    }

    /// Runs `f` once per batch. Every item in the batch is recorded
    /// complete or failed together, since the action either succeeds or
    /// fails as a unit.
    pub fn action<F, Fut>(self, step_name: impl Into<String>, options: StageOptions, f: F) -> TerminalPipeline
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let step_name = step_name.into();
        info!(stage = %StageSpec::Action, step_name = %step_name, batched = true, "attaching stage");
        let context = self.context.clone();
        let concurrency = options.resolved_parallelism(context.default_options.max_degree_of_parallelism.unwrap_or(1));
        let track_progress = options.enable_progress_tracking;
        let cancellation = context.cancellation.clone();
        let f = Arc::new(f);
        let work_context = context.clone();
        let work_step_name = step_name.clone();

        let new_handles = spawn_sink_pool(self.receiver, concurrency, cancellation, move |batch: Vec<Envelope<T>>| {
            let f = f.clone();
            let context = work_context.clone();
            let step_name = work_step_name.clone();
            async move {
                let (lineage, items): (Vec<(String, ResourceRunId)>, Vec<T>) =
                    batch.into_iter().map(|e| ((e.root_resource_id, e.resource_run_id), e.item)).unzip();
                let sequences: Vec<Option<u32>> = lineage
                    .iter()
                    .map(|(root, resource_run_id)| track_progress.then(|| context.tracker.record_step_start(*resource_run_id, root, &step_name)))
                    .collect();
                let start = Instant::now();
                let result = f(items).await;
                let duration = elapsed_ms(start);
                match result {
                    Ok(()) => {
                        for ((root, resource_run_id), sequence) in lineage.iter().zip(sequences.iter()) {
                            if let Some(sequence) = sequence {
                                context.tracker.record_step_complete(*resource_run_id, &step_name, *sequence, duration);
                            }
                            complete_fanned_out_child(&context, root, *resource_run_id, false, None, None, duration);
                        }
                    }
                    Err(err) => {
                        let message = err.to_string();
                        for ((root, resource_run_id), sequence) in lineage.iter().zip(sequences.iter()) {
                            if let Some(sequence) = sequence {
                                context.tracker.record_step_failed(*resource_run_id, &step_name, *sequence, duration, message.clone());
                            }
                            complete_fanned_out_child(&context, root, *resource_run_id, true, Some(message.clone()), Some(step_name.clone()), duration);
                        }
                    }
                }
            }
        });

        let mut handles = self.handles;
        handles.extend(new_handles);
        TerminalPipeline { context, handles }
    }
}

/// The outcome of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    pub final_status: RunStatus,
}

/// A fully-wired, running pipeline; awaiting [`TerminalPipeline::complete`]
/// blocks until the source is exhausted (or cancellation stops it) and
/// every stage has drained.
pub struct TerminalPipeline {
    context: Arc<Context>,
    handles: Vec<JoinHandle<()>>,
}

impl TerminalPipeline {
    pub fn run_id(&self) -> RunId {
        self.context.run_id
    }

    pub fn cancellation(&self) -> CancellationSignal {
        self.context.cancellation.clone()
    }

    /// Awaits every stage worker, then tears down the context (finalizing
    /// the progress tracker and the artifact batcher) and reports the run's
    /// final status.
    pub async fn complete(self) -> Result<RunSummary, PipelineError> {
        for handle in self.handles {
            handle
                .await
                .map_err(|err| PipelineError::invariant(format!("stage worker panicked: {err}")))?;
        }
        let forced_failure = self.context.cancellation.is_cancelled();
        let final_status = self.context.teardown(forced_failure).await?;
        Ok(RunSummary {
            run_id: self.context.run_id,
            final_status,
        })
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    start.elapsed().as_millis() as i64
}

/// Reports one child (or a non-fanned-out resource) reaching a terminal
/// stage to the fan-out tracker, and if it was the last pending child,
/// records the aggregate resource completion.
fn complete_fanned_out_child(
    context: &Context,
    root_resource_id: &str,
    resource_run_id: ResourceRunId,
    failed: bool,
    error_message: Option<String>,
    error_step: Option<String>,
    duration_ms: i64,
) {
    if let FanOutOutcome::RootComplete { failed, error_message, error_step } =
        context.fan_out.record_child_terminal(root_resource_id, failed, error_message, error_step)
    {
        let status = if failed { ResourceStatus::Failed } else { ResourceStatus::Completed };
        context.tracker.record_resource_complete(root_resource_id, resource_run_id, status, duration_ms, error_message, error_step);
    }
}

/// Spawns `concurrency` workers sharing one inbound queue, running `work`
/// for its side effect only — used by terminal (`Action`) stages, which
/// have no downstream channel to forward into.
fn spawn_sink_pool<In, F, Fut>(rx: StageReceiver<In>, concurrency: usize, cancellation: CancellationSignal, work: F) -> Vec<JoinHandle<()>>
where
    In: Send + 'static,
    F: Fn(In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let rx = Arc::new(AsyncMutex::new(rx));
    let work = Arc::new(work);
    (0..concurrency.max(1))
        .map(|_| {
            let rx = rx.clone();
            let cancellation = cancellation.clone();
            let work = work.clone();
            tokio::spawn(async move {
                loop {
                    if cancellation.is_cancelled() {
                        break;
                    }
                    let item = {
                        let mut guard = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancellation.cancelled() => None,
                            item = guard.recv() => item,
                        }
                    };
                    let Some(item) = item else { break };
                    work(item).await;
                }
            })
        })
        .collect()
}
