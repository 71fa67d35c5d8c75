// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The narrow persistence interface the progress tracker and resource-run
//! cache write through. Implementers provide any backing store — SQL,
//! embedded, or in-memory; see `InMemoryStorageService` and
//! `SqliteStorageService` in the engine crate for the two reference
//! implementations.
//!
//! This module intentionally mirrors the shape of a repository trait like
//! the teacher's `PipelineRepository`: a handful of coarse, batch-oriented
//! methods rather than one method per field mutation, because the progress
//! tracker's batching streams (one flush per interval) are the caller on the
//! hot path.

use async_trait::async_trait;

use crate::value_objects::{ResourceRunId, ResourceStatus, RunId, RunStatus, RunType, StepStatus};
use crate::PipelineError;

/// One resource id to create a ResourceRun row for, as seen for the first
/// time by the resource-run cache.
#[derive(Debug, Clone)]
pub struct CreateResourceRunUpdate {
    pub resource_run_id: ResourceRunId,
    pub resource_id: String,
    pub resource_type: String,
}

/// One step's progress to upsert into `StepProgress`.
#[derive(Debug, Clone)]
pub struct StepProgressUpdate {
    pub resource_run_id: ResourceRunId,
    pub step_name: String,
    pub sequence: u32,
    pub status: StepStatus,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

/// One resource-run completion to apply.
#[derive(Debug, Clone)]
pub struct ResourceCompletionUpdate {
    pub resource_run_id: ResourceRunId,
    pub status: ResourceStatus,
    pub duration_ms: i64,
    pub error_message: Option<String>,
    pub error_step: Option<String>,
}

/// The run-ledger persistence port. Every method is phrased so a conforming
/// implementation can be idempotent on retry, which the progress tracker and
/// resource-run cache rely on.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Idempotent on `run_id`: on conflict, leaves the existing row
    /// untouched.
    async fn create_run(
        &self,
        run_id: RunId,
        category: &str,
        name: &str,
        run_type: RunType,
        parent_run_id: Option<RunId>,
        configuration: Option<serde_json::Value>,
    ) -> Result<(), PipelineError>;

    /// Sets `end_time = now`, `duration_ms`, and the final status.
    async fn complete_run(&self, run_id: RunId, final_status: RunStatus) -> Result<(), PipelineError>;

    /// Lookup only; does not create.
    async fn get_resource_run_id(
        &self,
        run_id: RunId,
        resource_id: &str,
    ) -> Result<Option<ResourceRunId>, PipelineError>;

    /// Idempotent on `(run_id, resource_id)`. Increments `total_resources` by
    /// the number of newly created rows and transitions the run
    /// `pending -> running` on the first create.
    async fn create_resource_runs_batch(
        &self,
        run_id: RunId,
        updates: &[CreateResourceRunUpdate],
    ) -> Result<(), PipelineError>;

    /// Upserts `(resource_run_id, step_name)` rows. Any update whose
    /// resource-run is not yet present is returned for the tracker to retry.
    async fn update_step_progress_batch(
        &self,
        run_id: RunId,
        updates: &[StepProgressUpdate],
    ) -> Result<Vec<StepProgressUpdate>, PipelineError>;

    /// Updates ResourceRun status/timing and the run's aggregate counters.
    async fn complete_resource_runs_batch(
        &self,
        run_id: RunId,
        updates: &[ResourceCompletionUpdate],
    ) -> Result<(), PipelineError>;

    /// Resource ids whose status is not in `{completed, skipped}`.
    async fn get_incomplete_resource_ids(&self, run_id: RunId) -> Result<Vec<String>, PipelineError>;
}
