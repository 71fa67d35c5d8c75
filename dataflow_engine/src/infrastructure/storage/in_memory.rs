// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! An in-process [`StorageService`] backed by `parking_lot`-guarded maps.
//! Used by the engine's own tests and the demo binary; exercises the same
//! idempotency and deferred-update contract a real backend must honor.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use dataflow_domain::entities::{PipelineRun, ResourceRun, StepProgress};
use dataflow_domain::services::{
    CreateResourceRunUpdate, ResourceCompletionUpdate, StepProgressUpdate, StorageService,
};
use dataflow_domain::value_objects::{ResourceRunId, ResourceStatus, RunId, RunStatus, RunType};
use dataflow_domain::PipelineError;

#[derive(Default)]
struct State {
    runs: HashMap<RunId, PipelineRun>,
    resource_runs: HashMap<ResourceRunId, ResourceRun>,
    by_resource_id: HashMap<(RunId, String), ResourceRunId>,
    steps: HashMap<(ResourceRunId, String), StepProgress>,
}

#[derive(Default)]
pub struct InMemoryStorageService {
    state: RwLock<State>,
}

impl InMemoryStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_run(&self, run_id: RunId) -> Option<PipelineRun> {
        self.state.read().runs.get(&run_id).cloned()
    }

    pub fn resource_run_count(&self, run_id: RunId) -> usize {
        self.state
            .read()
            .resource_runs
            .values()
            .filter(|rr| rr.pipeline_run_id == run_id)
            .count()
    }

    pub fn step_count(&self, run_id: RunId) -> usize {
        let state = self.state.read();
        state
            .steps
            .keys()
            .filter(|(resource_run_id, _)| {
                state
                    .resource_runs
                    .get(resource_run_id)
                    .map(|rr| rr.pipeline_run_id == run_id)
                    .unwrap_or(false)
            })
            .count()
    }
}

#[async_trait]
impl StorageService for InMemoryStorageService {
    async fn create_run(
        &self,
        run_id: RunId,
        category: &str,
        name: &str,
        run_type: RunType,
        parent_run_id: Option<RunId>,
        configuration: Option<serde_json::Value>,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.write();
        state
            .runs
            .entry(run_id)
            .or_insert_with(|| PipelineRun::new(run_id, category, name, run_type, parent_run_id, configuration));
        Ok(())
    }

    async fn complete_run(&self, run_id: RunId, final_status: RunStatus) -> Result<(), PipelineError> {
        let mut state = self.state.write();
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| PipelineError::NotFound(format!("run {run_id}")))?;
        run.complete(final_status)
    }

    async fn get_resource_run_id(
        &self,
        run_id: RunId,
        resource_id: &str,
    ) -> Result<Option<ResourceRunId>, PipelineError> {
        Ok(self
            .state
            .read()
            .by_resource_id
            .get(&(run_id, resource_id.to_string()))
            .copied())
    }

    async fn create_resource_runs_batch(
        &self,
        run_id: RunId,
        updates: &[CreateResourceRunUpdate],
    ) -> Result<(), PipelineError> {
        let mut state = self.state.write();
        let mut newly_created = 0u64;
        for update in updates {
            let key = (run_id, update.resource_id.clone());
            if state.by_resource_id.contains_key(&key) {
                continue;
            }
            state.by_resource_id.insert(key, update.resource_run_id);
            state.resource_runs.insert(
                update.resource_run_id,
                ResourceRun::new(run_id, update.resource_id.clone(), update.resource_type.clone()),
            );
            newly_created += 1;
        }
        if newly_created > 0 {
            if let Some(run) = state.runs.get_mut(&run_id) {
                run.total_resources += newly_created;
                if run.status == RunStatus::Pending {
                    run.mark_running()?;
                }
            }
        }
        Ok(())
    }

    async fn update_step_progress_batch(
        &self,
        _run_id: RunId,
        updates: &[StepProgressUpdate],
    ) -> Result<Vec<StepProgressUpdate>, PipelineError> {
        let mut state = self.state.write();
        let mut deferred = Vec::new();
        for update in updates {
            if !state.resource_runs.contains_key(&update.resource_run_id) {
                deferred.push(update.clone());
                continue;
            }
            let key = (update.resource_run_id, update.step_name.clone());
            let row = state
                .steps
                .entry(key)
                .or_insert_with(|| StepProgress::start(update.resource_run_id, update.step_name.clone(), update.sequence));
            row.status = update.status;
            row.sequence = update.sequence;
            if let Some(duration_ms) = update.duration_ms {
                row.duration_ms = Some(duration_ms);
                row.end_time = Some(Utc::now());
            }
            row.error_message = update.error_message.clone();
        }
        Ok(deferred)
    }

    async fn complete_resource_runs_batch(
        &self,
        run_id: RunId,
        updates: &[ResourceCompletionUpdate],
    ) -> Result<(), PipelineError> {
        let mut state = self.state.write();
        let mut completed_delta = 0u64;
        let mut failed_delta = 0u64;
        let mut skipped_delta = 0u64;
        for update in updates {
            let Some(resource_run) = state.resource_runs.get_mut(&update.resource_run_id) else {
                continue;
            };
            if resource_run.status.is_terminal() {
                continue;
            }
            resource_run.complete(update.status, update.error_message.clone(), update.error_step.clone())?;
            match update.status {
                ResourceStatus::Completed => completed_delta += 1,
                ResourceStatus::Failed => failed_delta += 1,
                ResourceStatus::Skipped => skipped_delta += 1,
                ResourceStatus::Processing => {}
            }
        }
        if let Some(run) = state.runs.get_mut(&run_id) {
            run.completed_resources += completed_delta;
            run.failed_resources += failed_delta;
            run.skipped_resources += skipped_delta;
        }
        Ok(())
    }

    async fn get_incomplete_resource_ids(&self, run_id: RunId) -> Result<Vec<String>, PipelineError> {
        let state = self.state.read();
        Ok(state
            .resource_runs
            .values()
            .filter(|rr| rr.pipeline_run_id == run_id && rr.status.counts_as_incomplete())
            .map(|rr| rr.resource_id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_run_is_idempotent() {
        let storage = InMemoryStorageService::new();
        let run_id = RunId::new();
        storage.create_run(run_id, "cat", "name", RunType::Fresh, None, None).await.unwrap();
        storage.create_run(run_id, "cat", "renamed", RunType::Fresh, None, None).await.unwrap();
        assert_eq!(storage.get_run(run_id).unwrap().name, "name");
    }

    #[tokio::test]
    async fn creating_resource_runs_transitions_pending_to_running() {
        let storage = InMemoryStorageService::new();
        let run_id = RunId::new();
        storage.create_run(run_id, "cat", "name", RunType::Fresh, None, None).await.unwrap();
        storage
            .create_resource_runs_batch(
                run_id,
                &[CreateResourceRunUpdate {
                    resource_run_id: ResourceRunId::new(),
                    resource_id: "RR-001".into(),
                    resource_type: "record".into(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(storage.get_run(run_id).unwrap().status, RunStatus::Running);
    }

    #[tokio::test]
    async fn step_progress_for_unknown_resource_run_is_deferred() {
        let storage = InMemoryStorageService::new();
        let run_id = RunId::new();
        let deferred = storage
            .update_step_progress_batch(
                run_id,
                &[StepProgressUpdate {
                    resource_run_id: ResourceRunId::new(),
                    step_name: "normalize".into(),
                    sequence: 0,
                    status: dataflow_domain::value_objects::StepStatus::InProgress,
                    duration_ms: None,
                    error_message: None,
                }],
            )
            .await
            .unwrap();
        assert_eq!(deferred.len(), 1);
    }

    #[tokio::test]
    async fn incomplete_resource_ids_excludes_completed_and_skipped() {
        let storage = InMemoryStorageService::new();
        let run_id = RunId::new();
        storage.create_run(run_id, "cat", "name", RunType::Fresh, None, None).await.unwrap();
        let rr_id = ResourceRunId::new();
        storage
            .create_resource_runs_batch(
                run_id,
                &[CreateResourceRunUpdate {
                    resource_run_id: rr_id,
                    resource_id: "RR-001".into(),
                    resource_type: "record".into(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(storage.get_incomplete_resource_ids(run_id).await.unwrap(), vec!["RR-001".to_string()]);
        storage
            .complete_resource_runs_batch(
                run_id,
                &[ResourceCompletionUpdate {
                    resource_run_id: rr_id,
                    status: ResourceStatus::Completed,
                    duration_ms: 5,
                    error_message: None,
                    error_step: None,
                }],
            )
            .await
            .unwrap();
        assert!(storage.get_incomplete_resource_ids(run_id).await.unwrap().is_empty());
    }
}
