// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Context
//!
//! The single argument every pipeline takes: run identity, the cancellation
//! signal every worker checks, the progress tracker and artifact batcher the
//! stage chain writes through, the fan-out tracker that reconciles
//! `TransformMany` children back to one resource completion, and the default
//! stage options new stages inherit unless overridden.
//!
//! Built via [`ContextBuilder`], following the teacher's dependency-passing
//! style: every collaborator is constructed up front and handed to the
//! context rather than the context reaching out to a locator.

use std::sync::Arc;

use tracing::instrument;

use dataflow_domain::services::{ArtifactSink, StorageService};
use dataflow_domain::value_objects::{RunId, RunStatus, RunType};
use dataflow_domain::PipelineError;

use crate::config::EngineConfig;
use crate::infrastructure::artifacts::ArtifactBatcher;
use crate::infrastructure::handle_pool::HandlePool;
use crate::infrastructure::progress::ProgressTracker;
use crate::infrastructure::runtime::{CancellationSignal, FanOutTracker};

use super::stage::StageOptions;

pub struct Context {
    pub run_id: RunId,
    pub category: String,
    pub name: String,
    pub run_type: RunType,
    pub parent_run_id: Option<RunId>,
    pub cancellation: CancellationSignal,
    pub tracker: Arc<ProgressTracker>,
    pub artifacts: Arc<ArtifactBatcher>,
    pub handles: Arc<HandlePool>,
    pub fan_out: FanOutTracker,
    pub default_options: StageOptions,
}

impl Context {
    /// Finalizes the tracker, then the artifact batcher. Exceptions during
    /// either are logged and returned; teardown always attempts both steps
    /// rather than aborting after the first failure, so a tracker error
    /// never strands unresolved artifact completion tokens.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn teardown(&self, forced_failure: bool) -> Result<RunStatus, PipelineError> {
        let tracker_result = self.tracker.finalize(forced_failure).await;
        self.artifacts.finalize().await;
        tracker_result
    }
}

/// Assembles a [`Context`], wiring the progress tracker, artifact batcher,
/// and handle pool from a storage service, artifact sink, and engine
/// configuration.
pub struct ContextBuilder {
    category: String,
    name: String,
    run_type: RunType,
    parent_run_id: Option<RunId>,
    configuration: Option<serde_json::Value>,
    storage: Arc<dyn StorageService>,
    artifact_sink: Arc<dyn ArtifactSink>,
    engine_config: EngineConfig,
}

impl ContextBuilder {
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        storage: Arc<dyn StorageService>,
        artifact_sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            run_type: RunType::Fresh,
            parent_run_id: None,
            configuration: None,
            storage,
            artifact_sink,
            engine_config: EngineConfig::default(),
        }
    }

    pub fn run_type(mut self, run_type: RunType) -> Self {
        self.run_type = run_type;
        self
    }

    pub fn parent_run_id(mut self, parent_run_id: RunId) -> Self {
        self.parent_run_id = Some(parent_run_id);
        self
    }

    pub fn configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn engine_config(mut self, engine_config: EngineConfig) -> Self {
        self.engine_config = engine_config;
        self
    }

    pub async fn build(self) -> Result<Arc<Context>, PipelineError> {
        let run_id = RunId::new();
        let cancellation = CancellationSignal::new();
        let handles = Arc::new(HandlePool::new(self.engine_config.max_concurrent_contexts));
        let tracker = ProgressTracker::init(
            self.storage,
            run_id,
            &self.category,
            &self.name,
            self.run_type,
            self.parent_run_id,
            self.configuration,
            self.engine_config.progress_tuning(),
            handles.clone(),
            cancellation.clone(),
        )
        .await?;
        let artifacts = ArtifactBatcher::start(
            self.artifact_sink,
            self.engine_config.artifact_batch_size,
            self.engine_config.artifact_flush_interval(),
            handles.clone(),
            cancellation.clone(),
        );
        let default_options = StageOptions::new().with_parallelism(self.engine_config.default_max_degree_of_parallelism);
        let default_options = match self.engine_config.default_bounded_capacity {
            Some(capacity) => default_options.with_bounded_capacity(capacity),
            None => default_options,
        };

        Ok(Arc::new(Context {
            run_id,
            category: self.category,
            name: self.name,
            run_type: self.run_type,
            parent_run_id: self.parent_run_id,
            cancellation,
            tracker,
            artifacts,
            handles,
            fan_out: FanOutTracker::new(),
            default_options,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::artifacts::InMemoryArtifactSink;
    use crate::infrastructure::storage::InMemoryStorageService;

    #[tokio::test]
    async fn build_assembles_a_usable_context() {
        let storage: Arc<dyn StorageService> = Arc::new(InMemoryStorageService::new());
        let sink: Arc<dyn ArtifactSink> = Arc::new(InMemoryArtifactSink::new());
        let context = ContextBuilder::new("demo", "unit-test", storage, sink).build().await.unwrap();
        assert_eq!(context.run_type, RunType::Fresh);
        let status = context.teardown(false).await.unwrap();
        assert_eq!(status, RunStatus::Completed);
    }
}
