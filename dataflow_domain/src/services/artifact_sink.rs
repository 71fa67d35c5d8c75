// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The artifact persistence port the artifact batcher writes batches
//! through.

use async_trait::async_trait;

use crate::value_objects::{ResourceRunId, StorageType};
use crate::PipelineError;

/// One artifact payload queued by a stage's `WithArtifact` attachment.
#[derive(Debug, Clone)]
pub struct ArtifactSaveRequest {
    pub resource_run_id: ResourceRunId,
    pub step_name: String,
    pub artifact_name: String,
    pub storage_type: StorageType,
    pub data: Option<Vec<u8>>,
    pub metadata: Option<serde_json::Value>,
}

/// The outcome of persisting one [`ArtifactSaveRequest`], in request order.
#[derive(Debug, Clone)]
pub struct ArtifactSaveResult {
    pub resource_run_id: ResourceRunId,
    pub step_name: String,
    pub artifact_name: String,
    pub outcome: Result<String, PipelineError>,
}

/// Persists artifact batches drawn from any mix of resources and steps —
/// the batcher groups by size/time, not by resource. A batch is atomic per
/// request: each request either persists and reports success with its
/// resolved `storage_path`, or leaves no trace and reports failure — partial
/// success across a batch is legal.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save_batch(&self, requests: Vec<ArtifactSaveRequest>) -> Vec<ArtifactSaveResult>;
}
