// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A named side-channel payload captured during a stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ArtifactId, ResourceRunId, StorageType};

/// Unique on `(resource_run_id, step_name, artifact_name)`. Appended only;
/// never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: ArtifactId,
    pub resource_run_id: ResourceRunId,
    pub step_name: String,
    pub artifact_name: String,
    pub storage_type: StorageType,
    pub storage_path: String,
    pub data: Option<Vec<u8>>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        resource_run_id: ResourceRunId,
        step_name: impl Into<String>,
        artifact_name: impl Into<String>,
        storage_type: StorageType,
        storage_path: impl Into<String>,
        data: Option<Vec<u8>>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            artifact_id: ArtifactId::new(),
            resource_run_id,
            step_name: step_name.into(),
            artifact_name: artifact_name.into(),
            storage_type,
            storage_path: storage_path.into(),
            data,
            metadata,
            created_at: Utc::now(),
        }
    }
}
