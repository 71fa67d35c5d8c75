// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! An in-process [`ArtifactSink`] backed by a `Mutex`-guarded map, used by
//! tests and the demo binary.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use dataflow_domain::services::{ArtifactSaveRequest, ArtifactSaveResult, ArtifactSink};
use dataflow_domain::value_objects::ResourceRunId;
use dataflow_domain::PipelineError;

#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub step_name: String,
    pub artifact_name: String,
    pub data: Option<Vec<u8>>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Default)]
pub struct InMemoryArtifactSink {
    stored: Mutex<HashMap<(ResourceRunId, String, String), StoredArtifact>>,
}

impl InMemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource_run_id: ResourceRunId, step_name: &str, artifact_name: &str) -> Option<StoredArtifact> {
        self.stored
            .lock()
            .get(&(resource_run_id, step_name.to_string(), artifact_name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.stored.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactSink for InMemoryArtifactSink {
    async fn save_batch(&self, requests: Vec<ArtifactSaveRequest>) -> Vec<ArtifactSaveResult> {
        let mut stored = self.stored.lock();
        requests
            .into_iter()
            .map(|req| {
                let key = (req.resource_run_id, req.step_name.clone(), req.artifact_name.clone());
                if stored.contains_key(&key) {
                    return ArtifactSaveResult {
                        resource_run_id: req.resource_run_id,
                        step_name: req.step_name,
                        artifact_name: req.artifact_name,
                        outcome: Err(PipelineError::invariant("duplicate artifact (resource_run, step, name)")),
                    };
                }
                let storage_path = format!("memory://{}/{}/{}", key.0, key.1, key.2);
                stored.insert(
                    key,
                    StoredArtifact {
                        step_name: req.step_name.clone(),
                        artifact_name: req.artifact_name.clone(),
                        data: req.data,
                        metadata: req.metadata,
                    },
                );
                ArtifactSaveResult {
                    resource_run_id: req.resource_run_id,
                    step_name: req.step_name,
                    artifact_name: req.artifact_name,
                    outcome: Ok(storage_path),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_domain::value_objects::StorageType;

    #[tokio::test]
    async fn saving_the_same_artifact_twice_fails_the_second_request() {
        let sink = InMemoryArtifactSink::new();
        let resource_run_id = ResourceRunId::new();
        let request = ArtifactSaveRequest {
            resource_run_id,
            step_name: "normalize".into(),
            artifact_name: "out.json".into(),
            storage_type: StorageType::Memory,
            data: None,
            metadata: None,
        };
        let first = sink.save_batch(vec![request.clone()]).await;
        assert!(first[0].outcome.is_ok());
        let second = sink.save_batch(vec![request]).await;
        assert!(second[0].outcome.is_err());
    }
}
