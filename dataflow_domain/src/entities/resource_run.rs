// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! One record's traversal of the pipeline within one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ResourceRunId, ResourceStatus, RunId};
use crate::PipelineError;

/// Uniquely keyed by `(pipeline_run_id, resource_id)`. Created on first
/// appearance of a record via the resource-run cache (§4.5); mutated by step
/// updates and the completion write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRun {
    pub resource_run_id: ResourceRunId,
    pub pipeline_run_id: RunId,
    pub resource_id: String,
    pub resource_type: String,
    pub status: ResourceStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub error_step: Option<String>,
}

impl ResourceRun {
    /// Creates a new ResourceRun in `Processing` status, as the cache does
    /// when a resource id is seen for the first time.
    pub fn new(pipeline_run_id: RunId, resource_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource_run_id: ResourceRunId::new(),
            pipeline_run_id,
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Processing,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            retry_count: 0,
            error_message: None,
            error_step: None,
        }
    }

    /// Applies a terminal completion write. Returns an error if the
    /// resource-run already reached a terminal status — it transitions at
    /// most once.
    pub fn complete(
        &mut self,
        status: ResourceStatus,
        error_message: Option<String>,
        error_step: Option<String>,
    ) -> Result<(), PipelineError> {
        if self.status.is_terminal() {
            return Err(PipelineError::invariant(format!(
                "resource run {} already terminal ({})",
                self.resource_run_id, self.status
            )));
        }
        if !status.is_terminal() {
            return Err(PipelineError::invariant(format!(
                "cannot complete resource run {} with non-terminal status {status}",
                self.resource_run_id
            )));
        }
        if status == ResourceStatus::Failed && error_step.is_none() {
            return Err(PipelineError::invariant(format!(
                "failed resource run {} must carry error_step",
                self.resource_run_id
            )));
        }
        let now = Utc::now();
        self.duration_ms = Some((now - self.start_time).num_milliseconds().max(0));
        self.end_time = Some(now);
        self.status = status;
        self.error_message = error_message;
        self.error_step = error_step;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_completion_requires_error_step() {
        let mut rr = ResourceRun::new(RunId::new(), "RR-001", "record");
        let err = rr.complete(ResourceStatus::Failed, Some("boom".into()), None).unwrap_err();
        assert_eq!(err.category(), "invariant");
    }

    #[test]
    fn cannot_complete_twice() {
        let mut rr = ResourceRun::new(RunId::new(), "RR-001", "record");
        rr.complete(ResourceStatus::Completed, None, None).unwrap();
        assert!(rr.complete(ResourceStatus::Completed, None, None).is_err());
    }
}
