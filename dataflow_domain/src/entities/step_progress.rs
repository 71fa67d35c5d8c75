// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! One stage's outcome for one resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ResourceRunId, StepStatus};

/// `(resource_run_id, step_name)` is unique per resource. `sequence` is
/// assigned in the order steps first report in-progress, and is strictly
/// increasing within a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepProgress {
    pub resource_run_id: ResourceRunId,
    pub step_name: String,
    pub sequence: u32,
    pub status: StepStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl StepProgress {
    /// Records a step entering `InProgress`, assigning it the next sequence
    /// number for its resource.
    pub fn start(resource_run_id: ResourceRunId, step_name: impl Into<String>, sequence: u32) -> Self {
        Self {
            resource_run_id,
            step_name: step_name.into(),
            sequence,
            status: StepStatus::InProgress,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            error_message: None,
        }
    }

    /// Marks the step completed with an observed duration.
    pub fn mark_completed(&mut self, duration_ms: i64) {
        self.finish(StepStatus::Completed, duration_ms, None);
    }

    /// Marks the step failed with an observed duration and error message.
    pub fn mark_failed(&mut self, duration_ms: i64, error_message: impl Into<String>) {
        self.finish(StepStatus::Failed, duration_ms, Some(error_message.into()));
    }

    fn finish(&mut self, status: StepStatus, duration_ms: i64, error_message: Option<String>) {
        self.status = status;
        self.duration_ms = Some(duration_ms);
        self.end_time = Some(self.start_time + chrono::Duration::milliseconds(duration_ms));
        self.error_message = error_message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_sets_end_time_from_duration() {
        let mut step = StepProgress::start(ResourceRunId::new(), "normalize", 0);
        step.mark_completed(12);
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.duration_ms, Some(12));
        assert!(step.end_time.is_some());
    }

    #[test]
    fn failure_carries_the_error_message() {
        let mut step = StepProgress::start(ResourceRunId::new(), "score", 1);
        step.mark_failed(5, "division by zero");
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error_message.as_deref(), Some("division by zero"));
    }
}
