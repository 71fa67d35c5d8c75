// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The top-level record of one pipeline execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{RunId, RunStatus, RunType};
use crate::PipelineError;

/// One invocation of the pipeline, carrying a unique id and a lineage link
/// to any parent run it retries.
///
/// Created by the progress tracker on first use (§4.3); never deleted by the
/// engine. `status` advances monotonically pending -> running -> (completed |
/// failed), and `end_time` is set if and only if `status` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub category: String,
    pub name: String,
    pub run_type: RunType,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub total_resources: u64,
    pub completed_resources: u64,
    pub failed_resources: u64,
    pub skipped_resources: u64,
    pub parent_run_id: Option<RunId>,
    pub configuration: Option<serde_json::Value>,
}

impl PipelineRun {
    /// Starts a new run in `Pending` status, as the tracker does on
    /// `CreateRun`.
    pub fn new(
        run_id: RunId,
        category: impl Into<String>,
        name: impl Into<String>,
        run_type: RunType,
        parent_run_id: Option<RunId>,
        configuration: Option<serde_json::Value>,
    ) -> Self {
        Self {
            run_id,
            category: category.into(),
            name: name.into(),
            run_type,
            status: RunStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            total_resources: 0,
            completed_resources: 0,
            failed_resources: 0,
            skipped_resources: 0,
            parent_run_id,
            configuration,
        }
    }

    /// Moves the run to `Running`, the way the resource-run cache does on
    /// the first created ResourceRun.
    pub fn mark_running(&mut self) -> Result<(), PipelineError> {
        self.transition(RunStatus::Running)
    }

    /// Finalizes the run with a terminal status, setting `end_time` and
    /// `duration_ms`.
    pub fn complete(&mut self, status: RunStatus) -> Result<(), PipelineError> {
        if !status.is_terminal() {
            return Err(PipelineError::invariant(format!(
                "cannot complete run {} with non-terminal status {status}",
                self.run_id
            )));
        }
        self.transition(status)?;
        let now = Utc::now();
        self.duration_ms = Some((now - self.start_time).num_milliseconds().max(0));
        self.end_time = Some(now);
        Ok(())
    }

    fn transition(&mut self, next: RunStatus) -> Result<(), PipelineError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_advance_to(next) {
            return Err(PipelineError::invariant(format!(
                "run {} cannot advance from {} to {next}",
                self.run_id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }

    /// `sum(completed) + sum(failed) + sum(skipped) <= total_resources`,
    /// with equality required once the run is terminal.
    pub fn counts_are_consistent(&self) -> bool {
        let accounted = self.completed_resources + self.failed_resources + self.skipped_resources;
        if self.status.is_terminal() {
            accounted == self.total_resources
        } else {
            accounted <= self.total_resources
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_run() -> PipelineRun {
        PipelineRun::new(RunId::new(), "ingest", "demo", RunType::Fresh, None, None)
    }

    #[test]
    fn starts_pending_with_no_end_time() {
        let run = new_run();
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.end_time.is_none());
    }

    #[test]
    fn completing_sets_end_time_and_duration() {
        let mut run = new_run();
        run.mark_running().unwrap();
        run.complete(RunStatus::Completed).unwrap();
        assert!(run.end_time.is_some());
        assert!(run.duration_ms.is_some());
    }

    #[test]
    fn rejects_regression_from_terminal_status() {
        let mut run = new_run();
        run.complete(RunStatus::Failed).unwrap();
        assert!(run.mark_running().is_err());
    }

    #[test]
    fn rejects_completing_with_non_terminal_status() {
        let mut run = new_run();
        assert!(run.complete(RunStatus::Running).is_err());
    }
}
