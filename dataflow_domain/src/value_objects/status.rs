// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Closed status enums for the run ledger's data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a run draws from the full source (`Fresh`) or from a prior run's
/// incomplete resource ids (`Retry`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Fresh,
    Retry,
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunType::Fresh => write!(f, "fresh"),
            RunType::Retry => write!(f, "retry"),
        }
    }
}

/// A [`crate::entities::PipelineRun`]'s lifecycle state.
///
/// Advances monotonically: `Pending -> Running -> (Completed | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Whether this status is one of the two terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Whether `self -> next` is a legal monotonic transition.
    pub fn can_advance_to(self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Completed)
                | (RunStatus::Pending, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A [`crate::entities::ResourceRun`]'s lifecycle state.
///
/// Starts at `Processing`; transitions at most once to a terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl ResourceStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ResourceStatus::Processing)
    }

    pub fn counts_as_incomplete(self) -> bool {
        !matches!(self, ResourceStatus::Completed | ResourceStatus::Skipped)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Processing => "processing",
            ResourceStatus::Completed => "completed",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// A [`crate::entities::StepProgress`] row's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Where an [`crate::entities::Artifact`]'s payload actually lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Inlined into the Artifacts table alongside its metadata.
    Database,
    /// Uploaded externally; only `storage_path` + `metadata` are recorded.
    ObjectStore,
    /// Held in-process only, for tests and the demo binary.
    Memory,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StorageType::Database => "database",
            StorageType::ObjectStore => "object_store",
            StorageType::Memory => "memory",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_cannot_regress() {
        assert!(RunStatus::Pending.can_advance_to(RunStatus::Running));
        assert!(!RunStatus::Completed.can_advance_to(RunStatus::Running));
        assert!(!RunStatus::Failed.can_advance_to(RunStatus::Completed));
    }

    #[test]
    fn resource_status_terminal_classification() {
        assert!(!ResourceStatus::Processing.is_terminal());
        assert!(ResourceStatus::Completed.is_terminal());
        assert!(!ResourceStatus::Completed.counts_as_incomplete());
        assert!(ResourceStatus::Failed.counts_as_incomplete());
    }
}
