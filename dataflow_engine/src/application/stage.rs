// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Per-stage configuration and the tag identifying which kind of stage a
//! builder call attaches.

/// Which of the builder's stage kinds a call attaches, used for structured
/// logging when a stage is wired into the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSpec {
    Transform,
    TransformMany,
    Batch,
    Action,
    WithArtifact,
}

impl std::fmt::Display for StageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageSpec::Transform => "transform",
            StageSpec::TransformMany => "transform_many",
            StageSpec::Batch => "batch",
            StageSpec::Action => "action",
            StageSpec::WithArtifact => "with_artifact",
        };
        write!(f, "{s}")
    }
}

/// Per-stage overrides of the context's defaults. `None` means "use the
/// context default"; `enable_progress_tracking` has no context-level
/// fallback and defaults to `true`.
#[derive(Debug, Clone)]
pub struct StageOptions {
    pub max_degree_of_parallelism: Option<usize>,
    pub bounded_capacity: Option<usize>,
    pub enable_progress_tracking: bool,
}

impl StageOptions {
    pub fn new() -> Self {
        Self {
            max_degree_of_parallelism: None,
            bounded_capacity: None,
            enable_progress_tracking: true,
        }
    }

    pub fn with_parallelism(mut self, degree: usize) -> Self {
        self.max_degree_of_parallelism = Some(degree);
        self
    }

    pub fn with_bounded_capacity(mut self, capacity: usize) -> Self {
        self.bounded_capacity = Some(capacity);
        self
    }

    pub fn without_progress_tracking(mut self) -> Self {
        self.enable_progress_tracking = false;
        self
    }

    /// Resolves the worker count for this stage: this stage's override, else
    /// the context default, clamped to at least one worker.
    pub fn resolved_parallelism(&self, context_default: usize) -> usize {
        self.max_degree_of_parallelism.unwrap_or(context_default).max(1)
    }

    /// Resolves the bounded channel capacity for this stage: this stage's
    /// override, else the context default (which may itself be unbounded).
    pub fn resolved_capacity(&self, context_default: Option<usize>) -> Option<usize> {
        self.bounded_capacity.or(context_default)
    }
}

impl Default for StageOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallelism_falls_back_to_context_default() {
        let options = StageOptions::new();
        assert_eq!(options.resolved_parallelism(4), 4);
    }

    #[test]
    fn explicit_parallelism_overrides_the_default() {
        let options = StageOptions::new().with_parallelism(8);
        assert_eq!(options.resolved_parallelism(4), 8);
    }

    #[test]
    fn zero_parallelism_is_clamped_to_one() {
        let options = StageOptions::new().with_parallelism(0);
        assert_eq!(options.resolved_parallelism(4), 1);
    }
}
