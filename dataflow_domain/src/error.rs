// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! A hierarchical error type for the pipeline engine, organized around the
//! error taxonomy the engine actually needs to act on: some failures only
//! affect a single resource, some are fatal to the whole run, and some are
//! programmer errors that indicate a broken invariant.
//!
//! ## Error Categories
//!
//! - **User-function errors**: raised by a stage's function. Caught by the
//!   stage runtime; mark the affected resource failed. Other resources
//!   continue.
//! - **Persistence errors (progress)**: a flush of the progress tracker's
//!   batching streams failed. Fatal — the run is torn down because
//!   continuing would desynchronize the ledger.
//! - **Artifact errors**: surfaced through a completion token. Logged; do not
//!   fail the run unless a caller awaits the token.
//! - **Cancellation**: returned to the caller as an observable cancellation.
//! - **Invariant violations**: programmer errors, e.g. an unsignalled
//!   artifact token after finalization.

use thiserror::Error;

/// Errors produced by the pipeline engine.
///
/// # Design Principles
///
/// - **Specific**: each variant represents a specific failure mode.
/// - **Actionable**: messages provide enough context for debugging.
/// - **Categorized**: `is_recoverable` and `category` support systematic
///   handling without matching on every variant.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("stage '{step_name}' failed for resource '{resource_id}': {message}")]
    UserFunctionError {
        step_name: String,
        resource_id: String,
        message: String,
    },

    #[error("persistence flush failed: {0}")]
    PersistenceError(String),

    #[error("artifact error: {0}")]
    ArtifactError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl PipelineError {
    /// Creates a new configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a new user-function error for a specific resource and step.
    pub fn user_function(step_name: impl Into<String>, resource_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UserFunctionError {
            step_name: step_name.into(),
            resource_id: resource_id.into(),
            message: message.into(),
        }
    }

    /// Creates a new persistence error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceError(msg.into())
    }

    /// Creates a new invariant-violation error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Whether local recovery (retry) is meaningful for this error.
    ///
    /// Persistence errors on the progress stream are deliberately *not*
    /// recoverable here: the tracker already retries deferred step updates
    /// internally (see `StorageService::update_step_progress_batch`); an
    /// error surfacing past that point means retrying would not help.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::DatabaseError(_))
    }

    /// Whether this error should fail the run outright (vs. only the
    /// resource/request that triggered it).
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, PipelineError::PersistenceError(_) | PipelineError::InvariantViolation(_))
    }

    /// A short, stable category tag, useful for metrics and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfiguration(_) => "configuration",
            PipelineError::UserFunctionError { .. } => "user_function",
            PipelineError::PersistenceError(_) => "persistence",
            PipelineError::ArtifactError(_) => "artifact",
            PipelineError::DatabaseError(_) => "database",
            PipelineError::Cancelled(_) => "cancellation",
            PipelineError::InvariantViolation(_) => "invariant",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::SerializationError(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_errors_are_fatal_to_the_run() {
        let err = PipelineError::persistence("flush failed");
        assert!(err.is_fatal_to_run());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn user_function_errors_are_scoped_to_a_resource() {
        let err = PipelineError::user_function("score", "RR-001", "boom");
        assert!(!err.is_fatal_to_run());
        assert_eq!(err.category(), "user_function");
    }

    #[test]
    fn category_is_stable_per_variant() {
        assert_eq!(PipelineError::invalid_config("x").category(), "configuration");
        assert_eq!(PipelineError::invariant("x").category(), "invariant");
    }
}
