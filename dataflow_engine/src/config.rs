// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Layered Engine Configuration
//!
//! `EngineConfig` is assembled in three layers, lowest priority first:
//! compiled-in defaults, an optional TOML file, then environment variables
//! prefixed `DATAFLOW_` (double-underscore separated, e.g.
//! `DATAFLOW_ARTIFACT_BATCH_SIZE=200`). This mirrors how the teacher layers
//! infrastructure configuration, using the `config` crate's `Config` builder
//! rather than hand-rolled merging.
//!
//! ```toml
//! [engine]
//! default_max_degree_of_parallelism = 4
//! default_bounded_capacity = 256
//! max_concurrent_contexts = 8
//!
//! [engine.artifacts]
//! batch_size = 100
//! flush_interval_ms = 2000
//!
//! [engine.progress]
//! batch_size_start = 50
//! batch_size_step = 100
//! batch_size_complete = 100
//! flush_interval_start_ms = 1000
//! flush_interval_step_ms = 5000
//! flush_interval_complete_ms = 3000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dataflow_domain::PipelineError;

use crate::infrastructure::progress::ProgressTuning;

/// Fully resolved, validated engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_max_degree_of_parallelism: usize,
    pub default_bounded_capacity: Option<usize>,
    pub max_concurrent_contexts: usize,
    pub artifact_batch_size: usize,
    pub artifact_flush_interval_ms: u64,
    pub progress_batch_size_start: usize,
    pub progress_batch_size_step: usize,
    pub progress_batch_size_complete: usize,
    pub progress_flush_interval_start_ms: u64,
    pub progress_flush_interval_step_ms: u64,
    pub progress_flush_interval_complete_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_degree_of_parallelism: 4,
            default_bounded_capacity: None,
            max_concurrent_contexts: 8,
            artifact_batch_size: 100,
            artifact_flush_interval_ms: 2_000,
            progress_batch_size_start: 50,
            progress_batch_size_step: 100,
            progress_batch_size_complete: 100,
            progress_flush_interval_start_ms: 1_000,
            progress_flush_interval_step_ms: 5_000,
            progress_flush_interval_complete_ms: 3_000,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from defaults, an optional TOML file, and
    /// `DATAFLOW_`-prefixed environment variables, in that priority order.
    pub fn load(toml_path: Option<&Path>) -> Result<Self, PipelineError> {
        let defaults = EngineConfig::default();
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&defaults).map_err(
            |e| PipelineError::invalid_config(format!("failed to seed configuration defaults: {e}")),
        )?);

        if let Some(path) = toml_path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DATAFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let resolved: EngineConfig = builder
            .build()
            .map_err(|e| PipelineError::invalid_config(format!("failed to assemble configuration: {e}")))?
            .try_deserialize()
            .map_err(|e| PipelineError::invalid_config(format!("failed to deserialize configuration: {e}")))?;

        resolved.validate()?;
        Ok(resolved)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.default_max_degree_of_parallelism == 0 {
            return Err(PipelineError::invalid_config("default_max_degree_of_parallelism must be nonzero"));
        }
        if self.max_concurrent_contexts == 0 {
            return Err(PipelineError::invalid_config("max_concurrent_contexts must be nonzero"));
        }
        if self.artifact_batch_size == 0 {
            return Err(PipelineError::invalid_config("artifact_batch_size must be nonzero"));
        }
        if self.artifact_flush_interval_ms == 0 {
            return Err(PipelineError::invalid_config("artifact_flush_interval_ms must be nonzero"));
        }
        for (name, value) in [
            ("progress_batch_size_start", self.progress_batch_size_start),
            ("progress_batch_size_step", self.progress_batch_size_step),
            ("progress_batch_size_complete", self.progress_batch_size_complete),
        ] {
            if value == 0 {
                return Err(PipelineError::invalid_config(format!("{name} must be nonzero")));
            }
        }
        for (name, value) in [
            ("progress_flush_interval_start_ms", self.progress_flush_interval_start_ms),
            ("progress_flush_interval_step_ms", self.progress_flush_interval_step_ms),
            ("progress_flush_interval_complete_ms", self.progress_flush_interval_complete_ms),
        ] {
            if value == 0 {
                return Err(PipelineError::invalid_config(format!("{name} must be nonzero")));
            }
        }
        Ok(())
    }

    pub fn artifact_flush_interval(&self) -> Duration {
        Duration::from_millis(self.artifact_flush_interval_ms)
    }

    pub fn progress_flush_interval_start(&self) -> Duration {
        Duration::from_millis(self.progress_flush_interval_start_ms)
    }

    pub fn progress_flush_interval_step(&self) -> Duration {
        Duration::from_millis(self.progress_flush_interval_step_ms)
    }

    pub fn progress_flush_interval_complete(&self) -> Duration {
        Duration::from_millis(self.progress_flush_interval_complete_ms)
    }

    /// Assembles the progress tracker's per-stream batching tuning from this
    /// configuration.
    pub fn progress_tuning(&self) -> ProgressTuning {
        ProgressTuning {
            resource_start_batch_size: self.progress_batch_size_start,
            resource_start_flush_interval: self.progress_flush_interval_start(),
            step_progress_batch_size: self.progress_batch_size_step,
            step_progress_flush_interval: self.progress_flush_interval_step(),
            resource_complete_batch_size: self.progress_batch_size_complete,
            resource_complete_flush_interval: self.progress_flush_interval_complete(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.artifact_batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.default_max_degree_of_parallelism = 0;
        assert!(cfg.validate().is_err());
    }
}
