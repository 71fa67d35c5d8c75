// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # dataflow-engine
//!
//! A bounded-parallel, multi-stage record pipeline engine with durable
//! progress tracking and artifact capture.
//!
//! The dependency order mirrors how the pieces are wired at runtime:
//! persistence ports (from `dataflow-domain`) -> [`infrastructure::cache`]
//! -> [`infrastructure::progress`] and [`infrastructure::artifacts`] ->
//! [`application::context`] -> [`infrastructure::runtime`] ->
//! [`application::builder`].

pub mod application;
pub mod config;
pub mod infrastructure;

pub use application::{BatchedPipelineBuilder, Context, ContextBuilder, PipelineBuilder, RunSummary, Source, StageOptions, StageSpec, TerminalPipeline};
pub use config::EngineConfig;

pub use application::fresh_or_retry;

pub use dataflow_domain::value_objects::{ResourceRunId, ResourceStatus, RunId, RunStatus, RunType, StorageType};
pub use dataflow_domain::PipelineError;
