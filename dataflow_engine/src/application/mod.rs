// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Application layer: the pipeline builder chain, the run context it
//! threads through every stage, the source adapter, and per-stage options.

mod builder;
mod context;
mod source;
mod stage;

pub use builder::{BatchedPipelineBuilder, PipelineBuilder, RunSummary, TerminalPipeline};
pub use context::{Context, ContextBuilder};
pub use source::{fresh_or_retry, Source};
pub use stage::{StageOptions, StageSpec};
