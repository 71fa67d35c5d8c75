// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The run ledger's entities: [`PipelineRun`], [`ResourceRun`],
//! [`StepProgress`], and [`Artifact`].

mod artifact;
mod pipeline_run;
mod resource_run;
mod step_progress;

pub use artifact::Artifact;
pub use pipeline_run::PipelineRun;
pub use resource_run::ResourceRun;
pub use step_progress::StepProgress;
