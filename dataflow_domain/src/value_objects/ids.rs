// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Concrete identifier types for the run ledger, each a distinctly-marked
//! [`EntityId`].

use super::entity_id::{EntityId, IdCategory};

/// Marker for [`RunId`].
#[derive(Debug)]
pub struct RunMarker;
impl IdCategory for RunMarker {
    fn category_name() -> &'static str {
        "pipeline run"
    }
}

/// Identifies one [`crate::entities::PipelineRun`].
pub type RunId = EntityId<RunMarker>;

/// Marker for [`ResourceRunId`].
#[derive(Debug)]
pub struct ResourceRunMarker;
impl IdCategory for ResourceRunMarker {
    fn category_name() -> &'static str {
        "resource run"
    }
}

/// Identifies one [`crate::entities::ResourceRun`] — a resource's traversal
/// of the pipeline within one run.
pub type ResourceRunId = EntityId<ResourceRunMarker>;

/// Marker for [`ArtifactId`].
#[derive(Debug)]
pub struct ArtifactMarker;
impl IdCategory for ArtifactMarker {
    fn category_name() -> &'static str {
        "artifact"
    }
}

/// Identifies one captured [`crate::entities::Artifact`].
pub type ArtifactId = EntityId<ArtifactMarker>;
