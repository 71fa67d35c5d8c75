// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port traits the engine depends on and infrastructure adapters
//! implement: [`StorageService`] for the run ledger, [`ArtifactSink`] for
//! captured side-channel payloads.

mod artifact_sink;
mod storage_service;

pub use artifact_sink::{ArtifactSaveRequest, ArtifactSaveResult, ArtifactSink};
pub use storage_service::{
    CreateResourceRunUpdate, ResourceCompletionUpdate, StepProgressUpdate, StorageService,
};
