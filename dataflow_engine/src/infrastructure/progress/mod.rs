// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The progress tracker: the pipeline's ledger-writer, batching three
//! independent event streams onto the storage service.

mod tracker;

pub use tracker::{ProgressTracker, ProgressTuning};
