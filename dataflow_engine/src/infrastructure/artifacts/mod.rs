// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The artifact batcher: a channel-backed queue with a single consumer that
//! flushes batches to an [`dataflow_domain::services::ArtifactSink`] and
//! resolves a per-request completion token for each one.

mod batcher;
mod completion_token;
mod in_memory_sink;

pub use batcher::ArtifactBatcher;
pub use completion_token::{CompletionToken, CompletionWaiter};
pub use in_memory_sink::InMemoryArtifactSink;
