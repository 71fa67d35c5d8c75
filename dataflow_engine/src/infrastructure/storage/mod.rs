// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Reference implementations of [`dataflow_domain::services::StorageService`]:
//! an in-memory store for tests and the demo binary, and a SQLite-backed
//! store following the teacher's repository pattern.

mod in_memory;
mod schema;
mod sqlite;

pub use in_memory::InMemoryStorageService;
pub use sqlite::{SqliteArtifactSink, SqliteStorageService};
