// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap
//!
//! The composition root for the dataflow pipeline engine. This crate sits
//! **outside** the domain and engine layers and owns everything that is
//! specific to *running* a pipeline as a program rather than as a library:
//!
//! - **Argument parsing** - [`cli`] turns CLI flags into a validated, demo
//!   ready configuration.
//! - **Logging** - [`logger`] is a thin, testable facade in front of
//!   `tracing` for messages emitted before the application's own structured
//!   logging is wired up.
//! - **Shutdown coordination** - [`shutdown`] propagates an external
//!   cancellation request (Ctrl-C) into a running pipeline's
//!   [`dataflow_engine`]  `CancellationSignal` with a grace period.
//!
//! Enterprise layers (`dataflow-domain`, `dataflow-engine`) never depend on
//! this crate; the dependency only runs one way, from here down.

pub mod cli;
pub mod logger;
pub mod shutdown;

pub use cli::{parse_and_validate, DemoArgs};
