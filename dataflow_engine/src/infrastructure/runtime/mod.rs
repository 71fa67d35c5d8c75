// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The concurrency primitives the stage chain is built from: a cancellation
//! signal shared by every worker, the envelope/fan-out bookkeeping that lets
//! `TransformMany` children converge back onto one resource completion, and
//! the worker-pool scheduler that actually runs a stage.

mod cancellation;
mod envelope;
mod scheduler;

pub use cancellation::CancellationSignal;
pub use envelope::{Envelope, FanOutOutcome, FanOutTracker};
pub use scheduler::{make_channel, spawn_worker_pool, StageReceiver, StageSender};
