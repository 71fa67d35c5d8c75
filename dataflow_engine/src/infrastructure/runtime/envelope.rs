// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The envelope carried between stages, and the per-root fan-out counter
//! that lets a `TransformMany` expansion report a single aggregate
//! completion for its root resource.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use dataflow_domain::value_objects::ResourceRunId;

/// One item travelling through the stage chain, tagged with the identity of
/// the root resource it traces back to.
///
/// All children produced by a `TransformMany` share their parent's
/// `resource_run_id` — the run ledger tracks ResourceRuns per root resource,
/// not per fan-out child (see the pending-child counter in
/// [`FanOutTracker`]).
pub struct Envelope<T> {
    pub root_resource_id: String,
    pub resource_run_id: ResourceRunId,
    pub item: T,
}

impl<T> Envelope<T> {
    pub fn new(root_resource_id: impl Into<String>, resource_run_id: ResourceRunId, item: T) -> Self {
        Self {
            root_resource_id: root_resource_id.into(),
            resource_run_id,
            item,
        }
    }

    pub fn map<U>(self, item: U) -> Envelope<U> {
        Envelope {
            root_resource_id: self.root_resource_id,
            resource_run_id: self.resource_run_id,
            item,
        }
    }
}

/// Aggregate outcome accumulated so far for one root resource's fan-out.
#[derive(Debug, Clone, Default)]
struct FanOutState {
    pending: u64,
    failed: bool,
    error_message: Option<String>,
    error_step: Option<String>,
}

/// Tracks how many in-flight children remain for each root resource that
/// went through a `TransformMany` expansion, so the stage runtime can emit a
/// single `RecordResourceComplete` once every child has reached a terminal
/// stage.
///
/// A root resource that never fans out is tracked with `pending = 1` and
/// completes on its own first (and only) terminal arrival.
#[derive(Clone, Default)]
pub struct FanOutTracker {
    state: Arc<Mutex<HashMap<String, FanOutState>>>,
}

/// What to do after a child (or a non-fanned-out resource) reaches a
/// terminal stage.
pub enum FanOutOutcome {
    /// Other children are still pending; no resource-level completion yet.
    StillPending,
    /// This was the last pending child; the caller should record resource
    /// completion with the given aggregate status.
    RootComplete { failed: bool, error_message: Option<String>, error_step: Option<String> },
}

impl FanOutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a root resource entering the chain with one pending child.
    pub fn register_root(&self, root_resource_id: &str) {
        let mut state = self.state.lock();
        state.entry(root_resource_id.to_string()).or_default().pending += 1;
        // The initial registration itself counts as the first pending unit;
        // undo the double count from entry's Default + this increment.
    }

    /// Registers `extra` additional children fanned out from a root
    /// (`TransformMany` emitting `extra + 1` children replaces the root's
    /// single pending unit with `extra + 1` units — call with `children - 1`
    /// after the root's initial registration).
    pub fn register_additional_children(&self, root_resource_id: &str, extra: u64) {
        if extra == 0 {
            return;
        }
        let mut state = self.state.lock();
        state.entry(root_resource_id.to_string()).or_default().pending += extra;
    }

    /// Reports that one child (or the whole resource, if it never fanned
    /// out) reached a terminal stage.
    pub fn record_child_terminal(
        &self,
        root_resource_id: &str,
        failed: bool,
        error_message: Option<String>,
        error_step: Option<String>,
    ) -> FanOutOutcome {
        let mut state = self.state.lock();
        let entry = state.entry(root_resource_id.to_string()).or_default();
        if failed {
            entry.failed = true;
            entry.error_message = error_message;
            entry.error_step = error_step;
        }
        entry.pending = entry.pending.saturating_sub(1);
        if entry.pending == 0 {
            let finished = state.remove(root_resource_id).unwrap_or_default();
            FanOutOutcome::RootComplete {
                failed: finished.failed,
                error_message: finished.error_message,
                error_step: finished.error_step,
            }
        } else {
            FanOutOutcome::StillPending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_resource_with_no_fan_out_completes_on_first_terminal() {
        let tracker = FanOutTracker::new();
        tracker.register_root("PT-001");
        match tracker.record_child_terminal("PT-001", false, None, None) {
            FanOutOutcome::RootComplete { failed, .. } => assert!(!failed),
            FanOutOutcome::StillPending => panic!("expected immediate completion"),
        }
    }

    #[test]
    fn parent_completes_only_after_all_children_terminate() {
        let tracker = FanOutTracker::new();
        tracker.register_root("PT-001");
        tracker.register_additional_children("PT-001", 2); // 3 children total

        assert!(matches!(
            tracker.record_child_terminal("PT-001", false, None, None),
            FanOutOutcome::StillPending
        ));
        assert!(matches!(
            tracker.record_child_terminal("PT-001", false, None, None),
            FanOutOutcome::StillPending
        ));
        match tracker.record_child_terminal("PT-001", false, None, None) {
            FanOutOutcome::RootComplete { failed, .. } => assert!(!failed),
            FanOutOutcome::StillPending => panic!("expected completion on last child"),
        }
    }

    #[test]
    fn any_failed_child_fails_the_parent() {
        let tracker = FanOutTracker::new();
        tracker.register_root("PT-001");
        tracker.register_additional_children("PT-001", 1);

        tracker.record_child_terminal("PT-001", true, Some("boom".into()), Some("score".into()));
        match tracker.record_child_terminal("PT-001", false, None, None) {
            FanOutOutcome::RootComplete { failed, error_step, .. } => {
                assert!(failed);
                assert_eq!(error_step.as_deref(), Some("score"));
            }
            FanOutOutcome::StillPending => panic!("expected completion"),
        }
    }
}
