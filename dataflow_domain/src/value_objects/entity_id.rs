// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic Entity Identifier
//!
//! A type-safe, time-ordered identifier built on [`Ulid`]. Every entity in
//! the run ledger (`PipelineRun`, `ResourceRun`, `Artifact`) gets its own
//! marker type so a `RunId` can never be accidentally passed where a
//! `ResourceRunId` is expected, while all of them share one implementation of
//! generation, parsing, and ordering.
//!
//! ULIDs are preferred over plain UUIDs here because the run ledger is
//! write-heavy and append-only: a time-ordered identifier keeps the Runs and
//! ResourceRuns indexes roughly insertion-ordered, which matters for the
//! range-style queries a retry loader performs (`GetIncompleteResourceIds`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

use crate::PipelineError;

/// A category of entity that can own an [`EntityId`].
///
/// Implemented by zero-sized marker types; never instantiated.
pub trait IdCategory {
    /// Human-readable name used in error messages (e.g. "pipeline run").
    fn category_name() -> &'static str;
}

/// A type-safe wrapper around a [`Ulid`], tagged with an entity marker.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId<C: IdCategory> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<C>,
}

impl<C: IdCategory> EntityId<C> {
    /// Generates a new, time-ordered identifier.
    pub fn new() -> Self {
        Self {
            ulid: Ulid::new(),
            _marker: PhantomData,
        }
    }

    /// Wraps an existing ULID (e.g. one read back from storage).
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self { ulid, _marker: PhantomData }
    }

    /// Parses an identifier from its canonical 26-character string form.
    pub fn from_string(s: &str) -> Result<Self, PipelineError> {
        let ulid = Ulid::from_string(s).map_err(|e| {
            PipelineError::invalid_config(format!("invalid {} id '{}': {}", C::category_name(), s, e))
        })?;
        Ok(Self::from_ulid(ulid))
    }

    /// The underlying ULID.
    pub fn ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<C: IdCategory> Default for EntityId<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: IdCategory> Clone for EntityId<C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C: IdCategory> Copy for EntityId<C> {}

impl<C: IdCategory> PartialEq for EntityId<C> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}
impl<C: IdCategory> Eq for EntityId<C> {}

impl<C: IdCategory> PartialOrd for EntityId<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<C: IdCategory> Ord for EntityId<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<C: IdCategory> std::hash::Hash for EntityId<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<C: IdCategory> fmt::Debug for EntityId<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", C::category_name(), self.ulid)
    }
}

impl<C: IdCategory> fmt::Display for EntityId<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ulid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestMarker;
    impl IdCategory for TestMarker {
        fn category_name() -> &'static str {
            "test"
        }
    }
    type TestId = EntityId<TestMarker>;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(TestId::new(), TestId::new());
    }

    #[test]
    fn round_trips_through_string() {
        let id = TestId::new();
        let parsed = TestId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(TestId::from_string("not-a-ulid").is_err());
    }

    #[test]
    fn ids_are_time_ordered() {
        let a = TestId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = TestId::new();
        assert!(a < b);
    }
}
