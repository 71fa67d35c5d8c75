// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Source Adapter
//!
//! Produces the ordered, finite, non-restartable stream of items a pipeline
//! consumes: a plain synchronous iterator, or a lazily-polled async stream
//! for sources that themselves await I/O per item.
//!
//! [`fresh_or_retry`] implements the run-type-aware variant: a fresh run
//! draws from the caller's source factory; a retry run instead asks the
//! storage service for the incomplete resource ids of the run being retried
//! (or its parent) and hands that set to a retry loader.

use futures::stream::BoxStream;
use futures::StreamExt;

use dataflow_domain::services::StorageService;
use dataflow_domain::value_objects::{RunId, RunType};
use dataflow_domain::PipelineError;

/// A finite, ordered, non-restartable stream of pipeline input items.
pub enum Source<T> {
    Iter(Box<dyn Iterator<Item = T> + Send>),
    Stream(BoxStream<'static, T>),
}

impl<T: Send + 'static> Source<T> {
    /// Wraps a plain synchronous iterable.
    pub fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Source::Iter(Box::new(iter.into_iter()))
    }

    /// Wraps a lazily-polled async stream, for sources that themselves await
    /// I/O to produce each item.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = T> + Send + 'static,
    {
        Source::Stream(stream.boxed())
    }

    pub async fn next(&mut self) -> Option<T> {
        match self {
            Source::Iter(iter) => iter.next(),
            Source::Stream(stream) => stream.next().await,
        }
    }
}

/// Selects a fresh source, or loads the incomplete resource ids of the run
/// (or its parent) being retried and hands them to `retry_loader`.
pub async fn fresh_or_retry<T, FFresh, FRetry>(
    run_type: RunType,
    storage: &dyn StorageService,
    run_id: RunId,
    parent_run_id: Option<RunId>,
    fresh_source: FFresh,
    retry_loader: FRetry,
) -> Result<Source<T>, PipelineError>
where
    T: Send + 'static,
    FFresh: FnOnce() -> Source<T>,
    FRetry: FnOnce(Vec<String>) -> Source<T>,
{
    match run_type {
        RunType::Fresh => Ok(fresh_source()),
        RunType::Retry => {
            let lookup_run = parent_run_id.unwrap_or(run_id);
            let incomplete_ids = storage.get_incomplete_resource_ids(lookup_run).await?;
            Ok(retry_loader(incomplete_ids))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryStorageService;
    use dataflow_domain::services::CreateResourceRunUpdate;
    use dataflow_domain::value_objects::ResourceRunId;

    #[tokio::test]
    async fn iter_source_yields_items_in_order() {
        let mut source = Source::from_iter(vec![1, 2, 3]);
        assert_eq!(source.next().await, Some(1));
        assert_eq!(source.next().await, Some(2));
        assert_eq!(source.next().await, Some(3));
        assert_eq!(source.next().await, None);
    }

    #[tokio::test]
    async fn stream_source_yields_items_in_order() {
        let mut source = Source::from_stream(futures::stream::iter(vec!["a", "b"]));
        assert_eq!(source.next().await, Some("a"));
        assert_eq!(source.next().await, Some("b"));
        assert_eq!(source.next().await, None);
    }

    #[tokio::test]
    async fn fresh_run_type_uses_the_fresh_source() {
        let storage = InMemoryStorageService::new();
        let run_id = RunId::new();
        let mut source = fresh_or_retry(
            RunType::Fresh,
            &storage,
            run_id,
            None,
            || Source::from_iter(vec![1, 2]),
            |_ids| Source::from_iter(Vec::<i32>::new()),
        )
        .await
        .unwrap();
        assert_eq!(source.next().await, Some(1));
    }

    #[tokio::test]
    async fn retry_run_type_loads_incomplete_ids_from_the_parent_run() {
        let storage = InMemoryStorageService::new();
        let parent_run = RunId::new();
        storage
            .create_run(parent_run, "cat", "name", RunType::Fresh, None, None)
            .await
            .unwrap();
        storage
            .create_resource_runs_batch(
                parent_run,
                &[CreateResourceRunUpdate {
                    resource_run_id: ResourceRunId::new(),
                    resource_id: "RR-001".into(),
                    resource_type: "record".into(),
                }],
            )
            .await
            .unwrap();

        let retry_run = RunId::new();
        let mut source = fresh_or_retry(
            RunType::Retry,
            &storage,
            retry_run,
            Some(parent_run),
            || Source::from_iter(Vec::<String>::new()),
            Source::from_iter,
        )
        .await
        .unwrap();
        assert_eq!(source.next().await, Some("RR-001".to_string()));
    }
}
