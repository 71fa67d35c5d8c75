// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The worker-pool scheduler every stage runs on: `N` tasks pulling from one
//! shared inbound queue and pushing to a shared outbound queue, honoring
//! `max_degree_of_parallelism` and `bounded_capacity` per §5. Within-stage
//! output order is not preserved when `N > 1`; across stages, items never
//! overtake the queue they were pushed into.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use dataflow_domain::PipelineError;

use super::CancellationSignal;

/// The sending half of a stage-to-stage queue. Bounded channels apply
/// backpressure; unbounded ones are the pragmatic default for stages that
/// don't configure `bounded_capacity`.
pub enum StageSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        match self {
            StageSender::Bounded(tx) => StageSender::Bounded(tx.clone()),
            StageSender::Unbounded(tx) => StageSender::Unbounded(tx.clone()),
        }
    }
}

impl<T: Send> StageSender<T> {
    /// Sends one item, racing a bounded channel's backpressure against
    /// cancellation. Unbounded sends never block, so cancellation is only
    /// observed on the next receive.
    pub async fn send(&self, item: T, cancellation: &CancellationSignal) -> Result<(), PipelineError> {
        match self {
            StageSender::Bounded(tx) => {
                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => Err(PipelineError::Cancelled("send interrupted by cancellation".into())),
                    result = tx.send(item) => result.map_err(|_| PipelineError::invariant("downstream stage dropped its receiver")),
                }
            }
            StageSender::Unbounded(tx) => tx
                .send(item)
                .map_err(|_| PipelineError::invariant("downstream stage dropped its receiver")),
        }
    }
}

/// The receiving half of a stage-to-stage queue, shared across a worker
/// pool via an async mutex so only one worker dequeues at a time.
pub enum StageReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> StageReceiver<T> {
    pub async fn recv(&mut self) -> Option<T> {
        match self {
            StageReceiver::Bounded(rx) => rx.recv().await,
            StageReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Creates a fresh stage-to-stage queue. `None` capacity yields an unbounded
/// channel, matching the spec's "unbounded is the pragmatic default" note.
pub fn make_channel<T>(bounded_capacity: Option<usize>) -> (StageSender<T>, StageReceiver<T>) {
    match bounded_capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (StageSender::Bounded(tx), StageReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (StageSender::Unbounded(tx), StageReceiver::Unbounded(rx))
        }
    }
}

/// Spawns `concurrency` workers sharing one inbound queue. Each worker
/// dequeues an item, cooperatively checking cancellation first, then races
/// `work` against cancellation rather than simply awaiting it, so a
/// cancelled run doesn't wait out whatever the in-flight item happens to be
/// doing. Returning `None` from `work` (or losing the race to cancellation)
/// drops the item without forwarding — used when a stage fails a resource
/// and the runtime chooses not to propagate it further.
pub fn spawn_worker_pool<In, Out, F, Fut>(
    rx: StageReceiver<In>,
    tx: StageSender<Out>,
    concurrency: usize,
    cancellation: CancellationSignal,
    work: F,
) -> Vec<JoinHandle<()>>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Out>> + Send + 'static,
{
    let rx = Arc::new(AsyncMutex::new(rx));
    let work = Arc::new(work);
    (0..concurrency.max(1))
        .map(|_| {
            let rx = rx.clone();
            let tx = tx.clone();
            let cancellation = cancellation.clone();
            let work = work.clone();
            tokio::spawn(async move {
                loop {
                    if cancellation.is_cancelled() {
                        break;
                    }
                    let item = {
                        let mut guard = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancellation.cancelled() => None,
                            item = guard.recv() => item,
                        }
                    };
                    let Some(item) = item else { break };
                    let outcome = tokio::select! {
                        biased;
                        _ = cancellation.cancelled() => None,
                        out = work(item) => out,
                    };
                    if let Some(out) = outcome {
                        if tx.send(out, &cancellation).await.is_err() {
                            break;
                        }
                    }
                    if cancellation.is_cancelled() {
                        break;
                    }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn workers_forward_transformed_items() {
        let (in_tx, in_rx) = make_channel::<u32>(None);
        let (out_tx, mut out_rx) = make_channel::<u32>(None);
        let cancellation = CancellationSignal::new();
        let handles = spawn_worker_pool(in_rx, out_tx, 2, cancellation.clone(), |n: u32| async move { Some(n * 2) });

        for n in 0..5u32 {
            in_tx.send(n, &cancellation).await.unwrap();
        }
        drop(in_tx);

        let mut results = Vec::new();
        for _ in 0..5 {
            results.push(out_rx.recv().await.unwrap());
        }
        results.sort_unstable();
        assert_eq!(results, vec![0, 2, 4, 6, 8]);

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn items_returning_none_are_dropped_without_forwarding() {
        let (in_tx, in_rx) = make_channel::<u32>(None);
        let (out_tx, mut out_rx) = make_channel::<u32>(None);
        let cancellation = CancellationSignal::new();
        let _handles =
            spawn_worker_pool(in_rx, out_tx, 1, cancellation.clone(), |n: u32| async move { if n % 2 == 0 { Some(n) } else { None } });

        for n in 0..4u32 {
            in_tx.send(n, &cancellation).await.unwrap();
        }
        drop(in_tx);

        let mut results = Vec::new();
        while let Some(item) = tokio::time::timeout(Duration::from_millis(200), out_rx.recv()).await.ok().flatten() {
            results.push(item);
        }
        results.sort_unstable();
        assert_eq!(results, vec![0, 2]);
    }

    #[tokio::test]
    async fn cancellation_stops_workers_promptly() {
        let (in_tx, in_rx) = make_channel::<u32>(None);
        let (out_tx, _out_rx) = make_channel::<u32>(None);
        let cancellation = CancellationSignal::new();
        let started = Arc::new(AtomicUsize::new(0));
        let started_clone = started.clone();
        let handles = spawn_worker_pool(in_rx, out_tx, 1, cancellation.clone(), move |n: u32| {
            started_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Some(n)
            }
        });
        in_tx.send(1, &cancellation).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancellation.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_millis(200), handle).await.unwrap().unwrap();
        }
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }
}
