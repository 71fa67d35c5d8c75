// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A one-shot completion signal for a single artifact-save request: the
//! batcher's consumer resolves it with the outcome once the owning batch has
//! been flushed to the sink. Stages that need durability before claiming
//! success await the waiter half; most stages drop it and fire-and-forget.

use tokio::sync::oneshot;

use dataflow_domain::PipelineError;

/// The producer half, held by the artifact batcher's consumer loop.
pub struct CompletionToken {
    sender: oneshot::Sender<Result<String, PipelineError>>,
}

/// The consumer half, optionally held by the stage that enqueued the
/// artifact.
pub struct CompletionWaiter {
    receiver: oneshot::Receiver<Result<String, PipelineError>>,
}

/// Creates a linked token/waiter pair.
pub fn completion_pair() -> (CompletionToken, CompletionWaiter) {
    let (sender, receiver) = oneshot::channel();
    (CompletionToken { sender }, CompletionWaiter { receiver })
}

impl CompletionToken {
    pub fn signal_ok(self, storage_path: String) {
        let _ = self.sender.send(Ok(storage_path));
    }

    pub fn signal_err(self, error: PipelineError) {
        let _ = self.sender.send(Err(error));
    }
}

impl CompletionWaiter {
    /// Awaits the artifact's durable outcome. A closed token without a
    /// signal (dropped during teardown without resolving) surfaces as an
    /// invariant violation — finalization must never let this happen.
    pub async fn wait(self) -> Result<String, PipelineError> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(PipelineError::invariant("artifact completion token dropped unsignalled")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_ok_resolves_the_waiter() {
        let (token, waiter) = completion_pair();
        token.signal_ok("s3://bucket/out.json".into());
        assert_eq!(waiter.wait().await.unwrap(), "s3://bucket/out.json");
    }

    #[tokio::test]
    async fn signal_err_resolves_the_waiter_with_an_error() {
        let (token, waiter) = completion_pair();
        token.signal_err(PipelineError::persistence("disk full"));
        assert!(waiter.wait().await.is_err());
    }

    #[tokio::test]
    async fn an_unsignalled_dropped_token_surfaces_as_an_invariant_violation() {
        let (token, waiter) = completion_pair();
        drop(token);
        let err = waiter.wait().await.unwrap_err();
        assert_eq!(err.category(), "invariant");
    }
}
