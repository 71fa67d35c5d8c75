// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end scenarios driving the full stage chain against the in-memory
//! reference storage and artifact backends.

use std::sync::Arc;
use std::time::Duration;

use dataflow_engine::application::{ContextBuilder, PipelineBuilder, Source, StageOptions};
use dataflow_engine::infrastructure::artifacts::InMemoryArtifactSink;
use dataflow_engine::infrastructure::storage::InMemoryStorageService;
use dataflow_domain::services::StorageService;
use dataflow_engine::{PipelineError, ResourceStatus, RunStatus, RunType, StorageType};

fn harness() -> (Arc<InMemoryStorageService>, Arc<InMemoryArtifactSink>) {
    (Arc::new(InMemoryStorageService::new()), Arc::new(InMemoryArtifactSink::new()))
}

#[tokio::test]
async fn five_record_pipeline_completes_successfully() {
    let (storage, sink) = harness();
    let context = ContextBuilder::new("orders", "normalize-and-score", storage.clone(), sink)
        .build()
        .await
        .unwrap();

    let source = Source::from_iter((1..=5).map(|n| format!("ORDER-{n:03}")));
    let summary = PipelineBuilder::new(context, "order", source, |id: &String| id.clone())
        .transform("normalize", StageOptions::new(), |id: String| async move { Ok::<_, PipelineError>(id.to_lowercase()) })
        .transform("score", StageOptions::new(), |id: String| async move { Ok::<_, PipelineError>(format!("{id}-scored")) })
        .action("persist", StageOptions::new(), |_id: String| async move { Ok(()) })
        .complete()
        .await
        .unwrap();

    assert_eq!(summary.final_status, RunStatus::Completed);
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.total_resources, 5);
    assert_eq!(run.completed_resources, 5);
    assert_eq!(run.failed_resources, 0);
    assert_eq!(storage.resource_run_count(summary.run_id), 5);
    assert_eq!(storage.step_count(summary.run_id), 15);
}

#[tokio::test]
async fn a_failing_stage_fails_only_its_own_resource() {
    let (storage, sink) = harness();
    let context = ContextBuilder::new("orders", "partial-failure", storage.clone(), sink).build().await.unwrap();

    let source = Source::from_iter(vec!["ok-1".to_string(), "bad".to_string(), "ok-2".to_string()]);
    let summary = PipelineBuilder::new(context, "order", source, |id: &String| id.clone())
        .transform("validate", StageOptions::new(), |id: String| async move {
            if id == "bad" {
                Err(PipelineError::user_function("validate", &id, "rejected"))
            } else {
                Ok(id)
            }
        })
        .action("persist", StageOptions::new(), |_id: String| async move { Ok(()) })
        .complete()
        .await
        .unwrap();

    assert_eq!(summary.final_status, RunStatus::Failed);
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.total_resources, 3);
    assert_eq!(run.completed_resources, 2);
    assert_eq!(run.failed_resources, 1);
}

#[tokio::test]
async fn retry_run_only_processes_the_parents_incomplete_resources() {
    let (storage, sink) = harness();
    let fresh_context = ContextBuilder::new("orders", "fresh-run", storage.clone(), sink.clone())
        .build()
        .await
        .unwrap();
    let fresh_run_id = fresh_context.run_id;

    let source = Source::from_iter(vec!["keep".to_string(), "bad".to_string()]);
    PipelineBuilder::new(fresh_context, "order", source, |id: &String| id.clone())
        .transform("validate", StageOptions::new(), |id: String| async move {
            if id == "bad" {
                Err(PipelineError::user_function("validate", &id, "boom"))
            } else {
                Ok(id)
            }
        })
        .action("persist", StageOptions::new(), |_id: String| async move { Ok(()) })
        .complete()
        .await
        .unwrap();

    assert_eq!(storage.get_incomplete_resource_ids(fresh_run_id).await.unwrap(), vec!["bad".to_string()]);

    let retry_context = ContextBuilder::new("orders", "retry-run", storage.clone(), sink)
        .run_type(RunType::Retry)
        .parent_run_id(fresh_run_id)
        .build()
        .await
        .unwrap();
    let retry_run_id = retry_context.run_id;
    let retry_storage = storage.clone();

    let source = dataflow_engine::fresh_or_retry(
        RunType::Retry,
        retry_storage.as_ref(),
        retry_run_id,
        Some(fresh_run_id),
        || Source::from_iter(Vec::<String>::new()),
        Source::from_iter,
    )
    .await
    .unwrap();

    let summary = PipelineBuilder::new(retry_context, "order", source, |id: &String| id.clone())
        .transform("validate", StageOptions::new(), |id: String| async move { Ok::<_, PipelineError>(id) })
        .action("persist", StageOptions::new(), |_id: String| async move { Ok(()) })
        .complete()
        .await
        .unwrap();

    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(storage.get_run(retry_run_id).unwrap().total_resources, 1);
}

#[tokio::test]
async fn cancelling_mid_run_stops_the_pipeline() {
    let (storage, sink) = harness();
    let mut engine_config = dataflow_engine::EngineConfig::default();
    engine_config.default_max_degree_of_parallelism = 2;
    engine_config.default_bounded_capacity = Some(4);
    let context = ContextBuilder::new("orders", "cancelled-run", storage.clone(), sink)
        .engine_config(engine_config)
        .build()
        .await
        .unwrap();

    // A bounded feeder channel means the source can only stay a handful of
    // items ahead of the slow stage below, so cancellation has time to land
    // well before all 1,000 items are pulled off the source.
    let source = Source::from_iter(0..1_000u32);
    let builder = PipelineBuilder::new(context, "order", source, |n: &u32| n.to_string());
    let cancellation = builder.cancellation();

    let summary = builder
        .transform("slow", StageOptions::new(), |n: u32| async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, PipelineError>(n)
        })
        .action("persist", StageOptions::new(), |_n: u32| async move { Ok(()) })
        .complete();

    tokio::time::sleep(Duration::from_millis(30)).await;
    cancellation.cancel();
    let summary = summary.await.unwrap();

    let run = storage.get_run(summary.run_id).unwrap();
    assert!(run.total_resources < 1_000, "cancellation should have stopped the source before it was exhausted");
}

#[tokio::test]
async fn artifact_capture_persists_a_row_per_captured_step() {
    let (storage, sink) = harness();
    let context = ContextBuilder::new("orders", "with-artifacts", storage.clone(), sink.clone())
        .build()
        .await
        .unwrap();

    let source = Source::from_iter(vec!["a".to_string(), "b".to_string()]);
    let summary = PipelineBuilder::new(context, "order", source, |id: &String| id.clone())
        .transform("normalize", StageOptions::new(), |id: String| async move { Ok::<_, PipelineError>(id.to_uppercase()) })
        .with_artifact(|id: &String| format!("{id}.json"), StorageType::Memory)
        .action("persist", StageOptions::new(), |_id: String| async move { Ok(()) })
        .complete()
        .await
        .unwrap();

    assert_eq!(summary.final_status, RunStatus::Completed);
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn fan_out_resource_completes_only_after_every_child_finishes() {
    let (storage, sink) = harness();
    let context = ContextBuilder::new("orders", "fan-out", storage.clone(), sink).build().await.unwrap();

    let source = Source::from_iter(vec!["batch-1".to_string()]);
    let summary = PipelineBuilder::new(context, "batch", source, |id: &String| id.clone())
        .transform_many(
            "expand",
            StageOptions::new(),
            |line: &String| line.clone(),
            |id: String| async move { Ok::<_, PipelineError>(vec![format!("{id}-0"), format!("{id}-1"), format!("{id}-2")]) },
        )
        .action("persist", StageOptions::new(), |_line: String| async move { Ok(()) })
        .complete()
        .await
        .unwrap();

    assert_eq!(summary.final_status, RunStatus::Completed);
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.total_resources, 1);
    assert_eq!(run.completed_resources, 1);
    // Fanned-out children share their parent's resource_run_id, so per-step
    // rows are keyed by (resource_run_id, step_name) rather than per child:
    // one row for "expand", one for "persist", regardless of fan-out width.
    assert_eq!(storage.step_count(summary.run_id), 2);
}

#[tokio::test]
async fn disabling_progress_tracking_skips_step_rows_for_that_stage() {
    let (storage, sink) = harness();
    let context = ContextBuilder::new("orders", "untracked-stage", storage.clone(), sink).build().await.unwrap();

    let source = Source::from_iter(vec!["a".to_string(), "b".to_string()]);
    let summary = PipelineBuilder::new(context, "order", source, |id: &String| id.clone())
        .transform("normalize", StageOptions::new().without_progress_tracking(), |id: String| async move {
            Ok::<_, PipelineError>(id.to_uppercase())
        })
        .action("persist", StageOptions::new(), |_id: String| async move { Ok(()) })
        .complete()
        .await
        .unwrap();

    assert_eq!(summary.final_status, RunStatus::Completed);
    // Only "persist" recorded a step row; "normalize" ran with tracking off.
    assert_eq!(storage.step_count(summary.run_id), 2);
}

#[tokio::test]
async fn batched_action_completes_every_item_in_the_batch() {
    let (storage, sink) = harness();
    let context = ContextBuilder::new("orders", "batched-write", storage.clone(), sink).build().await.unwrap();

    let source = Source::from_iter((1..=7).map(|n| format!("ITEM-{n}")));
    let summary = PipelineBuilder::new(context, "item", source, |id: &String| id.clone())
        .transform("normalize", StageOptions::new(), |id: String| async move { Ok::<_, PipelineError>(id.to_lowercase()) })
        .batch(3)
        .action("bulk-write", StageOptions::new(), |items: Vec<String>| async move {
            assert!(!items.is_empty() && items.len() <= 3);
            Ok(())
        })
        .complete()
        .await
        .unwrap();

    assert_eq!(summary.final_status, RunStatus::Completed);
    let run = storage.get_run(summary.run_id).unwrap();
    assert_eq!(run.total_resources, 7);
    assert_eq!(run.completed_resources, 7);
}
