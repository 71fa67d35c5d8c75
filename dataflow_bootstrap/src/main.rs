// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Demo entry point: wires a synthetic multi-stage pipeline to the SQLite
//! reference storage and artifact backends, runs it under CLI control, and
//! prints a run summary.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use dataflow_bootstrap::cli::{parse_and_validate, ValidatedCommand};
use dataflow_bootstrap::logger::{BootstrapLogger, ConsoleLogger};
use dataflow_bootstrap::shutdown::ShutdownCoordinator;

use dataflow_domain::services::StorageService as _;
use dataflow_engine::infrastructure::storage::{SqliteArtifactSink, SqliteStorageService};
use dataflow_engine::{ContextBuilder, EngineConfig, PipelineBuilder, RunId, RunType, Source, StageOptions};

const DATABASE_URL: &str = "sqlite://dataflow-demo.db?mode=rwc";

#[tokio::main]
async fn main() -> ExitCode {
    let logger = ConsoleLogger::new();

    let args = match parse_and_validate() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("argument error: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(if args.verbose { "debug" } else { "info" })
        .init();
    logger.info("dataflow-demo starting");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_run_failure(&logger, &e),
    }
}

/// Logs a run failure through whatever [`BootstrapLogger`] the caller
/// passes in and returns the process exit code — split out from `main` so
/// the message format can be asserted against a `CapturingLogger`.
fn report_run_failure(logger: &dyn BootstrapLogger, err: &anyhow::Error) -> ExitCode {
    logger.error(&format!("run failed: {err}"));
    ExitCode::FAILURE
}

async fn run(args: dataflow_bootstrap::cli::DemoArgs) -> anyhow::Result<()> {
    let storage = Arc::new(SqliteStorageService::connect(DATABASE_URL).await?);
    let sink = Arc::new(SqliteArtifactSink::new(storage.pool()));
    let engine_config = EngineConfig::load(args.config.as_deref())?;

    let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
    let shutdown_signal = coordinator.signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            coordinator.initiate_shutdown();
        }
    });

    match args.command {
        ValidatedCommand::Run {
            resource_count,
            parallelism,
            fail_every,
        } => run_fresh(storage, sink, engine_config, shutdown_signal, resource_count, parallelism, fail_every).await,
        ValidatedCommand::Retry { parent_run_id } => {
            let parent_run_id = RunId::from_string(&parent_run_id)?;
            run_retry(storage, sink, engine_config, shutdown_signal, parent_run_id).await
        }
    }
}

async fn run_fresh(
    storage: Arc<SqliteStorageService>,
    sink: Arc<SqliteArtifactSink>,
    mut engine_config: EngineConfig,
    shutdown_signal: dataflow_engine::infrastructure::runtime::CancellationSignal,
    resource_count: usize,
    parallelism: usize,
    fail_every: usize,
) -> anyhow::Result<()> {
    engine_config.default_max_degree_of_parallelism = parallelism;

    let context = ContextBuilder::new("demo", "synthetic-run", storage.clone(), sink)
        .engine_config(engine_config)
        .build()
        .await?;
    println!("run {} started", context.run_id);

    let source = Source::from_iter((0..resource_count).map(|n| format!("RES-{n:05}")));
    let builder = PipelineBuilder::new(context, "resource", source, |id: &String| id.clone());
    bridge_shutdown(shutdown_signal, builder.cancellation());

    let summary = builder
        .transform("normalize", StageOptions::new(), |id: String| async move {
            Ok::<_, dataflow_engine::PipelineError>(id.to_lowercase())
        })
        .transform("score", StageOptions::new(), move |id: String| async move {
            let index: usize = id.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(0);
            if fail_every != 0 && index % fail_every == 0 {
                Err(dataflow_engine::PipelineError::user_function("score", &id, "synthetic failure"))
            } else {
                Ok(format!("{id}-scored"))
            }
        })
        .action("persist", StageOptions::new(), |_id: String| async move { Ok(()) })
        .complete()
        .await?;

    report(&summary, storage.as_ref()).await
}

async fn run_retry(
    storage: Arc<SqliteStorageService>,
    sink: Arc<SqliteArtifactSink>,
    engine_config: EngineConfig,
    shutdown_signal: dataflow_engine::infrastructure::runtime::CancellationSignal,
    parent_run_id: RunId,
) -> anyhow::Result<()> {
    let context = ContextBuilder::new("demo", "synthetic-retry", storage.clone(), sink)
        .run_type(RunType::Retry)
        .parent_run_id(parent_run_id)
        .engine_config(engine_config)
        .build()
        .await?;
    println!("retry run {} started (parent {})", context.run_id, parent_run_id);

    let source = dataflow_engine::fresh_or_retry(
        RunType::Retry,
        storage.as_ref(),
        context.run_id,
        Some(parent_run_id),
        || Source::from_iter(Vec::<String>::new()),
        Source::from_iter,
    )
    .await?;

    let builder = PipelineBuilder::new(context, "resource", source, |id: &String| id.clone());
    bridge_shutdown(shutdown_signal, builder.cancellation());

    let summary = builder
        .transform("normalize", StageOptions::new(), |id: String| async move {
            Ok::<_, dataflow_engine::PipelineError>(id.to_lowercase())
        })
        .transform("score", StageOptions::new(), |id: String| async move { Ok::<_, dataflow_engine::PipelineError>(format!("{id}-scored")) })
        .action("persist", StageOptions::new(), |_id: String| async move { Ok(()) })
        .complete()
        .await?;

    report(&summary, storage.as_ref()).await
}

/// Forwards the process-wide shutdown signal into a single run's own
/// cancellation signal — the two are distinct because [`ContextBuilder`]
/// mints a fresh one per run, but a shutdown should stop whichever run is
/// in flight.
fn bridge_shutdown(
    shutdown_signal: dataflow_engine::infrastructure::runtime::CancellationSignal,
    run_cancellation: dataflow_engine::infrastructure::runtime::CancellationSignal,
) {
    tokio::spawn(async move {
        shutdown_signal.cancelled().await;
        run_cancellation.cancel();
    });
}

async fn report(summary: &dataflow_engine::RunSummary, storage: &SqliteStorageService) -> anyhow::Result<()> {
    let incomplete = storage.get_incomplete_resource_ids(summary.run_id).await?;
    println!("run {} finished: {:?}", summary.run_id, summary.final_status);
    if !incomplete.is_empty() {
        println!("{} resource(s) incomplete: {:?}", incomplete.len(), incomplete);
        println!("retry with: dataflow-demo retry {}", summary.run_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_bootstrap::logger::{CapturingLogger, LogLevel};

    #[test]
    fn run_failure_is_logged_as_an_error_with_the_message_prefixed() {
        let logger = CapturingLogger::new();
        let _ = report_run_failure(&logger, &anyhow::anyhow!("database unreachable"));

        let messages = logger.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, LogLevel::Error);
        assert_eq!(messages[0].message, "run failed: database unreachable");
    }
}
