// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! A [`StorageService`] backed by `sqlx`'s SQLite driver, demonstrating the
//! persisted schema of §6.3 against a real engine. Follows the teacher's
//! repository pattern: a thin struct wrapping a pool, with every method
//! issuing parameterized SQL rather than building queries by hand.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use dataflow_domain::services::{
    ArtifactSaveRequest, ArtifactSaveResult, ArtifactSink, CreateResourceRunUpdate, ResourceCompletionUpdate,
    StepProgressUpdate, StorageService,
};
use dataflow_domain::value_objects::{ResourceRunId, ResourceStatus, RunId, RunStatus, RunType};
use dataflow_domain::PipelineError;

use super::schema::CREATE_TABLES;

pub struct SqliteStorageService {
    pool: SqlitePool,
}

impl SqliteStorageService {
    /// Connects to `database_url` (e.g. `sqlite://pipeline.db`) and ensures
    /// the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, PipelineError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        sqlx::raw_sql(CREATE_TABLES)
            .execute(&pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wraps an already-open pool, e.g. one shared with [`SqliteArtifactSink`].
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}

#[async_trait]
impl StorageService for SqliteStorageService {
    #[instrument(skip(self, configuration), fields(run_id = %run_id))]
    async fn create_run(
        &self,
        run_id: RunId,
        category: &str,
        name: &str,
        run_type: RunType,
        parent_run_id: Option<RunId>,
        configuration: Option<serde_json::Value>,
    ) -> Result<(), PipelineError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO pipeline_runs \
                (run_id, category, name, run_type, status, start_time, parent_run_id, configuration) \
             VALUES (?, ?, ?, ?, 'pending', ?, ?, ?) \
             ON CONFLICT (run_id) DO NOTHING",
        )
        .bind(run_id.to_string())
        .bind(category)
        .bind(name)
        .bind(run_type.to_string())
        .bind(now)
        .bind(parent_run_id.map(|id| id.to_string()))
        .bind(configuration.map(|v| v.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn complete_run(&self, run_id: RunId, final_status: RunStatus) -> Result<(), PipelineError> {
        let now = Utc::now();
        let row = sqlx::query("SELECT start_time FROM pipeline_runs WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?
            .ok_or_else(|| PipelineError::NotFound(format!("run {run_id}")))?;
        let start_time: String = row.try_get("start_time").map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        let start_time = chrono::DateTime::parse_from_rfc3339(&start_time)
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?
            .with_timezone(&Utc);
        let duration_ms = (now - start_time).num_milliseconds().max(0);

        sqlx::query("UPDATE pipeline_runs SET status = ?, end_time = ?, duration_ms = ? WHERE run_id = ?")
            .bind(final_status.to_string())
            .bind(now.to_rfc3339())
            .bind(duration_ms)
            .bind(run_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn get_resource_run_id(
        &self,
        run_id: RunId,
        resource_id: &str,
    ) -> Result<Option<ResourceRunId>, PipelineError> {
        let row = sqlx::query("SELECT resource_run_id FROM resource_runs WHERE pipeline_run_id = ? AND resource_id = ?")
            .bind(run_id.to_string())
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        row.map(|row| {
            let id: String = row.try_get("resource_run_id").map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
            dataflow_domain::value_objects::ResourceRunId::from_string(&id)
        })
        .transpose()
    }

    async fn create_resource_runs_batch(
        &self,
        run_id: RunId,
        updates: &[CreateResourceRunUpdate],
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        let mut created = 0u64;
        for update in updates {
            let result = sqlx::query(
                "INSERT INTO resource_runs \
                    (resource_run_id, pipeline_run_id, resource_id, resource_type, status, start_time) \
                 VALUES (?, ?, ?, ?, 'processing', ?) \
                 ON CONFLICT (pipeline_run_id, resource_id) DO NOTHING",
            )
            .bind(update.resource_run_id.to_string())
            .bind(run_id.to_string())
            .bind(&update.resource_id)
            .bind(&update.resource_type)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
            if result.rows_affected() > 0 {
                created += 1;
            }
        }
        if created > 0 {
            sqlx::query(
                "UPDATE pipeline_runs SET total_resources = total_resources + ?, \
                 status = CASE WHEN status = 'pending' THEN 'running' ELSE status END \
                 WHERE run_id = ?",
            )
            .bind(created as i64)
            .bind(run_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        }
        tx.commit().await.map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn update_step_progress_batch(
        &self,
        _run_id: RunId,
        updates: &[StepProgressUpdate],
    ) -> Result<Vec<StepProgressUpdate>, PipelineError> {
        let mut deferred = Vec::new();
        let now = Utc::now().to_rfc3339();
        for update in updates {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM resource_runs WHERE resource_run_id = ?")
                .bind(update.resource_run_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
            if exists.is_none() {
                deferred.push(update.clone());
                continue;
            }
            sqlx::query(
                "INSERT INTO step_progress \
                    (resource_run_id, step_name, sequence, status, start_time, duration_ms, error_message) \
                 VALUES (?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT (resource_run_id, step_name) DO UPDATE SET \
                    sequence = excluded.sequence, status = excluded.status, \
                    duration_ms = excluded.duration_ms, error_message = excluded.error_message",
            )
            .bind(update.resource_run_id.to_string())
            .bind(&update.step_name)
            .bind(update.sequence)
            .bind(update.status.to_string())
            .bind(&now)
            .bind(update.duration_ms)
            .bind(&update.error_message)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        }
        Ok(deferred)
    }

    async fn complete_resource_runs_batch(
        &self,
        run_id: RunId,
        updates: &[ResourceCompletionUpdate],
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        let (mut completed, mut failed, mut skipped) = (0i64, 0i64, 0i64);
        for update in updates {
            let result = sqlx::query(
                "UPDATE resource_runs SET status = ?, end_time = ?, duration_ms = ?, \
                    error_message = ?, error_step = ? \
                 WHERE resource_run_id = ? AND status = 'processing'",
            )
            .bind(update.status.to_string())
            .bind(&now)
            .bind(update.duration_ms)
            .bind(&update.error_message)
            .bind(&update.error_step)
            .bind(update.resource_run_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
            if result.rows_affected() > 0 {
                match update.status {
                    ResourceStatus::Completed => completed += 1,
                    ResourceStatus::Failed => failed += 1,
                    ResourceStatus::Skipped => skipped += 1,
                    ResourceStatus::Processing => {}
                }
            }
        }
        sqlx::query(
            "UPDATE pipeline_runs SET completed_resources = completed_resources + ?, \
                failed_resources = failed_resources + ?, skipped_resources = skipped_resources + ? \
             WHERE run_id = ?",
        )
        .bind(completed)
        .bind(failed)
        .bind(skipped)
        .bind(run_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        tx.commit().await.map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn get_incomplete_resource_ids(&self, run_id: RunId) -> Result<Vec<String>, PipelineError> {
        let rows = sqlx::query(
            "SELECT resource_id FROM resource_runs \
             WHERE pipeline_run_id = ? AND status NOT IN ('completed', 'skipped')",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        rows.into_iter()
            .map(|row| row.try_get("resource_id").map_err(|e| PipelineError::DatabaseError(e.to_string())))
            .collect()
    }
}

/// Persists `database`-storage-type artifacts inline in the `artifacts`
/// table; `memory`/`object_store` requests only record path and metadata,
/// matching §3's Artifact model.
pub struct SqliteArtifactSink {
    pool: SqlitePool,
}

impl SqliteArtifactSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactSink for SqliteArtifactSink {
    async fn save_batch(&self, requests: Vec<ArtifactSaveRequest>) -> Vec<ArtifactSaveResult> {
        let mut results = Vec::with_capacity(requests.len());
        for req in requests {
            let artifact_id = dataflow_domain::value_objects::ArtifactId::new();
            let storage_path = format!(
                "sqlite://artifacts/{}/{}/{}",
                req.resource_run_id, req.step_name, req.artifact_name
            );
            let now = Utc::now().to_rfc3339();
            let outcome = sqlx::query(
                "INSERT INTO artifacts \
                    (artifact_id, resource_run_id, step_name, artifact_name, storage_type, storage_path, data, metadata, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(artifact_id.to_string())
            .bind(req.resource_run_id.to_string())
            .bind(&req.step_name)
            .bind(&req.artifact_name)
            .bind(req.storage_type.to_string())
            .bind(&storage_path)
            .bind(req.data.as_deref())
            .bind(req.metadata.as_ref().map(|v| v.to_string()))
            .bind(&now)
            .execute(&self.pool)
            .await
            .map(|_| storage_path.clone())
            .map_err(|e| PipelineError::DatabaseError(e.to_string()));
            results.push(ArtifactSaveResult {
                resource_run_id: req.resource_run_id,
                step_name: req.step_name,
                artifact_name: req.artifact_name,
                outcome,
            });
        }
        results
    }
}
