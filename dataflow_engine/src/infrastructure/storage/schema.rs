// /////////////////////////////////////////////////////////////////////////////
// DataFlow Pipeline Engine
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The logical schema of §6.3, expressed as SQLite DDL. Four tables, with
//! the uniqueness and lookup indexes the spec calls out: `(pipeline_run_id,
//! resource_id)` on ResourceRuns, `(resource_run_id, step_name,
//! artifact_name)` on Artifacts, `(resource_run_id, sequence)` on
//! StepProgress, and `status` on ResourceRuns for retry loaders.

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS pipeline_runs (
    run_id              TEXT PRIMARY KEY,
    category            TEXT NOT NULL,
    name                TEXT NOT NULL,
    run_type            TEXT NOT NULL,
    status              TEXT NOT NULL,
    start_time          TEXT NOT NULL,
    end_time            TEXT,
    duration_ms         INTEGER,
    total_resources     INTEGER NOT NULL DEFAULT 0,
    completed_resources INTEGER NOT NULL DEFAULT 0,
    failed_resources    INTEGER NOT NULL DEFAULT 0,
    skipped_resources   INTEGER NOT NULL DEFAULT 0,
    parent_run_id       TEXT REFERENCES pipeline_runs(run_id),
    configuration       TEXT
);

CREATE TABLE IF NOT EXISTS resource_runs (
    resource_run_id TEXT PRIMARY KEY,
    pipeline_run_id TEXT NOT NULL REFERENCES pipeline_runs(run_id) ON DELETE CASCADE,
    resource_id     TEXT NOT NULL,
    resource_type   TEXT NOT NULL,
    status          TEXT NOT NULL,
    start_time      TEXT NOT NULL,
    end_time        TEXT,
    duration_ms     INTEGER,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    error_message   TEXT,
    error_step      TEXT,
    UNIQUE (pipeline_run_id, resource_id)
);
CREATE INDEX IF NOT EXISTS idx_resource_runs_status ON resource_runs (status);

CREATE TABLE IF NOT EXISTS step_progress (
    resource_run_id TEXT NOT NULL REFERENCES resource_runs(resource_run_id) ON DELETE CASCADE,
    step_name       TEXT NOT NULL,
    sequence        INTEGER NOT NULL,
    status          TEXT NOT NULL,
    start_time      TEXT NOT NULL,
    end_time        TEXT,
    duration_ms     INTEGER,
    error_message   TEXT,
    PRIMARY KEY (resource_run_id, step_name)
);
CREATE INDEX IF NOT EXISTS idx_step_progress_sequence ON step_progress (resource_run_id, sequence);

CREATE TABLE IF NOT EXISTS artifacts (
    artifact_id     TEXT PRIMARY KEY,
    resource_run_id TEXT NOT NULL REFERENCES resource_runs(resource_run_id) ON DELETE CASCADE,
    step_name       TEXT NOT NULL,
    artifact_name   TEXT NOT NULL,
    storage_type    TEXT NOT NULL,
    storage_path    TEXT NOT NULL,
    data            BLOB,
    metadata        TEXT,
    created_at      TEXT NOT NULL,
    UNIQUE (resource_run_id, step_name, artifact_name)
);
"#;
