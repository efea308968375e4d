//! Database schema for job_queue.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const JOB_QUEUE_TABLE_V0: Table = Table {
    name: "job_queue",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!("priority", &SqlType::Integer, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!(
            "attempts_made",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("max_attempts", &SqlType::Integer, non_null = true),
        sqlite_column!("backoff_base_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("available_at_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("enqueued_at_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("started_at_ms", &SqlType::Integer),
        sqlite_column!("finished_at_ms", &SqlType::Integer),
        sqlite_column!("last_error", &SqlType::Text),
    ],
    indices: &[
        (
            "idx_job_queue_claim",
            "job_type, status, priority, enqueued_at_ms",
        ),
        ("idx_job_queue_available", "available_at_ms"),
    ],
    unique_constraints: &[],
};

const DEAD_JOBS_TABLE_V0: Table = Table {
    name: "dead_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("original_job_id", &SqlType::Integer, non_null = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!("priority", &SqlType::Integer, non_null = true),
        sqlite_column!("attempts_made", &SqlType::Integer, non_null = true),
        sqlite_column!("max_attempts", &SqlType::Integer, non_null = true),
        sqlite_column!("backoff_base_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("error", &SqlType::Text, non_null = true),
        sqlite_column!("enqueued_at_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("failed_at_ms", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_dead_jobs_type_failed", "job_type, failed_at_ms")],
    unique_constraints: &[],
};

pub const JOB_QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[JOB_QUEUE_TABLE_V0, DEAD_JOBS_TABLE_V0],
    migration: None,
}];
