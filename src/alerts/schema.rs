//! Database schema for alerts.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const ALERTS_TABLE_V0: Table = Table {
    name: "alerts",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("alert_type", &SqlType::Text, non_null = true),
        sqlite_column!("severity", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'OPEN'")
        ),
        sqlite_column!("assigned_to", &SqlType::Text),
        sqlite_column!("channel", &SqlType::Text),
        sqlite_column!("threshold", &SqlType::Text, non_null = true),
        sqlite_column!("data", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("resolved_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_alerts_dedup", "alert_type, channel, status, created_at"),
        ("idx_alerts_created_at", "created_at"),
    ],
    unique_constraints: &[],
};

pub const ALERTS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[ALERTS_TABLE_V0],
    migration: None,
}];
