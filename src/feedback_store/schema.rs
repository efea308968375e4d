//! Database schema for feedback.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const FEEDBACK_TABLE_V0: Table = Table {
    name: "feedback",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("channel", &SqlType::Text, non_null = true),
        sqlite_column!("comment", &SqlType::Text),
        sqlite_column!(
            "metadata",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'{}'")
        ),
        sqlite_column!(
            "processed",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_feedback_channel", "channel")],
    unique_constraints: &[],
};

const FEEDBACK_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: "feedback",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ANALYSIS_RESULTS_TABLE_V0: Table = Table {
    name: "analysis_results",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "feedback_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&FEEDBACK_FOREIGN_KEY)
        ),
        sqlite_column!("sentiment", &SqlType::Text, non_null = true),
        sqlite_column!("score", &SqlType::Real, non_null = true),
        sqlite_column!("confidence", &SqlType::Real, non_null = true),
        sqlite_column!("primary_emotion", &SqlType::Text),
        sqlite_column!("emotions", &SqlType::Text, non_null = true),
        sqlite_column!("key_phrases", &SqlType::Text, non_null = true),
        sqlite_column!("word_count", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_analysis_created_at", "created_at")],
    unique_constraints: &[&["feedback_id"]],
};

pub const FEEDBACK_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[FEEDBACK_TABLE_V0, ANALYSIS_RESULTS_TABLE_V0],
    migration: None,
}];
