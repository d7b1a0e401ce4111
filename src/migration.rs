//! Database migration functionality
//!
//! This module provides idempotent schema setup for the resources table
//! managed by CareHaus.

use crate::core::CareHaus;
use crate::errors::CareHausError;
use sqlx::PgPool;

const CREATE_RESOURCES_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS resources (
    id UUID PRIMARY KEY,
    resource_type TEXT NOT NULL,
    version_id INTEGER NOT NULL,
    last_updated TIMESTAMPTZ NOT NULL,
    content JSONB NOT NULL
)";

const RESOURCE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS resources_type_idx ON resources (resource_type)",
    "CREATE INDEX IF NOT EXISTS resources_identifier_idx ON resources \
     USING GIN ((content->'identifier') jsonb_path_ops)",
];

/// Create the resources table and its indexes if they do not exist
pub async fn ensure_schema(pool: &PgPool) -> Result<(), CareHausError> {
    crate::debug_log!("Ensuring resources schema");
    sqlx::raw_sql(CREATE_RESOURCES_TABLE).execute(pool).await?;

    for index_sql in RESOURCE_INDEXES {
        sqlx::raw_sql(index_sql).execute(pool).await?;
    }

    Ok(())
}

impl CareHaus {
    /// Ensure the resources schema exists
    pub async fn migrate(&self) -> Result<(), CareHausError> {
        ensure_schema(self.pool()).await
    }
}
