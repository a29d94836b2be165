//! SQL execution collaborator boundary.
//!
//! The pipeline treats the execution engine as a black box behind
//! [`QueryExecutor`]: it renders a schema description for a bounded set of
//! tables and executes one query at a time. A Postgres adapter over sqlx is
//! provided as glue; tests use scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{Column, PgPool, Row};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Ordered result rows from the execution engine. May be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<HashMap<String, serde_json::Value>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// External engine that owns the uploaded data.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Render a textual schema description for the given tables. Each table
    /// appears as a `Table: <name>` header followed by its columns.
    async fn get_schema(&self, table_names: &[String]) -> Result<String>;

    /// Execute one SQL statement, failing with
    /// [`EngineError::QueryExecution`] when the engine rejects it.
    async fn execute(&self, query: &str) -> Result<QueryResult>;
}

/// Postgres-backed executor.
pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn get_schema(&self, table_names: &[String]) -> Result<String> {
        let rows = sqlx::query(
            "SELECT table_name, column_name, data_type \
             FROM information_schema.columns \
             WHERE table_name = ANY($1) \
             ORDER BY table_name, ordinal_position",
        )
        .bind(table_names)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EngineError::QueryExecution(format!("schema lookup failed: {}", e)))?;

        let mut description = String::new();
        let mut current_table = String::new();
        for row in rows {
            let table: String = row
                .try_get("table_name")
                .map_err(|e| EngineError::QueryExecution(e.to_string()))?;
            let column: String = row
                .try_get("column_name")
                .map_err(|e| EngineError::QueryExecution(e.to_string()))?;
            let data_type: String = row
                .try_get("data_type")
                .map_err(|e| EngineError::QueryExecution(e.to_string()))?;

            if table != current_table {
                if !description.is_empty() {
                    description.push('\n');
                }
                description.push_str(&format!("Table: {}\nColumns:\n", table));
                current_table = table;
            }
            description.push_str(&format!("  - {} ({})\n", column, data_type));
        }

        debug!(tables = table_names.len(), "rendered schema description");
        Ok(description)
    }

    async fn execute(&self, query: &str) -> Result<QueryResult> {
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::QueryExecution(e.to_string()))?;

        let mut result = QueryResult::default();
        if let Some(first) = rows.first() {
            result.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
        }
        for row in &rows {
            let mut record = HashMap::new();
            for (index, column) in row.columns().iter().enumerate() {
                record.insert(column.name().to_string(), column_value(row, index));
            }
            result.rows.push(record);
        }

        Ok(result)
    }
}

/// Decode a column into a JSON scalar, trying the common Postgres types in
/// turn. Types outside this set render as null.
fn column_value(row: &PgRow, index: usize) -> serde_json::Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(index) {
        return v
            .map(|d| serde_json::Value::String(d.to_string()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(index) {
        return v
            .map(|d| serde_json::Value::String(d.to_string()))
            .unwrap_or(serde_json::Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    serde_json::Value::Null
}
