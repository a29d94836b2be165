//! Database connection management using sqlx.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Build a connection pool and verify it with a test query.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(|e| EngineError::Persistence(format!("failed to connect: {}", e)))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| EngineError::Persistence(format!("connection test failed: {}", e)))?;

    Ok(pool)
}
