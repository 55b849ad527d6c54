//! Database connection management using sqlx

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::{NsqlError, Result};

/// Build a connection pool and verify connectivity.
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(|e| NsqlError::Database(format!("Failed to connect: {}", e)))?;

    // Test the connection
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| NsqlError::Database(format!("Connection test failed: {}", e)))?;

    Ok(pool)
}
