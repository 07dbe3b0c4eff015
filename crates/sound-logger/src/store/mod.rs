//! Local relational store.
//!
//! One MySQL database per acquired parameter, tables created idempotently on
//! first use. All access goes through one bounded connection pool; the
//! application does not start until the pool is established.

mod ops;
mod retention;
mod schema;

pub(crate) use ops::{LdenRow, TableSchema};
pub(crate) use retention::RetentionTask;
pub(crate) use schema::granularity_hint;

use std::time::Duration;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tokio::time::sleep;
use tracing::{error, info};

const MIN_CONNECTIONS: u32 = 1;
const MAX_CONNECTIONS: u32 = 100;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Handle to the local MySQL store.
#[derive(Clone)]
pub struct LocalStore {
    pool: MySqlPool,
    retention_days: u32,
}

impl LocalStore {
    /// Connects with exponential backoff, retrying forever. The pipeline
    /// cannot run without its local store, so startup blocks here until the
    /// server is reachable.
    pub async fn connect(url: &str, retention_days: u32) -> Self {
        let mut attempt: u32 = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            attempt += 1;
            info!(attempt, "Connecting to MySQL");

            match MySqlPoolOptions::new()
                .min_connections(MIN_CONNECTIONS)
                .max_connections(MAX_CONNECTIONS)
                .connect(url)
                .await
            {
                Ok(pool) => {
                    info!("MySQL connection pool established");
                    return Self { pool, retention_days };
                }
                Err(e) => {
                    error!(attempt, error = %e, "MySQL connection attempt failed");
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }

    /// The shared pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Configured retention window in days.
    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Closes the pool, waiting for checked-out connections.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("MySQL connection pool closed");
    }
}
