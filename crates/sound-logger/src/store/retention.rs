use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::LocalStore;

const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Daily purge of rows older than the configured retention window.
///
/// Runs against every discovered table, so tables created later in the
/// process lifetime are picked up on the next pass.
pub(crate) struct RetentionTask {
    store: Arc<LocalStore>,
}

impl RetentionTask {
    pub(crate) fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Runs the purge once per day until cancelled.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        loop {
            self.purge_all().await;

            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(PURGE_INTERVAL) => {}
            }
        }
        info!("Retention task stopped");
    }

    async fn purge_all(&self) {
        let days = self.store.retention_days();

        let databases = match self.store.discover().await {
            Ok(databases) => databases,
            Err(e) => {
                error!(error = %e, "Retention discovery failed");
                return;
            }
        };

        let mut purged: u64 = 0;
        for (db, tables) in &databases {
            for table in tables {
                match self.store.purge_older_than(db, &table.name, days).await {
                    Ok(count) => purged += count,
                    Err(e) => {
                        error!(db, table = %table.name, error = %e, "Retention purge failed");
                    }
                }
            }
        }

        info!(purged, days, "Retention purge complete");
    }
}
