//! Remote batch uploader.
//!
//! Consumes transfer messages, ensures remote collections and inserts row
//! batches. Uploads across tables interleave up to a bounded concurrency;
//! every batch reports its outcome on the status channel so the pump can
//! mark rows sent or refetch them.

use crate::store::granularity_hint;

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{RemoteStore, TABULAR_TTL, TransferMessage, UploadStatus, tables::decompress_batch};

/// Maximum concurrent in-flight table uploads.
const MAX_IN_FLIGHT: usize = 10;

/// The one collection that is not a time series.
const PLAIN_COLLECTIONS: [&str; 1] = ["connectivity"];

/// Upload worker for tabular batches.
pub(crate) struct RemoteUploader {
    remote: Arc<dyn RemoteStore>,
    database: String,
    data_rx: mpsc::Receiver<TransferMessage>,
    status_tx: mpsc::Sender<UploadStatus>,
    prepared: HashSet<String>,
    in_flight: Arc<Semaphore>,
}

impl RemoteUploader {
    pub(crate) fn new(
        remote: Arc<dyn RemoteStore>,
        database: String,
        data_rx: mpsc::Receiver<TransferMessage>,
        status_tx: mpsc::Sender<UploadStatus>,
    ) -> Self {
        Self {
            remote,
            database,
            data_rx,
            status_tx,
            prepared: HashSet::new(),
            in_flight: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }

    /// Processes transfer messages until cancelled.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => break,
                message = self.data_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                TransferMessage::PrepareCollection { table } => {
                    self.prepare_collection(&table).await;
                }
                TransferMessage::InsertBatch { table, payload, count } => {
                    self.spawn_insert(table, payload, count).await;
                }
            }
        }

        info!("Remote uploader stopped");
    }

    /// Ensures the remote collection for a table, once per run.
    async fn prepare_collection(&mut self, table: &str) {
        if self.prepared.contains(table) {
            return;
        }

        let collection = table.to_lowercase();
        let result = if PLAIN_COLLECTIONS.contains(&collection.as_str()) {
            self.remote
                .ensure_plain_collection(&self.database, &collection, Some(TABULAR_TTL))
                .await
        } else {
            self.remote
                .ensure_timeseries_collection(
                    &self.database,
                    &collection,
                    granularity_hint(table),
                    TABULAR_TTL,
                )
                .await
        };

        match result {
            Ok(()) => {
                self.prepared.insert(table.to_string());
            }
            Err(e) => error!(table, error = %e, "Preparing collection failed"),
        }
    }

    /// Uploads one batch on its own task, bounded by the in-flight cap.
    async fn spawn_insert(&self, table: String, payload: Vec<u8>, count: usize) {
        let Ok(permit) = Arc::clone(&self.in_flight).acquire_owned().await else {
            return;
        };

        let remote = Arc::clone(&self.remote);
        let database = self.database.clone();
        let status_tx = self.status_tx.clone();

        tokio::spawn(async move {
            let _permit = permit;

            let ok = match upload_batch(remote.as_ref(), &database, &table, &payload).await {
                Ok(inserted) => {
                    info!(table, inserted, "Batch inserted");
                    true
                }
                Err(e) => {
                    error!(table, error = %e, "Batch insert failed");
                    false
                }
            };

            let _ = status_tx.send(UploadStatus { table, count, ok }).await;
        });
    }
}

async fn upload_batch(
    remote: &dyn RemoteStore,
    database: &str,
    table: &str,
    payload: &[u8],
) -> crate::AppResult<u64> {
    let docs = decompress_batch(payload)?;
    remote
        .insert_many(database, &table.to_lowercase(), &docs)
        .await
}
