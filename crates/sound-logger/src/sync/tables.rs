//! Table discovery, unsent-row fetching and confirmation.
//!
//! Every table has at most one batch in flight: a fetch marks the table
//! busy, and only the uploader's confirmation (success or failure) makes it
//! eligible again. Successful batches are marked `is_sent = 1`; failed
//! batches stay unsent and are refetched.

use crate::{
    AppResult,
    store::{LocalStore, TableSchema},
};

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{TransferMessage, UploadStatus};

const DISCOVERY_INTERVAL: Duration = Duration::from_secs(600);
const FETCH_INTERVAL: Duration = Duration::from_secs(1);
/// Upper bound on rows per batch; bounds memory per table.
const FETCH_LIMIT: u32 = 3600;

/// Per-table in-flight bookkeeping. One outstanding batch per table.
#[derive(Default)]
pub(crate) struct SyncLedger {
    ready: HashMap<String, bool>,
    pending: HashMap<String, Vec<i64>>,
}

impl SyncLedger {
    /// Registers a table as eligible on first sight.
    pub(crate) fn register(&mut self, table: &str) {
        self.ready.entry(table.to_string()).or_insert(true);
    }

    /// Whether the table may fetch a new batch.
    pub(crate) fn is_ready(&self, table: &str) -> bool {
        self.ready.get(table).copied().unwrap_or(false)
    }

    /// Marks a batch in flight.
    pub(crate) fn begin(&mut self, table: &str, ids: Vec<i64>) {
        self.ready.insert(table.to_string(), false);
        self.pending.insert(table.to_string(), ids);
    }

    /// Releases the table and returns the in-flight ids.
    pub(crate) fn confirm(&mut self, table: &str) -> Vec<i64> {
        self.ready.insert(table.to_string(), true);
        self.pending.remove(table).unwrap_or_default()
    }
}

/// Fetch/confirm pump over all discovered tables.
pub(crate) struct TableSyncPump {
    store: Arc<LocalStore>,
    data_tx: mpsc::Sender<TransferMessage>,
    status_rx: mpsc::Receiver<UploadStatus>,
    ledger: SyncLedger,
    schemas: HashMap<String, TableSchema>,
    table_dbs: HashMap<String, String>,
}

impl TableSyncPump {
    pub(crate) fn new(
        store: Arc<LocalStore>,
        data_tx: mpsc::Sender<TransferMessage>,
        status_rx: mpsc::Receiver<UploadStatus>,
    ) -> Self {
        Self {
            store,
            data_tx,
            status_rx,
            ledger: SyncLedger::default(),
            schemas: HashMap::new(),
            table_dbs: HashMap::new(),
        }
    }

    /// Runs discovery, fetch and confirmation until cancelled.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        let mut discovery = tokio::time::interval(DISCOVERY_INTERVAL);
        let mut fetch = tokio::time::interval(FETCH_INTERVAL);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = discovery.tick() => self.discover().await,
                _ = fetch.tick() => self.fetch_all().await,
                Some(status) = self.status_rx.recv() => self.handle_status(status).await,
            }
        }

        info!("Table sync pump stopped");
    }

    /// Discovers databases and tables, announcing new collections.
    async fn discover(&mut self) {
        let databases = match self.store.discover().await {
            Ok(databases) => databases,
            Err(e) => {
                error!(error = %e, "Table discovery failed");
                return;
            }
        };

        for (db, tables) in databases {
            for table in tables {
                let name = table.name.clone();
                self.table_dbs.insert(name.clone(), db.clone());
                self.schemas.insert(name.clone(), table);
                self.ledger.register(&name);

                if self
                    .data_tx
                    .send(TransferMessage::PrepareCollection { table: name })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }

        debug!(tables = self.schemas.len(), "Discovery complete");
    }

    /// Fetches one batch per eligible table.
    async fn fetch_all(&mut self) {
        let tables: Vec<String> = self
            .schemas
            .keys()
            .filter(|t| self.ledger.is_ready(t))
            .cloned()
            .collect();

        for table in tables {
            if let Err(e) = self.fetch_table(&table).await {
                error!(table, error = %e, "Fetch failed");
            }
        }
    }

    async fn fetch_table(&mut self, table: &str) -> AppResult<()> {
        let (Some(schema), Some(db)) = (self.schemas.get(table), self.table_dbs.get(table)) else {
            return Ok(());
        };

        let rows = self.store.fetch_unsent_rows(db, schema, FETCH_LIMIT).await?;
        if rows.is_empty() {
            return Ok(());
        }

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let docs: Vec<Value> = rows.into_iter().map(|r| Value::Object(r.doc)).collect();
        let count = docs.len();
        let payload = compress_batch(&docs)?;

        self.ledger.begin(table, ids);

        if self
            .data_tx
            .send(TransferMessage::InsertBatch {
                table: table.to_string(),
                payload,
                count,
            })
            .await
            .is_err()
        {
            // Uploader is gone; release so a future pump can refetch.
            self.ledger.confirm(table);
        }

        Ok(())
    }

    /// Applies one upload outcome: mark rows sent, or release for refetch.
    async fn handle_status(&mut self, status: UploadStatus) {
        let ids = self.ledger.confirm(&status.table);

        if !status.ok {
            debug!(table = %status.table, "Batch not acknowledged, will refetch");
            return;
        }

        let Some(db) = self.table_dbs.get(&status.table) else {
            error!(table = %status.table, "No database known for table");
            return;
        };

        if let Err(e) = self.store.mark_sent(db, &status.table, &ids).await {
            error!(table = %status.table, error = %e, "Marking rows sent failed");
        } else {
            debug!(table = %status.table, count = status.count, "Batch confirmed");
        }
    }
}

/// Serializes the documents and compresses them for the uploader hand-off.
pub(crate) fn compress_batch(docs: &[Value]) -> AppResult<Vec<u8>> {
    let raw = serde_json::to_vec(docs)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Inflates an uploader payload back into documents.
pub(crate) fn decompress_batch(payload: &[u8]) -> AppResult<Vec<Value>> {
    use std::io::Read;

    let mut decoder = flate2::read::ZlibDecoder::new(payload);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    Ok(serde_json::from_slice(&raw)?)
}
