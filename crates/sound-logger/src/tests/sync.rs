use crate::store::granularity_hint;
use crate::sync::{
    RemoteStore, TransferMessage, UploadStatus,
    tables::{SyncLedger, compress_batch, decompress_batch},
    uploader::RemoteUploader,
};
use crate::{AppError, AppResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use error_location::ErrorLocation;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Remote double: records inserts, can be switched offline.
struct MockRemote {
    online: AtomicBool,
    inserted: Mutex<HashMap<String, Vec<Value>>>,
}

impl MockRemote {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(true),
            inserted: Mutex::new(HashMap::new()),
        })
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn offline_error() -> AppError {
        AppError::RemoteError {
            reason: "offline".to_string(),
            location: ErrorLocation::from(std::panic::Location::caller()),
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn ping(&self) -> AppResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Self::offline_error())
        }
    }

    async fn ensure_timeseries_collection(
        &self,
        _db: &str,
        _name: &str,
        _granularity: &str,
        _ttl: Duration,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn ensure_plain_collection(
        &self,
        _db: &str,
        _name: &str,
        _ttl: Option<Duration>,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn insert_many(&self, _db: &str, collection: &str, docs: &[Value]) -> AppResult<u64> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(Self::offline_error());
        }

        let mut inserted = self.inserted.lock().await;
        inserted
            .entry(collection.to_string())
            .or_default()
            .extend(docs.iter().cloned());
        Ok(docs.len() as u64)
    }

    async fn get_document(
        &self,
        _db: &str,
        _collection: &str,
        _id: &str,
    ) -> AppResult<Option<Value>> {
        Ok(None)
    }

    async fn put_document(
        &self,
        _db: &str,
        _collection: &str,
        _id: &str,
        _doc: &Value,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn patch_document(
        &self,
        _db: &str,
        _collection: &str,
        _id: &str,
        _fields: &Value,
    ) -> AppResult<()> {
        Ok(())
    }
}

fn sample_docs() -> Vec<Value> {
    vec![
        json!({"id": 1, "timestamp": "2024-06-10 09:00:00", "value": 54.3}),
        json!({"id": 2, "timestamp": "2024-06-10 09:00:01", "value": 55.1}),
        json!({"id": 3, "timestamp": "2024-06-10 09:00:02", "value": 53.9}),
    ]
}

/// WHAT: A table never has two batches in flight
/// WHY: Single outstanding batch per table is the duplication guard
#[test]
fn given_batch_in_flight_when_checking_ledger_then_table_blocked() {
    let mut ledger = SyncLedger::default();
    ledger.register("LAeq1min");

    assert!(ledger.is_ready("LAeq1min"));

    ledger.begin("LAeq1min", vec![1, 2, 3]);
    assert!(!ledger.is_ready("LAeq1min"));

    let ids = ledger.confirm("LAeq1min");
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(ledger.is_ready("LAeq1min"));
}

/// WHAT: Unknown tables are not eligible and re-registration is harmless
/// WHY: Fetches may only target discovered tables
#[test]
fn given_unknown_table_when_checking_ledger_then_not_ready() {
    let mut ledger = SyncLedger::default();

    assert!(!ledger.is_ready("LAeq"));

    ledger.register("LAeq");
    ledger.begin("LAeq", vec![7]);
    // Re-discovery must not reset an in-flight table.
    ledger.register("LAeq");
    assert!(!ledger.is_ready("LAeq"));
}

/// WHAT: The compressed hand-off payload round-trips
/// WHY: The uploader must reconstruct exactly the fetched documents
#[test]
fn given_documents_when_compressing_then_round_trips() {
    let docs = sample_docs();

    let payload = compress_batch(&docs).unwrap();
    assert!(!payload.is_empty());

    let restored = decompress_batch(&payload).unwrap();
    assert_eq!(restored, docs);
}

/// WHAT: Granularity follows the table-name rule
/// WHY: Remote time-series collections are created per table class
#[test]
fn given_table_names_when_choosing_granularity_then_rule_applies() {
    assert_eq!(granularity_hint("LAeq"), "seconds");
    assert_eq!(granularity_hint("LAeq1min"), "minutes");
    assert_eq!(granularity_hint("LAeq5min"), "minutes");
    assert_eq!(granularity_hint("LAeq15min"), "minutes");
    assert_eq!(granularity_hint("LAeq30min"), "hours");
    assert_eq!(granularity_hint("LAeq1h"), "hours");
    assert_eq!(granularity_hint("LAeq24h"), "seconds");
}

/// WHAT: An acknowledged batch reports success with its row count
/// WHY: Only confirmed batches may be marked sent locally
#[tokio::test]
async fn given_reachable_remote_when_uploading_then_status_ok() {
    let remote = MockRemote::new();
    let (data_tx, data_rx) = mpsc::channel(8);
    let (status_tx, mut status_rx) = mpsc::channel::<UploadStatus>(8);
    let cancel = CancellationToken::new();

    let uploader = RemoteUploader::new(
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        "SN-1".to_string(),
        data_rx,
        status_tx,
    );
    let handle = tokio::spawn(uploader.run(cancel.clone()));

    let docs = sample_docs();
    data_tx
        .send(TransferMessage::InsertBatch {
            table: "LAeq1min".to_string(),
            payload: compress_batch(&docs).unwrap(),
            count: docs.len(),
        })
        .await
        .unwrap();

    let status = status_rx.recv().await.unwrap();
    assert!(status.ok);
    assert_eq!(status.table, "LAeq1min");
    assert_eq!(status.count, 3);

    let inserted = remote.inserted.lock().await;
    assert_eq!(inserted.get("laeq1min").map(Vec::len), Some(3));
    drop(inserted);

    cancel.cancel();
    let _ = handle.await;
}

/// WHAT: Outage then recovery delivers each batch exactly once
/// WHY: Failed batches are refetched; confirmed batches are never resent
#[tokio::test]
async fn given_remote_outage_when_retrying_then_no_duplicates() {
    let remote = MockRemote::new();
    let (data_tx, data_rx) = mpsc::channel(8);
    let (status_tx, mut status_rx) = mpsc::channel::<UploadStatus>(8);
    let cancel = CancellationToken::new();

    let uploader = RemoteUploader::new(
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        "SN-1".to_string(),
        data_rx,
        status_tx,
    );
    let handle = tokio::spawn(uploader.run(cancel.clone()));

    let docs = sample_docs();
    let payload = compress_batch(&docs).unwrap();

    // Remote down: the batch must fail and stay unconfirmed.
    remote.set_online(false);
    data_tx
        .send(TransferMessage::InsertBatch {
            table: "LAeq1min".to_string(),
            payload: payload.clone(),
            count: docs.len(),
        })
        .await
        .unwrap();

    let status = status_rx.recv().await.unwrap();
    assert!(!status.ok);
    assert!(remote.inserted.lock().await.is_empty());

    // Back online: the refetched batch goes through once.
    remote.set_online(true);
    data_tx
        .send(TransferMessage::InsertBatch {
            table: "LAeq1min".to_string(),
            payload,
            count: docs.len(),
        })
        .await
        .unwrap();

    let status = status_rx.recv().await.unwrap();
    assert!(status.ok);

    let inserted = remote.inserted.lock().await;
    assert_eq!(inserted.get("laeq1min").map(Vec::len), Some(3));
    drop(inserted);

    cancel.cancel();
    let _ = handle.await;
}
