//! Store-and-forward synchronization with the remote document store.
//!
//! While the remote is reachable, four child tasks run: the table pump
//! (fetch unsent rows, confirm, mark sent), the uploader, the audio
//! transfer and the device status task. Connection loss cancels the
//! children; rows simply accumulate locally and are replayed after
//! reconnection.

mod audio;
mod connection;
mod device;
mod remote;
pub(crate) mod tables;
pub(crate) mod uploader;

pub(crate) use {
    connection::ConnectionHandler,
    device::SharedSensorSlot,
    remote::{HttpRemoteStore, RemoteStore},
};

use crate::{
    config::Parameters,
    store::LocalStore,
    supervisor::SupervisorEvent,
};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// TTL of tabular documents in the remote store.
pub(crate) const TABULAR_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 14);
/// TTL of audio documents in the remote store.
pub(crate) const AUDIO_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Message from the table pump to the uploader.
pub(crate) enum TransferMessage {
    /// Ensure the remote collection for a table exists.
    PrepareCollection {
        /// Local table name.
        table: String,
    },
    /// Upload one batch of rows.
    InsertBatch {
        /// Local table name.
        table: String,
        /// zlib-compressed JSON array of row documents.
        payload: Vec<u8>,
        /// Number of rows in the batch.
        count: usize,
    },
}

/// Upload outcome reported back to the table pump.
pub(crate) struct UploadStatus {
    /// Local table name.
    pub table: String,
    /// Rows the remote acknowledged.
    pub count: usize,
    /// Whether the insert was acknowledged; a failed batch is refetched.
    pub ok: bool,
}

/// Live-updatable audio upload threshold, written by the device watcher.
pub(crate) type AudioTrigger = Arc<RwLock<Option<f64>>>;

/// Supervising task for all remote synchronization.
pub(crate) struct RemoteSync {
    remote: Arc<dyn RemoteStore>,
    store: Arc<LocalStore>,
    database: String,
    status_db: String,
    serial_number: String,
    audio_dir: PathBuf,
    staged_extension: &'static str,
    parameters_path: PathBuf,
    parameters: Parameters,
    device: SharedSensorSlot,
    events: mpsc::Sender<SupervisorEvent>,
    connected: watch::Receiver<bool>,
}

impl RemoteSync {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        remote: Arc<dyn RemoteStore>,
        store: Arc<LocalStore>,
        serial_number: String,
        status_db: String,
        audio_dir: PathBuf,
        staged_extension: &'static str,
        parameters_path: PathBuf,
        parameters: Parameters,
        device: SharedSensorSlot,
        events: mpsc::Sender<SupervisorEvent>,
        connected: watch::Receiver<bool>,
    ) -> Self {
        Self {
            remote,
            store,
            database: serial_number.clone(),
            status_db,
            serial_number,
            audio_dir,
            staged_extension,
            parameters_path,
            parameters,
            device,
            events,
            connected,
        }
    }

    /// Runs sync cycles until cancelled: wait for connection, run children,
    /// tear them down on connection loss, repeat.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        let audio_trigger: AudioTrigger = Arc::new(RwLock::new(None));

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = self.connected.wait_for(|connected| *connected) => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            info!("Remote reachable, starting sync tasks");
            let children = cancel.child_token();

            let (data_tx, data_rx) = mpsc::channel::<TransferMessage>(64);
            let (status_tx, status_rx) = mpsc::channel::<UploadStatus>(64);

            let pump = tables::TableSyncPump::new(Arc::clone(&self.store), data_tx, status_rx);
            let uploader = uploader::RemoteUploader::new(
                Arc::clone(&self.remote),
                self.database.clone(),
                data_rx,
                status_tx,
            );
            let audio = audio::AudioTransfer::new(
                Arc::clone(&self.remote),
                Arc::clone(&self.store),
                self.database.clone(),
                self.status_db.clone(),
                self.serial_number.clone(),
                self.audio_dir.clone(),
                self.staged_extension,
                Arc::clone(&audio_trigger),
            );
            let status = device::DeviceStatusTask::new(
                Arc::clone(&self.remote),
                self.status_db.clone(),
                self.serial_number.clone(),
                self.parameters_path.clone(),
                self.parameters.clone(),
                Arc::clone(&self.device),
                self.events.clone(),
                Arc::clone(&audio_trigger),
            );

            let tasks = vec![
                tokio::spawn(pump.run(children.clone())),
                tokio::spawn(uploader.run(children.clone())),
                tokio::spawn(audio.run(children.clone())),
                tokio::spawn(status.run(children.clone())),
            ];

            // Hold until the connection drops or we are shut down.
            tokio::select! {
                () = cancel.cancelled() => {}
                changed = self.connected.wait_for(|connected| !*connected) => {
                    if changed.is_ok() {
                        info!("Remote connection lost, stopping sync tasks");
                    }
                }
            }

            children.cancel();
            let _ = futures::future::join_all(tasks).await;

            if cancel.is_cancelled() {
                break;
            }
        }

        info!("Remote sync stopped");
    }
}
