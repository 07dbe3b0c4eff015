//! Staged audio upload with trigger gating.
//!
//! Each staged minute file is uploaded only when its minute's LAeq reached
//! the live `audio_trigger` threshold; quieter minutes are deleted locally.
//! Files are removed only after the remote acknowledged the insert, or
//! after the gating decision said they will never be uploaded.

use crate::{AppResult, store::LocalStore};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDateTime;
use serde_json::{Value, json};
use sound_logger_core::parse_minute_file_name;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{AUDIO_TTL, AudioTrigger, RemoteStore};

const AUDIO_COLLECTION: &str = "audio";
/// Table holding the per-minute levels the trigger is compared against.
const TRIGGER_DB: &str = "LAeq";
const TRIGGER_TABLE: &str = "LAeq1min";

const BATCH_SIZE: usize = 5;
const BATCH_PAUSE: Duration = Duration::from_secs(3);
const IDLE_PAUSE: Duration = Duration::from_secs(40);
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Upload loop over the staged audio directory.
pub(crate) struct AudioTransfer {
    remote: Arc<dyn RemoteStore>,
    store: Arc<LocalStore>,
    database: String,
    status_db: String,
    serial_number: String,
    audio_dir: PathBuf,
    staged_extension: &'static str,
    trigger: AudioTrigger,
}

impl AudioTransfer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        remote: Arc<dyn RemoteStore>,
        store: Arc<LocalStore>,
        database: String,
        status_db: String,
        serial_number: String,
        audio_dir: PathBuf,
        staged_extension: &'static str,
        trigger: AudioTrigger,
    ) -> Self {
        Self {
            remote,
            store,
            database,
            status_db,
            serial_number,
            audio_dir,
            staged_extension,
            trigger,
        }
    }

    /// Runs the transfer loop until cancelled.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        if let Err(e) = self
            .remote
            .ensure_plain_collection(&self.database, AUDIO_COLLECTION, Some(AUDIO_TTL))
            .await
        {
            error!(error = %e, "Ensuring audio collection failed");
        }

        self.seed_trigger().await;

        loop {
            let files = self.scan_directory().await;

            let pause = if files.len() > BATCH_SIZE {
                info!(count = files.len(), "Processing staged audio in batches");
                for batch in files.chunks(BATCH_SIZE) {
                    self.process_batch(batch).await;
                    tokio::time::sleep(BATCH_PAUSE).await;
                }
                BATCH_PAUSE
            } else if !files.is_empty() {
                for file in &files {
                    self.process_batch(std::slice::from_ref(file)).await;
                }
                IDLE_PAUSE
            } else {
                IDLE_PAUSE
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }

        info!("Audio transfer stopped");
    }

    /// Initializes the trigger from the device document.
    async fn seed_trigger(&self) {
        match self
            .remote
            .get_document(&self.status_db, "microphones", &self.serial_number)
            .await
        {
            Ok(Some(doc)) => {
                let value = doc.get("audio_trigger").and_then(Value::as_f64);
                if value.is_none() {
                    warn!("No audio_trigger field in device document");
                }
                *self.trigger.write().await = value;
            }
            Ok(None) => warn!("Device document absent, audio trigger unknown"),
            Err(e) => error!(error = %e, "Fetching audio trigger failed"),
        }
    }

    /// Staged files with parseable minute timestamps, oldest first.
    async fn scan_directory(&self) -> Vec<(PathBuf, NaiveDateTime)> {
        let mut files = Vec::new();

        let Ok(mut entries) = tokio::fs::read_dir(&self.audio_dir).await else {
            return files;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let matches_ext = path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(self.staged_extension));
            if !matches_ext {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(minute) = parse_minute_file_name(name) {
                files.push((path, minute));
            }
        }

        files.sort_by_key(|(_, minute)| *minute);
        files
    }

    /// Uploads or discards up to one batch of staged files.
    async fn process_batch(&self, batch: &[(PathBuf, NaiveDateTime)]) {
        let mut documents = Vec::new();
        let mut uploaded_paths = Vec::new();

        for (path, minute) in batch {
            match self.prepare_document(path, *minute).await {
                Ok(Some(document)) => {
                    documents.push(document);
                    uploaded_paths.push(path.clone());
                }
                Ok(None) => {}
                Err(e) => error!(path = ?path, error = %e, "Preparing audio document failed"),
            }
        }

        if documents.is_empty() {
            return;
        }

        match self
            .remote
            .insert_many(&self.database, AUDIO_COLLECTION, &documents)
            .await
        {
            Ok(inserted) => {
                info!(inserted, "Audio documents inserted");
                for path in uploaded_paths {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        error!(path = ?path, error = %e, "Removing uploaded file failed");
                    }
                }
            }
            Err(e) => {
                // Files stay behind and are retried on the next scan.
                error!(error = %e, "Audio batch insert failed");
            }
        }
    }

    /// Builds the upload document when the minute clears the trigger;
    /// deletes the file and returns `None` when it never will.
    async fn prepare_document(
        &self,
        path: &Path,
        minute: NaiveDateTime,
    ) -> AppResult<Option<Value>> {
        let level = self
            .store
            .fetch_value_at(TRIGGER_DB, TRIGGER_TABLE, minute)
            .await?;
        let trigger = *self.trigger.read().await;

        let (Some(level), Some(trigger)) = (level, trigger) else {
            warn!(path = ?path, "Level or audio trigger missing, deleting file");
            tokio::fs::remove_file(path).await?;
            return Ok(None);
        };

        if level < trigger {
            info!(path = ?path, level, trigger, "Below audio trigger, deleting file");
            tokio::fs::remove_file(path).await?;
            return Ok(None);
        }

        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Some(json!({
            "filename": filename,
            "audio_data": BASE64.encode(bytes),
            "timestamp": minute.format(TIMESTAMP_FORMAT).to_string(),
        })))
    }
}
