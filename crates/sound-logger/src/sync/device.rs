//! Device status document and remote parameter updates.
//!
//! The device registers itself in the shared `microphones` collection and
//! refreshes its live status every 25 seconds. A short-interval watch of
//! the same document picks up `audio_trigger` changes and
//! `updated_parameters` requests; the latter rewrite the parameters file,
//! reset the remote fields and restart the acquisition pipeline.

use crate::{
    AppResult,
    config::{Parameters, UpdatedParameters},
    sampler::SharedSensor,
    supervisor::SupervisorEvent,
};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde_json::{Value, json};
use tokio::sync::{RwLock, mpsc};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{AudioTrigger, RemoteStore};

const MICROPHONES_COLLECTION: &str = "microphones";
const STATUS_INTERVAL: Duration = Duration::from_secs(25);
const WATCH_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_AUDIO_TRIGGER: f64 = 70.0;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Slot holding the sensor while the pipeline runs; `None` when detached.
pub(crate) type SharedSensorSlot = Arc<RwLock<Option<SharedSensor>>>;

/// Device registration, status refresh and parameter watch.
pub(crate) struct DeviceStatusTask {
    remote: Arc<dyn RemoteStore>,
    status_db: String,
    serial_number: String,
    parameters_path: PathBuf,
    parameters: Parameters,
    device: SharedSensorSlot,
    events: mpsc::Sender<SupervisorEvent>,
    trigger: AudioTrigger,
}

impl DeviceStatusTask {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        remote: Arc<dyn RemoteStore>,
        status_db: String,
        serial_number: String,
        parameters_path: PathBuf,
        parameters: Parameters,
        device: SharedSensorSlot,
        events: mpsc::Sender<SupervisorEvent>,
        trigger: AudioTrigger,
    ) -> Self {
        Self {
            remote,
            status_db,
            serial_number,
            parameters_path,
            parameters,
            device,
            events,
            trigger,
        }
    }

    /// Runs registration, the status refresh and the document watch until
    /// cancelled.
    pub(crate) async fn run(self, cancel: CancellationToken) {
        if let Err(e) = self
            .remote
            .ensure_plain_collection(&self.status_db, MICROPHONES_COLLECTION, None)
            .await
        {
            error!(error = %e, "Ensuring microphones collection failed");
        }

        if let Err(e) = self.register_device().await {
            error!(error = %e, "Device registration failed");
        }

        let mut status = tokio::time::interval(STATUS_INTERVAL);
        let mut watch = tokio::time::interval(WATCH_INTERVAL);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = status.tick() => {
                    if let Err(e) = self.refresh_status().await {
                        error!(error = %e, "Status refresh failed");
                    }
                }
                _ = watch.tick() => {
                    if let Err(e) = self.poll_document().await {
                        error!(error = %e, "Device document poll failed");
                    }
                }
            }
        }

        info!("Device status task stopped");
    }

    /// Creates the device document on first contact, or refreshes its
    /// static fields.
    async fn register_device(&self) -> AppResult<()> {
        let metadata = self.read_metadata().await;
        let connected = self.device.read().await.is_some();
        let state = if connected { "Running" } else { "Inactive" };
        let parameters = serde_json::to_value(&self.parameters)?;
        let now = Local::now().format(TIMESTAMP_FORMAT).to_string();

        let existing = self
            .remote
            .get_document(&self.status_db, MICROPHONES_COLLECTION, &self.serial_number)
            .await?;

        let (model, firmware, dob, doc) = metadata
            .map(|m| {
                (
                    Value::String(m.model),
                    Value::String(m.firmware),
                    Value::String(m.manufacture_date),
                    Value::String(m.calibration_date),
                )
            })
            .unwrap_or((Value::Null, Value::Null, Value::Null, Value::Null));

        let reset_updates = json!({
            "AcousticSequences": null,
            "SpectrumSequences": null,
            "AudioSequences": null,
        });

        if existing.is_none() {
            let document = json!({
                "_id": self.serial_number,
                "serial_number": self.serial_number,
                "type": model,
                "firmware": firmware,
                "manufacturing_date": dob,
                "calibration_date": doc,
                "longitude": null,
                "latitude": null,
                "altitude": null,
                "state": state,
                "temperature": null,
                "battery": { "current": null, "charged": null, "timeremaining": null },
                "parameters": parameters,
                "audio_trigger": DEFAULT_AUDIO_TRIGGER,
                "updated_parameters": reset_updates,
                "last_updated": now,
            });

            self.remote
                .put_document(
                    &self.status_db,
                    MICROPHONES_COLLECTION,
                    &self.serial_number,
                    &document,
                )
                .await?;
            info!(serial = %self.serial_number, "Device document created");
        } else {
            let fields = json!({
                "serial_number": self.serial_number,
                "type": model,
                "firmware": firmware,
                "manufacturing_date": dob,
                "calibration_date": doc,
                "state": state,
                "battery": { "current": null, "charged": null, "timeremaining": null },
                "parameters": parameters,
                "updated_parameters": reset_updates,
                "last_updated": now,
            });

            self.remote
                .patch_document(
                    &self.status_db,
                    MICROPHONES_COLLECTION,
                    &self.serial_number,
                    &fields,
                )
                .await?;
            info!(serial = %self.serial_number, "Device document updated");
        }

        Ok(())
    }

    /// Pushes live state and temperature.
    async fn refresh_status(&self) -> AppResult<()> {
        let device = self.device.read().await.clone();

        let (state, temperature) = match device {
            Some(device) => {
                let read = spawn_blocking(move || {
                    let mut device = device.lock().unwrap_or_else(|e| e.into_inner());
                    device.read_temperature()
                })
                .await;

                match read {
                    Ok(Ok(temperature)) => ("Running", Some(f64::from(temperature))),
                    Ok(Err(e)) => {
                        warn!(error = %e, "Temperature read failed");
                        ("Inactive", None)
                    }
                    Err(e) => {
                        warn!(error = %e, "Temperature worker panicked");
                        ("Inactive", None)
                    }
                }
            }
            None => ("Inactive", None),
        };

        let fields = json!({
            "state": state,
            "temperature": temperature,
            "battery": { "current": null, "charged": null, "timeremaining": null },
            "longitude": null,
            "latitude": null,
            "altitude": null,
            "last_updated": Local::now().format(TIMESTAMP_FORMAT).to_string(),
        });

        self.remote
            .patch_document(
                &self.status_db,
                MICROPHONES_COLLECTION,
                &self.serial_number,
                &fields,
            )
            .await
    }

    /// One watch cycle over the device document.
    async fn poll_document(&self) -> AppResult<()> {
        let Some(document) = self
            .remote
            .get_document(&self.status_db, MICROPHONES_COLLECTION, &self.serial_number)
            .await?
        else {
            return Ok(());
        };

        // Live trigger update.
        let new_trigger = document.get("audio_trigger").and_then(Value::as_f64);
        {
            let mut trigger = self.trigger.write().await;
            if *trigger != new_trigger {
                info!(?new_trigger, "Audio trigger updated");
                *trigger = new_trigger;
            }
        }

        // Remote parameter update request.
        let Some(updated) = document.get("updated_parameters") else {
            return Ok(());
        };
        if updated.is_null() {
            return Ok(());
        }
        let updated: UpdatedParameters = serde_json::from_value(updated.clone())?;
        if updated.is_empty() {
            return Ok(());
        }

        info!("Detected change in updated_parameters");

        let replacement = Parameters::from_update(&updated);
        replacement.save(&self.parameters_path)?;

        self.remote
            .patch_document(
                &self.status_db,
                MICROPHONES_COLLECTION,
                &self.serial_number,
                &json!({
                    "updated_parameters": {
                        "AcousticSequences": null,
                        "SpectrumSequences": null,
                        "AudioSequences": null,
                    },
                    "parameters": serde_json::to_value(&replacement)?,
                }),
            )
            .await?;

        if self
            .events
            .send(SupervisorEvent::ParametersUpdated)
            .await
            .is_err()
        {
            warn!("Pipeline event channel closed");
        }

        Ok(())
    }

    async fn read_metadata(&self) -> Option<sound_logger_core::SensorInfo> {
        let device = self.device.read().await.clone()?;

        let read = spawn_blocking(move || {
            let mut device = device.lock().unwrap_or_else(|e| e.into_inner());
            device.read_info()
        })
        .await;

        match read {
            Ok(Ok(info)) => Some(info),
            Ok(Err(e)) => {
                warn!(error = %e, "Could not read device metadata");
                None
            }
            Err(e) => {
                warn!(error = %e, "Metadata worker panicked");
                None
            }
        }
    }
}
