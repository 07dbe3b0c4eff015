//! Application lifecycle.
//!
//! Startup order: local store pool, remote sync (background, non-blocking),
//! retention, then the device supervisor. Once the meter is present the
//! acquisition pipeline starts: sensor configuration, sampler, recorder,
//! interval scheduler with its aggregators, and the stall watchdog.
//! Supervisor events tear the pipeline down and restart it in the original
//! order; shutdown cancels everything and flushes the last WAV.

use crate::{
    AppResult,
    aggregate::register_aggregators,
    config::{EnvConfig, PARAMETERS_PATH, Parameters},
    recorder::AudioRecorder,
    sampler::{AcousticSampler, SharedSensor},
    scheduler::IntervalScheduler,
    store::{LocalStore, RetentionTask},
    supervisor::{
        DevicePath, SupervisorEvent, run_presence, run_scheduled_resets, run_stall_watchdog,
    },
    sync::{ConnectionHandler, HttpRemoteStore, RemoteStore, RemoteSync, SharedSensorSlot},
};

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sound_logger_core::{
    SensorDriver, TimestampProvider, Transcoder, Weighting, default_transcoder,
};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fixed audio sampling rate of the meter.
const DEVICE_FS: u32 = 48_000;
/// Fast integration time constant.
const DEVICE_TAU: f64 = 0.125;
const RESTART_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Long-lived application state.
pub(crate) struct Application {
    env: EnvConfig,
    parameters: Parameters,
    clock: TimestampProvider,
}

struct PipelineHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    async fn stop(self) {
        self.cancel.cancel();
        let _ = futures::future::join_all(self.tasks).await;
    }
}

impl Application {
    pub(crate) fn new(env: EnvConfig, parameters: Parameters) -> Self {
        Self {
            env,
            parameters,
            clock: TimestampProvider::new(),
        }
    }

    /// Runs the application until the shutdown token fires.
    pub(crate) async fn run(mut self, shutdown: CancellationToken) -> AppResult<()> {
        info!("Starting sound-logger application");

        // The pipeline cannot run without its local store.
        let store = Arc::new(
            LocalStore::connect(&self.env.mysql_url(), self.env.retention_days).await,
        );

        let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::new(
            &self.env.remote_url,
            &self.env.remote_username,
            &self.env.remote_password,
        )?);

        let (connection, connected_rx) =
            ConnectionHandler::new(Arc::clone(&remote), Arc::clone(&store));

        let (event_tx, mut event_rx) = mpsc::channel::<SupervisorEvent>(16);
        let (presence_tx, mut presence_rx) = watch::channel::<Option<DevicePath>>(None);
        let device_slot: SharedSensorSlot = Arc::new(tokio::sync::RwLock::new(None));
        let transcoder = default_transcoder();

        let sync = RemoteSync::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            self.env.serial_number.clone(),
            self.env.device_status_db.clone(),
            self.env.audio_dir(),
            transcoder.staged_extension(),
            PathBuf::from(PARAMETERS_PATH),
            self.parameters.clone(),
            Arc::clone(&device_slot),
            event_tx.clone(),
            connected_rx,
        );

        let mut background = Vec::new();
        background.push(tokio::spawn(connection.run(shutdown.child_token())));
        background.push(tokio::spawn(sync.run(shutdown.child_token())));
        background.push(tokio::spawn(
            RetentionTask::new(Arc::clone(&store)).run(shutdown.child_token()),
        ));
        background.push(tokio::spawn(run_presence(
            presence_tx,
            event_tx.clone(),
            shutdown.child_token(),
        )));
        background.push(tokio::spawn(run_scheduled_resets(
            self.clock.clone(),
            event_tx.clone(),
            shutdown.child_token(),
        )));

        // Acquisition cycles: wait for the device, run the pipeline, tear
        // it down on a supervisor event, repeat.
        loop {
            let found = tokio::select! {
                () = shutdown.cancelled() => break,
                found = presence_rx.wait_for(Option::is_some) => match found {
                    Ok(found) => found.clone(),
                    Err(_) => break,
                },
            };
            let Some(found) = found else { continue };

            let Some(pipeline) = self
                .start_pipeline(&found, &store, &device_slot, &transcoder, &event_tx, &shutdown, &presence_rx)
                .await
            else {
                // Device vanished mid-start or parameters are unusable;
                // pause before consulting presence again.
                tokio::time::sleep(RESTART_RETRY_DELAY).await;
                continue;
            };

            // Wait for a recovery trigger or shutdown.
            let event = tokio::select! {
                () = shutdown.cancelled() => {
                    self.teardown(pipeline, &device_slot).await;
                    break;
                }
                event = event_rx.recv() => event,
            };

            let Some(event) = event else {
                self.teardown(pipeline, &device_slot).await;
                break;
            };

            warn!(?event, "Recovery event, restarting acquisition");
            self.teardown(pipeline, &device_slot).await;

            // Coalesce bursts of events into one restart and pick up any
            // parameter rewrite from disk.
            while event_rx.try_recv().is_ok() {}
            self.reload_parameters();
        }

        info!("Stopping application");
        shutdown.cancel();
        let _ = futures::future::join_all(background).await;
        store.close().await;
        info!("Application stopped");

        Ok(())
    }

    /// Opens and configures the meter, then launches the pipeline tasks.
    #[allow(clippy::too_many_arguments)]
    async fn start_pipeline(
        &self,
        found: &DevicePath,
        store: &Arc<LocalStore>,
        device_slot: &SharedSensorSlot,
        transcoder: &Arc<dyn Transcoder>,
        event_tx: &mpsc::Sender<SupervisorEvent>,
        shutdown: &CancellationToken,
        presence: &watch::Receiver<Option<DevicePath>>,
    ) -> Option<PipelineHandle> {
        let weighting = match self.parameters.weighting() {
            Ok(weighting) => weighting,
            Err(e) => {
                error!(error = %e, "Invalid parameters, acquisition not started");
                return None;
            }
        };

        let mut attempt = 0;
        let device = loop {
            attempt += 1;
            info!(attempt, "Attempting acquisition start");

            match open_and_configure(found.clone(), weighting).await {
                Ok(device) => break device,
                Err(e) => {
                    error!(attempt, error = %e, "Acquisition start failed");

                    if shutdown.is_cancelled() || presence.borrow().is_none() {
                        return None;
                    }
                    tokio::time::sleep(RESTART_RETRY_DELAY).await;
                }
            }
        };

        let shared: SharedSensor = Arc::new(Mutex::new(device));
        *device_slot.write().await = Some(Arc::clone(&shared));

        let cancel = shutdown.child_token();
        let mut tasks = Vec::new();

        let sampler = AcousticSampler::new(
            Arc::clone(&shared),
            self.parameters.enabled_sequences(),
            Arc::clone(store),
            self.clock.clone(),
            DEVICE_TAU,
        );
        tasks.push(tokio::spawn(log_task("sampler", sampler.run(cancel.clone()))));

        if self.parameters.audio_enabled() {
            let recorder = AudioRecorder::new(
                self.clock.clone(),
                self.env.construct_dir(),
                self.env.audio_dir(),
                DEVICE_FS,
                Arc::clone(transcoder),
            );
            tasks.push(tokio::spawn(log_task("recorder", recorder.run(cancel.clone()))));

            tasks.push(tokio::spawn(run_stall_watchdog(
                self.env.audio_dir(),
                transcoder.staged_extension(),
                event_tx.clone(),
                cancel.clone(),
            )));
        }

        let mut scheduler = IntervalScheduler::new(self.clock.clone());
        register_aggregators(
            &mut scheduler,
            &self.parameters.enabled_sequences(),
            store,
        );
        tasks.push(tokio::spawn(scheduler.run(cancel.clone())));

        info!(path = ?found.0, "Acquisition pipeline started");

        Some(PipelineHandle { cancel, tasks })
    }

    async fn teardown(&self, pipeline: PipelineHandle, device_slot: &SharedSensorSlot) {
        pipeline.stop().await;
        *device_slot.write().await = None;
        info!("Acquisition pipeline stopped");
    }

    fn reload_parameters(&mut self) {
        match Parameters::load(std::path::Path::new(PARAMETERS_PATH)) {
            Ok(parameters) => self.parameters = parameters,
            Err(e) => {
                error!(error = %e, "Parameters reload failed, keeping previous set");
            }
        }
    }
}

/// Opens the meter and applies tau, weighting and sampling rate.
async fn open_and_configure(
    found: DevicePath,
    weighting: Weighting,
) -> AppResult<Box<dyn SensorDriver>> {
    spawn_blocking(move || {
        let (path, variant) = found;
        let mut device = variant.open(&path)?;

        device.write_tau(DEVICE_TAU as f32)?;

        let current = device.read_weighting()?;
        if current != weighting {
            info!(?weighting, "Setting device weighting");
            device.write_weighting(weighting)?;
        }

        if device.read_fs()? != DEVICE_FS {
            device.write_fs(DEVICE_FS)?;
        }

        info!(?weighting, tau = DEVICE_TAU, fs = DEVICE_FS, "Device configured");

        Ok(device)
    })
    .await
    .map_err(|e| crate::AppError::ChannelSendFailed {
        message: format!("device configuration worker: {e}"),
        location: error_location::ErrorLocation::from(std::panic::Location::caller()),
    })?
}

async fn log_task(name: &'static str, task: impl Future<Output = AppResult<()>>) {
    if let Err(e) = task.await {
        error!(task = name, error = %e, "Task ended with error");
    }
}
