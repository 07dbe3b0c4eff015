//! Deadline-scheduled per-second acoustic sampling.
//!
//! The sampler aligns to the next wall-clock second and, for each second,
//! takes `1/tau` instantaneous and energy readings at their target instants.
//! Exactly one row per enabled parameter lands in its base table with the
//! second's timestamp. The loop advances deterministically, one second per
//! cycle, and never drifts with IO jitter.

use crate::{AppResult, store::LocalStore};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use sound_logger_core::{SensorDriver, TimestampProvider, is_valid_level, laeq, round2,
    truncate_to_second};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Sensor handle shared between the sampler and the status reporter.
///
/// The mutex is only ever locked from blocking worker threads; serial
/// exchanges must not run on the event loop.
pub(crate) type SharedSensor = Arc<Mutex<Box<dyn SensorDriver>>>;

/// Per-second acoustic sampling task.
pub(crate) struct AcousticSampler {
    device: SharedSensor,
    parameters: Vec<String>,
    store: Arc<LocalStore>,
    clock: TimestampProvider,
    sample_interval: f64,
}

impl AcousticSampler {
    pub(crate) fn new(
        device: SharedSensor,
        parameters: Vec<String>,
        store: Arc<LocalStore>,
        clock: TimestampProvider,
        sample_interval: f64,
    ) -> Self {
        Self {
            device,
            parameters,
            store,
            clock,
            sample_interval,
        }
    }

    /// Runs the sampling loop until cancelled. Cancellation is observed at
    /// the sleep points; an in-progress sensor read completes first.
    pub(crate) async fn run(self, cancel: CancellationToken) -> AppResult<()> {
        info!(parameters = ?self.parameters, "Acoustic sampler starting");

        for parameter in &self.parameters {
            self.store.ensure_database(parameter).await?;
            self.store
                .ensure_measurement_table(parameter, parameter)
                .await?;
        }

        let samples_per_second = (1.0 / self.sample_interval).round() as usize;

        info!(start = %self.clock.start_timestamp(), "Aligned start timestamp");

        // Align to the next whole second before the first cycle.
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            () = tokio::time::sleep(self.clock.sleep_to_next_second()) => {}
        }
        info!("Sampler aligned to next second");

        let mut second = truncate_to_second(self.clock.now());

        while !cancel.is_cancelled() {
            let (laf_values, leq_values) = self
                .collect_second(second, samples_per_second, &cancel)
                .await;

            if cancel.is_cancelled() {
                break;
            }

            if laf_values.len() < samples_per_second {
                warn!(%second, collected = laf_values.len(), "Incomplete sample set, skipping");
                second += ChronoDuration::seconds(1);
                continue;
            }

            self.emit_rows(second, &laf_values, &leq_values).await;

            second += ChronoDuration::seconds(1);
        }

        info!("Acoustic sampler stopped");
        Ok(())
    }

    /// Takes the intra-second readings at their target instants.
    async fn collect_second(
        &self,
        second: NaiveDateTime,
        samples_per_second: usize,
        cancel: &CancellationToken,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut laf_values = Vec::with_capacity(samples_per_second);
        let mut leq_values = Vec::with_capacity(samples_per_second);

        for k in 0..samples_per_second {
            let device = Arc::clone(&self.device);
            let reads = spawn_blocking(move || {
                let mut device = device.lock().unwrap_or_else(|e| e.into_inner());
                let laf = device.read_instant_level()?;
                let leq = device.read_energy_sample()?;
                Ok::<_, sound_logger_core::CoreError>((laf, leq))
            })
            .await;

            match reads {
                Ok(Ok((laf, leq))) => {
                    laf_values.push(f64::from(laf));
                    leq_values.push(f64::from(leq));
                }
                Ok(Err(e)) => error!(error = %e, "Sample error"),
                Err(e) => error!(error = %e, "Sample worker panicked"),
            }

            // Sync the sampling cadence to the wall clock.
            let target = second + ChronoDuration::milliseconds(
                ((k + 1) as f64 * self.sample_interval * 1_000.0) as i64,
            );
            let delay = (target - self.clock.now().naive_local())
                .to_std()
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        (laf_values, leq_values)
    }

    /// Computes and stores one row per enabled parameter.
    async fn emit_rows(&self, second: NaiveDateTime, laf_values: &[f64], leq_values: &[f64]) {
        for parameter in &self.parameters {
            let Some(value) = compute_parameter(parameter, laf_values, leq_values) else {
                continue;
            };

            if !is_valid_level(value) {
                warn!(parameter, value, "Validation skip");
                continue;
            }

            if let Err(e) = self
                .store
                .insert_measurement(parameter, parameter, second, round2(value))
                .await
            {
                error!(parameter, error = %e, "Row insert failed");
            }
        }
    }
}

/// Maps a parameter name onto its per-second value.
///
/// `*eq` parameters take the energy average of the tau samples, `*F` the
/// first instantaneous reading, `*Fmin`/`*Fmax` the window extremes.
pub(crate) fn compute_parameter(
    parameter: &str,
    laf_values: &[f64],
    leq_values: &[f64],
) -> Option<f64> {
    if parameter.ends_with("eq") {
        laeq(leq_values)
    } else if parameter.ends_with("Fmin") {
        laf_values.iter().copied().reduce(f64::min)
    } else if parameter.ends_with("Fmax") {
        laf_values.iter().copied().reduce(f64::max)
    } else if parameter.ends_with('F') {
        laf_values.first().copied()
    } else {
        None
    }
}
