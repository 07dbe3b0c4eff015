//! Minute-aligned audio capture.
//!
//! A cpal input stream fills a shared sample queue from its callback; the
//! recorder task drains one second of samples at a time into the minute
//! writer. Rotation is checked before every chunk and a watchdog forces a
//! rotation when the open file is more than 63 seconds old, defending
//! against IO stalls and clock jumps. Transcoding runs on blocking workers
//! and never delays the next minute's file.

use crate::{AppError, AppResult};

use std::collections::VecDeque;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use error_location::ErrorLocation;
use sound_logger_core::{
    CoreError, FinalizedWav, MinuteWavWriter, TimestampProvider, Transcoder, stage_finalized,
    truncate_to_minute,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Keywords the input device name must contain, case-insensitive.
const DEVICE_KEYWORDS: [&str; 2] = ["nsrt", "mk"];
const DEVICE_RETRIES: usize = 10;
const DEVICE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Force-rotate when the open file is this many seconds older than the
/// clock.
const STALL_ROTATE_AFTER_SECS: i64 = 63;
const READ_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Minute-aligned audio capture task.
pub(crate) struct AudioRecorder {
    clock: TimestampProvider,
    construct_dir: PathBuf,
    audio_dir: PathBuf,
    sample_rate: u32,
    transcoder: Arc<dyn Transcoder>,
}

impl AudioRecorder {
    pub(crate) fn new(
        clock: TimestampProvider,
        construct_dir: PathBuf,
        audio_dir: PathBuf,
        sample_rate: u32,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            clock,
            construct_dir,
            audio_dir,
            sample_rate,
            transcoder,
        }
    }

    /// Runs the capture loop until cancelled, finalizing the open WAV on
    /// the way out.
    pub(crate) async fn run(self, cancel: CancellationToken) -> AppResult<()> {
        info!(sample_rate = self.sample_rate, "Audio recorder starting");

        let samples: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let capture = CaptureThread::spawn(
            Arc::clone(&samples),
            Arc::clone(&shutdown),
            self.sample_rate,
        )
        .await?;

        let mut writer = MinuteWavWriter::new(&self.construct_dir, self.sample_rate)?;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(Duration::from_secs(1)) => {}
            }

            if let Err(e) = self.pump_chunk(&mut writer, &samples) {
                error!(error = %e, "Audio read error");
                tokio::time::sleep(READ_ERROR_PAUSE).await;
            }
        }

        shutdown.store(true, Ordering::Release);
        let _ = tokio::task::spawn_blocking(move || capture.join()).await;

        // Flush whatever minute was in progress.
        match writer.close() {
            Ok(Some(finalized)) => self.spawn_stage(finalized),
            Ok(None) => {}
            Err(e) => error!(error = %e, "Failed to finalize last WAV"),
        }

        info!("Audio recorder stopped");
        Ok(())
    }

    /// One cycle: rotation checks, then drain the queued audio.
    fn pump_chunk(
        &self,
        writer: &mut MinuteWavWriter,
        samples: &Mutex<VecDeque<i16>>,
    ) -> AppResult<()> {
        let now = self.clock.now();
        let aligned = truncate_to_minute(now);

        // Watchdog: a file older than start + 63s means rotation stalled.
        if let Some(start) = writer.current_start() {
            if now.naive_local() >= start + ChronoDuration::seconds(STALL_ROTATE_AFTER_SECS) {
                warn!(%start, "Over 63s since last rotation, forcing rotate");
                if let Some(finalized) = writer.force_rotate(aligned)? {
                    self.spawn_stage(finalized);
                }
            }
        }

        if let Some(finalized) = writer.update_timestamp(aligned)? {
            self.spawn_stage(finalized);
        }

        let chunk: Vec<i16> = {
            let mut queue = samples.lock().unwrap_or_else(|e| e.into_inner());
            queue.drain(..).collect()
        };

        if !chunk.is_empty() {
            writer.write_chunk(&chunk, aligned)?;
        }

        Ok(())
    }

    /// Transcodes and stages a finalized WAV on a blocking worker.
    fn spawn_stage(&self, finalized: FinalizedWav) {
        let transcoder = Arc::clone(&self.transcoder);
        let audio_dir = self.audio_dir.clone();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = stage_finalized(transcoder.as_ref(), &finalized, &audio_dir) {
                // The WAV stays behind in the construct directory.
                error!(path = ?finalized.path, error = %e, "Transcode failed");
            }
        });
    }
}

/// Dedicated thread owning the cpal stream; cpal streams are not `Send`.
struct CaptureThread {
    handle: std::thread::JoinHandle<()>,
}

impl CaptureThread {
    async fn spawn(
        samples: Arc<Mutex<VecDeque<i16>>>,
        shutdown: Arc<AtomicBool>,
        sample_rate: u32,
    ) -> AppResult<Self> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<AppResult<()>>();

        let handle = std::thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || capture_loop(samples, shutdown, sample_rate, ready_tx))?;

        let startup = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| AppError::ChannelSendFailed {
                message: format!("capture startup join: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        match startup {
            Ok(result) => result?,
            Err(e) => {
                return Err(AppError::ChannelSendFailed {
                    message: format!("capture startup channel closed: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        Ok(Self { handle })
    }

    fn join(self) {
        if self.handle.join().is_err() {
            error!("Audio capture thread panicked");
        }
    }
}

fn capture_loop(
    samples: Arc<Mutex<VecDeque<i16>>>,
    shutdown: Arc<AtomicBool>,
    sample_rate: u32,
    ready_tx: std::sync::mpsc::Sender<AppResult<()>>,
) {
    let stream = match build_stream(samples, Arc::clone(&shutdown), sample_rate) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
}

fn build_stream(
    samples: Arc<Mutex<VecDeque<i16>>>,
    shutdown: Arc<AtomicBool>,
    sample_rate: u32,
) -> AppResult<cpal::Stream> {
    let device = find_input_device()?;

    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if shutdown.load(Ordering::Acquire) {
                    return;
                }
                let mut queue = samples.lock().unwrap_or_else(|e| e.into_inner());
                queue.extend(data.iter().copied());
            },
            |err| {
                error!(error = %err, "Audio stream error");
            },
            None,
        )
        .map_err(|e| {
            AppError::from(CoreError::AudioDeviceError {
                reason: format!("build stream: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })
        })?;

    stream.play().map_err(|e| {
        AppError::from(CoreError::AudioDeviceError {
            reason: format!("start stream: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    })?;

    info!("Audio capture started");

    Ok(stream)
}

/// Scans the input devices for the meter's USB audio interface, retrying
/// while the device enumerates.
fn find_input_device() -> AppResult<cpal::Device> {
    let host = cpal::default_host();

    for attempt in 0..DEVICE_RETRIES {
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                let Ok(name) = device.name() else { continue };
                let lowered = name.to_lowercase();
                if DEVICE_KEYWORDS.iter().all(|kw| lowered.contains(kw)) {
                    info!(name, "Matched audio input device");
                    return Ok(device);
                }
            }
        }

        warn!(
            attempt = attempt + 1,
            retries = DEVICE_RETRIES,
            "No matching USB input device found"
        );
        std::thread::sleep(DEVICE_RETRY_DELAY);
    }

    Err(AppError::from(CoreError::NoAudioInputFound {
        keywords: DEVICE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        location: ErrorLocation::from(Location::caller()),
    }))
}
