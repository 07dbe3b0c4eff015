//! Device lifecycle supervision.
//!
//! Three independent watchers feed one event channel: the presence loop
//! resolving the meter's serial path, the audio stall watchdog over staged
//! file timestamps, and the twice-daily scheduled resets. The application
//! consumes the events serially, so recovery never runs re-entrantly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use sound_logger_core::{SensorVariant, TimestampProvider, parse_minute_file_name};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PRESENCE_SCAN_INTERVAL: Duration = Duration::from_secs(2);
const PRESENCE_MONITOR_INTERVAL: Duration = Duration::from_secs(1);
const STALL_SCAN_INTERVAL: Duration = Duration::from_secs(5);
const STALL_WINDOW_MINUTES: u64 = 3;
/// Daily safety resets against slow-rot sensor failure modes.
const RESET_TIMES: [(u32, u32, u32); 2] = [(2, 0, 3), (13, 0, 3)];

#[cfg(target_os = "windows")]
const WINDOWS_SERIAL_PORT: &str = "COM6";
#[cfg(not(target_os = "windows"))]
const SERIAL_BY_ID_DIR: &str = "/dev/serial/by-id";

/// Recovery triggers consumed by the application loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SupervisorEvent {
    /// The serial device disappeared.
    DeviceLost,
    /// No new staged audio for the stall window.
    AudioStalled,
    /// One of the scheduled daily resets fired.
    ScheduledReset,
    /// The remote rewrote the parameters file.
    ParametersUpdated,
}

/// Resolved sensor path with its hardware revision.
pub(crate) type DevicePath = (PathBuf, SensorVariant);

/// Resolves the target serial device, if present.
///
/// On Windows this is a fixed development port; elsewhere the by-id
/// directory is scanned for an entry matching a revision's keywords and
/// its symlink is resolved.
pub(crate) fn resolve_serial_port() -> Option<DevicePath> {
    #[cfg(target_os = "windows")]
    {
        Some((PathBuf::from(WINDOWS_SERIAL_PORT), SensorVariant::Mk3))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let entries = std::fs::read_dir(SERIAL_BY_ID_DIR).ok()?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(variant) = SensorVariant::matching(name) else {
                continue;
            };

            if let Ok(resolved) = std::fs::canonicalize(entry.path()) {
                return Some((resolved, variant));
            }
        }

        None
    }
}

/// Presence loop: publishes the resolved path on the watch channel and
/// emits [`SupervisorEvent::DeviceLost`] on disconnection.
pub(crate) async fn run_presence(
    presence_tx: watch::Sender<Option<DevicePath>>,
    events: mpsc::Sender<SupervisorEvent>,
    cancel: CancellationToken,
) {
    loop {
        // Wait for the device to appear.
        let found = loop {
            if let Some(found) = resolve_serial_port() {
                break found;
            }

            let _ = presence_tx.send(None);
            info!("Waiting for target serial device");

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(PRESENCE_SCAN_INTERVAL) => {}
            }
        };

        info!(path = ?found.0, variant = ?found.1, "Target serial device found");
        let _ = presence_tx.send(Some(found.clone()));

        // Monitor for disconnection.
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(PRESENCE_MONITOR_INTERVAL) => {}
            }

            if resolve_serial_port().map(|(p, _)| p) != Some(found.0.clone()) {
                break;
            }
        }

        warn!("Serial device disconnected");
        let _ = presence_tx.send(None);
        if events.send(SupervisorEvent::DeviceLost).await.is_err() {
            return;
        }
    }
}

/// Newest staged-file minute in the audio directory.
pub(crate) fn latest_staged_minute(audio_dir: &Path, extension: &str) -> Option<NaiveDateTime> {
    let entries = std::fs::read_dir(audio_dir).ok()?;

    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if !path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
            {
                return None;
            }
            path.file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_minute_file_name)
        })
        .max()
}

/// Stall watchdog: emits [`SupervisorEvent::AudioStalled`] when no new
/// staged-file timestamp appears within the stall window.
pub(crate) async fn run_stall_watchdog(
    audio_dir: PathBuf,
    extension: &'static str,
    events: mpsc::Sender<SupervisorEvent>,
    cancel: CancellationToken,
) {
    let max_stall_scans =
        (60 / STALL_SCAN_INTERVAL.as_secs()).max(1) * STALL_WINDOW_MINUTES;

    let mut last_seen: Option<NaiveDateTime> = None;
    let mut stall_scans: u64 = 0;

    info!(audio_dir = ?audio_dir, "Audio stall watchdog started");

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(STALL_SCAN_INTERVAL) => {}
        }

        let latest =
            tokio::task::spawn_blocking({
                let audio_dir = audio_dir.clone();
                move || latest_staged_minute(&audio_dir, extension)
            })
            .await
            .ok()
            .flatten();

        match latest {
            Some(latest) if last_seen.is_none_or(|seen| latest > seen) => {
                last_seen = Some(latest);
                stall_scans = 0;
            }
            _ => stall_scans += 1,
        }

        if stall_scans >= max_stall_scans {
            warn!(stall_scans, "No audio updates, triggering restart");
            stall_scans = 0;
            if events.send(SupervisorEvent::AudioStalled).await.is_err() {
                break;
            }
        }
    }

    info!("Audio stall watchdog stopped");
}

/// Delay until the next scheduled reset after `now`.
pub(crate) fn next_reset_delay(now: NaiveDateTime) -> Duration {
    let mut best: Option<ChronoDuration> = None;

    for &(hour, minute, second) in &RESET_TIMES {
        let Some(time) = NaiveTime::from_hms_opt(hour, minute, second) else {
            continue;
        };
        let mut at = now.date().and_time(time);
        if at <= now {
            at += ChronoDuration::days(1);
        }
        let until = at - now;
        if best.is_none_or(|b| until < b) {
            best = Some(until);
        }
    }

    best.and_then(|d| d.to_std().ok())
        .unwrap_or(Duration::from_secs(24 * 60 * 60))
}

/// Scheduled resets: emits [`SupervisorEvent::ScheduledReset`] at the
/// configured local times, regardless of pipeline health.
pub(crate) async fn run_scheduled_resets(
    clock: TimestampProvider,
    events: mpsc::Sender<SupervisorEvent>,
    cancel: CancellationToken,
) {
    loop {
        let now = clock.now().naive_local();
        let delay = next_reset_delay(now);
        info!(?delay, "Next scheduled reset armed");

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        info!("Executing scheduled reset");
        if events.send(SupervisorEvent::ScheduledReset).await.is_err() {
            break;
        }
    }
}
