//! Sound-logger Core Library
//!
//! Building blocks for a field acoustic data logger: a wall-clock timestamp
//! provider, serial sound-level-meter drivers, acoustic level mathematics
//! (LAeq, statistical percentiles, Lden and ISO 1996-2 Annex G uncertainty)
//! and minute-aligned WAV capture with staging.
//!
//! # Example
//!
//! ```no_run
//! use sound_logger_core::{TimestampProvider, laeq};
//!
//! let clock = TimestampProvider::new();
//! let levels = vec![60.0, 80.0];
//!
//! if let Some(value) = laeq(&levels) {
//!     println!("{} LAeq={value:.2} dB", clock.now());
//! }
//! ```

mod audio;
mod clock;
mod error;
mod levels;
mod sensor;

pub use {
    audio::{
        FinalizedWav, MinuteWavWriter, Transcoder, WavStager, default_transcoder,
        minute_file_name, parse_minute_file_name, stage_finalized,
    },
    clock::{TimestampProvider, truncate_to_minute, truncate_to_second},
    error::{CoreError, Result as CoreResult},
    levels::{
        GroupUncertainty, IntervalUncertainty, PercentileSet, group_uncertainty,
        interval_uncertainty, is_valid_level, laeq, lden, lden_uncertainty, percentile,
        percentile_set, round2,
    },
    sensor::{SensorDriver, SensorInfo, SensorVariant, Weighting},
};

#[cfg(feature = "mp3")]
pub use audio::Mp3Transcoder;

#[cfg(test)]
mod tests;
