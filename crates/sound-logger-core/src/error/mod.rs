use error_location::ErrorLocation;
use thiserror::Error;

/// Acquisition and acoustic-processing errors with source location tracking.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No audio input device matched the detection keywords.
    #[error("No matching audio input found for {keywords:?} {location}")]
    NoAudioInputFound {
        /// Keywords the device name was matched against.
        keywords: Vec<String>,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Audio device operation failed.
    #[error("Audio device error: {reason} {location}")]
    AudioDeviceError {
        /// Description of the device error.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A sensor read did not produce a usable sample.
    #[error("Sample failed: {reason} {location}")]
    SampleFailed {
        /// Description of the failed exchange.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The sensor rejected a configuration write (tau, fs or weighting).
    #[error("Sensor configuration failed: {reason} {location}")]
    SensorConfigFailed {
        /// Description of the rejected write.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// WAV file creation or write failed.
    #[error("WAV write error: {reason} {location}")]
    WavWriteError {
        /// Description of the write failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Transcoding a finalized WAV into the staged format failed.
    #[error("Transcode failed for {path:?}: {reason} {location}")]
    TranscodeFailed {
        /// The WAV file that could not be transcoded.
        path: std::path::PathBuf,
        /// Description of the encoder failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A computed level was NaN or infinite and must not be stored.
    #[error("Non-finite level {value} rejected {location}")]
    NonFiniteLevel {
        /// The rejected value.
        value: f64,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// IO error from filesystem or serial operations.
    #[error("IO error: {source} {location}")]
    IoError {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

impl From<std::io::Error> for CoreError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        CoreError::IoError {
            source,
            location: ErrorLocation::from(std::panic::Location::caller()),
        }
    }
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
