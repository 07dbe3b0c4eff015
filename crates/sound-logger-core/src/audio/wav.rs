use std::fs::{self, File};
use std::io::BufWriter;
use std::panic::Location;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use error_location::ErrorLocation;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info};

use crate::{CoreError, CoreResult};

const MINUTE_FORMAT: &str = "%Y-%m-%d %H-%M-00";
const PARSE_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

/// WAV file name for the minute starting at `start`.
pub fn minute_file_name(start: NaiveDateTime) -> String {
    format!("{}.wav", start.format(MINUTE_FORMAT))
}

/// Parses the minute timestamp out of a capture file name, any extension.
pub fn parse_minute_file_name(name: &str) -> Option<NaiveDateTime> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    NaiveDateTime::parse_from_str(stem, PARSE_FORMAT).ok()
}

/// A closed, complete WAV awaiting transcode and staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedWav {
    /// Path of the WAV in the construct directory.
    pub path: PathBuf,
    /// Minute the file covers, `[start, start + 60s)`.
    pub start: NaiveDateTime,
}

/// Writes mono 16-bit PCM into minute-named WAV files.
///
/// Exactly one file is open at a time. Rotation closes the current file and
/// returns it as a [`FinalizedWav`] for the caller to transcode and stage;
/// the writer itself never blocks on encoding.
pub struct MinuteWavWriter {
    spec: WavSpec,
    construct_dir: PathBuf,
    writer: Option<WavWriter<BufWriter<File>>>,
    current_path: Option<PathBuf>,
    current_start: Option<NaiveDateTime>,
}

impl MinuteWavWriter {
    /// Creates the writer and its construct directory.
    pub fn new(construct_dir: &Path, sample_rate: u32) -> CoreResult<Self> {
        fs::create_dir_all(construct_dir)?;

        Ok(Self {
            spec: WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            construct_dir: construct_dir.to_path_buf(),
            writer: None,
            current_path: None,
            current_start: None,
        })
    }

    /// Start of the minute the open file covers, if a file is open.
    pub fn current_start(&self) -> Option<NaiveDateTime> {
        self.current_start
    }

    /// Rotates when `aligned` has moved past the open file's minute.
    ///
    /// Returns the finalized previous file when a rotation happened.
    pub fn update_timestamp(&mut self, aligned: NaiveDateTime) -> CoreResult<Option<FinalizedWav>> {
        match self.current_start {
            Some(start) if aligned <= start => Ok(None),
            _ => self.rotate_to(aligned),
        }
    }

    /// Closes whatever is open and starts a file for `minute` immediately,
    /// regardless of the normal rotation rule.
    pub fn force_rotate(&mut self, minute: NaiveDateTime) -> CoreResult<Option<FinalizedWav>> {
        self.rotate_to(minute)
    }

    /// Appends one chunk of samples to the open file, opening a file for
    /// `minute` when none is open yet.
    #[track_caller]
    pub fn write_chunk(&mut self, samples: &[i16], minute: NaiveDateTime) -> CoreResult<()> {
        if self.writer.is_none() {
            self.open_new(minute)?;
        }

        if let Some(writer) = self.writer.as_mut() {
            let mut writer = writer.get_i16_writer(samples.len() as u32);
            for &sample in samples {
                writer.write_sample(sample);
            }
            writer.flush().map_err(|e| CoreError::WavWriteError {
                reason: format!("flush chunk: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;
        }

        Ok(())
    }

    /// Finalizes and returns the open file without opening a new one.
    #[track_caller]
    pub fn close(&mut self) -> CoreResult<Option<FinalizedWav>> {
        let Some(writer) = self.writer.take() else {
            return Ok(None);
        };

        writer.finalize().map_err(|e| CoreError::WavWriteError {
            reason: format!("finalize: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let finalized = match (self.current_path.take(), self.current_start.take()) {
            (Some(path), Some(start)) => {
                debug!(path = ?path, "WAV finalized");
                Some(FinalizedWav { path, start })
            }
            _ => None,
        };

        Ok(finalized)
    }

    fn rotate_to(&mut self, minute: NaiveDateTime) -> CoreResult<Option<FinalizedWav>> {
        let finalized = self.close()?;
        self.open_new(minute)?;
        Ok(finalized)
    }

    #[track_caller]
    fn open_new(&mut self, minute: NaiveDateTime) -> CoreResult<()> {
        let path = self.construct_dir.join(minute_file_name(minute));

        let writer = WavWriter::create(&path, self.spec).map_err(|e| CoreError::WavWriteError {
            reason: format!("create {path:?}: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!(path = ?path, "WAV opened");

        self.writer = Some(writer);
        self.current_path = Some(path);
        self.current_start = Some(minute);

        Ok(())
    }
}
