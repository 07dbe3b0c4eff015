use std::fs;
#[cfg(feature = "mp3")]
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "mp3")]
use error_location::ErrorLocation;
use tracing::{debug, info};

#[cfg(feature = "mp3")]
use crate::CoreError;
use crate::CoreResult;

use super::wav::FinalizedWav;

/// Converts a finalized construct WAV into the staged upload format.
///
/// Implementations run on blocking worker threads; a failed transcode is
/// logged by the caller and never blocks the next rotation.
pub trait Transcoder: Send + Sync {
    /// File extension of the staged output, without the dot.
    fn staged_extension(&self) -> &'static str;

    /// Encodes `wav` into `staged`. The source file is left in place; the
    /// caller removes it after a successful transcode.
    fn transcode(&self, wav: &Path, staged: &Path) -> CoreResult<()>;
}

/// Stages the finalized WAV unchanged. Used when no encoder is compiled in.
pub struct WavStager;

impl Transcoder for WavStager {
    fn staged_extension(&self) -> &'static str {
        "wav"
    }

    fn transcode(&self, wav: &Path, staged: &Path) -> CoreResult<()> {
        fs::copy(wav, staged)?;
        Ok(())
    }
}

/// MP3 encoder backed by libmp3lame.
#[cfg(feature = "mp3")]
pub struct Mp3Transcoder {
    kilobitrate: i32,
}

#[cfg(feature = "mp3")]
impl Mp3Transcoder {
    /// Creates the encoder with the given constant bitrate in kbit/s.
    pub fn new(kilobitrate: i32) -> Self {
        Self { kilobitrate }
    }
}

#[cfg(feature = "mp3")]
impl Default for Mp3Transcoder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(feature = "mp3")]
impl Transcoder for Mp3Transcoder {
    fn staged_extension(&self) -> &'static str {
        "mp3"
    }

    #[track_caller]
    fn transcode(&self, wav: &Path, staged: &Path) -> CoreResult<()> {
        let transcode_err = |reason: String| CoreError::TranscodeFailed {
            path: wav.to_path_buf(),
            reason,
            location: ErrorLocation::from(Location::caller()),
        };

        let mut reader =
            hound::WavReader::open(wav).map_err(|e| transcode_err(format!("open wav: {e}")))?;
        let spec = reader.spec();

        let samples: Vec<i16> = reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| transcode_err(format!("read samples: {e}")))?;

        let mut encoder = lame::Lame::new()
            .ok_or_else(|| transcode_err("lame initialization failed".to_string()))?;
        encoder
            .set_sample_rate(spec.sample_rate)
            .map_err(|e| transcode_err(format!("set sample rate: {e:?}")))?;
        encoder
            .set_channels(u8::try_from(spec.channels).unwrap_or(1))
            .map_err(|e| transcode_err(format!("set channels: {e:?}")))?;
        encoder
            .set_kilobitrate(self.kilobitrate)
            .map_err(|e| transcode_err(format!("set bitrate: {e:?}")))?;
        encoder
            .init_params()
            .map_err(|e| transcode_err(format!("init params: {e:?}")))?;

        // Worst-case MP3 buffer size per the lame documentation.
        let mut mp3_buffer = vec![0u8; samples.len() * 5 / 4 + 7200];
        let written = encoder
            .encode(&samples, &samples, &mut mp3_buffer)
            .map_err(|e| transcode_err(format!("encode: {e:?}")))?;
        mp3_buffer.truncate(written);

        fs::write(staged, &mp3_buffer)?;

        Ok(())
    }
}

/// Transcoder selected by the compiled feature set.
pub fn default_transcoder() -> Arc<dyn Transcoder> {
    #[cfg(feature = "mp3")]
    {
        Arc::new(Mp3Transcoder::default())
    }
    #[cfg(not(feature = "mp3"))]
    {
        Arc::new(WavStager)
    }
}

/// Transcodes a finalized WAV into the audio staging directory and removes
/// the construct file. Returns the staged path.
pub fn stage_finalized(
    transcoder: &dyn Transcoder,
    finalized: &FinalizedWav,
    audio_dir: &Path,
) -> CoreResult<PathBuf> {
    fs::create_dir_all(audio_dir)?;

    let staged_name = match finalized.path.file_stem() {
        Some(stem) => format!(
            "{}.{}",
            stem.to_string_lossy(),
            transcoder.staged_extension()
        ),
        None => format!(
            "{}.{}",
            finalized.start.format("%Y-%m-%d %H-%M-00"),
            transcoder.staged_extension()
        ),
    };
    let staged = audio_dir.join(staged_name);

    transcoder.transcode(&finalized.path, &staged)?;
    fs::remove_file(&finalized.path)?;

    debug!(staged = ?staged, "Audio staged");
    info!(minute = %finalized.start, "Minute file staged for upload");

    Ok(staged)
}
