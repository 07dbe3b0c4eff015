//! Minute-aligned WAV capture and staging.

mod transcode;
mod wav;

pub use {
    transcode::{Transcoder, WavStager, default_transcoder, stage_finalized},
    wav::{FinalizedWav, MinuteWavWriter, minute_file_name, parse_minute_file_name},
};

#[cfg(feature = "mp3")]
pub use transcode::Mp3Transcoder;
