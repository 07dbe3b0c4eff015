//! Serial sound-level-meter drivers.
//!
//! The meters expose a small register protocol over USB CDC serial. Two
//! hardware revisions are supported; both implement [`SensorDriver`] and are
//! selected by the identifying keywords of their `/dev/serial/by-id` entry.
//! All calls block on the serial link and must be isolated on a worker
//! thread by the caller.

mod link;
mod mk3;
mod mk4;

use std::panic::Location;
use std::path::Path;

use error_location::ErrorLocation;

use crate::{CoreError, CoreResult};

pub(crate) use link::SerialLink;
pub use mk3::NsrtMk3;
pub use mk4::NsrtMk4;

/// Frequency-weighting curve applied by the meter hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    /// A-weighting (environmental default).
    A,
    /// C-weighting.
    C,
    /// Z (flat) weighting.
    Z,
}

impl Weighting {
    /// Register value used by both hardware revisions.
    pub(crate) fn register_value(self) -> u8 {
        match self {
            Weighting::A => 0,
            Weighting::C => 1,
            Weighting::Z => 2,
        }
    }

    pub(crate) fn from_register_value(value: u8) -> CoreResult<Self> {
        match value {
            0 => Ok(Weighting::A),
            1 => Ok(Weighting::C),
            2 => Ok(Weighting::Z),
            other => Err(CoreError::SampleFailed {
                reason: format!("unknown weighting register value {other}"),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }

    /// Single-letter name, as used in parameter names (`LAeq`, `LCeq`, ...).
    pub fn letter(self) -> char {
        match self {
            Weighting::A => 'A',
            Weighting::C => 'C',
            Weighting::Z => 'Z',
        }
    }
}

/// Static metadata read from the meter at startup.
#[derive(Debug, Clone, Default)]
pub struct SensorInfo {
    /// Model designation.
    pub model: String,
    /// Firmware revision string.
    pub firmware: String,
    /// Manufacturing date as reported by the meter.
    pub manufacture_date: String,
    /// Last calibration date as reported by the meter.
    pub calibration_date: String,
}

/// Capability set of a connected sound-level meter.
///
/// Calls may block on serial IO; errors surface as a single
/// [`CoreError::SampleFailed`] kind and repeated failures must not halt the
/// acquisition pipeline.
pub trait SensorDriver: Send {
    /// Instantaneous fast-weighted level, in dB.
    fn read_instant_level(&mut self) -> CoreResult<f32>;

    /// Integrated energy sample over the configured tau, in dB.
    fn read_energy_sample(&mut self) -> CoreResult<f32>;

    /// Internal temperature, in degrees Celsius.
    fn read_temperature(&mut self) -> CoreResult<f32>;

    /// Model designation.
    fn read_model(&mut self) -> CoreResult<String>;

    /// Firmware revision.
    fn read_firmware(&mut self) -> CoreResult<String>;

    /// Manufacturing date.
    fn read_manufacture_date(&mut self) -> CoreResult<String>;

    /// Last calibration date.
    fn read_calibration_date(&mut self) -> CoreResult<String>;

    /// Audio sampling rate in Hz.
    fn read_fs(&mut self) -> CoreResult<u32>;

    /// Sets the audio sampling rate in Hz.
    fn write_fs(&mut self, hz: u32) -> CoreResult<()>;

    /// Sets the integration time constant in seconds (0.125 for "fast").
    fn write_tau(&mut self, seconds: f32) -> CoreResult<()>;

    /// Currently active weighting curve.
    fn read_weighting(&mut self) -> CoreResult<Weighting>;

    /// Sets the weighting curve.
    fn write_weighting(&mut self, weighting: Weighting) -> CoreResult<()>;

    /// Reads the full static metadata block.
    fn read_info(&mut self) -> CoreResult<SensorInfo> {
        Ok(SensorInfo {
            model: self.read_model()?,
            firmware: self.read_firmware()?,
            manufacture_date: self.read_manufacture_date()?,
            calibration_date: self.read_calibration_date()?,
        })
    }
}

/// Hardware revisions, distinguished by their `/dev/serial/by-id` keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorVariant {
    /// Third hardware revision.
    Mk3,
    /// Fourth hardware revision.
    Mk4,
}

impl SensorVariant {
    /// Keywords a by-id entry must all contain to identify this revision.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            SensorVariant::Mk3 => &["Convergence_Instruments", "NSRT", "mk3"],
            SensorVariant::Mk4 => &["Convergence_Instruments", "NSRT", "mk4"],
        }
    }

    /// Identifies the revision a by-id entry belongs to, mk4 keywords being
    /// the more specific match.
    pub fn matching(entry: &str) -> Option<Self> {
        for variant in [SensorVariant::Mk4, SensorVariant::Mk3] {
            if variant.keywords().iter().all(|kw| entry.contains(kw)) {
                return Some(variant);
            }
        }
        None
    }

    /// Opens the driver for this revision on the given serial path.
    pub fn open(self, path: &Path) -> CoreResult<Box<dyn SensorDriver>> {
        match self {
            SensorVariant::Mk3 => Ok(Box::new(NsrtMk3::open(path)?)),
            SensorVariant::Mk4 => Ok(Box::new(NsrtMk4::open(path)?)),
        }
    }
}
