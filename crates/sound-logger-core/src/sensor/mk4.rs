use std::path::Path;

use tracing::info;

use crate::{CoreResult, Weighting};

use super::{SensorDriver, SerialLink};

const BAUD_RATE: u32 = 230_400;

// mk4 register map. Measurement registers moved to a separate page; the
// metadata block kept the mk3 layout.
const OP_READ_LEVEL: u8 = 0x21;
const OP_READ_LEQ: u8 = 0x22;
const OP_READ_TEMPERATURE: u8 = 0x23;
const OP_READ_WEIGHTING: u8 = 0x24;
const OP_WRITE_WEIGHTING: u8 = 0x25;
const OP_READ_FS: u8 = 0x26;
const OP_WRITE_FS: u8 = 0x27;
const OP_WRITE_TAU: u8 = 0x28;
const OP_READ_MODEL: u8 = 0x10;
const OP_READ_FIRMWARE: u8 = 0x11;
const OP_READ_DOB: u8 = 0x12;
const OP_READ_DOC: u8 = 0x13;

/// Driver for the fourth hardware revision.
pub struct NsrtMk4 {
    link: SerialLink,
}

impl NsrtMk4 {
    /// Opens the meter on its resolved serial path.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let link = SerialLink::open(path, BAUD_RATE)?;
        info!(path = ?path, "mk4 meter opened");
        Ok(Self { link })
    }
}

impl SensorDriver for NsrtMk4 {
    fn read_instant_level(&mut self) -> CoreResult<f32> {
        self.link.read_f32(OP_READ_LEVEL)
    }

    fn read_energy_sample(&mut self) -> CoreResult<f32> {
        self.link.read_f32(OP_READ_LEQ)
    }

    fn read_temperature(&mut self) -> CoreResult<f32> {
        self.link.read_f32(OP_READ_TEMPERATURE)
    }

    fn read_model(&mut self) -> CoreResult<String> {
        self.link.read_string(OP_READ_MODEL)
    }

    fn read_firmware(&mut self) -> CoreResult<String> {
        self.link.read_string(OP_READ_FIRMWARE)
    }

    fn read_manufacture_date(&mut self) -> CoreResult<String> {
        self.link.read_string(OP_READ_DOB)
    }

    fn read_calibration_date(&mut self) -> CoreResult<String> {
        self.link.read_string(OP_READ_DOC)
    }

    fn read_fs(&mut self) -> CoreResult<u32> {
        self.link.read_u32(OP_READ_FS)
    }

    fn write_fs(&mut self, hz: u32) -> CoreResult<()> {
        self.link.write_register(OP_WRITE_FS, &hz.to_le_bytes())
    }

    fn write_tau(&mut self, seconds: f32) -> CoreResult<()> {
        self.link.write_register(OP_WRITE_TAU, &seconds.to_le_bytes())
    }

    fn read_weighting(&mut self) -> CoreResult<Weighting> {
        Weighting::from_register_value(self.link.read_u8(OP_READ_WEIGHTING)?)
    }

    fn write_weighting(&mut self, weighting: Weighting) -> CoreResult<()> {
        self.link
            .write_register(OP_WRITE_WEIGHTING, &[weighting.register_value()])
    }
}
