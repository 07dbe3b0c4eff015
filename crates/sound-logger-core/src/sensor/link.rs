use std::io::{Read, Write};
use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use error_location::ErrorLocation;
use serialport::SerialPort;
use tracing::{debug, trace};

use crate::{CoreError, CoreResult};

const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Framed request/response exchange with the meter.
///
/// A request is `[opcode, payload_len, payload...]`; the meter answers with
/// a fixed-size response per opcode. Values are little-endian.
pub(crate) struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    #[track_caller]
    pub(crate) fn open(path: &Path, baud_rate: u32) -> CoreResult<Self> {
        let port = serialport::new(path.to_string_lossy(), baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| CoreError::SampleFailed {
                reason: format!("open {path:?}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        debug!(path = ?path, baud_rate, "Serial link opened");

        Ok(Self { port })
    }

    #[track_caller]
    pub(crate) fn request(
        &mut self,
        opcode: u8,
        payload: &[u8],
        response_len: usize,
    ) -> CoreResult<Vec<u8>> {
        let mut frame = Vec::with_capacity(2 + payload.len());
        frame.push(opcode);
        frame.push(payload.len() as u8);
        frame.extend_from_slice(payload);

        self.port
            .write_all(&frame)
            .and_then(|()| self.port.flush())
            .map_err(|e| CoreError::SampleFailed {
                reason: format!("write opcode {opcode:#04x}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let mut response = vec![0u8; response_len];
        self.port
            .read_exact(&mut response)
            .map_err(|e| CoreError::SampleFailed {
                reason: format!("read opcode {opcode:#04x}: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        trace!(opcode, response_len, "Exchange complete");

        Ok(response)
    }

    pub(crate) fn read_f32(&mut self, opcode: u8) -> CoreResult<f32> {
        let bytes = self.request(opcode, &[], 4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u32(&mut self, opcode: u8) -> CoreResult<u32> {
        let bytes = self.request(opcode, &[], 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_u8(&mut self, opcode: u8) -> CoreResult<u8> {
        let bytes = self.request(opcode, &[], 1)?;
        Ok(bytes[0])
    }

    /// Reads a fixed 32-byte NUL-padded string register.
    pub(crate) fn read_string(&mut self, opcode: u8) -> CoreResult<String> {
        let bytes = self.request(opcode, &[], 32)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).trim().to_string())
    }

    /// Writes a register and checks the single-byte acknowledgement.
    #[track_caller]
    pub(crate) fn write_register(&mut self, opcode: u8, payload: &[u8]) -> CoreResult<()> {
        let ack = self.request(opcode, payload, 1)?;
        if ack[0] != 0 {
            return Err(CoreError::SensorConfigFailed {
                reason: format!("opcode {opcode:#04x} rejected with status {}", ack[0]),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        Ok(())
    }
}
