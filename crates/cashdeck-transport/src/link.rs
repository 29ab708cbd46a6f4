//! Blocking byte I/O over one serial line.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, warn};

use crate::error::{Result, TransportError};

/// Fixed line speed for all three peripheral families.
pub const BAUD_RATE: u32 = 9600;

/// Bounded read wait; the line returns as soon as any byte arrives.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Blocking byte transport over one serial line.
///
/// Implementations must be cheap to drop: closing the underlying handle on
/// drop is how a rejected scan candidate is released.
pub trait SerialLink: Send {
    /// Write the whole frame, returning the byte count on success.
    fn write_frame(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Read whatever is available within the line's bounded wait.
    ///
    /// Returns `Ok(0)` on a silent timeout; a hard line error is
    /// [`TransportError::ReadFailed`].
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Drop anything pending in both directions.
    ///
    /// Used after a corrupt exchange so a stale reply cannot be mistaken
    /// for the answer to the next command. Failure to flush is ignored.
    fn discard_io(&mut self);
}

/// [`SerialLink`] over a real port from the `serialport` crate.
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    path: String,
}

impl std::fmt::Debug for SerialPortLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SerialPortLink {
    /// Open `path` in raw 8-N-1 mode at the fixed baud rate.
    ///
    /// # Errors
    ///
    /// [`TransportError::OpenFailed`] when the path cannot be opened or the
    /// line settings cannot be applied.
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with(path, BAUD_RATE, READ_TIMEOUT)
    }

    /// Open with explicit baud rate and read timeout.
    pub fn open_with(path: &str, baud: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()
            .map_err(|e| TransportError::OpenFailed {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        debug!(target: "cashdeck::transport", %path, baud, "serial line configured");

        Ok(Self {
            port,
            path: path.to_string(),
        })
    }

    /// Device path this link was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SerialLink for SerialPortLink {
    fn write_frame(&mut self, bytes: &[u8]) -> Result<usize> {
        match self.port.write(bytes) {
            Ok(written) if written == bytes.len() => Ok(written),
            Ok(written) => {
                warn!(
                    target: "cashdeck::transport",
                    path = %self.path, written, expected = bytes.len(),
                    "short write"
                );
                Err(TransportError::WriteFailed {
                    written,
                    expected: bytes.len(),
                })
            }
            Err(e) => {
                warn!(target: "cashdeck::transport", path = %self.path, error = %e, "write error");
                Err(TransportError::WriteFailed {
                    written: 0,
                    expected: bytes.len(),
                })
            }
        }
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(read) => Ok(read),
            // A bounded wait with nothing on the wire is not a line fault.
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }

    fn discard_io(&mut self) {
        if let Err(e) = self.port.clear(ClearBuffer::All) {
            warn!(target: "cashdeck::transport", path = %self.path, error = %e, "flush failed");
        }
    }
}

/// Opens numbered device paths (`/dev/ttyUSB{n}`, `/dev/ttyACM{n}`) as
/// [`SerialPortLink`]s for the port scanner.
pub struct SystemPortOpener {
    prefix: String,
    baud: u32,
    timeout: Duration,
}

impl SystemPortOpener {
    /// Opener over `/dev/ttyUSB{n}` (coin acceptor, card dispenser).
    pub fn usb() -> Self {
        Self::with_prefix("/dev/ttyUSB")
    }

    /// Opener over `/dev/ttyACM{n}` (bill acceptor).
    pub fn acm() -> Self {
        Self::with_prefix("/dev/ttyACM")
    }

    /// Opener over an arbitrary path prefix; the scan index is appended.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            baud: BAUD_RATE,
            timeout: READ_TIMEOUT,
        }
    }

    pub(crate) fn open_index(&self, index: usize) -> Result<SerialPortLink> {
        let path = format!("{}{}", self.prefix, index);
        SerialPortLink::open_with(&path, self.baud, self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opener_builds_numbered_paths() {
        let opener = SystemPortOpener::usb();
        // No hardware in CI: opening must fail, and the error must carry
        // the numbered path it tried.
        let error = opener.open_index(99).unwrap_err();
        assert!(error.to_string().contains("/dev/ttyUSB99"));
    }

    #[test]
    fn test_acm_prefix() {
        let opener = SystemPortOpener::acm();
        let error = opener.open_index(0).unwrap_err();
        assert!(error.to_string().contains("/dev/ttyACM0"));
    }
}
