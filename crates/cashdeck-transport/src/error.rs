//! Transport-level error type.

use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised while opening, configuring or driving a serial line.
///
/// Any of these aborts the current candidate during a port scan; the scan
/// then moves on to the next index.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The candidate device path does not name an openable port.
    #[error("invalid device path: {path}")]
    InvalidPath { path: String },

    /// The port exists but could not be opened.
    #[error("could not open {path}: {message}")]
    OpenFailed { path: String, message: String },

    /// Line settings (baud, framing, timeouts) could not be applied.
    #[error("could not configure {path}: {message}")]
    ConfigFailed { path: String, message: String },

    /// A write did not accept the full frame.
    #[error("write failed after {written} of {expected} bytes")]
    WriteFailed { written: usize, expected: usize },

    /// The line produced a read error (distinct from a silent timeout).
    #[error("read failed: {0}")]
    ReadFailed(String),
}

impl From<TransportError> for cashdeck_core::Error {
    fn from(err: TransportError) -> Self {
        cashdeck_core::Error::Transport(err.to_string())
    }
}
