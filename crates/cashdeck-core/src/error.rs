//! Error types shared across the cashdeck crates.
//!
//! Library-level failures (port access, frame corruption, channel teardown)
//! are typed here; device-level conditions are NOT errors — controllers
//! report them as status records so a flaky peripheral never turns into a
//! panic or an unstructured failure in the calling process.

use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can escape the cashdeck public API.
#[derive(Error, Debug)]
pub enum Error {
    /// Serial line could not be opened, configured, read or written.
    #[error("transport error: {0}")]
    Transport(String),

    /// A wire frame failed checksum/CRC or structural validation.
    #[error("frame error: {0}")]
    Frame(String),

    /// The peripheral reported a fault code of its own.
    #[error("device fault {code}: {message}")]
    DeviceFault { code: i32, message: String },

    /// Background watcher was already stopped or its channel closed.
    #[error("watcher is not running")]
    WatcherStopped,

    /// Logging subsystem could not be initialized.
    #[error("logging init failed: {0}")]
    Logging(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a transport error from any displayable cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a frame error from any displayable cause.
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame(message.into())
    }

    /// Create a device-fault error with a machine-readable code.
    pub fn device_fault(code: i32, message: impl Into<String>) -> Self {
        Self::DeviceFault {
            code,
            message: message.into(),
        }
    }
}
