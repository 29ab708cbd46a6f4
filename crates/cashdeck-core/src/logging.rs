//! Tracing bootstrap for driver processes.
//!
//! The drivers only emit `tracing` events (targets `cashdeck::coin`,
//! `cashdeck::dispenser`, `cashdeck::bill`); wiring a subscriber is the
//! embedding process's job. These helpers cover the common case: an
//! `EnvFilter`-driven fmt subscriber, optionally writing to a per-device
//! log file.

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Initialize logging to stderr with the given filter directives.
///
/// `RUST_LOG` takes precedence over `directives` when set. Calling this a
/// second time in the same process fails.
///
/// # Errors
///
/// Returns [`Error::Logging`] if the directives do not parse or a global
/// subscriber is already installed.
pub fn init(directives: &str) -> Result<()> {
    let filter = env_filter(directives)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

/// Initialize logging into a file (ANSI disabled).
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be created, [`Error::Logging`]
/// if the directives do not parse or a subscriber is already installed.
pub fn init_with_file(directives: &str, path: &Path) -> Result<()> {
    let filter = env_filter(directives)?;
    let file = std::fs::File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

fn env_filter(directives: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse_filter(directives),
    }
}

fn parse_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_directives_are_rejected() {
        assert!(parse_filter("not==valid==").is_err());
    }

    #[test]
    fn test_valid_directives_parse() {
        assert!(parse_filter("cashdeck::coin=debug,warn").is_ok());
    }
}
