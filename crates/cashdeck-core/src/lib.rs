//! Shared types for the cashdeck peripheral drivers.
//!
//! This crate holds everything the three device families (coin acceptor,
//! card dispenser, bill acceptor) have in common: the error type, the
//! response records returned by every controller operation, the per-device
//! configuration structs, and the tracing bootstrap.
//!
//! # Status code convention
//!
//! Controller operations never fail with an `Err` for device-level
//! conditions; they return a [`CommandResponse`] (or an enriched variant)
//! whose numeric `status_code` is the compatibility surface consumed by
//! callers:
//!
//! - `2xx` — success, with detail (connected, coin read, card dispensed, ...)
//! - `3xx` — benign / no-change (no news, already started, card waiting, ...)
//! - `4xx` — precondition not met or accumulated fault posture
//! - `5xx` — communication or device failure
//!
//! The literal numeric catalog per device family is documented on each
//! controller; codes are stable and must not be renumbered.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{BillConfig, CoinConfig, DispenserConfig};
pub use error::{Error, Result};
pub use types::{BillTick, CoinTick, CommandResponse, DeviceStatus, DispenserFlags, LostCoins};
