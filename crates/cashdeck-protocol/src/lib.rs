//! Wire codecs for the cashdeck peripherals.
//!
//! Three proprietary binary protocols share this crate, one module each:
//!
//! - [`coin`] — ccTalk-style framing for the coin acceptor: 5-byte simple
//!   commands with an additive two's-complement checksum, replies prefixed
//!   by the local echo of the command.
//! - [`dispenser`] — the card dispenser's STX/ETX frames with an XOR
//!   trailer, ACK/NAK/EOT reply discipline and a host ACK write-back.
//! - [`bill`] — SSP-style framing for the bill acceptor: start byte,
//!   alternating sequence bit, length, payload and a CRC-16 trailer.
//!
//! Each module provides frame builders, a structural decoder, and the
//! static lookup tables that turn raw device codes into messages and
//! severities. Decoders are pure: they classify a received buffer into
//! exactly one structured outcome (success, retry-me, fatal, or
//! device-reported fault) and never silently treat a short or ambiguous
//! read as success. Per-instance protocol state (the bill sequence bit,
//! event-counter mirrors) lives in the device layers on top.

pub mod bill;
pub mod checksum;
pub mod coin;
pub mod dispenser;

pub use checksum::{additive_checksum, crc16, xor_checksum};
