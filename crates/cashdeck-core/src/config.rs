//! Per-instance driver configuration.
//!
//! Each device instance receives its configuration once at construction and
//! never mutates it afterwards (the bill acceptor's inhibit mask, the one
//! documented exception, lives on the controller rather than here). The
//! defaults are the values the production kiosks run with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a coin-acceptor instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinConfig {
    /// Warn/deck tallies at this threshold latch the secondary critical flag.
    pub warn_to_critical: u32,
    /// Critical-fault tally at this threshold latches the primary flag.
    pub max_critical: u32,
    /// Upper bound of the port scan range (candidates `0..max_ports-1`).
    pub max_ports: usize,
}

impl Default for CoinConfig {
    fn default() -> Self {
        Self {
            warn_to_critical: 10,
            max_critical: 4,
            max_ports: 10,
        }
    }
}

/// Configuration for a card-dispenser instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenserConfig {
    /// Attempts for the init command and the receive loop.
    pub max_init_attempts: u32,
    /// Extra wait after commands that do not move the motor.
    pub short_wait: Duration,
    /// Extra wait after commands that move the motor.
    pub long_wait: Duration,
    /// Upper bound of the port scan range.
    pub max_ports: usize,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        Self {
            max_init_attempts: 4,
            short_wait: Duration::ZERO,
            long_wait: Duration::from_secs(3),
            max_ports: 10,
        }
    }
}

/// Configuration for a bill-acceptor instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillConfig {
    /// Upper bound of the port scan range.
    pub max_ports: usize,
    /// Initial channel inhibit mask; bit `n` set enables channel `n + 1`.
    pub inhibit_mask: u8,
}

impl Default for BillConfig {
    fn default() -> Self {
        Self {
            max_ports: 10,
            inhibit_mask: 0xFF,
        }
    }
}
