//! Response records returned by controller operations.
//!
//! Every public controller operation resolves to one of these plain records.
//! They are `serde`-serializable because kiosk deployments ship them across
//! a process boundary to the calling application unchanged.

use serde::{Deserialize, Serialize};

/// Result of a simple controller operation.
///
/// `status_code` follows the workspace-wide 2xx/3xx/4xx/5xx convention; the
/// per-family catalogs are documented on each controller. `message` is a
/// human-readable rendering and is not part of the compatibility surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status_code: u16,
    pub message: String,
}

impl CommandResponse {
    /// Build a response from a code and message.
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// True for any 2xx success code.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// One poll tick of the coin acceptor.
///
/// `event` is the device-side event counter at the time of the tick, `coin`
/// the denomination credited (0 when none), and `remaining` the number of
/// events that elapsed since the previous tick when more than one was
/// detected (0 otherwise) — the caller recovers lost credits through
/// [`LostCoins`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinTick {
    pub status_code: u16,
    pub event: u8,
    pub coin: u32,
    pub message: String,
    pub remaining: u8,
}

/// Per-denomination counts of coins credited inside a multi-event poll tick.
///
/// When the device-side event counter advances by more than one between two
/// ticks, the individual credits are tallied here instead of being lost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LostCoins {
    pub coin_50: u32,
    pub coin_100: u32,
    pub coin_200: u32,
    pub coin_500: u32,
    pub coin_1000: u32,
}

/// One poll tick of the bill acceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillTick {
    pub status_code: u16,
    pub bill: u32,
    pub message: String,
}

impl BillTick {
    pub fn new(status_code: u16, bill: u32, message: impl Into<String>) -> Self {
        Self {
            status_code,
            bill,
            message: message.into(),
        }
    }
}

/// Snapshot of the dispenser's five sensor-derived flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispenserFlags {
    /// A card sits at the exit slot, ready for the user.
    pub card_in_gate: bool,
    /// A card is stuck at the RF/IC slot inside the channel.
    pub rfic_card_in_gate: bool,
    /// The dispensing hopper holds at least one card.
    pub cards_in_dispenser: bool,
    /// The dispensing hopper is full.
    pub dispenser_full: bool,
    /// The recycling box cannot take more cards.
    pub recycling_box_full: bool,
}

/// Diagnostic snapshot used by callers for alerting.
///
/// `error_type` distinguishes a device fault (`0`) from an
/// informational/event report (`1`); `priority` is `0` for purely
/// informational states and non-zero when operator action is warranted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub version: String,
    pub device: u8,
    pub error_type: u8,
    pub error_code: i32,
    pub message: String,
    pub additional_info: String,
    pub priority: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_response_success_range() {
        assert!(CommandResponse::new(200, "ok").is_success());
        assert!(CommandResponse::new(204, "ok").is_success());
        assert!(!CommandResponse::new(303, "no news").is_success());
        assert!(!CommandResponse::new(503, "not responding").is_success());
    }

    #[test]
    fn test_lost_coins_default_is_zeroed() {
        let lost = LostCoins::default();
        assert_eq!(lost.coin_50, 0);
        assert_eq!(lost.coin_1000, 0);
    }

    #[test]
    fn test_command_response_serialization() {
        let response = CommandResponse::new(202, "coin detected");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status_code\":202"));

        let back: CommandResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn test_dispenser_flags_serialization() {
        let flags = DispenserFlags {
            recycling_box_full: true,
            cards_in_dispenser: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&flags).unwrap();
        let back: DispenserFlags = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flags);
    }
}
