//! Static lookup tables for the coin acceptor.
//!
//! All lookups are total: an unknown code resolves to a distinguishable
//! "not found" sentinel entry instead of failing, so a firmware revision
//! that grows new codes degrades to a labelled unknown rather than a crash.

/// Classification of one polling error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingFault {
    pub code: u8,
    pub message: &'static str,
    /// `1` when the coin was rejected back to the user, `2` for timeouts,
    /// `0` otherwise; `3` marks the unknown-code sentinel.
    pub rejected: u8,
    /// Escalation class `0..=3`; class `1` feeds the critical counter.
    pub critical: u8,
}

/// Channel number to coin denomination (COP).
static COIN_CHANNELS: [(u8, u32); 16] = [
    (1, 0),
    (2, 0),
    (3, 0),
    (4, 50),
    (5, 100),
    (6, 200),
    (7, 500),
    (8, 0),
    (9, 0),
    (10, 50),
    (11, 100),
    (12, 200),
    (13, 500),
    (14, 1000),
    (15, 500),
    (16, 1000),
];

/// Polling error codes reported inside the buffered-credit event block.
static POLLING_FAULTS: [(u8, &str, u8, u8); 44] = [
    (0, "Null event", 0, 0),
    (1, "Reject coin", 1, 3),
    (2, "Inhibited coin", 1, 0),
    (3, "Multiple window", 1, 3),
    (4, "Wake-up timeout", 2, 3),
    (5, "Validation timeout", 2, 3),
    (6, "Credit sensor timeout", 2, 2),
    (7, "Sorter opto timeout", 0, 3),
    (8, "2nd close coin error", 1, 3),
    (9, "Accept gate not ready", 1, 2),
    (10, "Credit sensor not ready", 1, 2),
    (11, "Sorter not ready", 1, 0),
    (12, "Reject coin not cleared", 1, 1),
    (13, "Validation sensor not ready", 1, 1),
    (14, "Credit sensor blocked", 1, 1),
    (15, "Sorter opto blocked", 1, 1),
    (16, "Credit sequence error", 0, 2),
    (17, "Coin going backwards", 0, 2),
    (18, "Coin too fast", 0, 0),
    (19, "Coin too slow", 0, 0),
    (20, "C.O.S. mechanism activated", 0, 2),
    (21, "DCE opto timeout", 2, 0),
    (22, "DCE opto not seen", 1, 0),
    (23, "Credit sensor reached too early", 0, 3),
    (24, "Reject coin", 1, 3),
    (25, "Reject slug", 1, 3),
    (26, "Reject sensor blocked", 0, 1),
    (27, "Games overload", 0, 3),
    (28, "Max. coin meter pulses exceeded", 0, 3),
    (29, "Accept gate open not closed", 0, 1),
    (30, "Accept gate closed not open", 1, 1),
    (31, "Manifold opto timeout", 0, 3),
    (32, "Manifold opto blocked", 1, 1),
    (33, "Manifold not ready", 1, 3),
    (34, "Security status changed", 2, 3),
    (35, "Motor exception", 2, 2),
    (36, "Swallowed coin", 0, 3),
    (37, "Coin too fast", 1, 0),
    (38, "Coin too slow", 1, 0),
    (39, "Coin incorrectly sorted", 0, 3),
    (40, "External light attack", 0, 2),
    (253, "Data block request", 0, 3),
    (254, "Coin return mechanism activated", 0, 3),
    (255, "Unspecified alarm code", 0, 2),
];

/// Self-check fault codes (ccTalk header 232).
static FAULT_CODES: [(u8, &str); 15] = [
    (0, "OK"),
    (1, "Firmware checksum corrupted"),
    (2, "Fault on electromagnetic sensors"),
    (3, "Fault on credit sensors"),
    (4, "Fault on sound sensor or piezoelectric"),
    (6, "Fault on diameter sensor"),
    (20, "Fault on COS mechanism (is open)"),
    (28, "Sensor module not responding"),
    (30, "Datablock checksum corrupted"),
    (33, "Voltage of module sensor is wrong"),
    (34, "Fault on temperature sensor"),
    (35, "Fault on double-in sensor"),
    (41, "Error in COS mechanism (open)"),
    (253, "Coin jam in measurement system"),
    (255, "No valid hardware test: Measuring a coin inside"),
];

/// Denomination for a reported channel; unknown channels map to 0.
pub fn coin_for_channel(channel: u8) -> u32 {
    COIN_CHANNELS
        .iter()
        .find(|(ch, _)| *ch == channel)
        .map(|(_, coin)| *coin)
        .unwrap_or(0)
}

/// Classify a polling error code.
///
/// Codes 128..=159 are the per-channel "inhibited coin" aliases; anything
/// else outside the table resolves to the sentinel entry.
pub fn polling_fault(code: u8) -> PollingFault {
    if (128..=159).contains(&code) {
        return PollingFault {
            code,
            message: "Inhibited coin",
            rejected: 1,
            critical: 0,
        };
    }

    POLLING_FAULTS
        .iter()
        .find(|(c, _, _, _)| *c == code)
        .map(|&(code, message, rejected, critical)| PollingFault {
            code,
            message,
            rejected,
            critical,
        })
        .unwrap_or(PollingFault {
            code,
            message: "ErrorCode not found!!!",
            rejected: 3,
            critical: 0,
        })
}

/// Message for a self-check fault code.
pub fn fault_message(code: u8) -> &'static str {
    FAULT_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, message)| *message)
        .unwrap_or("FaultCode not found!!!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(4, 50)]
    #[case(5, 100)]
    #[case(6, 200)]
    #[case(7, 500)]
    #[case(14, 1000)]
    #[case(15, 500)]
    #[case(16, 1000)]
    fn test_coin_channel_denominations(#[case] channel: u8, #[case] coin: u32) {
        assert_eq!(coin_for_channel(channel), coin);
    }

    #[test]
    fn test_unmapped_channels_are_zero() {
        assert_eq!(coin_for_channel(1), 0);
        assert_eq!(coin_for_channel(8), 0);
        assert_eq!(coin_for_channel(99), 0);
    }

    #[test]
    fn test_polling_fault_known_code() {
        let fault = polling_fault(1);
        assert_eq!(fault.message, "Reject coin");
        assert_eq!(fault.rejected, 1);
        assert_eq!(fault.critical, 3);
    }

    #[test]
    fn test_polling_fault_inhibited_range() {
        for code in 128..=159 {
            let fault = polling_fault(code);
            assert_eq!(fault.message, "Inhibited coin");
            assert_eq!(fault.rejected, 1);
            assert_eq!(fault.critical, 0);
        }
    }

    #[test]
    fn test_polling_fault_unknown_code_is_sentinel() {
        let fault = polling_fault(99);
        assert_eq!(fault.message, "ErrorCode not found!!!");
        assert_eq!(fault.rejected, 3);
        assert_eq!(fault.critical, 0);
        assert_eq!(fault.code, 99);
    }

    #[test]
    fn test_fault_message_lookup() {
        assert_eq!(fault_message(0), "OK");
        assert_eq!(fault_message(253), "Coin jam in measurement system");
        assert_eq!(fault_message(200), "FaultCode not found!!!");
    }
}
