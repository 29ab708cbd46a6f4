//! Static lookup tables for the bill acceptor.

/// One classified device code: generic response, event, or reject reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeEntry {
    pub code: u8,
    pub message: &'static str,
    /// Severity used by the diagnostics snapshot; `0` informational.
    pub priority: u8,
}

/// Generic response codes (first payload byte of every reply).
static RESPONSE_CODES: [(u8, &str, u8); 8] = [
    (240, "OK", 0),
    (242, "COMMAND NOT KNOWN", 1),
    (243, "WRONG NO PARAMETERS", 1),
    (244, "PARAMETER OUT OF RANGE", 1),
    (245, "COMMAND CANNOT BE PROCESSED", 2),
    (246, "SOFTWARE ERROR", 1),
    (248, "FAIL", 1),
    (250, "KEY NOT SET", 1),
];

/// Event codes reported by the poll command.
static EVENT_CODES: [(u8, &str, u8); 17] = [
    // No additional parameters.
    (240, "OK", 0),
    // One additional parameter.
    (181, "CHANNELS_DISABLED", 1),
    (182, "INITIALIZING", 1),
    (204, "STACKING", 0),
    (231, "STACKER_FULL", 1),
    (232, "DISABLED", 2),
    (233, "UNSAFE JAM", 1),
    (234, "SAFE JAM", 1),
    (235, "STACKED", 0),
    (236, "REJECTED", 0),
    (237, "REJECTING", 0),
    (241, "SLAVE_RESET", 1),
    // Two additional parameters.
    (225, "CLEARED_FROM_FRONT", 1),
    (226, "CLEARED_TO_CASH_BOX", 1),
    (230, "FRAUD ATTEMPT", 1),
    (239, "READ", 0),
    // Three additional parameters.
    (238, "CREDIT", 0),
];

/// Reject reasons returned by the last-reject query.
static LAST_REJECT_CODES: [(u8, &str, u8); 29] = [
    (0, "Note accepted", 0),
    (1, "Note length incorrect", 3),
    (2, "Reject reason 2", 3),
    (3, "Reject reason 3", 3),
    (4, "Reject reason 4", 3),
    (5, "Reject reason 5", 3),
    (6, "Channel inhibited", 3),
    (7, "Second note inserted", 2),
    (8, "Reject reason 8", 3),
    (9, "Note recognised in more than one channel", 1),
    (10, "Reject reason 10", 3),
    (11, "Note too long", 3),
    (12, "Reject reason 12", 3),
    (13, "Mechanism slow/stalled", 1),
    (14, "Strimming attempt detected", 1),
    (15, "Fraud channel reject", 1),
    (16, "No notes inserted", 3),
    (17, "Peak detect fail", 2),
    (18, "Twisted note detected", 2),
    (19, "Escrow time-out", 3),
    (20, "Bar code scan fail", 2),
    (21, "Rear sensor 2 fail", 1),
    (22, "Slot fail 1", 1),
    (23, "Slot fail 2", 1),
    (24, "Lens over-sample", 2),
    (25, "Width detect fail", 2),
    (26, "Short note detected", 2),
    (27, "Note payout", 3),
    (28, "Unable to stack note", 1),
];

/// Channel number to bill denomination (COP).
static BILL_CHANNELS: [(u8, u32); 8] = [
    (0, 0),
    (1, 1000),
    (2, 2000),
    (3, 5000),
    (4, 10_000),
    (5, 20_000),
    (6, 50_000),
    (7, 100_000),
];

fn lookup(table: &'static [(u8, &'static str, u8)], code: u8, sentinel: &'static str) -> CodeEntry {
    table
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|&(code, message, priority)| CodeEntry {
            code,
            message,
            priority,
        })
        .unwrap_or(CodeEntry {
            code,
            message: sentinel,
            priority: 1,
        })
}

/// Sentinel message for unknown event codes.
pub const EVENT_NOT_FOUND: &str = "EventCode not found!!!";
/// Sentinel message for unknown reject codes.
pub const REJECT_NOT_FOUND: &str = "LRC not found!!!";
/// Sentinel message for unknown generic response codes.
pub const RESPONSE_NOT_FOUND: &str = "ErrorCode not found!!!";

/// Classify a generic response code.
pub fn response_code(code: u8) -> CodeEntry {
    lookup(&RESPONSE_CODES, code, RESPONSE_NOT_FOUND)
}

/// Classify an event code.
pub fn event_code(code: u8) -> CodeEntry {
    lookup(&EVENT_CODES, code, EVENT_NOT_FOUND)
}

/// Classify a last-reject reason.
pub fn last_reject_code(code: u8) -> CodeEntry {
    lookup(&LAST_REJECT_CODES, code, REJECT_NOT_FOUND)
}

/// Denomination for a reported channel; unknown channels map to 0.
pub fn bill_for_channel(channel: u8) -> u32 {
    BILL_CHANNELS
        .iter()
        .find(|(ch, _)| *ch == channel)
        .map(|(_, bill)| *bill)
        .unwrap_or(0)
}
