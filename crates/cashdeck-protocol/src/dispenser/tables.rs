//! Static lookup tables for the card dispenser.

/// One entry of the dispenser error-code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEntry {
    pub code: &'static str,
    pub message: &'static str,
    /// `1` plain fault, `2` collection box full, `3` dispenser not reset.
    pub priority: u8,
}

/// Error codes echoed in a fail response, keyed by their two ASCII chars.
static ERROR_CODES: [(&str, &str, u8); 56] = [
    ("00", "Undefined command", 1),
    ("01", "Errors in command parameters", 1),
    ("02", "Error in the command execution order", 1),
    ("03", "Hardware does not support commands", 1),
    ("04", "Command data error (error in communication packets DATA)", 1),
    ("05", "IC card is contacted but not released", 1),
    ("06", "IC card is contacted but not released", 1),
    ("07", "IC card is contacted but not released", 1),
    ("08", "IC card is contacted but not released", 1),
    ("09", "IC card is contacted but not released", 1),
    ("10", "Clogged card", 1),
    ("11", "Code not found, may be code is Clogged card", 1),
    ("12", "Sensor error", 1),
    ("13", "Long card error", 1),
    ("14", "Short card error", 1),
    ("40", "The card has been pulled away when recycling card", 1),
    ("41", "IC card electromagnet error", 1),
    ("42", "IC card electromagnet error", 1),
    ("43", "Card cannot be moved from IC card slot", 1),
    ("44", "Card cannot be moved from IC card slot", 1),
    ("45", "Cards are artificially moved", 1),
    ("46", "Cards are artificially moved", 1),
    ("47", "Cards are artificially moved", 1),
    ("48", "Cards are artificially moved", 1),
    ("49", "Cards are artificially moved", 1),
    ("50", "Recycled cards' counter overflows", 1),
    ("51", "Motor error", 1),
    ("52", "Motor error", 1),
    ("53", "Motor error", 1),
    ("54", "Motor error", 1),
    ("55", "Motor error", 1),
    ("56", "Motor error", 1),
    ("57", "Motor error", 1),
    ("58", "Motor error", 1),
    ("59", "Motor error", 1),
    ("60", "IC card power supply is short-circuited", 1),
    ("61", "IC card activation failed", 1),
    ("62", "IC card does not support the current command", 1),
    ("63", "IC card does not support the current command", 1),
    ("64", "IC card does not support the current command", 1),
    ("65", "IC card is not activated", 1),
    ("66", "The current IC card does not support the command", 1),
    ("67", "Transmission IC card data error", 1),
    ("68", "Transmission IC card data timeout", 1),
    ("69", "CPU / SAM card does not comply with EMV standard", 1),
    ("A0", "Card dispensing stack (box) is empty, there is no card in card stack", 1),
    ("A1", "Card collection box is full", 2),
    ("A2", "Card collection box is full", 2),
    ("A3", "Card collection box is full", 2),
    ("A4", "Card collection box is full", 2),
    ("A5", "Card collection box is full", 2),
    ("A6", "Card collection box is full", 2),
    ("A7", "Card collection box is full", 2),
    ("A8", "Card collection box is full", 2),
    ("A9", "Card collection box is full", 2),
    ("B0", "Card dispenser is not reset", 3),
];

/// Gate-occupancy field of a success response.
static GATE_STATUS: [(char, &str, u8); 3] = [
    ('0', "There is no card in gate", 0),
    ('1', "There is a card at exit slot of card dispenser channel", 0),
    ('2', "There is a card at RF / IC card slot of card dispenser channel", 1),
];

/// Hopper fill-level field of a success response.
static HOPPER_STATUS: [(char, &str, u8); 3] = [
    ('0', "There are no cards in dispenser", 1),
    ('1', "There are few cards in card dispensing box", 0),
    ('2', "There are enough cards in card dispensing box", 0),
];

/// Recycle-bin field of a success response.
static RECYCLE_STATUS: [(char, &str, u8); 2] = [
    ('0', "Recycling box is not full of cards", 0),
    ('1', "Recycling bin is full of cards", 1),
];

/// Look up a two-character error code; unknown codes resolve to `None` so
/// the decoder can classify the response as corrupt rather than inventing
/// a valid-looking fault.
pub fn error_entry(code: &str) -> Option<ErrorEntry> {
    ERROR_CODES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|&(code, message, priority)| ErrorEntry {
            code,
            message,
            priority,
        })
}

pub(crate) fn gate_message(status: char) -> Option<&'static str> {
    GATE_STATUS
        .iter()
        .find(|(c, _, _)| *c == status)
        .map(|(_, m, _)| *m)
}

pub(crate) fn hopper_message(status: char) -> Option<&'static str> {
    HOPPER_STATUS
        .iter()
        .find(|(c, _, _)| *c == status)
        .map(|(_, m, _)| *m)
}

pub(crate) fn recycle_message(status: char) -> Option<&'static str> {
    RECYCLE_STATUS
        .iter()
        .find(|(c, _, _)| *c == status)
        .map(|(_, m, _)| *m)
}
