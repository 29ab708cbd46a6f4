//! Codec for the motorized card dispenser.
//!
//! Command frames are `[STX=0xF2, 0x00, 0x00, 0x03, 'C', cmd, param,
//! ETX=0x03, bcc]` with an XOR trailer. The device answers with a single
//! control byte (ACK 0x06, NAK 0x15, EOT 0x04) followed by a structured
//! body that echoes the command and parameter bytes; the host must write a
//! lone ACK byte back after accepting a success response. A response whose
//! echo does not match what was sent is stale and must be rejected.

pub mod tables;

use cashdeck_core::DispenserFlags;

pub use tables::{ErrorEntry, error_entry};

/// Control bytes.
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const EOT: u8 = 0x04;

/// The single ACK byte the host writes back after accepting a response.
pub const HOST_ACK: [u8; 1] = [ACK];

/// Success code inside a response body (`'P'`).
pub const SUCCESS_CODE: u8 = 0x50;

/// Frame start byte.
pub const STX: u8 = 0xF2;

/// Canned command frames (XOR trailers; see the checksum tests).
pub const INIT: [u8; 9] = [0xF2, 0x00, 0x00, 0x03, 0x43, 0x30, 0x33, 0x03, 0xB2];
pub const DISPENSE_CARD: [u8; 9] = [0xF2, 0x00, 0x00, 0x03, 0x43, 0x32, 0x30, 0x03, 0xB3];
pub const GET_STATUS: [u8; 9] = [0xF2, 0x00, 0x00, 0x03, 0x43, 0x31, 0x30, 0x03, 0xB0];
pub const RETURN_CARD: [u8; 9] = [0xF2, 0x00, 0x00, 0x03, 0x43, 0x32, 0x33, 0x03, 0xB0];

/// Minimum assembled response length before decoding is attempted.
pub const MIN_RESPONSE_LEN: usize = 10;

/// Build a command frame for an arbitrary `cmd`/`param` ASCII pair.
pub fn build_command(cmd: u8, param: u8) -> [u8; 9] {
    let mut frame = [STX, 0x00, 0x00, 0x03, 0x43, cmd, param, 0x03, 0x00];
    frame[8] = crate::checksum::xor_checksum(&frame[..8]);
    frame
}

/// A fault response, resolved through the error-code table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispenserFault {
    /// The two ASCII characters as reported, high character first.
    pub code: String,
    pub message: &'static str,
    pub priority: u8,
}

/// Structural classification of one assembled dispenser response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispDecode {
    /// Success body; the three status fields decoded into flags. The host
    /// owes the device an ACK byte.
    Success(DispenserFlags),
    /// Device-reported fault, resolved through the error table.
    Fault(DispenserFault),
    /// Body echoes a different command/parameter than the one sent.
    StaleEcho,
    /// Status or error characters outside every table.
    UnknownCode { fault_code: Option<String> },
    /// Body does not start with the frame STX.
    Corrupt,
    /// Device answered NAK.
    Nak,
    /// Device answered EOT.
    Eot,
    /// Leading byte is none of ACK/NAK/EOT.
    Garbled,
}

fn byte_at(buf: &[u8], index: usize) -> u8 {
    buf.get(index).copied().unwrap_or(0)
}

/// Classify an assembled response against the command that produced it.
///
/// `buf` must already hold at least [`MIN_RESPONSE_LEN`] bytes; assembling
/// partial reads up to that point is the device layer's receive loop.
pub fn decode(cmd: &[u8], buf: &[u8]) -> DispDecode {
    match buf.first().copied() {
        Some(self::ACK) => {}
        Some(self::NAK) => return DispDecode::Nak,
        Some(self::EOT) => return DispDecode::Eot,
        _ => return DispDecode::Garbled,
    }

    let data_start = byte_at(buf, 1);
    let code = byte_at(buf, 5);
    let same_cmd = byte_at(buf, 6) == cmd[5] && byte_at(buf, 7) == cmd[6];

    if data_start != STX {
        return DispDecode::Corrupt;
    }
    if !same_cmd {
        return DispDecode::StaleEcho;
    }

    if code == SUCCESS_CODE {
        decode_success(buf)
    } else {
        decode_fault(buf)
    }
}

fn decode_success(buf: &[u8]) -> DispDecode {
    let gate = byte_at(buf, 8) as char;
    let hopper = byte_at(buf, 9) as char;
    let recycle = byte_at(buf, 10) as char;

    if tables::gate_message(gate).is_none()
        || tables::hopper_message(hopper).is_none()
        || tables::recycle_message(recycle).is_none()
    {
        return DispDecode::UnknownCode { fault_code: None };
    }

    DispDecode::Success(DispenserFlags {
        card_in_gate: gate == '1',
        rfic_card_in_gate: gate == '2',
        cards_in_dispenser: hopper == '1' || hopper == '2',
        dispenser_full: hopper == '2',
        recycling_box_full: recycle == '1',
    })
}

fn decode_fault(buf: &[u8]) -> DispDecode {
    let high = byte_at(buf, 8) as char;
    let low = byte_at(buf, 9) as char;
    let code: String = [high, low].iter().collect();

    match tables::error_entry(&code) {
        Some(entry) => DispDecode::Fault(DispenserFault {
            code,
            message: entry.message,
            priority: entry.priority,
        }),
        None => DispDecode::UnknownCode {
            fault_code: Some(code),
        },
    }
}
