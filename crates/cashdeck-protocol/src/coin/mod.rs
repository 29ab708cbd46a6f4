//! ccTalk-style codec for the coin acceptor.
//!
//! Commands are short frames `[dest, data_len, src, header, data.., chk]`
//! with an additive two's-complement trailer. The line is half-duplex with
//! local echo: every read starts with the bytes just written, and the
//! device's reply follows at offset `cmd_len`. The reply's return header
//! (`cmd_len + 3`) carries ACK (0x00), NAK (0x05) or BUSY (0x06); what
//! follows depends on which command was echoed.

pub mod tables;

use cashdeck_core::LostCoins;

pub use tables::{PollingFault, coin_for_channel, fault_message, polling_fault};

/// Destination address of the acceptor.
pub const DEST: u8 = 0x02;
/// Host source address.
pub const SRC: u8 = 0x01;

/// Command headers.
pub const HEADER_RESET: u8 = 0x01;
pub const HEADER_READ_BUFFERED: u8 = 0xE5;
pub const HEADER_MODIFY_INHIBIT: u8 = 0xE7;
pub const HEADER_SELF_CHECK: u8 = 0xE8;
pub const HEADER_READ_OPTO: u8 = 0xEC;
pub const HEADER_REQUEST_STATUS: u8 = 0xF8;
pub const HEADER_SIMPLE_POLL: u8 = 0xFE;

/// Canned command frames (trailers precomputed; see the checksum tests).
pub const SIMPLE_POLL: [u8; 5] = [0x02, 0x00, 0x01, 0xFE, 0xFF];
pub const READ_BUFFERED_CREDIT: [u8; 5] = [0x02, 0x00, 0x01, 0xE5, 0x18];
pub const RESET_DEVICE: [u8; 5] = [0x02, 0x00, 0x01, 0x01, 0xFC];
pub const REQUEST_STATUS: [u8; 5] = [0x02, 0x00, 0x01, 0xF8, 0x05];
pub const READ_OPTO_STATES: [u8; 5] = [0x02, 0x00, 0x01, 0xEC, 0x11];
pub const SELF_CHECK: [u8; 5] = [0x02, 0x00, 0x01, 0xE8, 0x15];
pub const ENABLE_ALL_CHANNELS: [u8; 7] = [0x02, 0x02, 0x01, 0xE7, 0xFF, 0xFF, 0x16];

/// Build the inhibit-mask command for the given channel masks.
///
/// Bit `n` of `mask1` governs channel `n + 1`, bits of `mask2` channels
/// 9..=16; a set bit leaves the channel enabled.
pub fn build_modify_inhibit(mask1: u8, mask2: u8) -> Vec<u8> {
    let mut frame = vec![DEST, 0x02, SRC, HEADER_MODIFY_INHIBIT, mask1, mask2];
    frame.push(crate::checksum::additive_checksum(&frame));
    frame
}

/// Raw buffered-credit block: the event counter plus five newest-first
/// `(channel, error-code)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBlock {
    pub counter: u8,
    pub data: [u8; 10],
}

/// Opto-sensor states from the 4-bit mask of header 0xEC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptoStates {
    pub no_used_bit: bool,
    pub measure_photo_blocked: bool,
    pub out_photo_blocked: bool,
    pub cos_alert: bool,
}

impl OptoStates {
    pub fn from_mask(mask: u8) -> Self {
        Self {
            no_used_bit: mask & 0x01 != 0,
            measure_photo_blocked: mask & 0x02 != 0,
            out_photo_blocked: mask & 0x04 != 0,
            cos_alert: mask & 0x08 != 0,
        }
    }
}

/// Structural classification of one read buffer.
///
/// Exactly one of: success (`SimpleAck`, `Poll`, `SelfCheck`,
/// `OptoStates`), retryable corruption (`Nak`, `Busy`, `Incomplete`,
/// `ShortRead`, `Unrecognized`, `BadHeader`, `CorruptPoll`), or a fatal
/// protocol breakdown (`UnknownAck`). Device-reported faults surface later
/// when the poll block is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinDecode {
    /// ACK with no further payload to extract.
    SimpleAck,
    /// Buffered-credit block, structurally valid.
    Poll(PollBlock),
    /// Self-check reply carrying the acceptor's fault code.
    SelfCheck { fault: u8 },
    /// Opto-state reply.
    OptoStates(OptoStates),
    /// Negative acknowledge.
    Nak,
    /// Acceptor is busy; repeat later.
    Busy,
    /// Unknown byte where the ACK belongs.
    UnknownAck(u8),
    /// Reply present but truncated.
    Incomplete,
    /// Fewer bytes than the echo alone; the wait was too short.
    ShortRead,
    /// Echo minus one byte: command or address not recognized.
    Unrecognized,
    /// ACK received but the echoed header matches no known command.
    BadHeader,
    /// Polling reply with a malformed length byte; reset the acceptor.
    CorruptPoll,
}

/// Classify a read buffer against the command that produced it.
///
/// `buf` is exactly the bytes read, starting with the local echo of `cmd`.
pub fn decode(cmd: &[u8], buf: &[u8]) -> CoinDecode {
    let cmd_len = cmd.len();

    if buf.len() + 1 == cmd_len {
        return CoinDecode::Unrecognized;
    }
    if buf.len() < cmd_len {
        return CoinDecode::ShortRead;
    }
    if buf.len() < cmd_len + 4 {
        return CoinDecode::Incomplete;
    }

    match buf[cmd_len + 3] {
        0x00 => {}
        0x05 => return CoinDecode::Nak,
        0x06 => return CoinDecode::Busy,
        other => return CoinDecode::UnknownAck(other),
    }

    // Dispatch on the echoed command header.
    match buf[3] {
        HEADER_READ_BUFFERED => {
            if buf.len() < cmd_len + 15 {
                return CoinDecode::Incomplete;
            }
            if buf[cmd_len + 1] != 11 {
                return CoinDecode::CorruptPoll;
            }
            let mut data = [0u8; 10];
            data.copy_from_slice(&buf[cmd_len + 5..cmd_len + 15]);
            CoinDecode::Poll(PollBlock {
                counter: buf[cmd_len + 4],
                data,
            })
        }
        HEADER_SELF_CHECK => CoinDecode::SelfCheck {
            fault: buf[cmd_len + 4],
        },
        HEADER_READ_OPTO => CoinDecode::OptoStates(OptoStates::from_mask(buf[cmd_len + 4])),
        HEADER_MODIFY_INHIBIT | HEADER_SIMPLE_POLL | HEADER_RESET => CoinDecode::SimpleAck,
        _ => CoinDecode::BadHeader,
    }
}

/// Interpretation of one poll block against the previous event counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollRead {
    /// Counter unchanged; nothing happened since the last poll.
    NoChange { counter: u8 },
    /// Credit window: the most recent coin plus any tallied catch-up.
    Credit {
        counter: u8,
        channel: u8,
        coin: u32,
        lost: LostCoins,
    },
    /// The window contains a device-reported fault.
    Fault {
        counter: u8,
        fault: PollingFault,
        critical: bool,
        lost: LostCoins,
    },
}

fn tally(lost: &mut LostCoins, coin: u32) {
    match coin {
        50 => lost.coin_50 += 1,
        100 => lost.coin_100 += 1,
        200 => lost.coin_200 += 1,
        500 => lost.coin_500 += 1,
        1000 => lost.coin_1000 += 1,
        _ => {}
    }
}

/// Walk a poll block's event pairs relative to the previous counter value.
///
/// A window that advanced by more than one event is replayed pair by pair:
/// coins land in the catch-up tally, error codes are classified, and a
/// class-1 error latches the window as critical. A single-event window
/// inspects only the newest pair.
pub fn interpret_poll(block: &PollBlock, prev: u8) -> PollRead {
    if block.counter == prev {
        return PollRead::NoChange {
            counter: block.counter,
        };
    }

    let delta = i32::from(block.counter) - i32::from(prev);
    let mut lost = LostCoins::default();
    let mut error_happened = false;
    let mut critical = false;
    let mut channel = 0u8;
    let mut coin = 0u32;
    let mut fault: Option<PollingFault> = None;

    if delta > 1 {
        let walk = (2 * delta).clamp(0, 10) as usize;
        let mut k: i32 = 1;
        for (i, &data) in block.data[..walk].iter().enumerate() {
            let i = i as i32;
            if data == 0 && i == 2 * (k - 1) {
                error_happened = true;
            } else if matches!(data, 4..=7 | 10..=16) && i == 2 * (k - 1) {
                channel = data;
                coin = coin_for_channel(data);
                tally(&mut lost, coin);
                k += 1;
            }

            if i == 2 * k - 1 && error_happened {
                let entry = polling_fault(data);
                k += 1;
                if entry.critical == 1 {
                    critical = true;
                    fault = Some(entry);
                }
                if !critical {
                    fault = Some(entry);
                }
            }
        }
    } else {
        if block.data[0] == 0 {
            error_happened = true;
        } else {
            channel = block.data[0];
            coin = coin_for_channel(channel);
        }

        if error_happened {
            fault = Some(polling_fault(block.data[1]));
        } else if block.data[1] == 0 {
            coin = 0;
        }
    }

    if error_happened || critical {
        PollRead::Fault {
            counter: block.counter,
            fault: fault.unwrap_or_else(|| polling_fault(0)),
            critical,
            lost,
        }
    } else {
        PollRead::Credit {
            counter: block.counter,
            channel,
            coin,
            lost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble `echo ++ reply` the way the half-duplex line delivers it.
    fn exchange(cmd: &[u8], reply: &[u8]) -> Vec<u8> {
        let mut buf = cmd.to_vec();
        buf.extend_from_slice(reply);
        buf
    }

    /// A well-formed ACK reply to a 5-byte command.
    fn ack_reply() -> Vec<u8> {
        // dest(host), len, src(acceptor), return header ACK, chk
        vec![0x01, 0x00, 0x02, 0x00, 0xFD]
    }

    fn poll_reply(counter: u8, data: [u8; 10]) -> Vec<u8> {
        let mut reply = vec![0x01, 11, 0x02, 0x00, counter];
        reply.extend_from_slice(&data);
        reply.push(crate::checksum::additive_checksum(&reply));
        reply
    }

    #[test]
    fn test_build_modify_inhibit_frame() {
        let frame = build_modify_inhibit(0xF7, 0xFD);
        assert_eq!(frame, vec![0x02, 0x02, 0x01, 0xE7, 0xF7, 0xFD, 0x20]);
    }

    #[test]
    fn test_decode_simple_ack() {
        let buf = exchange(&SIMPLE_POLL, &ack_reply());
        assert_eq!(decode(&SIMPLE_POLL, &buf), CoinDecode::SimpleAck);
    }

    #[test]
    fn test_decode_nak_and_busy() {
        let mut nak = ack_reply();
        nak[3] = 0x05;
        let buf = exchange(&SIMPLE_POLL, &nak);
        assert_eq!(decode(&SIMPLE_POLL, &buf), CoinDecode::Nak);

        let mut busy = ack_reply();
        busy[3] = 0x06;
        let buf = exchange(&SIMPLE_POLL, &busy);
        assert_eq!(decode(&SIMPLE_POLL, &buf), CoinDecode::Busy);
    }

    #[test]
    fn test_decode_unknown_ack_byte() {
        let mut reply = ack_reply();
        reply[3] = 0x42;
        let buf = exchange(&SIMPLE_POLL, &reply);
        assert_eq!(decode(&SIMPLE_POLL, &buf), CoinDecode::UnknownAck(0x42));
    }

    #[test]
    fn test_decode_echo_only_lengths() {
        // One byte short of the echo: the device rejected the command.
        assert_eq!(
            decode(&SIMPLE_POLL, &SIMPLE_POLL[..4]),
            CoinDecode::Unrecognized
        );
        // Even shorter: the read window closed too early.
        assert_eq!(decode(&SIMPLE_POLL, &SIMPLE_POLL[..2]), CoinDecode::ShortRead);
        // Echo plus a truncated reply.
        let buf = exchange(&SIMPLE_POLL, &[0x01, 0x00]);
        assert_eq!(decode(&SIMPLE_POLL, &buf), CoinDecode::Incomplete);
    }

    #[test]
    fn test_decode_self_check_fault() {
        let reply = vec![0x01, 0x02, 0x02, 0x00, 253, 0x00, 0x00];
        let buf = exchange(&SELF_CHECK, &reply);
        assert_eq!(decode(&SELF_CHECK, &buf), CoinDecode::SelfCheck { fault: 253 });
    }

    #[test]
    fn test_decode_opto_states_mask() {
        // Bit 1 (measure photo) and bit 3 (COS alert) set.
        let reply = vec![0x01, 0x01, 0x02, 0x00, 0b1010, 0x00, 0x00];
        let buf = exchange(&READ_OPTO_STATES, &reply);
        match decode(&READ_OPTO_STATES, &buf) {
            CoinDecode::OptoStates(states) => {
                assert!(!states.no_used_bit);
                assert!(states.measure_photo_blocked);
                assert!(!states.out_photo_blocked);
                assert!(states.cos_alert);
            }
            other => panic!("expected opto states, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_poll_block() {
        let mut data = [0u8; 10];
        data[0] = 5; // channel 5 = 100 COP
        let buf = exchange(&READ_BUFFERED_CREDIT, &poll_reply(1, data));
        match decode(&READ_BUFFERED_CREDIT, &buf) {
            CoinDecode::Poll(block) => {
                assert_eq!(block.counter, 1);
                assert_eq!(block.data[0], 5);
            }
            other => panic!("expected poll block, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_poll_bad_length_byte() {
        let mut reply = poll_reply(1, [0u8; 10]);
        reply[1] = 9; // corrupt length
        let buf = exchange(&READ_BUFFERED_CREDIT, &reply);
        assert_eq!(decode(&READ_BUFFERED_CREDIT, &buf), CoinDecode::CorruptPoll);
    }

    #[test]
    fn test_decode_truncated_poll_is_incomplete() {
        let reply = poll_reply(1, [0u8; 10]);
        let buf = exchange(&READ_BUFFERED_CREDIT, &reply[..7]);
        assert_eq!(decode(&READ_BUFFERED_CREDIT, &buf), CoinDecode::Incomplete);
    }

    #[test]
    fn test_interpret_no_change() {
        let block = PollBlock {
            counter: 7,
            data: [0u8; 10],
        };
        assert_eq!(interpret_poll(&block, 7), PollRead::NoChange { counter: 7 });
    }

    #[test]
    fn test_interpret_single_credit() {
        let mut data = [0u8; 10];
        data[0] = 5; // channel 5
        data[1] = 1; // sorter path, non-zero
        let block = PollBlock { counter: 3, data };

        match interpret_poll(&block, 2) {
            PollRead::Credit {
                counter,
                channel,
                coin,
                ..
            } => {
                assert_eq!(counter, 3);
                assert_eq!(channel, 5);
                assert_eq!(coin, 100);
            }
            other => panic!("expected credit, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_single_fault() {
        let mut data = [0u8; 10];
        data[0] = 0; // error marker
        data[1] = 1; // reject coin
        let block = PollBlock { counter: 4, data };

        match interpret_poll(&block, 3) {
            PollRead::Fault {
                fault, critical, ..
            } => {
                assert_eq!(fault.code, 1);
                assert_eq!(fault.message, "Reject coin");
                // Single-event windows never latch the critical flag.
                assert!(!critical);
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_multi_event_tallies_lost_coins() {
        // Three events since the last poll: 100, 500, 1000.
        let data = [5, 1, 7, 1, 14, 1, 0, 0, 0, 0];
        let block = PollBlock { counter: 6, data };

        match interpret_poll(&block, 3) {
            PollRead::Credit { coin, lost, .. } => {
                assert_eq!(lost.coin_100, 1);
                assert_eq!(lost.coin_500, 1);
                assert_eq!(lost.coin_1000, 1);
                // The last coin walked remains the headline credit.
                assert_eq!(coin, 1000);
            }
            other => panic!("expected credit, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_multi_event_critical_fault_latches() {
        // Two events: a credit-sensor-blocked fault (class 1) then a coin.
        let data = [0, 14, 5, 1, 0, 0, 0, 0, 0, 0];
        let block = PollBlock { counter: 5, data };

        match interpret_poll(&block, 3) {
            PollRead::Fault {
                fault,
                critical,
                lost,
                ..
            } => {
                assert_eq!(fault.code, 14);
                assert!(critical);
                // The trailing coin still lands in the tally.
                assert_eq!(lost.coin_100, 1);
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_single_event_zero_pair_keeps_coin_zero() {
        // Channel byte present but the second byte zeroed: no credit.
        let mut data = [0u8; 10];
        data[0] = 5;
        data[1] = 0;
        let block = PollBlock { counter: 2, data };

        match interpret_poll(&block, 1) {
            PollRead::Credit { coin, .. } => assert_eq!(coin, 0),
            other => panic!("expected credit, got {other:?}"),
        }
    }
}
