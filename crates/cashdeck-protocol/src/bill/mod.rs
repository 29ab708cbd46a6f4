//! SSP-style codec for the bill acceptor.
//!
//! Command frames are `[0x7F, seq, len, payload.., crc_lo, crc_hi]`. The
//! sequence byte alternates between `0x80` and `0x00` on every command and
//! the device mirrors it in its reply; a reply carrying the sequence of the
//! previous exchange is the device replaying its last answer (after a lost
//! ACK) and must not be decoded as fresh news. The CRC-16 trailer covers
//! sequence, length and payload, excluding the start byte.

pub mod tables;

use bytes::{BufMut, BytesMut};

pub use tables::{
    CodeEntry, EVENT_NOT_FOUND, REJECT_NOT_FOUND, bill_for_channel, event_code, last_reject_code,
    response_code,
};

/// Frame start byte.
pub const START: u8 = 0x7F;

/// Generic OK response code.
pub const CODE_OK: u8 = 240;

/// Event codes the controllers branch on.
pub const EVENT_STACKING: u8 = 204;
pub const EVENT_STACKED: u8 = 235;
pub const EVENT_REJECTED: u8 = 236;
pub const EVENT_REJECTING: u8 = 237;
pub const EVENT_CREDIT: u8 = 238;
pub const EVENT_READ: u8 = 239;

/// Command payloads.
pub const CMD_RESET: &[u8] = &[0x01];
pub const CMD_SET_CHANNELS: &[u8] = &[0x02, 0xFF, 0xFF, 0xFF];
pub const CMD_DISPLAY_ON: &[u8] = &[0x03];
pub const CMD_DISPLAY_OFF: &[u8] = &[0x04];
pub const CMD_POLL: &[u8] = &[0x07];
pub const CMD_REJECT: &[u8] = &[0x08];
pub const CMD_DISABLE: &[u8] = &[0x09];
pub const CMD_ENABLE: &[u8] = &[0x0A];
pub const CMD_SYNC: &[u8] = &[0x11];
pub const CMD_LAST_REJECT: &[u8] = &[0x17];
pub const CMD_HOLD: &[u8] = &[0x18];

/// Decoded payload fields of one structurally valid reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillFrame {
    /// Payload length byte; governs which fields below are populated.
    pub data_len: u8,
    /// Generic response code (always present).
    pub code: CodeEntry,
    /// Event code when `data_len >= 2` outside a last-reject exchange.
    pub event: Option<CodeEntry>,
    /// Reject reason when `data_len >= 2` inside a last-reject exchange.
    pub last_reject: Option<CodeEntry>,
    /// Channel byte and mapped denomination when `data_len >= 3`.
    pub channel: u8,
    pub bill: u32,
    /// Second event code, present only when `data_len == 4`.
    pub additional: Option<CodeEntry>,
}

/// Structural classification of one read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillDecode {
    /// Fresh, structurally valid reply.
    Frame(BillFrame),
    /// Same sequence number as the previous reply: already seen.
    Repeated,
    /// Start byte missing; bytes arrived shifted or corrupted.
    Shifted,
    /// Length byte below 1.
    BadLength,
    /// Fewer than the 6-byte structural minimum.
    ShortRead,
}

/// Framing and sequencing state for one bill-acceptor line.
///
/// Owns the alternating command sequence bit and the last reply sequence
/// for duplicate detection, plus the last-reject decode context (the reply
/// to a last-reject query reuses the event slot for the reject reason).
#[derive(Debug, Default)]
pub struct SspChannel {
    sequence: bool,
    prev_reply_seq: u8,
    last_reject_context: bool,
}

impl SspChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle and return the next command sequence byte.
    fn next_seq(&mut self) -> u8 {
        self.sequence = !self.sequence;
        if self.sequence { 0x80 } else { 0x00 }
    }

    /// Reset the sequence bit; the next command carries `0x80`.
    ///
    /// Run before a sync command so both ends agree again.
    pub fn reset_sequence(&mut self) {
        self.sequence = false;
    }

    /// Mark the next decode as a last-reject exchange.
    pub fn set_last_reject_context(&mut self, active: bool) {
        self.last_reject_context = active;
    }

    /// Frame a command payload with sequence byte and CRC trailer.
    pub fn build(&mut self, payload: &[u8]) -> Vec<u8> {
        let mut frame = BytesMut::with_capacity(payload.len() + 5);
        frame.put_u8(START);
        frame.put_u8(self.next_seq());
        frame.put_u8(payload.len() as u8);
        frame.put_slice(payload);

        let crc = crate::checksum::crc16(&frame[1..]);
        frame.put_slice(&crc);
        frame.to_vec()
    }

    /// Classify a read buffer, consuming its sequence number.
    pub fn decode(&mut self, buf: &[u8]) -> BillDecode {
        if buf.len() < 6 {
            return BillDecode::ShortRead;
        }
        if buf[0] != START {
            return BillDecode::Shifted;
        }
        if buf[1] == self.prev_reply_seq {
            return BillDecode::Repeated;
        }
        self.prev_reply_seq = buf[1];

        let data_len = buf[2];
        if data_len < 1 {
            return BillDecode::BadLength;
        }

        let mut frame = BillFrame {
            data_len,
            code: response_code(buf[3]),
            event: None,
            last_reject: None,
            channel: 0,
            bill: 0,
            additional: None,
        };

        if data_len >= 2 {
            if self.last_reject_context {
                frame.last_reject = Some(last_reject_code(buf[4]));
            } else {
                frame.event = Some(event_code(buf[4]));
            }
            if data_len >= 3 {
                frame.channel = buf[5];
                frame.bill = bill_for_channel(buf[5]);
            }
            if data_len == 4 {
                frame.additional = Some(event_code(buf[6]));
            }
        }

        BillDecode::Frame(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Device reply with the given sequence, payload bytes and CRC.
    fn reply(seq: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![START, seq, payload.len() as u8];
        frame.extend_from_slice(payload);
        let crc = crate::checksum::crc16(&frame[1..]);
        frame.extend_from_slice(&crc);
        frame
    }

    #[test]
    fn test_build_frame_layout() {
        let mut channel = SspChannel::new();
        let frame = channel.build(CMD_SYNC);

        assert_eq!(frame[0], START);
        assert_eq!(frame[1], 0x80); // first command after reset
        assert_eq!(frame[2], 1);
        assert_eq!(frame[3], 0x11);
        // CRC over seq+len+payload, little-endian trailer.
        assert_eq!(&frame[4..], &crate::checksum::crc16(&frame[1..4]));
    }

    #[test]
    fn test_sequence_bit_alternates() {
        let mut channel = SspChannel::new();
        assert_eq!(channel.build(CMD_POLL)[1], 0x80);
        assert_eq!(channel.build(CMD_POLL)[1], 0x00);
        assert_eq!(channel.build(CMD_POLL)[1], 0x80);

        channel.reset_sequence();
        assert_eq!(channel.build(CMD_SYNC)[1], 0x80);
    }

    #[test]
    fn test_decode_ok_only_frame() {
        let mut channel = SspChannel::new();
        let buf = reply(0x80, &[CODE_OK]);

        match channel.decode(&buf) {
            BillDecode::Frame(frame) => {
                assert_eq!(frame.data_len, 1);
                assert_eq!(frame.code.code, 240);
                assert!(frame.event.is_none());
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_repeated_sequence() {
        let mut channel = SspChannel::new();
        let buf = reply(0x80, &[CODE_OK]);

        assert!(matches!(channel.decode(&buf), BillDecode::Frame(_)));
        // Device replays its previous answer: same sequence number.
        assert_eq!(channel.decode(&buf), BillDecode::Repeated);

        // A fresh sequence is news again.
        let buf = reply(0x00, &[CODE_OK]);
        assert!(matches!(channel.decode(&buf), BillDecode::Frame(_)));
    }

    #[test]
    fn test_decode_credit_event_with_channel() {
        let mut channel = SspChannel::new();
        let buf = reply(0x80, &[CODE_OK, EVENT_CREDIT, 3]);

        match channel.decode(&buf) {
            BillDecode::Frame(frame) => {
                assert_eq!(frame.data_len, 3);
                assert_eq!(frame.event.unwrap().code, EVENT_CREDIT);
                assert_eq!(frame.channel, 3);
                assert_eq!(frame.bill, 5000);
                assert!(frame.additional.is_none());
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_additional_event_only_at_len_four() {
        let mut channel = SspChannel::new();
        let buf = reply(0x80, &[CODE_OK, EVENT_CREDIT, 3, EVENT_STACKED]);

        match channel.decode(&buf) {
            BillDecode::Frame(frame) => {
                assert_eq!(frame.data_len, 4);
                assert_eq!(frame.additional.unwrap().code, EVENT_STACKED);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_last_reject_context() {
        let mut channel = SspChannel::new();
        channel.set_last_reject_context(true);
        let buf = reply(0x80, &[CODE_OK, 6]);

        match channel.decode(&buf) {
            BillDecode::Frame(frame) => {
                let reject = frame.last_reject.unwrap();
                assert_eq!(reject.message, "Channel inhibited");
                assert!(frame.event.is_none());
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_structural_failures() {
        let mut channel = SspChannel::new();

        assert_eq!(channel.decode(&[START, 0x80, 1]), BillDecode::ShortRead);

        let mut shifted = reply(0x80, &[CODE_OK]);
        shifted[0] = 0x55;
        assert_eq!(channel.decode(&shifted), BillDecode::Shifted);

        // Structurally long enough, but the length byte says zero.
        let zero_len = [START, 0x80, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(channel.decode(&zero_len), BillDecode::BadLength);
    }
}
