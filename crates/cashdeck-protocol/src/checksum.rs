//! Frame trailers: additive checksum, XOR checksum, CRC-16.

/// Two's-complement (mod 256) of the byte sum.
///
/// The coin-acceptor frames end with this trailer; a valid frame plus its
/// trailer sums to zero mod 256.
///
/// ```
/// use cashdeck_protocol::additive_checksum;
///
/// // Simple-poll command body: dest, length, source, header.
/// assert_eq!(additive_checksum(&[0x02, 0x00, 0x01, 0xFE]), 0xFF);
/// ```
pub fn additive_checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg()
}

/// XOR of all bytes.
///
/// The dispenser frames end with this trailer; a valid frame plus its
/// trailer XORs to zero.
///
/// ```
/// use cashdeck_protocol::xor_checksum;
///
/// assert_eq!(xor_checksum(&[0xF2, 0x00, 0x00, 0x03, 0x43, 0x30, 0x33, 0x03]), 0xB2);
/// ```
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// CRC-16, seed `0xFFFF`, polynomial `0x8005`, big-endian shift.
///
/// The bill-acceptor frames carry this as a little-endian trailer
/// `[lo, hi]`, computed over sequence byte, length and payload (the start
/// byte is excluded).
pub fn crc16(bytes: &[u8]) -> [u8; 2] {
    const SEED: u16 = 0xFFFF;
    const POLY: u16 = 0x8005;

    let mut crc = SEED;
    for &byte in bytes {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    [(crc & 0xFF) as u8, (crc >> 8) as u8]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    // Every canned coin command and its shipped trailer.
    #[case(&[0x02, 0x00, 0x01, 0xFE], 0xFF)] // simple poll
    #[case(&[0x02, 0x00, 0x01, 0xE5], 0x18)] // read buffered credit
    #[case(&[0x02, 0x00, 0x01, 0x01], 0xFC)] // reset
    #[case(&[0x02, 0x00, 0x01, 0xF8], 0x05)] // request status
    #[case(&[0x02, 0x00, 0x01, 0xEC], 0x11)] // read opto states
    #[case(&[0x02, 0x00, 0x01, 0xE8], 0x15)] // self check
    #[case(&[0x02, 0x02, 0x01, 0xE7, 0xFF, 0xFF], 0x16)] // enable all channels
    fn test_additive_checksum_reference(#[case] body: &[u8], #[case] trailer: u8) {
        assert_eq!(additive_checksum(body), trailer);
    }

    #[rstest]
    // Every canned dispenser command and its shipped trailer.
    #[case(&[0xF2, 0x00, 0x00, 0x03, 0x43, 0x30, 0x33, 0x03], 0xB2)] // init "03"
    #[case(&[0xF2, 0x00, 0x00, 0x03, 0x43, 0x32, 0x30, 0x03], 0xB3)] // dispense "20"
    #[case(&[0xF2, 0x00, 0x00, 0x03, 0x43, 0x31, 0x30, 0x03], 0xB0)] // status "10"
    #[case(&[0xF2, 0x00, 0x00, 0x03, 0x43, 0x32, 0x33, 0x03], 0xB0)] // recycle "23"
    fn test_xor_checksum_reference(#[case] body: &[u8], #[case] trailer: u8) {
        assert_eq!(xor_checksum(body), trailer);
    }

    #[test]
    fn test_crc16_reference_vector() {
        // CRC-16 with poly 0x8005, seed 0xFFFF, no reflection: the standard
        // "123456789" check value is 0xAEE7, shipped little-endian.
        assert_eq!(crc16(b"123456789"), [0xE7, 0xAE]);
    }

    #[test]
    fn test_crc16_empty_is_seed() {
        assert_eq!(crc16(&[]), [0xFF, 0xFF]);
    }

    proptest! {
        #[test]
        fn prop_additive_checksum_closes_frame(body in proptest::collection::vec(any::<u8>(), 0..64)) {
            let trailer = additive_checksum(&body);
            let total = body.iter().fold(trailer, |acc, &b| acc.wrapping_add(b));
            prop_assert_eq!(total, 0);
        }

        #[test]
        fn prop_xor_checksum_closes_frame(body in proptest::collection::vec(any::<u8>(), 0..64)) {
            let trailer = xor_checksum(&body);
            let total = body.iter().fold(trailer, |acc, &b| acc ^ b);
            prop_assert_eq!(total, 0);
        }

        #[test]
        fn prop_crc16_detects_single_byte_flips(
            body in proptest::collection::vec(any::<u8>(), 1..32),
            index in 0usize..32,
            flip in 1u8..=255,
        ) {
            let index = index % body.len();
            let mut tampered = body.clone();
            tampered[index] ^= flip;
            prop_assert_ne!(crc16(&body), crc16(&tampered));
        }
    }
}
