//! CRC-8 used by the DHTC11 frame format.
//!
//! Bits are processed LSB-first with the reflected Dallas/Maxim polynomial.
//! A frame that carries its own CRC as the last byte checks out iff the CRC
//! over the whole frame, trailing byte included, is zero.

/// Computes the checksum over `data`.
pub(crate) fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        let mut byte = byte;
        for _ in 0..8 {
            if (crc ^ byte) & 0x01 != 0 {
                crc ^= 0x18;
                crc >>= 1;
                crc |= 0x80;
            } else {
                crc >>= 1;
            }
            byte >>= 1;
        }
    }
    crc
}
