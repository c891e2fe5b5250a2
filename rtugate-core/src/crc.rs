//! CRC16/MODBUS
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF, no final xor.
//! The check value travels low byte first, so the CRC over a whole frame
//! including its trailing check bytes is zero for an intact frame.

use bytes::{BufMut, BytesMut};
use tracing::trace;

/// Reflected CRC16/MODBUS polynomial
pub const POLYNOMIAL: u16 = 0xA001;

/// Initial register value
pub const INITIAL: u16 = 0xFFFF;

/// Calculate the CRC16/MODBUS of `data`
///
/// # Algorithm
///
/// ```text
/// crc = 0xFFFF
/// for each byte:
///     crc ^= byte
///     repeat 8 times:
///         lsb = crc & 1
///         crc >>= 1
///         if lsb: crc ^= 0xA001
/// ```
///
/// # Examples
///
/// ```
/// use rtugate_core::crc;
///
/// assert_eq!(crc::calculate(b"123456789"), 0x4B37);
/// ```
pub fn calculate(data: &[u8]) -> u16 {
    let mut crc = INITIAL;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            let lsb = crc & 0x0001;
            crc >>= 1;
            if lsb != 0 {
                crc ^= POLYNOMIAL;
            }
        }
    }

    trace!(len = data.len(), crc = format!("0x{:04X}", crc), "Calculated CRC16");

    crc
}

/// Append the CRC of the current buffer contents, low byte first
pub fn append(buf: &mut BytesMut) {
    let crc = calculate(buf);
    buf.put_u16_le(crc);
}

/// Check a complete frame whose last two bytes are its CRC
///
/// The residue over the whole frame must be zero. Frames shorter than the
/// check field itself are never valid.
pub fn verify(frame: &[u8]) -> bool {
    frame.len() > 2 && calculate(frame) == 0
}
