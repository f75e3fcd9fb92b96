//! Frame checksum algorithms
//!
//! Each algorithm is a deterministic function of the message address and the
//! payload bytes with the checksum field itself cleared to zero. The encoder
//! writes the result into the checksum signal after every other signal; the
//! decoder can recompute it to reject corrupted frames.

use crate::bit_codec;
use crate::signals::database::{MessageDefinition, SignalRole};
use crate::types::Result;
use serde::{Deserialize, Serialize};

/// Checksum algorithm declared by a message's checksum signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    /// 4-bit nibble sum in the last nibble of the frame
    Honda,
    /// 8-bit byte sum (seeded with the length) in the last byte
    Toyota,
    /// 8-bit byte sum in the first byte
    Subaru,
    /// CRC-8 SAE J1850 over every byte but the last
    Chrysler,
    /// CRC-8 poly 0xD5 used by the comma pedal interceptor, in the last byte
    Pedal,
    /// AUTOSAR CRC-8 (0x2F) in the first byte, finished with a per-counter
    /// pepper byte that depends on the message
    Volkswagen {
        /// Pepper byte indexed by the low nibble of byte 1 (the counter)
        pepper: [u8; 16],
    },
}

impl ChecksumAlgorithm {
    /// Compute the checksum of `data` sent on `address`
    ///
    /// `data` must already have the checksum field cleared.
    pub fn compute(&self, address: u32, data: &[u8]) -> u64 {
        if data.is_empty() {
            return 0;
        }
        let len = data.len();

        match self {
            ChecksumAlgorithm::Honda => {
                let mut sum = nibble_sum(address);
                for byte in &data[..len - 1] {
                    sum += u64::from(byte >> 4) + u64::from(byte & 0x0F);
                }
                // low nibble of the last byte holds the checksum
                sum += u64::from(data[len - 1] >> 4);
                8u64.wrapping_sub(sum) & 0x0F
            }
            ChecksumAlgorithm::Toyota => {
                let sum = len as u64 + byte_sum(address) + bytes_sum(&data[..len - 1]);
                sum & 0xFF
            }
            ChecksumAlgorithm::Subaru => {
                let sum = byte_sum(address) + bytes_sum(&data[1..]);
                sum & 0xFF
            }
            ChecksumAlgorithm::Chrysler => {
                let crc = crc8(0xFF, 0x1D, data[..len - 1].iter().copied());
                u64::from(!crc)
            }
            ChecksumAlgorithm::Pedal => {
                // bytes are fed last-to-first
                let crc = crc8(0xFF, 0xD5, data[..len - 1].iter().rev().copied());
                u64::from(crc)
            }
            ChecksumAlgorithm::Volkswagen { pepper } => {
                let counter = data.get(1).map_or(0, |b| b & 0x0F);
                let pepper = pepper[counter as usize];
                let crc = crc8(
                    0xFF,
                    0x2F,
                    data[1..].iter().copied().chain(std::iter::once(pepper)),
                );
                u64::from(crc ^ 0xFF)
            }
        }
    }
}

/// Compute the checksum a message's frame should carry
///
/// Returns `None` if the message declares no checksum signal. The checksum
/// field of `data` is treated as zero regardless of its current content.
pub fn frame_checksum(message: &MessageDefinition, data: &[u8]) -> Result<Option<u64>> {
    let Some(signal) = message.checksum_signal() else {
        return Ok(None);
    };
    let SignalRole::Checksum(algorithm) = signal.role else {
        return Ok(None);
    };

    let mut scratch = data.to_vec();
    bit_codec::insert(&mut scratch, signal, 0)?;
    let checksum = algorithm.compute(message.address, &scratch);
    Ok(Some(checksum & bit_codec::field_mask(signal.length)))
}

fn nibble_sum(mut value: u32) -> u64 {
    let mut sum = 0;
    while value != 0 {
        sum += u64::from(value & 0x0F);
        value >>= 4;
    }
    sum
}

fn byte_sum(value: u32) -> u64 {
    bytes_sum(&value.to_le_bytes())
}

fn bytes_sum(bytes: &[u8]) -> u64 {
    bytes.iter().map(|&b| u64::from(b)).sum()
}

fn crc8(init: u8, poly: u8, bytes: impl Iterator<Item = u8>) -> u8 {
    let mut crc = init;
    for byte in bytes {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ poly
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::database::{ByteOrder, SignalDefinition};

    #[test]
    fn test_honda_nibble_sum() {
        // address nibbles 1+2+3, payload nibbles 1+2+3 (last nibble skipped)
        let checksum = ChecksumAlgorithm::Honda.compute(0x123, &[0x12, 0x30]);
        assert_eq!(checksum, 0xC);
    }

    #[test]
    fn test_toyota_byte_sum() {
        // 4 + (0xE4 + 0x02) + (1 + 2 + 3)
        let checksum = ChecksumAlgorithm::Toyota.compute(0x2E4, &[0x01, 0x02, 0x03, 0x00]);
        assert_eq!(checksum, 0xF0);
    }

    #[test]
    fn test_subaru_skips_first_byte() {
        let checksum = ChecksumAlgorithm::Subaru.compute(0x122, &[0x00, 0x10, 0x20]);
        assert_eq!(checksum, 0x53);
        let ignored_first = ChecksumAlgorithm::Subaru.compute(0x122, &[0xAA, 0x10, 0x20]);
        assert_eq!(ignored_first, 0x53);
    }

    #[test]
    fn test_chrysler_is_crc8_j1850() {
        let mut data = b"123456789".to_vec();
        data.push(0);
        assert_eq!(ChecksumAlgorithm::Chrysler.compute(0x292, &data), 0x4B);
    }

    #[test]
    fn test_pedal_feeds_bytes_in_reverse() {
        assert_eq!(ChecksumAlgorithm::Pedal.compute(0x200, &[0x00, 0x00]), 0xF9);
        assert_eq!(ChecksumAlgorithm::Pedal.compute(0x200, &[0x01, 0x02, 0x00]), 0xBB);
    }

    #[test]
    fn test_volkswagen_autosar_crc_with_pepper() {
        // payload[1..] is "12345678", counter nibble of '1' is 1, pepper[1] = '9'
        let mut data = vec![0x00];
        data.extend_from_slice(b"12345678");
        let mut pepper = [0u8; 16];
        pepper[1] = b'9';
        let checksum = ChecksumAlgorithm::Volkswagen { pepper }.compute(0x126, &data);
        assert_eq!(checksum, 0xDF);
    }

    #[test]
    fn test_frame_checksum_ignores_current_field() {
        let message = MessageDefinition::new(0x2E4, "STEERING_LKA", 4)
            .with_signal(SignalDefinition::new("DATA", 0, 24, ByteOrder::BigEndian))
            .with_signal(
                SignalDefinition::new("CHECKSUM", 24, 8, ByteOrder::BigEndian)
                    .with_role(SignalRole::Checksum(ChecksumAlgorithm::Toyota)),
            );

        let clean = frame_checksum(&message, &[0x01, 0x02, 0x03, 0x00]).unwrap();
        let dirty = frame_checksum(&message, &[0x01, 0x02, 0x03, 0x77]).unwrap();
        assert_eq!(clean, Some(0xF0));
        assert_eq!(dirty, clean);

        let plain = MessageDefinition::new(0x10, "PLAIN", 1);
        assert_eq!(frame_checksum(&plain, &[0]).unwrap(), None);
    }
}
