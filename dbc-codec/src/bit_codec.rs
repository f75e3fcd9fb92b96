//! Bit Codec
//!
//! Stateless translation between a frame's byte buffer and the value of one
//! signal. Handles bit extraction and insertion for both byte orders, sign
//! extension and the affine factor/offset transform.
//!
//! # Bit numbering
//!
//! Both byte orders count bit positions across the whole buffer, with
//! position `p` living in byte `p / 8`:
//!
//! - Big-endian (Motorola): bit 0 is the MSB of byte 0, positions grow
//!   left-to-right in on-the-wire order. `start_bit` is the field's MSB and the
//!   field runs up to `start_bit + length - 1`, its LSB.
//! - Little-endian (Intel): bit 0 is the LSB of byte 0, positions grow
//!   right-to-left within a byte and then into the next byte. `start_bit` is
//!   the field's LSB.

use crate::signals::database::{ByteOrder, SignalDefinition};
use crate::types::{CodecError, Result};

/// Extract the raw (unsigned, unscaled) bit field of a signal
///
/// Fails with [`CodecError::FrameTooShort`] if the field extends past the end
/// of `data`.
pub fn extract(data: &[u8], signal: &SignalDefinition) -> Result<u64> {
    check_bounds(data.len(), signal)?;

    let start_bit = signal.start_bit as usize;
    let length = signal.length as usize;

    let raw = match signal.byte_order {
        ByteOrder::LittleEndian => extract_little_endian(data, start_bit, length),
        ByteOrder::BigEndian => extract_big_endian(data, start_bit, length),
    };
    Ok(raw)
}

/// Insert a raw bit field into `data`
///
/// Only the bits belonging to the signal are modified; neighbouring signals
/// sharing the same bytes are preserved. Bits of `raw` above the signal
/// length are ignored.
pub fn insert(data: &mut [u8], signal: &SignalDefinition, raw: u64) -> Result<()> {
    check_bounds(data.len(), signal)?;

    let start_bit = signal.start_bit as usize;
    let length = signal.length as usize;

    match signal.byte_order {
        ByteOrder::LittleEndian => insert_little_endian(data, start_bit, length, raw),
        ByteOrder::BigEndian => insert_big_endian(data, start_bit, length, raw),
    }
    Ok(())
}

/// Sign-extend a value from N bits to 64 bits
///
/// If the value's MSB is 1, fill the upper bits with 1s.
pub fn to_signed(value: u64, bit_length: u16) -> i64 {
    if bit_length == 0 {
        return 0;
    }
    if bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        let mask = !0u64 << bit_length;
        (value | mask) as i64
    } else {
        value as i64
    }
}

/// Apply the factor/offset transform: `integer * factor + offset`
pub fn to_physical(integer: i64, factor: f64, offset: f64) -> f64 {
    integer as f64 * factor + offset
}

/// Invert the factor/offset transform into raw field bits
///
/// The value is rounded to the nearest integer and then saturated to the
/// range the field can represent (`[0, 2^length - 1]` unsigned,
/// `[-2^(length-1), 2^(length-1) - 1]` signed). Out-of-range inputs are
/// clamped rather than rejected: physical ranges are the caller's to
/// validate. NaN encodes as zero.
///
/// Signed results are returned in two's complement, masked to `length` bits.
pub fn from_physical(value: f64, factor: f64, offset: f64, length: u16, signed: bool) -> u64 {
    let scaled = ((value - offset) / factor).round();
    if scaled.is_nan() || length == 0 {
        return 0;
    }

    let mask = field_mask(length);
    if signed {
        let (min, max) = signed_bounds(length);
        // `as` saturates at the i64 limits
        let clamped = (scaled as i64).clamp(min, max);
        (clamped as u64) & mask
    } else {
        // negative values saturate to zero
        (scaled as u64).min(mask)
    }
}

/// Invert the factor/offset transform, wrapping modulo `2^length`
///
/// Used for counters, where 16 in a 4-bit field means 0 rather than 15.
/// NaN and infinities encode as zero.
pub fn wrap_physical(value: f64, factor: f64, offset: f64, length: u16) -> u64 {
    let scaled = ((value - offset) / factor).round();
    if !scaled.is_finite() {
        return 0;
    }
    (scaled as i64 as u64) & field_mask(length)
}

/// Decode the physical value of a signal from a frame
pub fn decode_signal(data: &[u8], signal: &SignalDefinition) -> Result<f64> {
    let raw = extract(data, signal)?;
    Ok(raw_to_physical(raw, signal))
}

/// Encode a physical value into a frame
pub fn encode_signal(data: &mut [u8], signal: &SignalDefinition, value: f64) -> Result<()> {
    let raw = from_physical(
        value,
        signal.factor,
        signal.offset,
        signal.length,
        signal.is_signed(),
    );
    insert(data, signal, raw)
}

/// Convert raw field bits to a physical value, honoring signedness
pub fn raw_to_physical(raw: u64, signal: &SignalDefinition) -> f64 {
    if signal.is_signed() {
        to_physical(to_signed(raw, signal.length), signal.factor, signal.offset)
    } else {
        raw as f64 * signal.factor + signal.offset
    }
}

/// All-ones mask covering `length` bits
pub fn field_mask(length: u16) -> u64 {
    if length >= 64 {
        u64::MAX
    } else {
        (1u64 << length) - 1
    }
}

fn signed_bounds(length: u16) -> (i64, i64) {
    if length == 0 {
        (0, 0)
    } else if length >= 64 {
        (i64::MIN, i64::MAX)
    } else {
        let half = 1i64 << (length - 1);
        (-half, half - 1)
    }
}

fn check_bounds(available_bytes: usize, signal: &SignalDefinition) -> Result<()> {
    let required_bits = signal.required_bits();
    if required_bits > available_bytes * 8 {
        return Err(CodecError::FrameTooShort {
            signal: signal.name.clone(),
            required_bits,
            available_bytes,
        });
    }
    Ok(())
}

/// Little-endian: bit `p` is bit `p % 8` of byte `p / 8`, first bit is the LSB
fn extract_little_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
    let mut result: u64 = 0;

    for i in 0..length {
        let bit_pos = start_bit + i;
        let bit_value = (data[bit_pos / 8] >> (bit_pos % 8)) & 0x01;
        result |= (bit_value as u64) << i;
    }

    result
}

/// Big-endian: bit `p` is bit `7 - p % 8` of byte `p / 8`, first bit is the MSB
fn extract_big_endian(data: &[u8], start_bit: usize, length: usize) -> u64 {
    let mut result: u64 = 0;

    for i in 0..length {
        let bit_pos = start_bit + i;
        let bit_in_byte = 7 - (bit_pos % 8);
        let bit_value = (data[bit_pos / 8] >> bit_in_byte) & 0x01;
        result |= (bit_value as u64) << (length - 1 - i);
    }

    result
}

fn insert_little_endian(data: &mut [u8], start_bit: usize, length: usize, raw: u64) {
    for i in 0..length {
        let bit_pos = start_bit + i;
        let bit = ((raw >> i) & 0x01) as u8;
        write_bit(&mut data[bit_pos / 8], (bit_pos % 8) as u8, bit);
    }
}

fn insert_big_endian(data: &mut [u8], start_bit: usize, length: usize, raw: u64) {
    for i in 0..length {
        let bit_pos = start_bit + i;
        let bit = ((raw >> (length - 1 - i)) & 0x01) as u8;
        write_bit(&mut data[bit_pos / 8], 7 - (bit_pos % 8) as u8, bit);
    }
}

fn write_bit(byte: &mut u8, bit_in_byte: u8, bit: u8) {
    *byte = (*byte & !(1 << bit_in_byte)) | (bit << bit_in_byte);
}
