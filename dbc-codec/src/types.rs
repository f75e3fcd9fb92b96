//! Core types for the DBC codec library
//!
//! This module defines the raw frame record exchanged with the transport layer
//! and the error type shared by the decoder, the encoder and the schema loader.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Timestamp type used throughout the codec (nanoseconds, monotonic)
pub type Timestamp = u64;

/// Raw CAN frame at the transport boundary
///
/// Frames are consumed by value by the decoder and produced by the encoder.
/// The codec never mutates a frame it did not build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanFrame {
    /// CAN message ID (11-bit or 29-bit, without the extended flag)
    pub address: u32,
    /// Arrival time in nanoseconds, `None` if the transport did not stamp it
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    /// Frame data bytes (0-8 bytes for classic CAN, up to 64 for CAN-FD)
    pub payload: Vec<u8>,
    /// Bus index the frame was received on or should be sent to
    pub source_bus: u8,
}

impl CanFrame {
    /// Create an unstamped frame
    pub fn new(address: u32, payload: Vec<u8>, source_bus: u8) -> Self {
        Self {
            address,
            timestamp: None,
            payload,
            source_bus,
        }
    }

    /// Builder method: set the arrival timestamp
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Frame timestamp, or `fallback` if the transport left it unset
    pub fn timestamp_or(&self, fallback: Timestamp) -> Timestamp {
        self.timestamp.unwrap_or(fallback)
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.payload.len()
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}#", self.address)?;
        for byte in &self.payload {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Errors that can occur while building a schema, configuring a decoder,
/// or encoding and decoding frames
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to parse DBC file: {0}")]
    DbcParseError(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Message not found: CAN ID 0x{0:X}")]
    UnknownAddress(u32),

    #[error("Signal '{signal}' not found in message '{message}'")]
    SignalNotFound { message: String, signal: String },

    #[error("Duplicate message definition: {0}")]
    DuplicateMessage(String),

    #[error("Invalid signal definition: {0}")]
    InvalidSignalDefinition(String),

    #[error("Invalid decoder configuration: {0}")]
    InvalidConfig(String),

    #[error("Signal '{signal}' needs {required_bits} bits but frame only has {available_bytes} bytes")]
    FrameTooShort {
        signal: String,
        required_bits: usize,
        available_bytes: usize,
    },

    #[error("Message '{message}' is {expected_bytes} bytes but frame only has {available_bytes}")]
    PayloadTooShort {
        message: String,
        expected_bytes: usize,
        available_bytes: usize,
    },

    #[error("Checksum mismatch in message '{message}': expected 0x{expected:X}, found 0x{found:X}")]
    ChecksumMismatch {
        message: String,
        expected: u64,
        found: u64,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_timestamp_fallback() {
        let frame = CanFrame::new(0x123, vec![1, 2, 3], 0);
        assert_eq!(frame.timestamp_or(42), 42);

        let frame = frame.with_timestamp(7);
        assert_eq!(frame.timestamp_or(42), 7);
        assert_eq!(frame.dlc(), 3);
    }

    #[test]
    fn test_zero_timestamp_is_a_real_stamp() {
        let frame = CanFrame::new(0x123, vec![], 0).with_timestamp(0);
        assert_eq!(frame.timestamp, Some(0));
        assert_eq!(frame.timestamp_or(42), 0);
    }

    #[test]
    fn test_frame_display() {
        let frame = CanFrame::new(0x1A4, vec![0xDE, 0xAD, 0x01], 1);
        assert_eq!(frame.to_string(), "1A4#DEAD01");
    }

    #[test]
    fn test_error_display() {
        let err = CodecError::FrameTooShort {
            signal: "SPEED".to_string(),
            required_bits: 64,
            available_bytes: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("SPEED"));
        assert!(msg.contains("64 bits"));
        assert!(msg.contains("3 bytes"));
    }
}
