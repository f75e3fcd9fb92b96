//! DBC Codec Library
//!
//! Encodes and decodes CAN frames using signal definitions loaded from DBC
//! files, the way a driver-assistance controller talks to a vehicle bus.
//!
//! # Architecture
//!
//! - [`SignalDatabase`] holds message and signal definitions, built by hand
//!   or loaded from a DBC file with [`signals::dbc::parse_dbc_file`]
//! - [`bit_codec`] moves raw fields in and out of payload bytes and converts
//!   between raw and physical values
//! - [`Decoder`] ingests batches of frames, keeps the latest value and an
//!   update history per monitored signal, and tracks message liveness
//! - [`Encoder`] packs physical values into frames, filling in rolling
//!   counters and checksums
//!
//! The library does NOT:
//! - Read from or write to a CAN transport
//! - Parse multiplexed signals
//! - Synchronize access (wrap a decoder or encoder in a `Mutex` to share it)
//!
//! # Example Usage
//!
//! ```
//! use dbc_codec::{ByteOrder, Decoder, Encoder, MessageDefinition, SignalDatabase, SignalDefinition};
//!
//! let mut db = SignalDatabase::new();
//! db.add_message(
//!     MessageDefinition::new(0x1A0, "WHEEL_SPEEDS", 2)
//!         .with_signal(SignalDefinition::new("WHEEL_SPEED_FL", 0, 16, ByteOrder::BigEndian).with_scale(0.5, 0.0)),
//! )
//! .unwrap();
//!
//! let mut encoder = Encoder::new(&db);
//! let frame = encoder.pack("WHEEL_SPEEDS", 0, [("WHEEL_SPEED_FL", 12.5)], None).unwrap();
//!
//! let mut decoder = Decoder::new(
//!     &db,
//!     [("WHEEL_SPEED_FL", "WHEEL_SPEEDS")],
//!     [("WHEEL_SPEEDS", 50.0)],
//!     0,
//! )
//! .unwrap();
//! decoder.ingest([frame.with_timestamp(1_000)], 1_000);
//!
//! assert_eq!(decoder.value("WHEEL_SPEEDS", "WHEEL_SPEED_FL"), Some(12.5));
//! assert!(decoder.all_valid(1_000));
//! ```

// Public modules
pub mod bit_codec;
pub mod checksum;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod signals;
pub mod types;

// Re-export main types for convenience
pub use checksum::ChecksumAlgorithm;
pub use config::{DecoderConfig, FrequencyCheck, MonitoredSignal};
pub use decoder::{Decoder, IngestReport, Liveness, UpdateHistory, ValueTable};
pub use encoder::Encoder;
pub use signals::database::{
    ByteOrder, DatabaseStats, MessageDefinition, SignalDatabase, SignalDefinition, SignalRole,
    ValueType,
};
pub use signals::dbc::DbcFlavor;
pub use types::{CanFrame, CodecError, Result, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        let db = SignalDatabase::new();
        assert_eq!(db.stats().num_messages, 0);
        assert!(!VERSION.is_empty());
    }
}
