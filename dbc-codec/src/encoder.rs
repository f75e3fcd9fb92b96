//! Signal encoder
//!
//! The [`Encoder`] packs physical signal values into a raw frame of the
//! message's declared size. Signals without a value stay zero. Counter
//! signals are filled in automatically from per-message state kept in the
//! encoder instance, and checksum signals are computed after every other
//! signal has been written.

use crate::bit_codec;
use crate::checksum;
use crate::signals::database::{MessageDefinition, SignalDatabase, SignalRole};
use crate::types::{CanFrame, CodecError, Result};
use std::collections::HashMap;

/// Stateful encoder bound to one signal database
///
/// Counter state is scoped to the instance, so independent encoders never
/// interfere. Not internally synchronized.
pub struct Encoder<'a> {
    /// Signal database the encoder reads definitions from
    signal_db: &'a SignalDatabase,
    /// Key: CAN ID, Value: counter value the next auto-filled frame carries
    counters: HashMap<u32, u64>,
}

impl<'a> Encoder<'a> {
    /// Create a new encoder
    pub fn new(signal_db: &'a SignalDatabase) -> Self {
        Self {
            signal_db,
            counters: HashMap::new(),
        }
    }

    /// Pack a message by name
    ///
    /// `values` maps signal names to physical values; out-of-range values are
    /// saturated. If the message has a counter signal that `values` does not
    /// set, `counter` is written when given, otherwise the encoder's own
    /// counter for this message is. Either way the internal counter continues
    /// from the value written.
    ///
    /// The returned frame is unstamped; stamping is the transport's job.
    ///
    /// # Example
    /// ```
    /// use dbc_codec::{ByteOrder, Encoder, MessageDefinition, SignalDatabase, SignalDefinition};
    ///
    /// let mut db = SignalDatabase::new();
    /// db.add_message(
    ///     MessageDefinition::new(0x1D0, "VSA_STATUS", 2)
    ///         .with_signal(SignalDefinition::new("USER_BRAKE", 0, 16, ByteOrder::BigEndian)),
    /// )
    /// .unwrap();
    ///
    /// let mut encoder = Encoder::new(&db);
    /// let frame = encoder.pack("VSA_STATUS", 0, [("USER_BRAKE", 258.0)], None).unwrap();
    /// assert_eq!(frame.payload, vec![0x01, 0x02]);
    /// ```
    pub fn pack<I, K>(
        &mut self,
        message_name: &str,
        bus: u8,
        values: I,
        counter: Option<u64>,
    ) -> Result<CanFrame>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let signal_db = self.signal_db;
        let message = signal_db
            .get_message_by_name(message_name)
            .ok_or_else(|| CodecError::MessageNotFound(message_name.to_string()))?;
        self.pack_message(message, bus, values, counter)
    }

    /// Pack a message by CAN ID
    pub fn pack_by_address<I, K>(
        &mut self,
        address: u32,
        bus: u8,
        values: I,
        counter: Option<u64>,
    ) -> Result<CanFrame>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let signal_db = self.signal_db;
        let message = signal_db
            .get_message(address)
            .ok_or(CodecError::UnknownAddress(address))?;
        self.pack_message(message, bus, values, counter)
    }

    /// Counter value the next auto-filled frame of a message would carry
    pub fn next_counter(&self, message_name: &str) -> Option<u64> {
        let message = self.signal_db.get_message_by_name(message_name)?;
        message.counter_signal()?;
        Some(self.counters.get(&message.address).copied().unwrap_or(0))
    }

    fn pack_message<I, K>(
        &mut self,
        message: &MessageDefinition,
        bus: u8,
        values: I,
        counter: Option<u64>,
    ) -> Result<CanFrame>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut data = vec![0u8; message.size];
        let mut supplied_counter = None;

        for (name, value) in values {
            let name = name.as_ref();
            let signal = message
                .signal(name)
                .ok_or_else(|| CodecError::SignalNotFound {
                    message: message.name.clone(),
                    signal: name.to_string(),
                })?;

            let raw = if signal.role == SignalRole::Counter {
                bit_codec::wrap_physical(value, signal.factor, signal.offset, signal.length)
            } else {
                bit_codec::from_physical(
                    value,
                    signal.factor,
                    signal.offset,
                    signal.length,
                    signal.is_signed(),
                )
            };
            bit_codec::insert(&mut data, signal, raw)?;
            if signal.role == SignalRole::Counter {
                supplied_counter = Some(raw);
            }
        }

        if let Some(signal) = message.counter_signal() {
            let mask = bit_codec::field_mask(signal.length);
            let written = match (supplied_counter, counter) {
                (Some(raw), _) => raw,
                (None, explicit) => {
                    let next = explicit.unwrap_or_else(|| {
                        self.counters.get(&message.address).copied().unwrap_or(0)
                    });
                    let raw = next & mask;
                    bit_codec::insert(&mut data, signal, raw)?;
                    raw
                }
            };
            self.counters
                .insert(message.address, written.wrapping_add(1) & mask);
        }

        if let Some(checksum) = checksum::frame_checksum(message, &data)? {
            if let Some(signal) = message.checksum_signal() {
                bit_codec::insert(&mut data, signal, checksum)?;
            }
        }

        let frame = CanFrame::new(message.address, data, bus);
        log::debug!("Packed {} on bus {}: {}", message.name, bus, frame);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;
    use crate::signals::database::{ByteOrder, SignalDefinition};

    fn test_db() -> SignalDatabase {
        let mut db = SignalDatabase::new();
        db.add_message(
            MessageDefinition::new(0x1FA, "BRAKE_COMMAND", 8)
                .with_signal(
                    SignalDefinition::new("COMPUTER_BRAKE", 0, 10, ByteOrder::BigEndian)
                        .with_scale(1.0, 0.0),
                )
                .with_signal(SignalDefinition::new("BRAKE_PUMP_REQUEST", 10, 1, ByteOrder::BigEndian))
                .with_signal(
                    SignalDefinition::new("COUNTER", 58, 2, ByteOrder::BigEndian)
                        .with_role(SignalRole::Counter),
                )
                .with_signal(
                    SignalDefinition::new("CHECKSUM", 60, 4, ByteOrder::BigEndian)
                        .with_role(SignalRole::Checksum(ChecksumAlgorithm::Honda)),
                ),
        )
        .unwrap();
        db.add_message(
            MessageDefinition::new(0x300, "PLAIN", 2)
                .with_signal(SignalDefinition::new("A", 0, 8, ByteOrder::LittleEndian))
                .with_signal(SignalDefinition::new("B", 8, 8, ByteOrder::LittleEndian)),
        )
        .unwrap();
        db
    }

    fn counter_of(frame: &CanFrame) -> u8 {
        (frame.payload[7] >> 4) & 0x03
    }

    #[test]
    fn test_unknown_message_or_signal() {
        let db = test_db();
        let mut encoder = Encoder::new(&db);

        let err = encoder.pack("NOPE", 0, [("A", 1.0)], None);
        assert!(matches!(err, Err(CodecError::MessageNotFound(_))));

        let err = encoder.pack("PLAIN", 0, [("C", 1.0)], None);
        assert!(matches!(err, Err(CodecError::SignalNotFound { .. })));

        let err = encoder.pack_by_address(0x7FF, 0, [("A", 1.0)], None);
        assert!(matches!(err, Err(CodecError::UnknownAddress(0x7FF))));
    }

    #[test]
    fn test_unsupplied_signals_are_zero() {
        let db = test_db();
        let mut encoder = Encoder::new(&db);

        let frame = encoder.pack("PLAIN", 2, [("B", 7.0)], None).unwrap();
        assert_eq!(frame.address, 0x300);
        assert_eq!(frame.timestamp, None);
        assert_eq!(frame.source_bus, 2);
        assert_eq!(frame.payload, vec![0x00, 0x07]);

        let frame = encoder
            .pack_by_address(0x300, 0, Vec::<(&str, f64)>::new(), None)
            .unwrap();
        assert_eq!(frame.payload, vec![0x00, 0x00]);
    }

    #[test]
    fn test_counter_auto_increment_wraps() {
        let db = test_db();
        let mut encoder = Encoder::new(&db);

        let counters: Vec<u8> = (0..6)
            .map(|_| {
                let frame = encoder
                    .pack("BRAKE_COMMAND", 0, [("COMPUTER_BRAKE", 10.0)], None)
                    .unwrap();
                counter_of(&frame)
            })
            .collect();
        assert_eq!(counters, vec![0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_counter_override_continues() {
        let db = test_db();
        let mut encoder = Encoder::new(&db);

        encoder.pack("BRAKE_COMMAND", 0, [("COMPUTER_BRAKE", 1.0)], None).unwrap();
        let frame = encoder
            .pack("BRAKE_COMMAND", 0, [("COMPUTER_BRAKE", 1.0)], Some(6))
            .unwrap();
        // 6 mod 4
        assert_eq!(counter_of(&frame), 2);
        assert_eq!(encoder.next_counter("BRAKE_COMMAND"), Some(3));

        let frame = encoder.pack("BRAKE_COMMAND", 0, [("COUNTER", 0.0)], None).unwrap();
        assert_eq!(counter_of(&frame), 0);
        assert_eq!(encoder.next_counter("BRAKE_COMMAND"), Some(1));
        assert_eq!(encoder.next_counter("PLAIN"), None);
    }

    #[test]
    fn test_supplied_counter_wraps_to_field_width() {
        let db = test_db();
        let mut encoder = Encoder::new(&db);

        let counters: Vec<u8> = [3.0, 4.0, 5.0, 10.0]
            .iter()
            .map(|&counter| {
                let frame = encoder
                    .pack("BRAKE_COMMAND", 0, [("COUNTER", counter)], None)
                    .unwrap();
                counter_of(&frame)
            })
            .collect();
        assert_eq!(counters, vec![3, 0, 1, 2]);
        assert_eq!(encoder.next_counter("BRAKE_COMMAND"), Some(3));
    }

    #[test]
    fn test_encoders_do_not_share_counters() {
        let db = test_db();
        let mut first = Encoder::new(&db);
        let mut second = Encoder::new(&db);

        first.pack("BRAKE_COMMAND", 0, [("COMPUTER_BRAKE", 1.0)], None).unwrap();
        first.pack("BRAKE_COMMAND", 0, [("COMPUTER_BRAKE", 1.0)], None).unwrap();
        let frame = second.pack("BRAKE_COMMAND", 0, [("COMPUTER_BRAKE", 1.0)], None).unwrap();
        assert_eq!(counter_of(&frame), 0);
    }

    #[test]
    fn test_checksum_written_last() {
        let db = test_db();
        let mut encoder = Encoder::new(&db);
        let message = db.get_message_by_name("BRAKE_COMMAND").unwrap();

        for i in 0u32..8 {
            let frame = encoder
                .pack("BRAKE_COMMAND", 0, [("COMPUTER_BRAKE", f64::from(i * 100))], None)
                .unwrap();
            let expected = checksum::frame_checksum(message, &frame.payload).unwrap().unwrap();
            assert_eq!(u64::from(frame.payload[7] & 0x0F), expected);
            assert_eq!(
                expected,
                ChecksumAlgorithm::Honda.compute(0x1FA, &{
                    let mut data = frame.payload.clone();
                    data[7] &= 0xF0;
                    data
                })
            );
        }
    }

    #[test]
    fn test_out_of_range_saturates() {
        let db = test_db();
        let mut encoder = Encoder::new(&db);
        let frame = encoder.pack("PLAIN", 0, [("A", 1000.0), ("B", -3.0)], None).unwrap();
        assert_eq!(frame.payload, vec![0xFF, 0x00]);
    }
}
