//! Signal database
//!
//! In-memory schema of messages and signals, indexed by address and by name.
//! Built once (programmatically or from a DBC file) and then shared read-only
//! by any number of decoders and encoders.

use crate::checksum::ChecksumAlgorithm;
use crate::types::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum payload size of a CAN-FD frame in bytes
pub const MAX_MESSAGE_SIZE: usize = 64;

/// A complete CAN message definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDefinition {
    /// CAN message ID
    pub address: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    #[serde(default)]
    pub sender: Option<String>,
    /// All signals in this message
    pub signals: Vec<SignalDefinition>,
}

impl MessageDefinition {
    /// Create an empty message definition
    pub fn new(address: u32, name: impl Into<String>, size: usize) -> Self {
        Self {
            address,
            name: name.into(),
            size,
            sender: None,
            signals: Vec::new(),
        }
    }

    /// Builder method: append a signal
    pub fn with_signal(mut self, signal: SignalDefinition) -> Self {
        self.signals.push(signal);
        self
    }

    /// Builder method: set the transmitting node
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Look up a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// The signal carrying the rolling counter, if any
    pub fn counter_signal(&self) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.role == SignalRole::Counter)
    }

    /// The signal carrying the checksum, if any
    pub fn checksum_signal(&self) -> Option<&SignalDefinition> {
        self.signals
            .iter()
            .find(|s| matches!(s.role, SignalRole::Checksum(_)))
    }
}

/// A CAN signal definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Address of the owning message (filled in when the message is added)
    #[serde(default)]
    pub message_address: u32,
    /// Start bit: MSB position for big-endian, LSB position for little-endian
    pub start_bit: u16,
    /// Length in bits (1-64)
    pub length: u16,
    /// Byte order of the bit field
    pub byte_order: ByteOrder,
    /// Value type (signed/unsigned)
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value (advisory)
    #[serde(default)]
    pub min: f64,
    /// Maximum physical value (advisory)
    #[serde(default)]
    pub max: f64,
    /// Engineering unit (e.g., "km/h", "V")
    #[serde(default)]
    pub unit: Option<String>,
    /// Value table for enum-like values (raw_value -> description)
    #[serde(default)]
    pub value_table: Option<HashMap<i64, String>>,
    /// Whether the encoder manages this signal
    #[serde(default)]
    pub role: SignalRole,
}

impl SignalDefinition {
    /// Create an unscaled unsigned signal
    pub fn new(name: impl Into<String>, start_bit: u16, length: u16, byte_order: ByteOrder) -> Self {
        Self {
            name: name.into(),
            message_address: 0,
            start_bit,
            length,
            byte_order,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 0.0,
            unit: None,
            value_table: None,
            role: SignalRole::Data,
        }
    }

    /// Builder method: mark the signal as two's-complement signed
    pub fn signed(mut self) -> Self {
        self.value_type = ValueType::Signed;
        self
    }

    /// Builder method: set factor and offset
    pub fn with_scale(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    /// Builder method: set the advisory physical range
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Builder method: set the role
    pub fn with_role(mut self, role: SignalRole) -> Self {
        self.role = role;
        self
    }

    /// Builder method: set the engineering unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// True if the signal is two's-complement signed
    pub fn is_signed(&self) -> bool {
        self.value_type == ValueType::Signed
    }

    /// Number of payload bits the signal needs, counted from bit position 0
    pub fn required_bits(&self) -> usize {
        self.start_bit as usize + self.length as usize
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// Signed integer
    Signed,
    /// Unsigned integer
    Unsigned,
}

/// Special meaning a signal has for the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignalRole {
    /// Plain data, written only when the caller supplies a value
    #[default]
    Data,
    /// Rolling counter, auto-incremented on every pack
    Counter,
    /// Checksum over the rest of the frame, computed last
    Checksum(ChecksumAlgorithm),
}

/// The signal database
#[derive(Debug, Clone, Default)]
pub struct SignalDatabase {
    /// Database name (usually the DBC file stem)
    name: String,

    /// All message definitions in insertion order
    messages: Vec<MessageDefinition>,

    /// Key: CAN ID, Value: index into `messages`
    address_lookup: HashMap<u32, usize>,

    /// Key: message name, Value: index into `messages`
    message_lookup: HashMap<String, usize>,

    /// Key: signal name, Value: list of (CAN ID, signal index) tuples
    signal_lookup: HashMap<String, Vec<(u32, usize)>>,
}

impl SignalDatabase {
    /// Create a new empty signal database
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new empty signal database with a name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a message definition to the database
    ///
    /// Rejects duplicate addresses or names, messages larger than a CAN-FD
    /// frame, signals that do not fit the declared size, and messages with
    /// more than one counter or checksum signal.
    pub fn add_message(&mut self, mut message: MessageDefinition) -> Result<()> {
        if self.address_lookup.contains_key(&message.address) {
            return Err(CodecError::DuplicateMessage(format!(
                "CAN ID 0x{:X} ({})",
                message.address, message.name
            )));
        }
        if self.message_lookup.contains_key(&message.name) {
            return Err(CodecError::DuplicateMessage(message.name));
        }
        validate_message(&message)?;

        let address = message.address;
        for signal in &mut message.signals {
            signal.message_address = address;
        }

        for (sig_idx, signal) in message.signals.iter().enumerate() {
            self.signal_lookup
                .entry(signal.name.clone())
                .or_default()
                .push((address, sig_idx));
        }

        let msg_idx = self.messages.len();
        self.address_lookup.insert(address, msg_idx);
        self.message_lookup.insert(message.name.clone(), msg_idx);
        self.messages.push(message);
        Ok(())
    }

    /// Replace the checksum algorithm of a message's checksum signal
    ///
    /// Used to install algorithm parameters a DBC file cannot carry, such as
    /// a Volkswagen pepper table.
    pub fn set_checksum_algorithm(
        &mut self,
        message_name: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<()> {
        let msg_idx = *self
            .message_lookup
            .get(message_name)
            .ok_or_else(|| CodecError::MessageNotFound(message_name.to_string()))?;
        let message = &mut self.messages[msg_idx];
        let signal = message
            .signals
            .iter_mut()
            .find(|s| matches!(s.role, SignalRole::Checksum(_)))
            .ok_or_else(|| CodecError::SignalNotFound {
                message: message_name.to_string(),
                signal: "<checksum>".to_string(),
            })?;
        signal.role = SignalRole::Checksum(algorithm);
        Ok(())
    }

    /// Get a message definition by CAN ID
    pub fn get_message(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.address_lookup
            .get(&can_id)
            .map(|&idx| &self.messages[idx])
    }

    /// Get a message definition by name
    pub fn get_message_by_name(&self, message_name: &str) -> Option<&MessageDefinition> {
        self.message_lookup
            .get(message_name)
            .map(|&idx| &self.messages[idx])
    }

    /// Get a signal definition by message and signal name
    pub fn get_signal(&self, message_name: &str, signal_name: &str) -> Option<&SignalDefinition> {
        self.get_message_by_name(message_name)
            .and_then(|msg| msg.signal(signal_name))
    }

    /// Find all messages containing a specific signal name
    pub fn find_signal(&self, signal_name: &str) -> Vec<(u32, &SignalDefinition)> {
        self.signal_lookup
            .get(signal_name)
            .map(|locations| {
                locations
                    .iter()
                    .filter_map(|(can_id, sig_idx)| {
                        self.get_message(*can_id)
                            .and_then(|msg| msg.signals.get(*sig_idx))
                            .map(|sig| (*can_id, sig))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Iterate over all messages in insertion order
    pub fn messages(&self) -> impl Iterator<Item = &MessageDefinition> {
        self.messages.iter()
    }

    /// Get database statistics
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.iter().map(|msg| msg.signals.len()).sum(),
            num_counters: self
                .messages
                .iter()
                .filter(|msg| msg.counter_signal().is_some())
                .count(),
            num_checksums: self
                .messages
                .iter()
                .filter(|msg| msg.checksum_signal().is_some())
                .count(),
        }
    }

    /// Get all unique CAN IDs in the database
    pub fn get_all_can_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.address_lookup.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

fn validate_message(message: &MessageDefinition) -> Result<()> {
    if message.size > MAX_MESSAGE_SIZE {
        return Err(CodecError::InvalidSignalDefinition(format!(
            "message '{}' declares {} bytes, maximum is {}",
            message.name, message.size, MAX_MESSAGE_SIZE
        )));
    }

    for signal in &message.signals {
        if signal.length == 0 || signal.length > 64 {
            return Err(CodecError::InvalidSignalDefinition(format!(
                "signal '{}' in '{}' has length {}, expected 1-64",
                signal.name, message.name, signal.length
            )));
        }
        if signal.required_bits() > message.size * 8 {
            return Err(CodecError::InvalidSignalDefinition(format!(
                "signal '{}' ends at bit {} but '{}' is {} bytes",
                signal.name,
                signal.required_bits(),
                message.name,
                message.size
            )));
        }
        if signal.factor == 0.0 || !signal.factor.is_finite() {
            return Err(CodecError::InvalidSignalDefinition(format!(
                "signal '{}' in '{}' has factor {}",
                signal.name, message.name, signal.factor
            )));
        }
    }

    let counters = message
        .signals
        .iter()
        .filter(|s| s.role == SignalRole::Counter)
        .count();
    let checksums = message
        .signals
        .iter()
        .filter(|s| matches!(s.role, SignalRole::Checksum(_)))
        .count();
    if counters > 1 || checksums > 1 {
        return Err(CodecError::InvalidSignalDefinition(format!(
            "message '{}' declares {} counter and {} checksum signals",
            message.name, counters, checksums
        )));
    }

    Ok(())
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
    /// Messages with a counter signal
    pub num_counters: usize,
    /// Messages with a checksum signal
    pub num_checksums: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_data() -> MessageDefinition {
        MessageDefinition::new(0x123, "EngineData", 8)
            .with_sender("ECU1")
            .with_signal(
                SignalDefinition::new("EngineSpeed", 0, 16, ByteOrder::LittleEndian)
                    .with_range(0.0, 8000.0)
                    .with_unit("rpm"),
            )
            .with_signal(SignalDefinition::new("COUNTER", 60, 4, ByteOrder::LittleEndian).with_role(SignalRole::Counter))
    }

    #[test]
    fn test_empty_database() {
        let db = SignalDatabase::new();
        let stats = db.stats();
        assert_eq!(stats.num_messages, 0);
        assert_eq!(stats.num_signals, 0);
        assert!(db.get_all_can_ids().is_empty());
    }

    #[test]
    fn test_add_message() {
        let mut db = SignalDatabase::with_name("test");
        db.add_message(engine_data()).unwrap();

        let stats = db.stats();
        assert_eq!(stats.num_messages, 1);
        assert_eq!(stats.num_signals, 2);
        assert_eq!(stats.num_counters, 1);
        assert_eq!(stats.num_checksums, 0);

        let msg = db.get_message(0x123).unwrap();
        assert_eq!(msg.name, "EngineData");
        assert_eq!(msg.signals[0].message_address, 0x123);
        assert_eq!(msg.counter_signal().unwrap().name, "COUNTER");

        let by_name = db.get_message_by_name("EngineData").unwrap();
        assert_eq!(by_name.address, 0x123);

        let found = db.find_signal("EngineSpeed");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 0x123);
        assert!(db.get_signal("EngineData", "Missing").is_none());
    }

    #[test]
    fn test_duplicate_message_rejected() {
        let mut db = SignalDatabase::new();
        db.add_message(engine_data()).unwrap();

        let same_address = MessageDefinition::new(0x123, "Other", 8);
        assert!(matches!(
            db.add_message(same_address),
            Err(CodecError::DuplicateMessage(_))
        ));

        let same_name = MessageDefinition::new(0x124, "EngineData", 8);
        assert!(matches!(
            db.add_message(same_name),
            Err(CodecError::DuplicateMessage(_))
        ));
    }

    #[test]
    fn test_signal_outside_message_rejected() {
        let mut db = SignalDatabase::new();
        let msg = MessageDefinition::new(0x10, "Small", 2)
            .with_signal(SignalDefinition::new("Wide", 8, 16, ByteOrder::BigEndian));
        assert!(matches!(
            db.add_message(msg),
            Err(CodecError::InvalidSignalDefinition(_))
        ));
    }

    #[test]
    fn test_two_counters_rejected() {
        let mut db = SignalDatabase::new();
        let msg = MessageDefinition::new(0x10, "TwoCounters", 8)
            .with_signal(SignalDefinition::new("A", 0, 4, ByteOrder::LittleEndian).with_role(SignalRole::Counter))
            .with_signal(SignalDefinition::new("B", 4, 4, ByteOrder::LittleEndian).with_role(SignalRole::Counter));
        assert!(db.add_message(msg).is_err());
    }

    #[test]
    fn test_set_checksum_algorithm() {
        let mut db = SignalDatabase::new();
        let msg = MessageDefinition::new(0x126, "HCA_01", 8).with_signal(
            SignalDefinition::new("CHECKSUM", 0, 8, ByteOrder::LittleEndian)
                .with_role(SignalRole::Checksum(ChecksumAlgorithm::Volkswagen { pepper: [0; 16] })),
        );
        db.add_message(msg).unwrap();

        let pepper = [0xDA; 16];
        db.set_checksum_algorithm("HCA_01", ChecksumAlgorithm::Volkswagen { pepper })
            .unwrap();
        let sig = db.get_message_by_name("HCA_01").unwrap().checksum_signal().unwrap();
        assert_eq!(sig.role, SignalRole::Checksum(ChecksumAlgorithm::Volkswagen { pepper }));

        assert!(db
            .set_checksum_algorithm("Missing", ChecksumAlgorithm::Honda)
            .is_err());
    }
}
