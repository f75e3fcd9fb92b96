//! DBC file loader
//!
//! Parses Vector DBC files with the `can-dbc` crate and converts them into the
//! internal signal database. Two things happen on the way:
//!
//! - Big-endian start bits are converted from DBC's "sawtooth" numbering
//!   (byte * 8 + bit, MSB of the field) to the sequential numbering used by
//!   the bit codec.
//! - Counter and checksum roles are inferred from signal names according to
//!   the vendor convention (`DbcFlavor`) of the file.

use crate::checksum::ChecksumAlgorithm;
use crate::signals::database::{
    ByteOrder, MessageDefinition, SignalDatabase, SignalDefinition, SignalRole, ValueType,
};
use crate::types::{CodecError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 29-bit identifier bits of an extended CAN ID
const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Vendor convention used to recognise counter and checksum signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbcFlavor {
    Honda,
    Toyota,
    Subaru,
    Chrysler,
    Volkswagen,
    /// No vendor convention; only the pedal interceptor signals get a role
    Generic,
}

impl DbcFlavor {
    /// Guess the flavor from a DBC name such as `honda_civic_touring_2016_can_generated`
    pub fn from_dbc_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.starts_with("honda_") || name.starts_with("acura_") {
            DbcFlavor::Honda
        } else if name.starts_with("toyota_") || name.starts_with("lexus_") {
            DbcFlavor::Toyota
        } else if name.starts_with("subaru_") {
            DbcFlavor::Subaru
        } else if name.starts_with("chrysler_") {
            DbcFlavor::Chrysler
        } else if name.starts_with("vw_") {
            DbcFlavor::Volkswagen
        } else {
            DbcFlavor::Generic
        }
    }

    /// Role of a signal with the given name under this convention
    pub fn role_for(&self, signal_name: &str) -> SignalRole {
        match signal_name {
            "CHECKSUM_PEDAL" => return SignalRole::Checksum(ChecksumAlgorithm::Pedal),
            "COUNTER_PEDAL" => return SignalRole::Counter,
            _ => {}
        }

        match (self, signal_name) {
            (DbcFlavor::Honda, "CHECKSUM") => SignalRole::Checksum(ChecksumAlgorithm::Honda),
            (DbcFlavor::Honda, "COUNTER") => SignalRole::Counter,
            (DbcFlavor::Toyota, "CHECKSUM") => SignalRole::Checksum(ChecksumAlgorithm::Toyota),
            (DbcFlavor::Subaru, "Checksum") => SignalRole::Checksum(ChecksumAlgorithm::Subaru),
            (DbcFlavor::Subaru, "Counter") => SignalRole::Counter,
            (DbcFlavor::Chrysler, "CHECKSUM") => SignalRole::Checksum(ChecksumAlgorithm::Chrysler),
            (DbcFlavor::Chrysler, "COUNTER") => SignalRole::Counter,
            (DbcFlavor::Volkswagen, "CHECKSUM") => {
                SignalRole::Checksum(ChecksumAlgorithm::Volkswagen { pepper: [0; 16] })
            }
            (DbcFlavor::Volkswagen, "COUNTER") => SignalRole::Counter,
            _ => SignalRole::Data,
        }
    }
}

/// Parse a DBC file into a signal database
///
/// The database is named after the file stem. If `flavor` is `None` it is
/// guessed from that name.
pub fn parse_dbc_file(path: &Path, flavor: Option<DbcFlavor>) -> Result<SignalDatabase> {
    log::info!("Parsing DBC file: {:?}", path);

    let bytes = std::fs::read(path).map_err(|e| {
        CodecError::DbcParseError(format!("Failed to read file {:?}: {}", path, e))
    })?;

    // Try UTF-8 first, then fall back to Latin-1 (compatible with Windows-1252)
    let dbc_content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("DBC file is not UTF-8, trying Latin-1 encoding");
            e.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    let name = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let db = parse_dbc_str(&dbc_content, &name, flavor)?;

    log::info!(
        "Parsed {} messages from {:?}",
        db.stats().num_messages,
        path
    );

    Ok(db)
}

/// Parse DBC text into a signal database named `name`
pub fn parse_dbc_str(content: &str, name: &str, flavor: Option<DbcFlavor>) -> Result<SignalDatabase> {
    let dbc = can_dbc::DBC::from_slice(content.as_bytes()).map_err(|e| {
        CodecError::DbcParseError(format!("Failed to parse DBC '{}': {:?}", name, e))
    })?;

    let flavor = flavor.unwrap_or_else(|| DbcFlavor::from_dbc_name(name));
    log::debug!("Using {:?} signal conventions for '{}'", flavor, name);

    let mut db = SignalDatabase::with_name(name);
    for dbc_msg in dbc.messages() {
        let message = convert_message(&dbc, dbc_msg, flavor)?;
        db.add_message(message)?;
    }

    Ok(db)
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    flavor: DbcFlavor,
) -> Result<MessageDefinition> {
    // can-dbc keeps the DBC extended-frame flag (bit 31) in the raw ID
    let address = dbc_msg.message_id().0 & EXTENDED_ID_MASK;

    let mut signals = Vec::with_capacity(dbc_msg.signals().len());
    for dbc_sig in dbc_msg.signals() {
        let mut signal = convert_signal(dbc_sig, flavor)?;
        signal.message_address = address;
        signal.value_table = dbc
            .value_descriptions_for_signal(*dbc_msg.message_id(), dbc_sig.name())
            .map(|descriptions| {
                descriptions
                    .iter()
                    .map(|desc| (*desc.a() as i64, desc.b().to_string()))
                    .collect::<HashMap<i64, String>>()
            });
        signals.push(signal);
    }

    Ok(MessageDefinition {
        address,
        name: dbc_msg.message_name().to_string(),
        size: *dbc_msg.message_size() as usize,
        sender: match dbc_msg.transmitter() {
            can_dbc::Transmitter::NodeName(name) => Some(name.to_string()),
            _ => None,
        },
        signals,
    })
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(dbc_sig: &can_dbc::Signal, flavor: DbcFlavor) -> Result<SignalDefinition> {
    let dbc_start = *dbc_sig.start_bit();
    let length = *dbc_sig.signal_size();
    if length == 0 || length > 64 || dbc_start >= 512 {
        return Err(CodecError::InvalidSignalDefinition(format!(
            "signal '{}' has start bit {} and length {}",
            dbc_sig.name(),
            dbc_start,
            length
        )));
    }

    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let start_bit = match byte_order {
        ByteOrder::LittleEndian => dbc_start as u16,
        ByteOrder::BigEndian => sawtooth_to_sequential(dbc_start as u16),
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    Ok(SignalDefinition {
        name: dbc_sig.name().to_string(),
        message_address: 0,
        start_bit,
        length: length as u16,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        min: *dbc_sig.min(),
        max: *dbc_sig.max(),
        unit: if dbc_sig.unit().is_empty() {
            None
        } else {
            Some(dbc_sig.unit().to_string())
        },
        value_table: None,
        role: flavor.role_for(dbc_sig.name()),
    })
}

/// Convert a DBC Motorola start bit (byte * 8 + bit, bit 0 = LSB) to the
/// sequential position where bit 0 is the MSB of byte 0
pub fn sawtooth_to_sequential(start_bit: u16) -> u16 {
    (start_bit / 8) * 8 + (7 - start_bit % 8)
}
