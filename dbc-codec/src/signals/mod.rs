//! Signal database and DBC parser
//!
//! This module contains the DBC loader and the signal database every codec
//! component reads its definitions from.

pub mod database;
pub mod dbc;

// Re-export key types for convenience
pub use database::{
    ByteOrder, DatabaseStats, MessageDefinition, SignalDatabase, SignalDefinition, SignalRole,
    ValueType,
};
pub use dbc::{parse_dbc_file, parse_dbc_str, DbcFlavor};
