//! Decoder configuration types
//!
//! A decoder is configured once at construction with the signals to track,
//! the per-message frequency expectations and the bus to listen on. The same
//! structure deserializes from TOML/JSON so the application layer can keep it
//! in a file.

use serde::{Deserialize, Serialize};

/// Default margin applied to a message's nominal period before it is stale
pub const DEFAULT_STALENESS_MULTIPLIER: f64 = 1.2;

/// Default number of values kept per signal in the update history
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

/// Configuration for a decoder instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Signals to decode, in the order they were requested
    #[serde(default)]
    pub signals: Vec<MonitoredSignal>,

    /// Expected message frequencies used for liveness tracking
    #[serde(default)]
    pub checks: Vec<FrequencyCheck>,

    /// Only frames from this bus are ingested
    #[serde(default)]
    pub bus: u8,

    /// A message is stale once `multiplier / frequency` seconds pass without a frame
    #[serde(default = "default_staleness_multiplier")]
    pub staleness_multiplier: f64,

    /// Maximum number of undrained values kept per signal (oldest dropped first)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Drop frames whose checksum signal does not match the recomputed value
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

fn default_staleness_multiplier() -> f64 {
    DEFAULT_STALENESS_MULTIPLIER
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_true() -> bool {
    true
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            signals: Vec::new(),
            checks: Vec::new(),
            bus: 0,
            staleness_multiplier: DEFAULT_STALENESS_MULTIPLIER,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            verify_checksums: true,
        }
    }
}

/// A (signal name, message name) pair the caller wants tracked
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitoredSignal {
    /// Signal name
    pub name: String,
    /// Name of the message carrying the signal
    pub message: String,
}

impl MonitoredSignal {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl<S: Into<String>, M: Into<String>> From<(S, M)> for MonitoredSignal {
    fn from((name, message): (S, M)) -> Self {
        Self::new(name, message)
    }
}

/// Expected frequency of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyCheck {
    /// Message name
    pub message: String,
    /// Nominal frequency in Hz
    pub frequency: f64,
}

impl FrequencyCheck {
    pub fn new(message: impl Into<String>, frequency: f64) -> Self {
        Self {
            message: message.into(),
            frequency,
        }
    }

    /// Staleness timeout in nanoseconds for a given multiplier
    pub fn threshold_ns(&self, multiplier: f64) -> u64 {
        (multiplier * 1e9 / self.frequency).round() as u64
    }
}

impl<M: Into<String>> From<(M, f64)> for FrequencyCheck {
    fn from((message, frequency): (M, f64)) -> Self {
        Self::new(message, frequency)
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: track a signal
    pub fn add_signal(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.signals.push(MonitoredSignal::new(name, message));
        self
    }

    /// Builder method: add a frequency check
    pub fn add_check(mut self, message: impl Into<String>, frequency: f64) -> Self {
        self.checks.push(FrequencyCheck::new(message, frequency));
        self
    }

    /// Builder method: set the bus to listen on
    pub fn with_bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }

    /// Builder method: set the staleness multiplier
    pub fn with_staleness_multiplier(mut self, multiplier: f64) -> Self {
        self.staleness_multiplier = multiplier;
        self
    }

    /// Builder method: set the per-signal history bound
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Builder method: enable or disable checksum verification
    pub fn with_checksum_verification(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Check if a frame's bus should be processed
    pub fn should_process_bus(&self, bus: u8) -> bool {
        self.bus == bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_config_builder() {
        let config = DecoderConfig::new()
            .add_signal("STEER_TORQUE", "STEERING_CONTROL")
            .add_signal("USER_BRAKE", "VSA_STATUS")
            .add_check("STEERING_CONTROL", 100.0)
            .with_bus(1)
            .with_history_capacity(16)
            .with_checksum_verification(false);

        assert_eq!(config.signals.len(), 2);
        assert_eq!(config.signals[1], MonitoredSignal::new("USER_BRAKE", "VSA_STATUS"));
        assert_eq!(config.checks.len(), 1);
        assert_eq!(config.bus, 1);
        assert_eq!(config.history_capacity, 16);
        assert_eq!(config.staleness_multiplier, DEFAULT_STALENESS_MULTIPLIER);
        assert!(!config.verify_checksums);
        assert!(config.should_process_bus(1));
        assert!(!config.should_process_bus(0));
    }

    #[test]
    fn test_threshold() {
        let check = FrequencyCheck::new("STEERING_CONTROL", 100.0);
        assert_eq!(check.threshold_ns(1.0), 10_000_000);
        assert_eq!(check.threshold_ns(1.2), 12_000_000);

        let check: FrequencyCheck = ("VSA_STATUS", 50.0).into();
        assert_eq!(check.threshold_ns(DEFAULT_STALENESS_MULTIPLIER), 24_000_000);
    }

    #[test]
    fn test_config_deserialization_defaults() {
        let toml_content = r#"
            bus = 2

            [[signals]]
            name = "STEER_TORQUE"
            message = "STEERING_CONTROL"

            [[checks]]
            message = "STEERING_CONTROL"
            frequency = 50.0
        "#;

        let config: DecoderConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.bus, 2);
        assert_eq!(config.signals.len(), 1);
        assert_eq!(config.checks[0].frequency, 50.0);
        assert_eq!(config.staleness_multiplier, DEFAULT_STALENESS_MULTIPLIER);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert!(config.verify_checksums);
    }
}
