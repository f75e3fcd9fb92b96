//! Signal decoder
//!
//! The [`Decoder`] consumes batches of raw frames, decodes the monitored
//! signals of every matching frame and keeps three pieces of state:
//!
//! - the current value table (latest value per signal),
//! - the update history (every value since the caller last drained it),
//! - per-message liveness, derived from the last-seen timestamp and the
//!   message's expected frequency.
//!
//! Liveness is computed at query time against a caller-supplied `now`; there
//! is no background timer.

use crate::bit_codec;
use crate::checksum;
use crate::config::{DecoderConfig, FrequencyCheck, MonitoredSignal};
use crate::signals::database::{MessageDefinition, SignalDatabase, SignalDefinition};
use crate::types::{CanFrame, CodecError, Result, Timestamp};
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};

/// Current value table: message name -> signal name -> latest physical value
pub type ValueTable = HashMap<String, HashMap<String, f64>>;

/// Drained update history: message name -> signal name -> values in arrival order
pub type UpdateHistory = HashMap<String, HashMap<String, Vec<f64>>>;

/// Liveness of a monitored message at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Liveness {
    /// No frame has been decoded yet; the message has no current values
    Unseen,
    /// Seen within its staleness threshold (or seen at all, without a frequency check)
    Valid,
    /// Seen, but not within its staleness threshold
    Stale,
}

/// Outcome of one ingestion call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Frames in the batch
    pub frames: usize,
    /// Frames decoded and applied
    pub decoded: usize,
    /// Frames ignored (other bus or unmonitored address)
    pub skipped: usize,
    /// Monitored frames rejected (too short or checksum mismatch)
    pub dropped: usize,
}

/// Per-message decoding state
struct MonitoredMessage<'a> {
    definition: &'a MessageDefinition,
    signals: Vec<&'a SignalDefinition>,
    threshold_ns: Option<u64>,
    last_seen: Option<Timestamp>,
}

impl MonitoredMessage<'_> {
    fn liveness(&self, now: Timestamp) -> Liveness {
        match (self.last_seen, self.threshold_ns) {
            (None, _) => Liveness::Unseen,
            (Some(_), None) => Liveness::Valid,
            (Some(seen), Some(threshold)) => {
                if now.saturating_sub(seen) > threshold {
                    Liveness::Stale
                } else {
                    Liveness::Valid
                }
            }
        }
    }
}

/// Stateful decoder bound to one signal database
///
/// Not internally synchronized: share an instance across threads by wrapping
/// it in a `Mutex`.
pub struct Decoder<'a> {
    /// Signal database the decoder reads definitions from
    signal_db: &'a SignalDatabase,
    /// Key: CAN ID, Value: decoding state of that message
    monitored: HashMap<u32, MonitoredMessage<'a>>,
    values: ValueTable,
    history: HashMap<String, HashMap<String, VecDeque<f64>>>,
    config: DecoderConfig,
}

impl<'a> Decoder<'a> {
    /// Create a decoder for the given signals, frequency checks and bus
    ///
    /// Fails if any signal or message name does not resolve in `signal_db`.
    ///
    /// # Example
    /// ```
    /// use dbc_codec::{ByteOrder, Decoder, MessageDefinition, SignalDatabase, SignalDefinition};
    ///
    /// let mut db = SignalDatabase::new();
    /// db.add_message(
    ///     MessageDefinition::new(0x1D0, "VSA_STATUS", 8)
    ///         .with_signal(SignalDefinition::new("USER_BRAKE", 0, 16, ByteOrder::BigEndian)),
    /// )
    /// .unwrap();
    ///
    /// let decoder = Decoder::new(&db, [("USER_BRAKE", "VSA_STATUS")], [("VSA_STATUS", 50.0)], 0)
    ///     .unwrap();
    /// assert!(!decoder.is_valid("VSA_STATUS", 0));
    /// ```
    pub fn new<S, C>(signal_db: &'a SignalDatabase, signals: S, checks: C, bus: u8) -> Result<Self>
    where
        S: IntoIterator,
        S::Item: Into<MonitoredSignal>,
        C: IntoIterator,
        C::Item: Into<FrequencyCheck>,
    {
        let config = DecoderConfig {
            signals: signals.into_iter().map(Into::into).collect(),
            checks: checks.into_iter().map(Into::into).collect(),
            bus,
            ..DecoderConfig::default()
        };
        Self::with_config(signal_db, config)
    }

    /// Create a decoder from a full configuration
    pub fn with_config(signal_db: &'a SignalDatabase, config: DecoderConfig) -> Result<Self> {
        if !(config.staleness_multiplier.is_finite() && config.staleness_multiplier > 0.0) {
            return Err(CodecError::InvalidConfig(format!(
                "staleness multiplier must be positive, got {}",
                config.staleness_multiplier
            )));
        }
        if config.history_capacity == 0 {
            return Err(CodecError::InvalidConfig(
                "history capacity must be at least 1".to_string(),
            ));
        }

        let mut monitored: HashMap<u32, MonitoredMessage<'a>> = HashMap::new();
        let mut history: HashMap<String, HashMap<String, VecDeque<f64>>> = HashMap::new();

        for requested in &config.signals {
            let definition = signal_db
                .get_message_by_name(&requested.message)
                .ok_or_else(|| CodecError::MessageNotFound(requested.message.clone()))?;
            let signal = definition
                .signal(&requested.name)
                .ok_or_else(|| CodecError::SignalNotFound {
                    message: requested.message.clone(),
                    signal: requested.name.clone(),
                })?;

            let state = monitored
                .entry(definition.address)
                .or_insert_with(|| MonitoredMessage {
                    definition,
                    signals: Vec::new(),
                    threshold_ns: None,
                    last_seen: None,
                });
            if state.signals.iter().any(|s| s.name == signal.name) {
                log::debug!("Signal {}.{} requested twice", definition.name, signal.name);
                continue;
            }
            state.signals.push(signal);
            history
                .entry(definition.name.clone())
                .or_default()
                .insert(signal.name.clone(), VecDeque::new());
        }

        for check in &config.checks {
            let definition = signal_db
                .get_message_by_name(&check.message)
                .ok_or_else(|| CodecError::MessageNotFound(check.message.clone()))?;
            if !(check.frequency.is_finite() && check.frequency > 0.0) {
                return Err(CodecError::InvalidConfig(format!(
                    "frequency for '{}' must be positive, got {}",
                    check.message, check.frequency
                )));
            }

            let state = monitored
                .entry(definition.address)
                .or_insert_with(|| MonitoredMessage {
                    definition,
                    signals: Vec::new(),
                    threshold_ns: None,
                    last_seen: None,
                });
            state.threshold_ns = Some(check.threshold_ns(config.staleness_multiplier));
        }

        log::info!(
            "Decoder monitoring {} messages ({} signals) on bus {}",
            monitored.len(),
            monitored.values().map(|m| m.signals.len()).sum::<usize>(),
            config.bus
        );

        Ok(Self {
            signal_db,
            monitored,
            values: HashMap::new(),
            history,
            config,
        })
    }

    /// Ingest a batch of frames in order
    ///
    /// When several frames of one message arrive in the same batch, the value
    /// table ends up holding the last one while the history keeps all of them.
    /// A frame that cannot be decoded completely is dropped without touching
    /// any state; the rest of the batch is still processed.
    pub fn ingest<I>(&mut self, frames: I, reference_time: Timestamp) -> IngestReport
    where
        I: IntoIterator,
        I::Item: Borrow<CanFrame>,
    {
        let mut report = IngestReport::default();

        for frame in frames {
            let frame = frame.borrow();
            report.frames += 1;

            if !self.config.should_process_bus(frame.source_bus) {
                report.skipped += 1;
                continue;
            }
            let Some(state) = self.monitored.get(&frame.address) else {
                log::trace!("Unmonitored CAN ID: 0x{:X}, skipping", frame.address);
                report.skipped += 1;
                continue;
            };

            let definition = state.definition;
            let decoded = match Self::decode_frame(state, frame, self.config.verify_checksums) {
                Ok(decoded) => decoded,
                Err(e @ (CodecError::FrameTooShort { .. } | CodecError::PayloadTooShort { .. })) => {
                    log::warn!("Dropping frame for {}: {}", definition.name, e);
                    report.dropped += 1;
                    continue;
                }
                Err(e) => {
                    log::debug!("Dropping frame for {}: {}", definition.name, e);
                    report.dropped += 1;
                    continue;
                }
            };

            self.apply(definition, decoded);
            if let Some(state) = self.monitored.get_mut(&frame.address) {
                state.last_seen = Some(frame.timestamp_or(reference_time));
            }
            report.decoded += 1;
        }

        report
    }

    /// Ingest a single frame
    pub fn ingest_single(&mut self, frame: &CanFrame, reference_time: Timestamp) -> IngestReport {
        self.ingest(std::iter::once(frame), reference_time)
    }

    /// Start a fresh observation window: clear the history, then ingest
    pub fn ingest_window<I>(&mut self, frames: I, reference_time: Timestamp) -> IngestReport
    where
        I: IntoIterator,
        I::Item: Borrow<CanFrame>,
    {
        self.clear_history();
        self.ingest(frames, reference_time)
    }

    /// Decode every monitored signal of a frame, all or nothing
    fn decode_frame(
        state: &MonitoredMessage<'a>,
        frame: &CanFrame,
        verify_checksums: bool,
    ) -> Result<Vec<(&'a str, f64)>> {
        let data = frame.payload.as_slice();
        if data.len() < state.definition.size {
            return Err(CodecError::PayloadTooShort {
                message: state.definition.name.clone(),
                expected_bytes: state.definition.size,
                available_bytes: data.len(),
            });
        }

        if verify_checksums {
            if let (Some(expected), Some(signal)) = (
                checksum::frame_checksum(state.definition, data)?,
                state.definition.checksum_signal(),
            ) {
                let found = bit_codec::extract(data, signal)?;
                if found != expected {
                    return Err(CodecError::ChecksumMismatch {
                        message: state.definition.name.clone(),
                        expected,
                        found,
                    });
                }
            }
        }

        let mut decoded = Vec::with_capacity(state.signals.len());
        for &signal in &state.signals {
            decoded.push((signal.name.as_str(), bit_codec::decode_signal(data, signal)?));
        }
        Ok(decoded)
    }

    fn apply(&mut self, definition: &MessageDefinition, decoded: Vec<(&str, f64)>) {
        if decoded.is_empty() {
            return;
        }
        let table = self.values.entry(definition.name.clone()).or_default();
        let mut history = self.history.get_mut(&definition.name);
        let capacity = self.config.history_capacity;

        for (name, value) in decoded {
            table.insert(name.to_string(), value);

            if let Some(values) = history.as_mut().and_then(|h| h.get_mut(name)) {
                values.push_back(value);
                while values.len() > capacity {
                    values.pop_front();
                }
            }
        }
    }

    /// Latest value of every monitored signal whose message has been seen
    pub fn current_values(&self) -> &ValueTable {
        &self.values
    }

    /// Latest value of one signal
    pub fn value(&self, message_name: &str, signal_name: &str) -> Option<f64> {
        self.values
            .get(message_name)
            .and_then(|signals| signals.get(signal_name))
            .copied()
    }

    /// Drain the update history
    ///
    /// Returns every value decoded since the previous call, per monitored
    /// signal and in arrival order, and leaves the history empty. Signals with
    /// no new values map to an empty sequence.
    pub fn history(&mut self) -> UpdateHistory {
        self.history
            .iter_mut()
            .map(|(message, signals)| {
                let drained: HashMap<String, Vec<f64>> = signals
                    .iter_mut()
                    .map(|(signal, values)| (signal.clone(), values.drain(..).collect()))
                    .collect();
                (message.clone(), drained)
            })
            .collect()
    }

    /// Discard the update history without reading it
    pub fn clear_history(&mut self) {
        for values in self.history.values_mut().flat_map(|signals| signals.values_mut()) {
            values.clear();
        }
    }

    /// Liveness of a monitored message at time `now`
    ///
    /// Returns `None` if the message is not monitored.
    pub fn liveness(&self, message_name: &str, now: Timestamp) -> Option<Liveness> {
        let definition = self.signal_db.get_message_by_name(message_name)?;
        self.monitored
            .get(&definition.address)
            .map(|state| state.liveness(now))
    }

    /// True if the message has been seen and is not stale at time `now`
    pub fn is_valid(&self, message_name: &str, now: Timestamp) -> bool {
        self.liveness(message_name, now) == Some(Liveness::Valid)
    }

    /// True if every message with a frequency check is valid at time `now`
    pub fn all_valid(&self, now: Timestamp) -> bool {
        self.monitored
            .values()
            .filter(|state| state.threshold_ns.is_some())
            .all(|state| state.liveness(now) == Liveness::Valid)
    }

    /// Timestamp of the last decoded frame of a message
    pub fn last_seen(&self, message_name: &str) -> Option<Timestamp> {
        let definition = self.signal_db.get_message_by_name(message_name)?;
        self.monitored
            .get(&definition.address)
            .and_then(|state| state.last_seen)
    }

    /// Value table label of a signal's current value, if the schema has one
    pub fn describe(&self, message_name: &str, signal_name: &str) -> Option<&'a str> {
        let signal = self.signal_db.get_signal(message_name, signal_name)?;
        let value = self.value(message_name, signal_name)?;
        let raw = bit_codec::from_physical(
            value,
            signal.factor,
            signal.offset,
            signal.length,
            signal.is_signed(),
        );
        let raw = if signal.is_signed() {
            bit_codec::to_signed(raw, signal.length)
        } else {
            raw as i64
        };
        signal
            .value_table
            .as_ref()
            .and_then(|table| table.get(&raw))
            .map(String::as_str)
    }

    /// The configuration the decoder was built with
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}
