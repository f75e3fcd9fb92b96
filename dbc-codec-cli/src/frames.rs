//! Text frame formats
//!
//! A frame is written as `ADDRESS#PAYLOAD` with both parts in hex
//! (`E4#FF0080000F`). Frame logs hold one `TIMESTAMP_NS BUS ADDRESS#PAYLOAD`
//! entry per line; blank lines and lines starting with `#` are skipped.

use anyhow::{bail, Context, Result};
use dbc_codec::CanFrame;
use std::fs;
use std::path::Path;

/// Parse `ADDRESS#PAYLOAD` into an address and payload bytes
pub fn parse_frame(text: &str) -> Result<(u32, Vec<u8>)> {
    let Some((address, payload)) = text.split_once('#') else {
        bail!("expected ADDRESS#PAYLOAD, got '{}'", text);
    };

    let address = u32::from_str_radix(address, 16)
        .with_context(|| format!("invalid address '{}'", address))?;

    if !payload.is_ascii() || payload.len() % 2 != 0 {
        bail!("payload '{}' is not a whole number of hex bytes", payload);
    }
    let payload = (0..payload.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&payload[i..i + 2], 16)
                .with_context(|| format!("invalid payload byte '{}'", &payload[i..i + 2]))
        })
        .collect::<Result<Vec<u8>>>()?;

    Ok((address, payload))
}

/// Parse one frame log line; `Ok(None)` for blank and comment lines
pub fn parse_log_line(line: &str) -> Result<Option<CanFrame>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let [timestamp, bus, frame] = fields.as_slice() else {
        bail!("expected 'TIMESTAMP_NS BUS ADDRESS#PAYLOAD', got '{}'", line);
    };

    let timestamp: u64 = timestamp
        .parse()
        .with_context(|| format!("invalid timestamp '{}'", timestamp))?;
    let bus: u8 = bus.parse().with_context(|| format!("invalid bus '{}'", bus))?;
    let (address, payload) = parse_frame(frame)?;

    Ok(Some(CanFrame::new(address, payload, bus).with_timestamp(timestamp)))
}

/// Read every frame of a frame log
pub fn read_frame_log(path: &Path) -> Result<Vec<CanFrame>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read frame log: {:?}", path))?;

    let mut frames = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let frame = parse_log_line(line)
            .with_context(|| format!("{:?} line {}", path, index + 1))?;
        frames.extend(frame);
    }

    log::info!("Read {} frames from {:?}", frames.len(), path);
    Ok(frames)
}
