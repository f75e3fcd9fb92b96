//! DBC Codec CLI Application
//!
//! Command-line front end for the dbc-codec library:
//! - `info`: load a DBC file and show what it defines
//! - `pack`: encode signal values into frames
//! - `decode`: replay a frame log through a configured decoder

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dbc_codec::signals::parse_dbc_file;
use dbc_codec::{
    CanFrame, DbcFlavor, Decoder, Encoder, IngestReport, Liveness, SignalDatabase, Timestamp,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod config;
mod frames;

/// DBC Codec - Pack and decode CAN frames with DBC signal definitions
#[derive(Parser, Debug)]
#[command(name = "dbc-codec-cli")]
#[command(about = "Pack and decode CAN frames using DBC files", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the messages and signals of a DBC file
    Info {
        /// Path to the DBC file
        #[arg(long, value_name = "FILE")]
        dbc: PathBuf,
    },
    /// Pack signal values into one or more frames
    Pack {
        /// Path to the DBC file
        #[arg(long, value_name = "FILE")]
        dbc: PathBuf,

        /// Message name
        #[arg(short, long)]
        message: String,

        /// Bus the frame is addressed to
        #[arg(short, long, default_value_t = 0)]
        bus: u8,

        /// Counter value for the first frame (default: automatic)
        #[arg(long)]
        counter: Option<u64>,

        /// Number of frames to pack
        #[arg(long, default_value_t = 1)]
        repeat: usize,

        /// Signal values as SIGNAL=VALUE
        #[arg(value_name = "SIGNAL=VALUE")]
        values: Vec<String>,
    },
    /// Replay a frame log through a decoder
    Decode {
        /// Path to the DBC file
        #[arg(long, value_name = "FILE")]
        dbc: PathBuf,

        /// Decoder configuration (decode.toml)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Frame log: one "TIMESTAMP_NS BUS ADDRESS#PAYLOAD" per line
        #[arg(short, long, value_name = "FILE")]
        frames: PathBuf,

        /// Time liveness is evaluated at (default: last frame timestamp)
        #[arg(long, value_name = "NS")]
        now: Option<Timestamp>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("DBC Codec CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using codec library v{}", dbc_codec::VERSION);

    match args.command {
        Command::Info { dbc } => info_mode(&dbc),
        Command::Pack {
            dbc,
            message,
            bus,
            counter,
            repeat,
            values,
        } => {
            let db = load_dbc(&dbc, None)?;
            let values = parse_values(&values)?;
            for frame in pack_frames(&db, &message, bus, counter, repeat, &values)? {
                println!("{}", frame);
            }
            Ok(())
        }
        Command::Decode {
            dbc,
            config: config_path,
            frames: frame_log,
            now,
            json,
        } => {
            let config = config::load_config(&config_path)?;
            let db = load_dbc(&dbc, config.flavor)?;
            let frames = frames::read_frame_log(&frame_log)?;
            let summary = decode_frames(&db, config.decoder, &frames, now)?;
            if json {
                let json = serde_json::to_string_pretty(&summary).context("serialize summary")?;
                println!("{json}");
            } else {
                print_summary(&summary);
            }
            Ok(())
        }
    }
}

fn load_dbc(path: &Path, flavor: Option<DbcFlavor>) -> Result<SignalDatabase> {
    parse_dbc_file(path, flavor).with_context(|| format!("Failed to load DBC: {:?}", path))
}

/// Info mode - load a DBC and list its contents
fn info_mode(path: &Path) -> Result<()> {
    let db = load_dbc(path, None)?;
    let stats = db.stats();

    println!("Signal Database: {}", db.name());
    println!("  Messages:  {}", stats.num_messages);
    println!("  Signals:   {}", stats.num_signals);
    println!("  Counters:  {}", stats.num_counters);
    println!("  Checksums: {}", stats.num_checksums);
    println!();

    for message in db.messages() {
        println!(
            "0x{:X} {} ({} bytes{})",
            message.address,
            message.name,
            message.size,
            message
                .sender
                .as_ref()
                .map(|s| format!(", from {}", s))
                .unwrap_or_default()
        );
        for signal in &message.signals {
            println!(
                "    {:<24} bit {:>3} len {:>2} {:?} x{} {:+} {:?}",
                signal.name,
                signal.start_bit,
                signal.length,
                signal.byte_order,
                signal.factor,
                signal.offset,
                signal.role
            );
        }
    }

    Ok(())
}

/// Parse `SIGNAL=VALUE` arguments
fn parse_values(args: &[String]) -> Result<Vec<(String, f64)>> {
    args.iter()
        .map(|arg| {
            let (name, value) = arg
                .split_once('=')
                .with_context(|| format!("expected SIGNAL=VALUE, got '{}'", arg))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid value for {}: '{}'", name, value))?;
            Ok((name.trim().to_string(), value))
        })
        .collect()
}

/// Pack `repeat` frames of one message
///
/// An explicit `counter` seeds the first frame; later frames continue from it.
fn pack_frames(
    db: &SignalDatabase,
    message: &str,
    bus: u8,
    counter: Option<u64>,
    repeat: usize,
    values: &[(String, f64)],
) -> Result<Vec<CanFrame>> {
    let mut encoder = Encoder::new(db);
    let mut frames = Vec::with_capacity(repeat);
    for i in 0..repeat {
        let counter = if i == 0 { counter } else { None };
        let frame = encoder
            .pack(message, bus, values.iter().map(|(n, v)| (n.as_str(), *v)), counter)
            .with_context(|| format!("Failed to pack {}", message))?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Result of replaying a frame log
#[derive(Debug, Serialize)]
struct DecodeSummary {
    report: IngestReport,
    now: Timestamp,
    values: BTreeMap<String, BTreeMap<String, f64>>,
    history: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    liveness: BTreeMap<String, Liveness>,
}

fn decode_frames(
    db: &SignalDatabase,
    config: dbc_codec::DecoderConfig,
    frames: &[CanFrame],
    now: Option<Timestamp>,
) -> Result<DecodeSummary> {
    let mut decoder = Decoder::with_config(db, config).context("Failed to create decoder")?;

    let now = now
        .or_else(|| frames.iter().filter_map(|f| f.timestamp).max())
        .unwrap_or(0);
    let report = decoder.ingest(frames, now);
    log::info!(
        "Decoded {} of {} frames ({} skipped, {} dropped)",
        report.decoded,
        report.frames,
        report.skipped,
        report.dropped
    );

    let values = decoder
        .current_values()
        .iter()
        .map(|(message, signals)| {
            let signals: BTreeMap<String, f64> =
                signals.iter().map(|(s, v)| (s.clone(), *v)).collect();
            (message.clone(), signals)
        })
        .collect();
    let history = decoder
        .history()
        .into_iter()
        .map(|(message, signals)| (message, signals.into_iter().collect::<BTreeMap<_, _>>()))
        .collect();

    let mut liveness = BTreeMap::new();
    for check in &decoder.config().checks {
        if let Some(state) = decoder.liveness(&check.message, now) {
            liveness.insert(check.message.clone(), state);
        }
    }

    Ok(DecodeSummary {
        report,
        now,
        values,
        history,
        liveness,
    })
}

fn print_summary(summary: &DecodeSummary) {
    println!(
        "Frames: {} decoded, {} skipped, {} dropped",
        summary.report.decoded, summary.report.skipped, summary.report.dropped
    );

    println!("\nCurrent values:");
    for (message, signals) in &summary.values {
        for (signal, value) in signals {
            println!("  {}.{} = {}", message, signal, value);
        }
    }

    println!("\nHistory:");
    for (message, signals) in &summary.history {
        for (signal, values) in signals {
            println!("  {}.{}: {:?}", message, signal, values);
        }
    }

    if !summary.liveness.is_empty() {
        println!("\nLiveness at {} ns:", summary.now);
        for (message, state) in &summary.liveness {
            println!("  {}: {:?}", message, state);
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
