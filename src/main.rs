//! # tracecap CLI
//!
//! Command-line inspection of trace files.
//!
//! ## Usage
//!
//! ```bash
//! # Summarize a trace
//! tracecap info drive.tcap
//!
//! # Stream records, optionally filtered
//! tracecap cat drive.tcap --topic /vehicle/pose --limit 20
//!
//! # Fetch one record by global index
//! tracecap get drive.tcap 42
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

use tracecap::trace::{OpenOptions, TraceFormat, TraceReader};

/// tracecap - Indexed Event-Trace Reader
#[derive(Parser)]
#[command(name = "tracecap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display information about a trace file
    Info {
        /// Input trace file path
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Stream records from a trace file
    Cat {
        /// Input trace file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Topic to read (chunked traces; defaults to the first channel)
        #[arg(short, long)]
        topic: Option<String>,

        /// Inclusive lower bound on log time in nanoseconds
        #[arg(long)]
        start: Option<u64>,

        /// Exclusive upper bound on log time in nanoseconds
        #[arg(long)]
        end: Option<u64>,

        /// Stop after this many records
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Fetch one record by its global index
    Get {
        /// Input trace file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Global record index
        #[arg(value_name = "INDEX")]
        index: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Info { file } => cmd_info(file),
        Commands::Cat {
            file,
            topic,
            start,
            end,
            limit,
        } => cmd_cat(file, topic, start, end, limit),
        Commands::Get { file, index } => cmd_get(file, index),
    }
}

fn open(file: &Path, topic: Option<String>) -> Result<TraceReader> {
    let mut options = OpenOptions::default();
    if let Some(topic) = topic {
        options = options.with_topic(topic);
    }
    TraceReader::open(file, options).with_context(|| format!("opening {}", file.display()))
}

fn cmd_info(file: PathBuf) -> Result<()> {
    let mut trace = open(&file, None)?;

    match trace.format() {
        TraceFormat::Flat => {
            println!("format: flat");
            let offsets = trace.retrieve_offsets(None)?;
            println!("records: {}", offsets.len().saturating_sub(1));
        }
        TraceFormat::Chunked => {
            println!("format: chunked");
            println!("topics:");
            for topic in trace.available_topics(None)? {
                println!("  {}", topic);
            }
            if let Some(schema) = trace.record_schema()? {
                println!("schema: {} ({})", schema.name, schema.encoding);
            }
            let metadata = trace.file_metadata()?;
            if !metadata.is_empty() {
                println!("metadata:");
                for (key, value) in metadata {
                    println!("  {} = {}", key, value);
                }
            }
            let mut count = 0usize;
            for record in trace.records() {
                record?;
                count += 1;
            }
            println!("records ({}): {}", trace.topic().unwrap_or("-"), count);
        }
    }
    Ok(())
}

fn cmd_cat(
    file: PathBuf,
    topic: Option<String>,
    start: Option<u64>,
    end: Option<u64>,
    limit: Option<usize>,
) -> Result<()> {
    let mut trace = open(&file, topic)?;
    info!("streaming records from {}", file.display());

    let mut printed = 0usize;
    for (index, record) in trace.records().enumerate() {
        let record = record?;
        // Flat traces carry no log time; the window only applies to chunked.
        if start.is_some_and(|start| record.log_time < start) {
            continue;
        }
        if end.is_some_and(|end| record.log_time >= end) {
            continue;
        }
        println!(
            "{:>8}  t={:<20} channel={:<5} {} bytes",
            index,
            record.log_time,
            record.channel_id,
            record.data.len()
        );
        printed += 1;
        if limit.is_some_and(|limit| printed >= limit) {
            break;
        }
    }
    Ok(())
}

fn cmd_get(file: PathBuf, index: usize) -> Result<()> {
    let mut trace = open(&file, None)?;
    let record = trace
        .get_record_by_index(index)
        .with_context(|| format!("fetching record {}", index))?;
    println!(
        "index={} t={} channel={} {} bytes",
        index,
        record.log_time,
        record.channel_id,
        record.data.len()
    );
    Ok(())
}
