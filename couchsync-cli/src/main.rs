//! couchsync command-line driver
//!
//! Runs the engine's operations against a live CouchDB from a terminal:
//! 1. `check` validates settings and connectivity
//! 2. `discover` infers a schema from the documents a query selects
//! 3. `read` prints the selected documents as JSON lines
//! 4. `write` replicates JSON-line records from stdin into a target database
//!
//! Usage:
//!   couchsync --settings couch.json discover '{"selector": {}}'

use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use couchsync_engine::{
    DiscoverSchemasRequest, EngineConfig, Plugin, PrepareWriteRequest, ReplicationTarget,
};
use couchsync_types::{RecordAck, Schema, WriteRecord};
use futures::{StreamExt, stream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "couchsync")]
#[command(about = "Discover, read and replicate CouchDB documents")]
struct Args {
    /// Path to the connection settings JSON file
    #[arg(short, long, global = true, default_value = "couchsync.json")]
    settings: PathBuf,

    /// Documents sampled per schema during discovery
    #[arg(long, global = true)]
    sample_size: Option<usize>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate settings and check that the database is reachable
    Check,

    /// Infer property types for a Mango query
    Discover {
        /// Mango query selecting the sample documents
        query: String,
    },

    /// Print the documents a Mango query selects, one JSON object per line
    Read {
        query: String,

        /// Maximum documents to request
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Replicate records read from stdin into a target database
    Write {
        /// Mango query whose discovered schema describes the records
        query: String,

        /// Target database, created if missing
        #[arg(short, long)]
        target: String,

        /// Property id whose value becomes the document id
        #[arg(short = 'k', long, default_value = couchsync_engine::AUTO_GENERATE_KEY)]
        primary_key: String,

        /// Per-record commit deadline in seconds (0 disables it)
        #[arg(long, default_value = "30")]
        sla: u64,

        /// Writes dispatched concurrently
        #[arg(long, default_value = "1")]
        max_in_flight: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let settings = fs::read_to_string(&args.settings)
        .with_context(|| format!("Failed to read settings from {}", args.settings.display()))?;

    let mut config = EngineConfig::default();
    if let Some(sample_size) = args.sample_size {
        config.discovery_sample_size = sample_size;
    }
    if let Command::Write { max_in_flight, .. } = &args.command {
        config.max_in_flight_writes = *max_in_flight;
    }

    let plugin = Plugin::new(config);
    let response = plugin.connect(&settings).await;
    if !response.settings_error.is_empty() {
        bail!("Settings error: {}", response.settings_error);
    }
    if !response.connection_error.is_empty() {
        bail!("Connection error: {}", response.connection_error);
    }

    let result = match args.command {
        Command::Check => {
            println!("OK");
            Ok(())
        }
        Command::Discover { query } => discover(&plugin, &query).await.map(|schema| {
            for property in &schema.properties {
                println!("{}\t{:?}", property.name, property.property_type);
            }
        }),
        Command::Read { query, limit } => read(&plugin, &query, limit).await,
        Command::Write {
            query,
            target,
            primary_key,
            sla,
            ..
        } => write(&plugin, &query, ReplicationTarget::new(target, primary_key), sla).await,
    };

    plugin.disconnect().await;
    result
}

async fn discover(plugin: &Plugin, query: &str) -> Result<Schema> {
    let schema = Schema::new("cli", "cli", query);
    let mut schemas = plugin
        .discover_schemas(DiscoverSchemasRequest::refresh(vec![schema]))
        .await;
    match schemas.pop() {
        Some(schema) => Ok(schema),
        None => bail!("No documents matched the query, or the query is invalid"),
    }
}

async fn read(plugin: &Plugin, query: &str, limit: Option<u32>) -> Result<()> {
    let schema = Schema::new("cli", "cli", query);
    let mut records = plugin.read_stream(&schema, limit).await;
    let mut count = 0usize;
    while let Some(record) = records.next().await {
        let record = record?;
        println!("{}", record.data.to_json_value());
        count += 1;
    }
    info!("Read {} documents", count);
    Ok(())
}

async fn write(plugin: &Plugin, query: &str, target: ReplicationTarget, sla: u64) -> Result<()> {
    let schema = discover(plugin, query).await?;
    plugin
        .prepare_write(PrepareWriteRequest {
            schema,
            commit_sla_seconds: sla,
            replication: Some(target),
        })
        .await?;

    let records = read_records(BufReader::new(tokio::io::stdin())).await?;

    let (acks_tx, mut acks_rx) = mpsc::channel::<RecordAck>(64);
    let printer = tokio::spawn(async move {
        while let Some(ack) = acks_rx.recv().await {
            if !ack.is_success() {
                warn!(correlation_id = %ack.correlation_id, "Write failed: {}", ack.error);
            }
            if let Some(line) = ack_line(&ack) {
                println!("{line}");
            }
        }
    });

    let summary = plugin.write_stream(stream::iter(records), acks_tx).await?;
    printer.await?;
    info!(
        "{} received, {} written, {} failed, {} timed out",
        summary.received, summary.written, summary.failed, summary.timed_out
    );
    Ok(())
}

/// Parses one JSON record per non-blank line. Errors name the 1-based
/// input line.
async fn read_records<R: AsyncBufRead + Unpin>(reader: R) -> Result<Vec<WriteRecord>> {
    let mut records = Vec::new();
    let mut lines = reader.lines();
    let mut line_number = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: WriteRecord = serde_json::from_str(&line)
            .with_context(|| format!("Invalid record on line {line_number}"))?;
        records.push(record);
    }
    Ok(records)
}

fn ack_line(ack: &RecordAck) -> Option<String> {
    match serde_json::to_string(ack) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!(correlation_id = %ack.correlation_id, "Failed to encode ack: {}", e);
            None
        }
    }
}
