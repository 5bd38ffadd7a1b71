//! stormkv CLI
//!
//! Command-line access to a local stormkv database directory.

use std::process;

use clap::{Parser, Subcommand};
use stormkv::{CompactionOutcome, Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// stormkv CLI
#[derive(Parser, Debug)]
#[command(name = "stormkv")]
#[command(about = "Embedded key-value store for fixed-size values")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./stormkv_data")]
    data_dir: String,

    /// Fixed value size in bytes (must match the database)
    #[arg(short = 's', long, default_value = "8")]
    value_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: u32,
    },

    /// Set a key to a hex-encoded value
    Put {
        /// The key to set
        key: u32,

        /// The value, as hex (exactly value-size bytes)
        value: String,
    },

    /// Print every live key and value
    Scan {
        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Compact the write-log into the data file
    Compact,

    /// Print database statistics
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stormkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .value_size(args.value_size)
        .build();
    let engine = Engine::open(config)?;

    match args.command {
        Commands::Get { key } => match engine.get(key)? {
            Some(value) => println!("{}", hex::encode(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => {
            let value = parse_value(&value, engine.value_size())?;
            engine.put(key, &value)?;
            println!("OK");
        }
        Commands::Scan { limit } => {
            let limit = limit.unwrap_or(usize::MAX);
            let mut printed = 0usize;
            engine.iterate(|key, value| {
                if printed < limit {
                    println!("{}\t{}", key, hex::encode(value));
                    printed += 1;
                }
            })?;
        }
        Commands::Compact => match engine.compact()? {
            CompactionOutcome::Skipped => println!("Nothing to compact"),
            CompactionOutcome::Compacted(stats) => println!(
                "Compacted {} records into {} bytes in {:?}",
                stats.records_written, stats.data_bytes, stats.elapsed
            ),
        },
        Commands::Stats => {
            println!("keys:          {}", engine.len());
            println!("value size:    {}", engine.value_size());
            println!("wal bytes:     {}", engine.wal_bytes());
            println!("data bytes:    {}", engine.data_bytes());
            println!("compact now:   {}", engine.should_compact());
        }
    }

    engine.close()?;
    Ok(())
}

/// Decode a hex value that must be exactly `value_size` bytes
fn parse_value(text: &str, value_size: usize) -> Result<Vec<u8>, String> {
    let value = hex::decode(text).map_err(|e| format!("invalid hex value: {}", e))?;
    if value.len() != value_size {
        return Err(format!(
            "value is {} bytes, database stores {}-byte values",
            value.len(),
            value_size
        ));
    }
    Ok(value)
}
