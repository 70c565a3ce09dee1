//! TierKV CLI
//!
//! Command-line interface for working with a local TierKV data directory.

use std::process;

use clap::{Parser, Subcommand};
use tierkv::{Config, Database};
use tracing_subscriber::{fmt, EnvFilter};

/// TierKV CLI
#[derive(Parser, Debug)]
#[command(name = "tierkv-cli")]
#[command(about = "CLI for the TierKV embedded key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./tierkv_data")]
    data_dir: String,

    /// Memtable record threshold before flush
    #[arg(short = 't', long, default_value = "3000")]
    memtable_threshold: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Flush the memtable and compact every level over budget
    Compact,

    /// Print memtable and per-level statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tierkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> tierkv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_threshold(args.memtable_threshold)
        .build()?;

    let db = Database::open(config)?;

    match args.command {
        Commands::Get { key } => match db.get(&key)? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Set { key, value } => {
            db.set(&key, value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            db.delete(&key)?;
            println!("OK");
        }
        Commands::Compact => {
            db.flush()?;
            for outcome in db.compact()? {
                println!(
                    "L{} -> L{}: {} + {} tables in, {} out, {} tombstones dropped",
                    outcome.source_level,
                    outcome.target_level,
                    outcome.inputs,
                    outcome.consumed,
                    outcome.outputs,
                    outcome.tombstones_dropped
                );
            }
        }
        Commands::Stats => {
            let stats = db.stats();
            println!("memtable: {} entries, {} bytes", stats.memtable_entries, stats.memtable_bytes);
            println!("wal generation: {}", stats.wal_generation);
            for level in stats.levels {
                println!("L{}: {} tables, {} bytes", level.level, level.tables, level.bytes);
            }
        }
    }

    db.close()
}
