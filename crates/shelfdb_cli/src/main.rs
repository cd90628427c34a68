//! ShelfDB CLI
//!
//! Command-line tools for ShelfDB database management.
//!
//! # Commands
//!
//! - `inspect` - Display stores, record counts and log statistics
//! - `verify` - Check every log line and the sidecar files
//! - `dump-log` - Print log entries with decoded keys
//! - `scan` - Print the records of one store in key order
//! - `compact` - Rewrite the log down to the live records
//! - `delete` - Remove a database and all of its files

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ShelfDB command-line database tools.
#[derive(Parser)]
#[command(name = "shelfdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display stores, record counts and log statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check every log line and the sidecar files
    Verify,

    /// Print log entries with decoded keys
    DumpLog {
        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only entries touching this store
        #[arg(short, long)]
        store: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the records of one store in key order
    Scan {
        /// Store to read
        store: String,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Walk the store from the largest key down
        #[arg(short, long)]
        reverse: bool,
    },

    /// Rewrite the log down to the live records
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Remove a database and all of its files
    Delete,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::DumpLog {
            limit,
            store,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for dump-log")?;
            commands::dump_log::run(&path, limit, store.as_deref(), &format)?;
        }
        Commands::Scan {
            store,
            limit,
            reverse,
        } => {
            let path = cli.path.ok_or("Database path required for scan")?;
            commands::scan::run(&path, &store, limit, reverse)?;
        }
        Commands::Compact { dry_run } => {
            let path = cli.path.ok_or("Database path required for compact")?;
            commands::compact::run(&path, dry_run)?;
        }
        Commands::Delete => {
            let path = cli.path.ok_or("Database path required for delete")?;
            commands::delete::run(&path)?;
        }
        Commands::Version => {
            println!("ShelfDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ShelfDB Core v{}", shelfdb_core::VERSION);
        }
    }

    Ok(())
}
