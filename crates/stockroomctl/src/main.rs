//! stockroomctl: Command-line interface for a Stockroom data directory.
//!
//! Opens the collections directly (no daemon needed) to inspect records,
//! edit map entries, and run backup, repair and restore.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stockroom::RegistryBuilder;

/// Command-line interface for a Stockroom data directory.
#[derive(Parser)]
#[command(name = "stockroomctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Data directory to operate on
    #[arg(short, long, env = "STOCKROOM_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Open every collection from its JSON file, ignoring SQLite
    #[arg(long)]
    no_sqlite: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List collections with backend, shape and size
    Collections,
    /// Print one record (list) or one entry (map)
    Get {
        /// Collection name
        collection: String,
        /// Record id or map key
        key: String,
    },
    /// Print records matching every --where clause
    Find {
        /// Collection name
        collection: String,
        /// Filter as field=string or field:=json (e.g. total:=1299)
        #[arg(short, long = "where", value_name = "FIELD=VALUE")]
        filters: Vec<String>,
    },
    /// Set a map entry, or merge a JSON object into a record
    Set {
        /// Collection name
        collection: String,
        /// Record id or map key
        key: String,
        /// JSON value
        value: String,
    },
    /// Back up one collection, or all of them
    Backup {
        /// Collection name (all collections if omitted)
        collection: Option<String>,
    },
    /// List backup directories
    Backups,
    /// Recreate missing collection files and replace corrupt ones
    Repair,
    /// Restore collection files from a backup directory
    Restore {
        /// Backup directory path, or its name under <data-dir>/backups
        backup: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let registry = RegistryBuilder::new(&cli.data_dir)
        .with_sqlite(!cli.no_sqlite)
        .build()?;

    match cli.command {
        Commands::Collections => commands::collections::list(&registry, cli.output)?,
        Commands::Get { collection, key } => {
            commands::records::get(&registry, &collection, &key, cli.output)?;
        }
        Commands::Find {
            collection,
            filters,
        } => commands::records::find(&registry, &collection, &filters, cli.output)?,
        Commands::Set {
            collection,
            key,
            value,
        } => commands::records::set(&registry, &collection, &key, &value, cli.output)?,
        Commands::Backup { collection } => {
            commands::maintenance::backup(&registry, collection.as_deref(), cli.output)?;
        }
        Commands::Backups => commands::maintenance::backups(&registry, cli.output)?,
        Commands::Repair => commands::maintenance::repair(&registry, cli.output)?,
        Commands::Restore { backup } => {
            commands::maintenance::restore(&registry, &backup, cli.output)?;
        }
    }

    registry.flush_all()?;
    Ok(())
}
