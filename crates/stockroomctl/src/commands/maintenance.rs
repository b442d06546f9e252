//! Maintenance commands: backup, backups, repair, restore.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use stockroom::StoreRegistry;

use crate::OutputFormat;

#[derive(Serialize)]
struct BackupOutput {
    dir: Option<String>,
    collections: Vec<String>,
}

pub fn backup(registry: &StoreRegistry, collection: Option<&str>, format: OutputFormat) -> Result<()> {
    let output = match collection {
        Some(name) => {
            let store = registry.collection(name)?;
            BackupOutput {
                dir: store.backup()?.map(|p| p.display().to_string()),
                collections: vec![name.to_string()],
            }
        }
        None => {
            let report = registry.backup_all()?;
            BackupOutput {
                dir: Some(report.dir.display().to_string()),
                collections: report.collections,
            }
        }
    };

    match format {
        OutputFormat::Text => match &output.dir {
            Some(dir) => println!("Backed up {} collection(s) to {dir}", output.collections.len()),
            None => println!("{}: SQLite collections have no file backup; back up all collections instead", output.collections.join(", ")),
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
    }
    Ok(())
}

pub fn backups(registry: &StoreRegistry, format: OutputFormat) -> Result<()> {
    let dirs = registry
        .backups()?
        .into_iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>();

    match format {
        OutputFormat::Text => {
            if dirs.is_empty() {
                println!("No backups found.");
            } else {
                for dir in &dirs {
                    println!("{dir}");
                }
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dirs)?),
    }
    Ok(())
}

pub fn repair(registry: &StoreRegistry, format: OutputFormat) -> Result<()> {
    let report = registry.repair()?;

    match format {
        OutputFormat::Text => {
            for name in &report.created {
                println!("Created:  {name}");
            }
            for (name, moved) in &report.repaired {
                println!("Repaired: {name} (corrupt file moved to {})", moved.display());
            }
            println!();
            println!("{} action(s), {} healthy file(s)", report.actions(), report.healthy);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

pub fn restore(registry: &StoreRegistry, backup: &Path, format: OutputFormat) -> Result<()> {
    let restored = registry.restore(backup)?;

    match format {
        OutputFormat::Text => println!("Restored {} collection(s): {}", restored.len(), restored.join(", ")),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&restored)?),
    }
    Ok(())
}
