//! Collections command implementation.

use anyhow::Result;
use serde::Serialize;
use stockroom::registry::CollectionStats;
use stockroom::StoreRegistry;

use crate::OutputFormat;

#[derive(Serialize)]
struct CollectionsOutput {
    collections: Vec<CollectionStats>,
    total: usize,
    sqlite: bool,
}

pub fn list(registry: &StoreRegistry, format: OutputFormat) -> Result<()> {
    let collections = registry.stats()?;
    let output = CollectionsOutput {
        total: collections.len(),
        collections,
        sqlite: registry.sqlite_enabled(),
    };

    match format {
        OutputFormat::Text => {
            println!("{:<20} {:<8} {:<6} {:>10}", "COLLECTION", "BACKEND", "SHAPE", "COUNT");
            println!("{}", "-".repeat(47));
            for c in &output.collections {
                println!(
                    "{:<20} {:<8} {:<6} {:>10}",
                    c.name,
                    c.backend.to_string(),
                    c.shape.to_string(),
                    c.count
                );
            }
            println!();
            println!(
                "Total: {} collection(s), SQLite {}",
                output.total,
                if output.sqlite { "enabled" } else { "disabled" }
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
