//! Record commands: get, find, set.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use stockroom::{Query, Record, Shape, StoreRegistry};

use crate::OutputFormat;

pub fn get(registry: &StoreRegistry, collection: &str, key: &str, format: OutputFormat) -> Result<()> {
    let store = registry.collection(collection)?;
    let found = match store.shape() {
        Shape::List => store.find_by_id(key)?.map(Record::into_value),
        Shape::Map => store.get(key)?,
    };

    match found {
        Some(value) => print_value(&value, format),
        None => bail!("{collection}: no entry for '{key}'"),
    }
}

pub fn find(
    registry: &StoreRegistry,
    collection: &str,
    filters: &[String],
    format: OutputFormat,
) -> Result<()> {
    let store = registry.collection(collection)?;
    let query = parse_filters(filters)?;
    let records = store.find(&query)?;

    match format {
        OutputFormat::Text => {
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            println!();
            println!("Total: {} record(s)", records.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}

pub fn set(
    registry: &StoreRegistry,
    collection: &str,
    key: &str,
    value: &str,
    format: OutputFormat,
) -> Result<()> {
    let store = registry.collection(collection)?;
    let value: Value = serde_json::from_str(value).context("value must be valid JSON")?;

    let stored = match store.shape() {
        Shape::Map => {
            store.set(key, value.clone())?;
            value
        }
        Shape::List => {
            let patch = Record::try_from(value)
                .map_err(|_| anyhow!("records are JSON objects"))?;
            match store.update(key, patch.clone())? {
                Some(updated) => updated.into_value(),
                None => store.create(patch.with("id", key))?.into_value(),
            }
        }
    };
    print_value(&stored, format)
}

/// `field=value` compares against the string `value`; `field:=json`
/// compares against a parsed JSON value (numbers, booleans, null, ...).
fn parse_filters(filters: &[String]) -> Result<Query> {
    filters.iter().try_fold(Query::new(), |query, clause| {
        let (field, raw) = clause
            .split_once('=')
            .ok_or_else(|| anyhow!("filter '{clause}' is not field=value or field:=json"))?;
        let (field, value) = match field.strip_suffix(':') {
            Some(field) => {
                let value: Value = serde_json::from_str(raw)
                    .with_context(|| format!("filter '{clause}' has invalid JSON"))?;
                (field, value)
            }
            None => (field, Value::String(raw.to_string())),
        };
        Ok(query.eq(field, value))
    })
}

fn print_value(value: &Value, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}
