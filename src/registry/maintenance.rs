//! Maintenance operations over a whole registry: backup, repair, restore
//! and statistics.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::StoreRegistry;
use crate::catalog::CollectionSpec;
use crate::error::{Result, StoreError};
use crate::record::{CollectionData, Shape};
use crate::storage::atomic::{self, BACKUP_DIR};
use crate::storage::Backend;

/// Result of [`StoreRegistry::backup_all`].
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub dir: PathBuf,
    pub collections: Vec<String>,
}

/// Result of [`StoreRegistry::repair`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    /// Files that were missing and were written from the seed.
    pub created: Vec<String>,
    /// Corrupt files moved aside (collection, moved-to path) and re-seeded.
    pub repaired: Vec<(String, PathBuf)>,
    /// Files that parsed fine.
    pub healthy: usize,
}

impl RepairReport {
    /// Number of files touched.
    pub fn actions(&self) -> usize {
        self.created.len() + self.repaired.len()
    }
}

/// One row of [`StoreRegistry::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: String,
    pub backend: Backend,
    pub shape: Shape,
    pub count: usize,
}

impl StoreRegistry {
    fn backups_root(&self) -> PathBuf {
        self.data_dir.join(BACKUP_DIR)
    }

    fn live_path(&self, spec: &CollectionSpec) -> PathBuf {
        self.data_dir.join(spec.file_name())
    }

    /// Snapshot every collection into one new backup directory.
    ///
    /// File-backed collections are flushed and copied; SQLite collections are
    /// exported as JSON. Older backups beyond the retention count are pruned.
    pub fn backup_all(&self) -> Result<BackupReport> {
        let dir = self.backups_root().join(atomic::backup_stamp(Utc::now()));
        fs::create_dir_all(&dir)?;

        let mut collections = Vec::new();
        for (spec, store) in self.stores_in_order() {
            store.flush()?;
            match store.backend() {
                Backend::File => {
                    atomic::copy_into(&self.live_path(spec), &dir)?;
                }
                Backend::Sqlite => {
                    let data = store.find_all()?;
                    let bytes = serde_json::to_vec_pretty(data.as_ref())?;
                    atomic::write_atomic(&dir.join(spec.file_name()), &bytes)?;
                }
            }
            atomic::prune_backups(&self.backups_root(), &spec.file_name(), self.backup_keep)?;
            collections.push(spec.name.clone());
        }

        info!(dir = %dir.display(), collections = collections.len(), "Backup complete");
        Ok(BackupReport { dir, collections })
    }

    /// Recreate missing collection files and replace corrupt ones.
    ///
    /// A corrupt file is moved to `<name>.corrupted.<unix-seconds>` and the
    /// seed is written in its place. SQLite collections are not inspected.
    pub fn repair(&self) -> Result<RepairReport> {
        if let Err(e) = self.flush_all() {
            warn!(error = %e, "Flush before repair failed");
        }

        let mut report = RepairReport::default();
        for (spec, store) in self.stores_in_order() {
            if store.backend() != Backend::File {
                continue;
            }
            let path = self.live_path(spec);

            if !path.exists() {
                write_seed(spec, &path)?;
                report.created.push(spec.name.clone());
                info!(collection = %spec.name, "Created missing collection file");
            } else if let Err(reason) = check_file(spec, &path) {
                let moved = corrupted_path(&path, Utc::now().timestamp());
                fs::rename(&path, &moved)?;
                write_seed(spec, &path)?;
                warn!(
                    collection = %spec.name,
                    reason = %reason,
                    moved_to = %moved.display(),
                    "Replaced corrupt collection file with seed"
                );
                report.repaired.push((spec.name.clone(), moved));
            } else {
                report.healthy += 1;
                continue;
            }
            store.invalidate();
        }
        Ok(report)
    }

    /// Copy the collection files of a backup over the live data.
    ///
    /// `backup` may be a path or the name of a directory under the backups
    /// root. Returns the restored collections.
    pub fn restore(&self, backup: &Path) -> Result<Vec<String>> {
        let dir = self.resolve_backup(backup)?;

        let mut restored = Vec::new();
        for (spec, store) in self.stores_in_order() {
            let source = dir.join(spec.file_name());
            if !source.exists() {
                continue;
            }

            match store.backend() {
                Backend::File => {
                    store.flush()?;
                    atomic::write_atomic(&self.live_path(spec), &fs::read(&source)?)?;
                    store.invalidate();
                }
                Backend::Sqlite => {
                    let value: Value = serde_json::from_slice(&fs::read(&source)?)?;
                    match CollectionData::from_value(spec.shape, value) {
                        Ok(data) => store.replace_all(data)?,
                        Err(reason) => {
                            warn!(collection = %spec.name, reason = %reason, "Skipping unreadable backup file");
                            continue;
                        }
                    }
                }
            }
            restored.push(spec.name.clone());
        }

        info!(from = %dir.display(), collections = restored.len(), "Restore complete");
        Ok(restored)
    }

    /// Backend, shape and size of every collection.
    pub fn stats(&self) -> Result<Vec<CollectionStats>> {
        self.stores_in_order()
            .map(|(spec, store)| {
                Ok(CollectionStats {
                    name: spec.name.clone(),
                    backend: store.backend(),
                    shape: store.shape(),
                    count: store.count()?,
                })
            })
            .collect()
    }

    /// Backup directories, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        atomic::list_backups(&self.backups_root())
    }

    fn resolve_backup(&self, backup: &Path) -> Result<PathBuf> {
        if backup.is_dir() {
            return Ok(backup.to_path_buf());
        }
        let named = self.backups_root().join(backup);
        if named.is_dir() {
            Ok(named)
        } else {
            Err(StoreError::BackupNotFound(backup.to_path_buf()))
        }
    }
}

fn write_seed(spec: &CollectionSpec, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(&spec.seed())?;
    atomic::write_atomic(path, &bytes)
}

fn check_file(spec: &CollectionSpec, path: &Path) -> std::result::Result<(), String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let value = serde_json::from_slice::<Value>(&bytes).map_err(|e| e.to_string())?;
    CollectionData::from_value(spec.shape, value).map(|_| ())
}

/// `orders.json` -> `orders.corrupted.1700000000`.
fn corrupted_path(path: &Path, unix_secs: i64) -> PathBuf {
    path.with_extension(format!("corrupted.{unix_secs}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupted_path() {
        assert_eq!(
            corrupted_path(Path::new("/d/orders.json"), 1_700_000_000),
            PathBuf::from("/d/orders.corrupted.1700000000")
        );
    }

    #[test]
    fn test_check_file_reports_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carts.json");
        fs::write(&path, b"[]").unwrap();

        let err = check_file(&CollectionSpec::map("carts"), &path).unwrap_err();
        assert_eq!(err, "expected a map document, found an array");
    }
}
