//! Crash-safe file writes and timestamped backups.
//!
//! Every collection file is replaced by writing a sibling temp file, syncing
//! it, and renaming it over the live file. A reader (or a process restarted
//! after a crash) therefore sees either the previous or the next complete
//! snapshot, never a partial one.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Name of the backup subtree inside the data directory.
pub const BACKUP_DIR: &str = "backups";

/// Backup directory name format (UTC, sortable).
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Temp sibling used while replacing `path`: `orders.json` -> `orders.json.tmp`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with `content`.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Directory name for a backup taken at `at`.
pub fn backup_stamp(at: DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// Copy `live` into `backups_root/<now>/` and keep only the newest `keep`
/// backups of that file. Returns the path of the copy.
pub fn backup_file(live: &Path, backups_root: &Path, keep: usize) -> Result<PathBuf> {
    let dir = backups_root.join(backup_stamp(Utc::now()));
    let copy = copy_into(live, &dir)?;
    if let Some(name) = live.file_name().and_then(|n| n.to_str()) {
        prune_backups(backups_root, name, keep)?;
    }
    Ok(copy)
}

/// Copy `live` into `dir`, creating it if needed.
pub fn copy_into(live: &Path, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let target = dir.join(live.file_name().unwrap_or_default());
    fs::copy(live, &target)?;
    Ok(target)
}

/// Backup directories under `backups_root`, oldest first.
pub fn list_backups(backups_root: &Path) -> Result<Vec<PathBuf>> {
    if !backups_root.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = fs::read_dir(backups_root)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    dirs.sort();
    Ok(dirs)
}

/// Remove `file_name` from all but the newest `keep` backup directories that
/// hold it. Directories left empty are removed. Returns how many copies were
/// deleted.
pub fn prune_backups(backups_root: &Path, file_name: &str, keep: usize) -> Result<usize> {
    let holding = list_backups(backups_root)?
        .into_iter()
        .filter(|dir| dir.join(file_name).exists())
        .collect::<Vec<_>>();

    let excess = holding.len().saturating_sub(keep);
    for dir in &holding[..excess] {
        fs::remove_file(dir.join(file_name))?;
        if fs::read_dir(dir)?.next().is_none() {
            fs::remove_dir(dir)?;
        }
    }
    Ok(excess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_temp_path_is_sibling() {
        assert_eq!(
            temp_path(Path::new("/data/orders.json")),
            PathBuf::from("/data/orders.json.tmp")
        );
    }

    #[test]
    fn test_write_atomic_creates_parent_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("orders.json");

        write_atomic(&path, b"[]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
        assert!(!temp_path(&path).exists());

        write_atomic(&path, b"[{\"id\":\"1\"}]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"id\":\"1\"}]");
    }

    #[test]
    fn test_stale_temp_file_is_overwritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.json");
        write_atomic(&path, b"[1]").unwrap();

        // Leftover from an interrupted write.
        fs::write(temp_path(&path), b"[{\"id\":").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1]");

        write_atomic(&path, b"[2]").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[2]");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempdir().unwrap();
        let root = dir.path().join(BACKUP_DIR);
        let live = dir.path().join("orders.json");
        fs::write(&live, b"[]").unwrap();

        for stamp in ["20240101T000000.001Z", "20240101T000000.002Z", "20240101T000000.003Z"] {
            copy_into(&live, &root.join(stamp)).unwrap();
        }
        // Another collection's backup in the oldest directory survives.
        fs::write(root.join("20240101T000000.001Z").join("users.json"), b"[]").unwrap();

        assert_eq!(prune_backups(&root, "orders.json", 2).unwrap(), 1);

        let remaining = list_backups(&root).unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(!remaining[0].join("orders.json").exists());
        assert!(remaining[0].join("users.json").exists());
        assert!(remaining[2].join("orders.json").exists());
    }

    #[test]
    fn test_prune_removes_empty_directories() {
        let dir = tempdir().unwrap();
        let root = dir.path().join(BACKUP_DIR);
        let live = dir.path().join("carts.json");
        fs::write(&live, b"{}").unwrap();

        copy_into(&live, &root.join("20240101T000000.001Z")).unwrap();
        copy_into(&live, &root.join("20240101T000000.002Z")).unwrap();

        prune_backups(&root, "carts.json", 1).unwrap();
        assert_eq!(list_backups(&root).unwrap().len(), 1);
    }

    #[test]
    fn test_backup_file_returns_copy() {
        let dir = tempdir().unwrap();
        let live = dir.path().join("products.json");
        fs::write(&live, b"[{\"id\":\"prod-001\"}]").unwrap();

        let copy = backup_file(&live, &dir.path().join(BACKUP_DIR), 5).unwrap();
        assert_eq!(fs::read(&copy).unwrap(), fs::read(&live).unwrap());
    }
}
