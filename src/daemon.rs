//! Long-running store process.
//!
//! Owns the registry for the lifetime of the process:
//! - Opens every collection at startup
//! - Runs scheduled backups when configured
//! - Flushes all pending writes on graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::registry::{RegistryBuilder, StoreRegistry};

/// Run the store until `shutdown_rx` flips to true.
///
/// # Arguments
///
/// * `config` - Daemon configuration
/// * `shutdown_rx` - Receiver for shutdown signal
///
/// # Returns
///
/// Returns once every store has been flushed.
pub async fn run_daemon(
    config: Config,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let registry = Arc::new(RegistryBuilder::from_config(&config).build()?);

    tracing::info!(
        data_dir = %registry.data_dir().display(),
        collections = registry.names().len(),
        sqlite = registry.sqlite_enabled(),
        "Stockroom ready"
    );

    let backups = config
        .backup_interval()
        .map(|period| tokio::spawn(backup_loop(Arc::clone(&registry), period, shutdown_rx.clone())));

    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }
    tracing::info!("Shutdown signal received, flushing collections");

    if let Some(task) = backups {
        let _ = task.await;
    }

    let flushed = tokio::task::spawn_blocking(move || registry.flush_all()).await?;
    flushed?;

    tracing::info!("Stockroom stopped");
    Ok(())
}

async fn backup_loop(
    registry: Arc<StoreRegistry>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let registry = Arc::clone(&registry);
                match tokio::task::spawn_blocking(move || registry.backup_all()).await {
                    Ok(Ok(report)) => {
                        tracing::info!(dir = %report.dir.display(), "Scheduled backup written");
                    }
                    Ok(Err(e)) => tracing::error!(error = %e, "Scheduled backup failed"),
                    Err(e) => tracing::error!(error = %e, "Backup task failed"),
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::atomic::list_backups;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_daemon_flushes_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let config = Config::test_config(dir.path().to_path_buf());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let daemon = tokio::spawn(run_daemon(config, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        daemon.await.unwrap().unwrap();
        assert!(dir.path().join("products.json").exists());
        assert!(dir.path().join("stockroom.sqlite3").exists());
    }

    #[tokio::test]
    async fn test_scheduled_backups() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            sqlite: false,
            ..Config::test_config(dir.path().to_path_buf())
        };
        let registry = Arc::new(RegistryBuilder::from_config(&config).build().unwrap());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(backup_loop(
            Arc::clone(&registry),
            Duration::from_millis(20),
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        assert!(!list_backups(&dir.path().join("backups")).unwrap().is_empty());
    }
}
