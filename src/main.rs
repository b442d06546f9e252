//! Stockroom: embedded collection store daemon.
//!
//! # Usage
//!
//! ```bash
//! stockroom --data-dir ./data --backup-interval-secs 3600
//! ```
//!
//! Environment variables can also be used:
//! - `STOCKROOM_DATA_DIR`: Directory for collection files and SQLite
//! - `STOCKROOM_SQLITE`: Set to `false` to keep every collection in JSON files
//! - `RUST_LOG`: Log filter (trace, debug, info, warn, error)

use stockroom::config::Config;
use stockroom::daemon::run_daemon;
use stockroom::observability::metrics::init_metrics_with_endpoint;
use stockroom::observability::tracing::init_tracing;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  Stockroom v{} - Embedded Collection Store

  Configuration:
    Data Dir:   {}
    SQLite:     {}
    Debounce:   {} ms
    Cache TTL:  {} s
    Log Level:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version,
        config.data_dir.display(),
        if config.sqlite { config.sqlite_file.as_str() } else { "disabled" },
        config.debounce_ms,
        config.cache_ttl_secs,
        config.log_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse_args();

    init_tracing("stockroom", config.log_json);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    print_banner(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                        }
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating shutdown...");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        let _ = shutdown_tx.send(true);
    });

    run_daemon(config, shutdown_rx).await?;

    tracing::info!("Stockroom shutdown complete");
    Ok(())
}
