//! CLI and shutdown integration tests.
//!
//! Tests:
//! - CLI help and version output
//! - SIGTERM shuts the daemon down cleanly after the data dir is ready

use std::process::Command;
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_stockroom");

/// CLI --help output should show the store options.
#[test]
fn test_cli_help_output() {
    let output = Command::new(BIN)
        .arg("--help")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);

    for option in [
        "--data-dir",
        "--sqlite",
        "--debounce-ms",
        "--cache-ttl-secs",
        "--backup-keep",
        "--log-level",
    ] {
        assert!(stdout.contains(option), "help should mention {option}: {stdout}");
    }
}

/// CLI --version should show version.
#[test]
fn test_cli_version_output() {
    let output = Command::new(BIN)
        .arg("--version")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "version output should contain version number: {}",
        stdout
    );
}

/// The daemon creates the collection files, then exits cleanly on SIGTERM.
#[cfg(unix)]
#[tokio::test]
async fn test_graceful_shutdown_on_sigterm() {
    use std::process::Stdio;
    use tokio::process::Command as TokioCommand;
    use tokio::time::timeout;

    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
    let products = temp_dir.path().join("products.json");

    let mut child = TokioCommand::new(BIN)
        .args(["--data-dir", temp_dir.path().to_str().unwrap()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn daemon");

    let started = timeout(Duration::from_secs(10), async {
        while !products.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "daemon did not create collection files");
    // Give the signal handler time to install.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let pid = child.id().expect("no pid");
    let _ = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status();

    match timeout(Duration::from_secs(5), child.wait()).await {
        Ok(Ok(status)) => assert!(status.success(), "daemon exited with {status}"),
        Ok(Err(e)) => panic!("failed to wait for child: {}", e),
        Err(_) => {
            child.kill().await.expect("failed to kill");
            panic!("daemon did not respond to SIGTERM within timeout");
        }
    }
}
