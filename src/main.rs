//! Player Host
//!
//! Serves the game directory on a local origin for the WebView host and
//! prints the values that host needs to launch.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use player_host::asset::StaticAssetServer;
use player_host::config::{SettingsStore, SettingsStoreConfig};
use player_host::core::{ErrorRecovery, PlayerHostError, RecoveryAction};
use player_host::logging::{init_fallback_logging, LoggingConfig, LoggingSystem};

/// Attempts made before giving up on a retryable bind failure
const MAX_START_ATTEMPTS: u32 = 3;

/// Command line arguments
struct Args {
    /// Settings file; the platform default when absent
    config: Option<PathBuf>,
    /// Overrides the configured asset root
    root: Option<PathBuf>,
    /// Overrides the configured port
    port: Option<u16>,
    /// Verbose console logging instead of the configured logging
    dev: bool,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut root = None;
        let mut port = None;
        let mut dev = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = Some(args.next().map(PathBuf::from).ok_or("--config needs a path")?);
                }
                "--root" | "-r" => {
                    root = Some(args.next().map(PathBuf::from).ok_or("--root needs a path")?);
                }
                "--port" | "-p" => {
                    let val = args.next().ok_or("--port needs a value")?;
                    port = Some(val.parse().map_err(|_| "Invalid port value")?);
                }
                "--dev" | "-d" => {
                    dev = true;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                _ => {
                    return Err(format!("Unknown argument: {}", arg));
                }
            }
        }

        Ok(Self {
            config,
            root,
            port,
            dev,
        })
    }
}

fn print_help() {
    println!(
        r#"Player Host - local asset server for the game WebView

USAGE:
    player-host [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Settings file (default: <config dir>/player-host/config.json)
    -r, --root <DIR>       Asset root, overriding the settings file
    -p, --port <PORT>      Port, overriding the settings file (0 = any free port)
    -d, --dev              Verbose console logging
    -h, --help             Print this help message

DESCRIPTION:
    Serves the game directory on a loopback origin. Requests that do not match
    an asset receive {{"Message":"Error"}}. Press Ctrl+C to stop.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(2);
        }
    };

    let store_config = match args.config.clone() {
        Some(path) => SettingsStoreConfig::at(path),
        None => SettingsStoreConfig::default(),
    };
    let store = SettingsStore::new(store_config)
        .await
        .context("failed to load settings")?;
    let mut settings = store.get().await;

    let logging_config = if args.dev {
        LoggingConfig::development()
    } else {
        settings.logging.clone()
    };

    // Kept alive for the whole run so the file writer is flushed on exit
    let _logging_system = match LoggingSystem::init(logging_config) {
        Ok(system) => Some(system),
        Err(e) => {
            eprintln!("Failed to initialize logging system: {}. Using basic logging.", e);
            init_fallback_logging();
            None
        }
    };
    tracing::info!("Settings loaded from {}", store.path().display());

    if let Some(root) = args.root {
        settings.server.root_dir = root;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let base_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let server_config = settings
        .server
        .to_server_config(&base_dir)
        .map_err(PlayerHostError::from)?;
    let server = StaticAssetServer::new(server_config).map_err(PlayerHostError::from)?;

    start_with_retry(&server).await?;

    let origin = server
        .origin_url()
        .context("server reported no local address")?;
    let (env_name, env_value) = settings.webview.launch_env();
    println!("Origin: {}", origin);
    println!("{}={}", env_name, env_value);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    tracing::info!("Shutdown requested");

    server.stop().await.map_err(PlayerHostError::from)?;
    Ok(())
}

/// Start the server, resetting and retrying while the failure is transient
async fn start_with_retry(server: &StaticAssetServer) -> Result<(), PlayerHostError> {
    let mut attempt = 1;
    loop {
        let err = match server.start().await {
            Ok(()) => return Ok(()),
            Err(e) => PlayerHostError::from(e),
        };

        if attempt >= MAX_START_ATTEMPTS || err.recovery_action() != RecoveryAction::Retry {
            tracing::error!("Asset server failed to start: {}", err);
            return Err(err);
        }

        let delay = Duration::from_millis(err.retry_delay_ms().unwrap_or(1000));
        tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Asset server start failed, retrying: {}",
            err
        );
        tokio::time::sleep(delay).await;
        server.reset().await.map_err(PlayerHostError::from)?;
        attempt += 1;
    }
}
