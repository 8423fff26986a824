//! Player Host - local static asset server for a WebView-hosted game
//!
//! This crate provides:
//! - A loopback HTTP server for the bundled game directory
//! - MIME overrides for WebAssembly builds
//! - A catch-all JSON error route for anything that is not an asset
//! - An observable start/stop lifecycle
//! - Persistent settings and structured logging for the host binary

pub mod asset;
pub mod config;
pub mod core;
pub mod logging;

// Re-export commonly used items
pub use asset::{AssetError, ServerConfig, ServerState, StateChange, StaticAssetServer};
pub use config::{HostSettings, SettingsStore, SettingsStoreConfig};
pub use self::core::error::{PlayerHostError, Result};
pub use logging::{LoggingConfig, LoggingSystem};
