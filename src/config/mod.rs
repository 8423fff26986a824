//! Host Settings Module
//!
//! Provides persistent settings storage with:
//! - JSON file-based storage
//! - Serde defaults for every field, so partial files load
//! - Thread-safe access
//! - Conversion into the asset server configuration

mod storage;
#[cfg(test)]
mod tests;

pub use storage::{
    default_config_path, ConfigError, ConfigResult, HostSettings, ServerSettings, SettingsStore,
    SettingsStoreConfig, WebViewSettings,
};
