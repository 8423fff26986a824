//! Settings Storage Implementation
//!
//! Provides JSON file-based settings storage with:
//! - Atomic writes using temp file + rename
//! - Thread-safe access via RwLock
//! - Default settings generation
//! - Conversion into the immutable asset server configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::asset::{ServerConfig, DEFAULT_ASSET_SERVER_PORT, DEFAULT_MAX_SESSIONS};
use crate::logging::LoggingConfig;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings store location and behaviour
#[derive(Debug, Clone)]
pub struct SettingsStoreConfig {
    /// Path to the settings file
    pub config_path: PathBuf,
    /// Whether to create default settings if the file does not exist
    pub create_default: bool,
}

impl Default for SettingsStoreConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            create_default: true,
        }
    }
}

impl SettingsStoreConfig {
    /// Store backed by an explicit file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            create_default: true,
        }
    }
}

/// Default settings file: `<config dir>/player-host/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("player-host")
        .join("config.json")
}

/// Top-level host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    /// Settings version for future migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Asset server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Values handed to the WebView host
    #[serde(default)]
    pub webview: WebViewSettings,

    /// Last modified timestamp
    #[serde(default = "default_timestamp")]
    pub last_modified: String,
}

fn default_version() -> u32 {
    1
}

fn default_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            version: default_version(),
            server: ServerSettings::default(),
            logging: LoggingConfig::default(),
            webview: WebViewSettings::default(),
            last_modified: default_timestamp(),
        }
    }
}

/// Asset server settings as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host or IP to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind (0 = ephemeral)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Asset root; relative paths resolve against the working directory
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Extension to content-type overrides
    #[serde(default = "default_mime_types")]
    pub mime_types: BTreeMap<String, String>,

    /// Track clients with a session cookie
    #[serde(default = "default_true")]
    pub session_affinity: bool,

    /// Validators, 304 responses and in-memory caching
    #[serde(default = "default_true")]
    pub content_caching: bool,

    /// In-memory cache budget in bytes
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: usize,

    /// Largest file kept in memory, in bytes
    #[serde(default = "default_max_cached_file_bytes")]
    pub max_cached_file_bytes: usize,

    /// Directory default document (empty disables it)
    #[serde(default = "default_index_file")]
    pub index_file: String,

    /// Session idle expiry in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Most sessions tracked at once
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Drain window on stop, in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_ASSET_SERVER_PORT
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("game")
}

fn default_mime_types() -> BTreeMap<String, String> {
    crate::asset::game_overrides().into_iter().collect()
}

fn default_true() -> bool {
    true
}

fn default_max_cache_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_cached_file_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_index_file() -> String {
    "index.html".to_string()
}

fn default_session_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root_dir: default_root_dir(),
            mime_types: default_mime_types(),
            session_affinity: true,
            content_caching: true,
            max_cache_bytes: default_max_cache_bytes(),
            max_cached_file_bytes: default_max_cached_file_bytes(),
            index_file: default_index_file(),
            session_ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ServerSettings {
    /// Resolve the bind address. `localhost` maps to the IPv4 loopback.
    pub fn bind_addr(&self) -> ConfigResult<SocketAddr> {
        let host = self.host.trim();
        let ip: IpAddr = if host.eq_ignore_ascii_case("localhost") {
            IpAddr::from([127, 0, 0, 1])
        } else {
            host.trim_start_matches('[')
                .trim_end_matches(']')
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("host '{}': {}", self.host, e)))?
        };
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Build the immutable server configuration, resolving a relative root
    /// against `base_dir`
    pub fn to_server_config(&self, base_dir: &Path) -> ConfigResult<ServerConfig> {
        let root_dir = if self.root_dir.is_absolute() {
            self.root_dir.clone()
        } else {
            base_dir.join(&self.root_dir)
        };
        let index_file = Some(self.index_file.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        let mut config = ServerConfig::new(root_dir).with_bind_addr(self.bind_addr()?);
        config.mime_overrides = self
            .mime_types
            .iter()
            .map(|(ext, ty)| (ext.clone(), ty.clone()))
            .collect();
        config.session_affinity = self.session_affinity;
        config.content_caching = self.content_caching;
        config.max_cache_bytes = self.max_cache_bytes;
        config.max_cached_file_bytes = self.max_cached_file_bytes;
        config.index_file = index_file;
        config.session_ttl = Duration::from_secs(self.session_ttl_secs);
        config.max_sessions = self.max_sessions;
        config.shutdown_grace = Duration::from_millis(self.shutdown_grace_ms);
        Ok(config)
    }
}

/// Browser engine options the UI host applies before creating its WebView
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebViewSettings {
    /// Environment variable read by the WebView engine
    #[serde(default = "default_browser_args_var")]
    pub browser_arguments_env: String,

    /// Extra browser arguments
    #[serde(default = "default_browser_arguments")]
    pub browser_arguments: Vec<String>,
}

fn default_browser_args_var() -> String {
    "WEBVIEW2_ADDITIONAL_BROWSER_ARGUMENTS".to_string()
}

fn default_browser_arguments() -> Vec<String> {
    vec![
        "--disable-frame-rate-limit".to_string(),
        "--disable-gpu-vsync".to_string(),
        "--autoplay-policy=no-user-gesture-required".to_string(),
    ]
}

impl Default for WebViewSettings {
    fn default() -> Self {
        Self {
            browser_arguments_env: default_browser_args_var(),
            browser_arguments: default_browser_arguments(),
        }
    }
}

impl WebViewSettings {
    /// `(variable, value)` pair for the WebView process environment
    pub fn launch_env(&self) -> (String, String) {
        (
            self.browser_arguments_env.clone(),
            self.browser_arguments.join(" "),
        )
    }
}

/// Settings store with thread-safe access
pub struct SettingsStore {
    settings: Arc<RwLock<HostSettings>>,
    store: SettingsStoreConfig,
}

impl SettingsStore {
    /// Load settings, creating the default file when allowed
    pub async fn new(store: SettingsStoreConfig) -> ConfigResult<Self> {
        let settings = if store.config_path.exists() {
            Self::load_from_file(&store.config_path).await?
        } else if store.create_default {
            if let Some(parent) = store.config_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let defaults = HostSettings::default();
            Self::save_to_file(&store.config_path, &defaults).await?;
            tracing::info!("Created default settings at {}", store.config_path.display());
            defaults
        } else {
            return Err(ConfigError::NotFound(store.config_path.clone()));
        };

        Ok(Self {
            settings: Arc::new(RwLock::new(settings)),
            store,
        })
    }

    /// Load settings from file
    async fn load_from_file(path: &Path) -> ConfigResult<HostSettings> {
        let content = tokio::fs::read_to_string(path).await?;
        let settings: HostSettings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to file with atomic write
    async fn save_to_file(path: &Path, settings: &HostSettings) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(settings)?;

        // Write to temp file first
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content).await?;

        // Atomic rename
        tokio::fs::rename(&temp_path, path).await?;

        Ok(())
    }

    /// Get current settings (read-only)
    pub async fn get(&self) -> HostSettings {
        self.settings.read().await.clone()
    }

    /// Apply `updater`, validate and persist
    pub async fn update<F>(&self, updater: F) -> ConfigResult<HostSettings>
    where
        F: FnOnce(&mut HostSettings),
    {
        let mut settings = self.settings.write().await;
        let mut next = settings.clone();
        updater(&mut next);
        next.server.bind_addr()?;
        next.last_modified = default_timestamp();

        Self::save_to_file(&self.store.config_path, &next).await?;
        *settings = next.clone();
        Ok(next)
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.store.config_path
    }
}
