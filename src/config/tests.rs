//! Tests for Host Settings Module

use super::*;
use crate::asset::DEFAULT_ASSET_SERVER_PORT;
use crate::logging::LogLevel;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Create a test settings store with temporary directory
async fn create_test_store() -> (SettingsStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.json");

    let store = SettingsStore::new(SettingsStoreConfig::at(config_path))
        .await
        .unwrap();
    (store, temp_dir)
}

#[tokio::test]
async fn test_create_default_settings() {
    let (store, _temp) = create_test_store().await;

    assert!(store.path().exists());

    let settings = store.get().await;
    assert_eq!(settings.version, 1);
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, DEFAULT_ASSET_SERVER_PORT);
    assert_eq!(settings.server.root_dir, Path::new("game"));
    assert!(settings.server.content_caching);
    assert!(settings.server.session_affinity);
    assert_eq!(
        settings.server.mime_types.get(".wasm").map(String::as_str),
        Some("application/wasm")
    );
    assert_eq!(
        settings.server.mime_types.get(".symbols.json").map(String::as_str),
        Some("application/json")
    );
}

#[tokio::test]
async fn test_update_settings_persists() {
    let (store, _temp) = create_test_store().await;

    let updated = store
        .update(|settings| {
            settings.server.port = 8181;
            settings.logging.level = LogLevel::Debug;
        })
        .await
        .unwrap();
    assert_eq!(updated.server.port, 8181);

    // A fresh store over the same file sees the change
    let reopened = SettingsStore::new(SettingsStoreConfig::at(store.path()))
        .await
        .unwrap();
    let settings = reopened.get().await;
    assert_eq!(settings.server.port, 8181);
    assert_eq!(settings.logging.level, LogLevel::Debug);
}

#[tokio::test]
async fn test_invalid_update_is_rejected() {
    let (store, _temp) = create_test_store().await;

    let result = store
        .update(|settings| settings.server.host = "not an address".to_string())
        .await;
    assert!(matches!(result, Err(ConfigError::Invalid(_))));

    // In-memory and on-disk settings are untouched
    assert_eq!(store.get().await.server.host, "127.0.0.1");
    let on_disk = std::fs::read_to_string(store.path()).unwrap();
    assert!(!on_disk.contains("not an address"));
}

#[tokio::test]
async fn test_missing_file_without_create_default() {
    let temp = TempDir::new().unwrap();
    let config = SettingsStoreConfig {
        config_path: temp.path().join("absent.json"),
        create_default: false,
    };

    let result = SettingsStore::new(config).await;
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[tokio::test]
async fn test_partial_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(&path, r#"{ "server": { "port": 7000, "content_caching": false } }"#).unwrap();

    let store = SettingsStore::new(SettingsStoreConfig::at(&path)).await.unwrap();
    let settings = store.get().await;
    assert_eq!(settings.server.port, 7000);
    assert!(!settings.server.content_caching);
    assert!(settings.server.session_affinity);
    assert_eq!(settings.server.index_file, "index.html");
    assert_eq!(settings.server.mime_types.len(), 4);
    assert_eq!(
        settings.webview.browser_arguments_env,
        "WEBVIEW2_ADDITIONAL_BROWSER_ARGUMENTS"
    );
}

#[tokio::test]
async fn test_malformed_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = SettingsStore::new(SettingsStoreConfig::at(&path)).await;
    assert!(matches!(result, Err(ConfigError::Json(_))));
}

#[test]
fn test_to_server_config_resolves_relative_root() {
    let base = Path::new("/opt/player");
    let config = ServerSettings::default().to_server_config(base).unwrap();

    assert_eq!(config.root_dir, base.join("game"));
    assert_eq!(
        config.bind_addr,
        SocketAddr::from(([127, 0, 0, 1], DEFAULT_ASSET_SERVER_PORT))
    );
    assert_eq!(config.index_file.as_deref(), Some("index.html"));
    assert_eq!(config.session_ttl, Duration::from_secs(30 * 60));
    assert_eq!(config.max_sessions, crate::asset::DEFAULT_MAX_SESSIONS);
    assert_eq!(config.shutdown_grace, Duration::from_millis(5_000));
    assert!(config
        .mime_overrides
        .iter()
        .any(|(ext, ty)| ext == ".data" && ty == "application/octet-stream"));
}

#[test]
fn test_to_server_config_absolute_root_and_options() {
    let temp = TempDir::new().unwrap();
    let settings = ServerSettings {
        host: "localhost".to_string(),
        port: 0,
        root_dir: temp.path().to_path_buf(),
        index_file: "  ".to_string(),
        session_affinity: false,
        ..ServerSettings::default()
    };

    let config = settings.to_server_config(Path::new("/ignored")).unwrap();
    assert_eq!(config.root_dir, temp.path());
    assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 0)));
    assert!(config.index_file.is_none());
    assert!(!config.session_affinity);
}

#[test]
fn test_bind_addr_accepts_ipv6() {
    let settings = ServerSettings {
        host: "[::1]".to_string(),
        port: 9000,
        ..ServerSettings::default()
    };
    let addr = settings.bind_addr().unwrap();
    assert!(addr.is_ipv6());
    assert_eq!(addr.port(), 9000);
}

#[test]
fn test_webview_launch_env() {
    let (name, value) = WebViewSettings::default().launch_env();
    assert_eq!(name, "WEBVIEW2_ADDITIONAL_BROWSER_ARGUMENTS");
    assert_eq!(
        value,
        "--disable-frame-rate-limit --disable-gpu-vsync --autoplay-policy=no-user-gesture-required"
    );
}
