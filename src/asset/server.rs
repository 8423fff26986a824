//! Static Asset Server implementation
//!
//! Serves a root directory over a local HTTP listener for the game WebView:
//! - MIME-aware responses with per-extension overrides
//! - Validators and an in-memory cache for small assets
//! - Optional session affinity cookie
//! - Observable lifecycle (Stopped, Starting, Listening, Stopping, Failed)

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, Router};
use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use super::cache::{CacheStats, ContentCache};
use super::error::AssetError;
use super::mime::{game_overrides, MimeTable};
use super::routes::{handle_request, response_headers};
use super::session::{SessionManager, DEFAULT_MAX_SESSIONS};
use super::state::{ServerState, StateChange, StateNotifier};

/// Default port for the asset server
pub const DEFAULT_ASSET_SERVER_PORT: u16 = 9696;

lazy_static! {
    /// Addresses with a live listener owned by some server in this process
    static ref ACTIVE_BINDS: Mutex<HashSet<SocketAddr>> = Mutex::new(HashSet::new());
}

/// Registry claim on a bind address, released on drop
struct BindClaim(Option<SocketAddr>);

impl BindClaim {
    fn acquire(addr: SocketAddr) -> Result<Self, AssetError> {
        // Ephemeral ports are unique per bind; nothing to guard
        if addr.port() == 0 {
            return Ok(Self(None));
        }
        if !ACTIVE_BINDS.lock().insert(addr) {
            return Err(AssetError::AddressInUse { addr });
        }
        Ok(Self(Some(addr)))
    }
}

impl Drop for BindClaim {
    fn drop(&mut self) {
        if let Some(addr) = self.0.take() {
            ACTIVE_BINDS.lock().remove(&addr);
        }
    }
}

/// Asset server configuration. Immutable once the server is constructed.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind (port 0 picks an ephemeral port)
    pub bind_addr: SocketAddr,
    /// Directory exposed as the URL namespace
    pub root_dir: PathBuf,
    /// Extension to content-type pairs layered over the base table
    pub mime_overrides: Vec<(String, String)>,
    /// Issue and track a session cookie per client
    pub session_affinity: bool,
    /// Send validators, answer 304s and keep small files in memory
    pub content_caching: bool,
    /// Total in-memory cache budget in bytes (0 disables the memory cache)
    pub max_cache_bytes: usize,
    /// Largest single file kept in memory
    pub max_cached_file_bytes: usize,
    /// Default document for directory requests
    pub index_file: Option<String>,
    /// Idle time after which a session is forgotten
    pub session_ttl: Duration,
    /// Most sessions tracked at once
    pub max_sessions: usize,
    /// How long `stop` lets in-flight requests drain before aborting
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    /// Configuration for `root_dir` on the default loopback address
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_ASSET_SERVER_PORT),
            root_dir: root_dir.into(),
            mime_overrides: game_overrides(),
            session_affinity: true,
            content_caching: true,
            max_cache_bytes: 64 * 1024 * 1024, // 64 MB
            max_cached_file_bytes: 8 * 1024 * 1024, // 8 MB
            index_file: Some("index.html".to_string()),
            session_ttl: Duration::from_secs(30 * 60),
            max_sessions: DEFAULT_MAX_SESSIONS,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    pub fn with_mime_type(mut self, extension: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.mime_overrides.push((extension.into(), content_type.into()));
        self
    }

    pub fn with_session_affinity(mut self, enabled: bool) -> Self {
        self.session_affinity = enabled;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_content_caching(mut self, enabled: bool) -> Self {
        self.content_caching = enabled;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Shared state for request handlers
#[derive(Clone)]
pub struct AssetServerState {
    /// Canonical root directory
    pub root: Arc<PathBuf>,
    pub mime: Arc<MimeTable>,
    pub cache: Arc<ContentCache>,
    /// Present only when session affinity is enabled
    pub sessions: Option<Arc<SessionManager>>,
    pub config: Arc<ServerConfig>,
}

impl AssetServerState {
    /// Validate the root and build the shared tables
    pub fn new(config: ServerConfig) -> Result<Self, AssetError> {
        let root = validate_root(&config.root_dir)?;
        let mime = MimeTable::with_overrides(
            config
                .mime_overrides
                .iter()
                .map(|(ext, ty)| (ext.as_str(), ty.clone())),
        );
        let cache = ContentCache::new(config.max_cache_bytes, config.max_cached_file_bytes);
        let sessions = config
            .session_affinity
            .then(|| {
                Arc::new(
                    SessionManager::new(config.session_ttl).with_max_sessions(config.max_sessions),
                )
            });

        Ok(Self {
            root: Arc::new(root),
            mime: Arc::new(mime),
            cache: Arc::new(cache),
            sessions,
            config: Arc::new(config),
        })
    }
}

/// Root must exist, be a directory and be listable
fn validate_root(path: &Path) -> Result<PathBuf, AssetError> {
    let configuration = |reason: String| AssetError::Configuration {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = std::fs::metadata(path).map_err(|e| configuration(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(configuration("not a directory".to_string()));
    }
    std::fs::read_dir(path).map_err(|e| configuration(format!("not readable: {}", e)))?;
    std::fs::canonicalize(path).map_err(|e| configuration(e.to_string()))
}

/// Listener task owned while the server is `Listening`.
/// The task itself holds the bind claim, so the address is released only once
/// the socket is gone.
struct RunningServer {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Static Asset Server
///
/// Construct with [`StaticAssetServer::new`], then drive with `start` / `stop`.
/// Lifecycle calls are serialized; dropping a running server triggers the
/// same graceful shutdown without waiting for it. The address stays claimed
/// until that shutdown has finished.
pub struct StaticAssetServer {
    state: AssetServerState,
    notifier: Arc<StateNotifier>,
    lifecycle: tokio::sync::Mutex<Option<RunningServer>>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl StaticAssetServer {
    /// Validate `config` and return a server in `Stopped`
    pub fn new(config: ServerConfig) -> Result<Self, AssetError> {
        let state = AssetServerState::new(config)?;
        tracing::debug!(
            root = %state.root.display(),
            mime_entries = state.mime.len(),
            "Asset server constructed"
        );
        Ok(Self {
            state,
            notifier: Arc::new(StateNotifier::new()),
            lifecycle: tokio::sync::Mutex::new(None),
            local_addr: RwLock::new(None),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        self.notifier.current()
    }

    /// Register a callback invoked on every state transition
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(StateChange) + Send + Sync + 'static,
    {
        self.notifier.subscribe(listener);
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Canonical root directory
    pub fn root_dir(&self) -> &Path {
        &self.state.root
    }

    /// Address actually bound, while listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// URL a browser surface should navigate to, while listening
    pub fn origin_url(&self) -> Option<String> {
        self.local_addr().map(|mut addr| {
            if addr.ip().is_unspecified() {
                addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
            }
            format!("http://{}/", addr)
        })
    }

    /// Build the router with the asset handler and middleware
    pub fn build_router(&self) -> Router {
        Router::new()
            .fallback(handle_request)
            .layer(middleware::from_fn(response_headers))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and begin serving.
    ///
    /// A no-op when already `Listening`. Fails without touching the state when
    /// `Failed`; call [`reset`](Self::reset) first.
    pub async fn start(&self) -> Result<(), AssetError> {
        let mut running = self.lifecycle.lock().await;

        match self.notifier.current() {
            ServerState::Listening => {
                tracing::debug!("Asset server already listening");
                return Ok(());
            }
            ServerState::Failed => {
                return Err(AssetError::InvalidState {
                    operation: "start",
                    state: ServerState::Failed,
                });
            }
            _ => {}
        }

        self.notifier.transition(ServerState::Starting);

        let addr = self.state.config.bind_addr;
        let claim = match BindClaim::acquire(addr) {
            Ok(claim) => claim,
            Err(e) => return Err(self.fail(e)),
        };
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                return Err(self.fail(AssetError::BindFailed {
                    addr,
                    reason: e.to_string(),
                }))
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local) => local,
            Err(e) => return Err(self.fail(AssetError::Io(e))),
        };

        let router = self.build_router();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _claim = claim;
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap_or_else(|e| tracing::error!("HTTP server error: {}", e));
        });

        *running = Some(RunningServer { shutdown, task });
        *self.local_addr.write() = Some(local_addr);
        self.notifier.transition(ServerState::Listening);

        tracing::info!(
            "Serving {} on http://{}",
            self.state.root.display(),
            local_addr
        );
        Ok(())
    }

    /// Stop accepting connections and release the address.
    ///
    /// In-flight requests get `shutdown_grace` to finish before the listener
    /// task is aborted. Idempotent when `Stopped`; leaves `Failed` untouched.
    pub async fn stop(&self) -> Result<(), AssetError> {
        let mut running = self.lifecycle.lock().await;

        let Some(server) = running.take() else {
            return Ok(());
        };

        self.notifier.transition(ServerState::Stopping);

        let RunningServer { shutdown, mut task } = server;
        let _ = shutdown.send(());

        let grace = self.state.config.shutdown_grace;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Asset server task ended abnormally: {}", e),
            Err(_) => {
                tracing::warn!(
                    "In-flight requests did not drain within {:?}; aborting",
                    grace
                );
                task.abort();
                let _ = task.await;
            }
        }

        *self.local_addr.write() = None;
        self.notifier.transition(ServerState::Stopped);
        Ok(())
    }

    /// Clear a `Failed` state back to `Stopped` so `start` may be retried
    pub async fn reset(&self) -> Result<(), AssetError> {
        let _running = self.lifecycle.lock().await;
        if self.notifier.current() == ServerState::Failed {
            self.notifier.transition(ServerState::Stopped);
        }
        Ok(())
    }

    fn fail(&self, error: AssetError) -> AssetError {
        tracing::error!("Asset server failed to start: {}", error);
        self.notifier.transition(ServerState::Failed);
        error
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.state.cache.stats()
    }

    /// Drop every in-memory asset
    pub fn clear_cache(&self) {
        self.state.cache.clear();
    }

    /// Number of live sessions (0 when affinity is off)
    pub fn session_count(&self) -> usize {
        self.state.sessions.as_ref().map_or(0, |s| s.len())
    }
}
