//! Static Asset Server
//!
//! Serves the bundled game directory to the WebView over a local HTTP origin.
//!
//! Features:
//! - Root confinement (dot segments, encoded traversal and escaping symlinks
//!   are all treated as not found)
//! - Longest-suffix MIME lookup with consumer overrides (`.symbols.json`)
//! - ETag / Last-Modified validators and an in-memory cache for small files
//! - Catch-all JSON error payload for anything that is not an asset
//! - Optional session affinity cookie
//! - Observable, serialized lifecycle with a process-wide bind registry

mod cache;
mod error;
mod mime;
mod path;
mod routes;
mod server;
mod session;
mod state;

pub use cache::{CacheStats, CachedAsset};
pub use error::AssetError;
pub use mime::{game_overrides, MimeTable, FALLBACK_CONTENT_TYPE};
pub use path::normalize_request_path;
pub use routes::{entity_tag, fallback_response, handle_request, http_date, RequestContext};
pub use server::{AssetServerState, ServerConfig, StaticAssetServer, DEFAULT_ASSET_SERVER_PORT};
pub use session::{Session, SessionManager, SessionTicket, DEFAULT_MAX_SESSIONS, SESSION_COOKIE};
pub use state::{ServerState, StateChange, StateNotifier};
