//! Asset server request handling
//!
//! A single fallback handler serves every request: static file matching runs
//! first, and only when it finds nothing does the catch-all error payload go
//! out. Registration order therefore cannot shadow assets.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::cache::CachedAsset;
use super::mime::FALLBACK_CONTENT_TYPE;
use super::path::{is_within_root, normalize_request_path};
use super::server::AssetServerState;

/// Per-request record, owned by one request's handling
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: Uuid,
    pub method: Method,
    pub requested_path: String,
    /// Canonical file served, after root confinement
    pub resolved: Option<PathBuf>,
    pub content_type: Option<String>,
    pub status: StatusCode,
    pub session: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, requested_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            method,
            requested_path: requested_path.into(),
            resolved: None,
            content_type: None,
            status: StatusCode::OK,
            session: None,
        }
    }
}

/// A file under the root that a request maps to
struct ResolvedAsset {
    /// Path as requested (after index resolution); drives MIME lookup
    request_path: PathBuf,
    /// Canonical path actually read
    canonical: PathBuf,
    metadata: std::fs::Metadata,
}

enum Payload {
    Memory(Bytes),
    /// Open file and its length as of opening
    Stream(tokio::fs::File, u64),
}

impl Payload {
    /// Bytes the body will actually carry
    fn len(&self) -> u64 {
        match self {
            Payload::Memory(bytes) => bytes.len() as u64,
            Payload::Stream(_, len) => *len,
        }
    }
}

/// Fixed response for anything that is not a static asset
pub fn fallback_response() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "Message": "Error" }))).into_response()
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Response for an io failure on a path that resolved under the root.
///
/// A vanished file is just not found; permission and other failures are 500.
fn io_failure_response(error: &io::Error, path: &Path) -> Response {
    match error.kind() {
        io::ErrorKind::NotFound => fallback_response(),
        io::ErrorKind::PermissionDenied => {
            tracing::error!(path = %path.display(), "Permission denied reading asset: {}", error);
            internal_error()
        }
        _ => {
            tracing::error!(path = %path.display(), "Failed to read asset: {}", error);
            internal_error()
        }
    }
}

/// Entry point for every request
pub async fn handle_request(
    State(state): State<AssetServerState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let mut ctx = RequestContext::new(method, uri.path());

    let known = state
        .sessions
        .as_ref()
        .and_then(|sessions| sessions.resolve(&headers));

    let mut response = serve(&state, &mut ctx, &headers).await;
    ctx.status = response.status();

    // Sessions are only minted for clients that actually received an asset
    let ticket = match (known, state.sessions.as_ref()) {
        (Some(ticket), _) => Some(ticket),
        (None, Some(sessions)) if ctx.resolved.is_some() && is_asset_status(ctx.status) => {
            Some(sessions.issue())
        }
        _ => None,
    };
    ctx.session = ticket.as_ref().map(|t| t.token.clone());

    if let Some(cookie) = ticket.and_then(|t| t.set_cookie_header()) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }

    tracing::debug!(
        request_id = %ctx.id,
        method = %ctx.method,
        path = %ctx.requested_path,
        status = ctx.status.as_u16(),
        content_type = ctx.content_type.as_deref().unwrap_or("-"),
        resolved = ?ctx.resolved,
        "Handled request"
    );

    response
}

fn is_asset_status(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_MODIFIED
}

async fn serve(state: &AssetServerState, ctx: &mut RequestContext, headers: &HeaderMap) -> Response {
    if ctx.method != Method::GET && ctx.method != Method::HEAD {
        return fallback_response();
    }

    let Some(relative) = normalize_request_path(&ctx.requested_path) else {
        tracing::debug!(path = %ctx.requested_path, "Rejected path outside asset root");
        return fallback_response();
    };

    let asset = match resolve_asset(state, &relative).await {
        Ok(Some(asset)) => asset,
        Ok(None) => return fallback_response(),
        Err(e) => return io_failure_response(&e, &relative),
    };

    let content_type = state.mime.lookup(&asset.request_path).to_string();
    ctx.resolved = Some(asset.canonical.clone());
    ctx.content_type = Some(content_type.clone());

    serve_asset(state, &ctx.method, &asset, &content_type, headers).await
}

/// Map a normalized relative path to a readable file under the root.
///
/// `Ok(None)` means nothing servable exists there; `Err` is reserved for
/// permission failures on something that does exist.
async fn resolve_asset(state: &AssetServerState, relative: &Path) -> io::Result<Option<ResolvedAsset>> {
    let candidate = state.root.join(relative);

    let metadata = match stat(&candidate).await? {
        Some(m) => m,
        None => return Ok(None),
    };

    let (request_path, metadata) = if metadata.is_dir() {
        let Some(index) = state.config.index_file.as_deref() else {
            return Ok(None);
        };
        let index_path = candidate.join(index);
        match stat(&index_path).await? {
            Some(m) if m.is_file() => (index_path, m),
            _ => return Ok(None),
        }
    } else if metadata.is_file() {
        (candidate, metadata)
    } else {
        return Ok(None);
    };

    let canonical = match tokio::fs::canonicalize(&request_path).await {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(e),
        Err(_) => return Ok(None),
    };
    if !is_within_root(&state.root, &canonical) {
        tracing::warn!(
            path = %request_path.display(),
            target = %canonical.display(),
            "Symlink resolves outside asset root"
        );
        return Ok(None);
    }

    Ok(Some(ResolvedAsset {
        request_path,
        canonical,
        metadata,
    }))
}

async fn stat(path: &Path) -> io::Result<Option<std::fs::Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(m) => Ok(Some(m)),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(e),
        Err(_) => Ok(None),
    }
}

async fn serve_asset(
    state: &AssetServerState,
    method: &Method,
    asset: &ResolvedAsset,
    content_type: &str,
    req_headers: &HeaderMap,
) -> Response {
    let len = asset.metadata.len();
    let modified = asset.metadata.modified().ok();

    // Open before answering anything so unreadable files always surface as 500
    let payload = match load_payload(state, asset, len, modified).await {
        Ok(p) => p,
        Err(e) => return io_failure_response(&e, &asset.canonical),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE)),
    );

    if state.config.content_caching {
        let etag = entity_tag(len, modified);
        if let Ok(value) = HeaderValue::from_str(&etag) {
            headers.insert(header::ETAG, value);
        }
        if let Some(value) = modified.and_then(|m| HeaderValue::from_str(&http_date(m)).ok()) {
            headers.insert(header::LAST_MODIFIED, value);
        }
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        if is_not_modified(req_headers, &etag, modified) {
            return (StatusCode::NOT_MODIFIED, headers).into_response();
        }
    }

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(payload.len()));

    if *method == Method::HEAD {
        return (StatusCode::OK, headers).into_response();
    }

    let body = match payload {
        Payload::Memory(bytes) => Body::from(bytes),
        Payload::Stream(file, len) => Body::from_stream(ReaderStream::new(file.take(len))),
    };
    (StatusCode::OK, headers, body).into_response()
}

async fn load_payload(
    state: &AssetServerState,
    asset: &ResolvedAsset,
    len: u64,
    modified: Option<SystemTime>,
) -> io::Result<Payload> {
    let use_cache = state.config.content_caching && state.cache.accepts(len);
    if !use_cache {
        let file = tokio::fs::File::open(&asset.canonical).await?;
        // The file may have changed since the stat; frame what is there now
        let current = file.metadata().await?.len();
        return Ok(Payload::Stream(file, current));
    }

    if let Some(hit) = state.cache.get(&asset.canonical, len, modified) {
        return Ok(Payload::Memory(hit.data));
    }

    let data = tokio::fs::read(&asset.canonical).await?;
    // File changed between stat and read; serve what was read, don't cache it
    if data.len() as u64 != len {
        return Ok(Payload::Memory(Bytes::from(data)));
    }
    let cached = CachedAsset::new(data, modified);
    let bytes = cached.data.clone();
    state.cache.insert(asset.canonical.clone(), cached);
    Ok(Payload::Memory(bytes))
}

/// Weak validator derived from size and modification time
pub fn entity_tag(len: u64, modified: Option<SystemTime>) -> String {
    let nanos = modified
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("W/\"{:x}-{:x}\"", len, nanos)
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// `If-None-Match` takes precedence; `If-Modified-Since` only applies without it
fn is_not_modified(headers: &HeaderMap, etag: &str, modified: Option<SystemTime>) -> bool {
    if let Some(value) = headers.get(header::IF_NONE_MATCH) {
        let Ok(value) = value.to_str() else {
            return false;
        };
        return value
            .split(',')
            .map(str::trim)
            .any(|tag| tag == "*" || weak_eq(tag, etag));
    }

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    match (since, modified) {
        (Some(since), Some(modified)) => DateTime::<Utc>::from(modified).timestamp() <= since.timestamp(),
        _ => false,
    }
}

fn weak_eq(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

/// Adds hardening headers to every response
pub async fn response_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_http_date_format() {
        let time = UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_http_date_round_trip() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let parsed = parse_http_date(&http_date(time)).unwrap();
        assert_eq!(parsed.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_entity_tag_changes_with_mtime() {
        let a = entity_tag(10, Some(UNIX_EPOCH + Duration::from_secs(1)));
        let b = entity_tag(10, Some(UNIX_EPOCH + Duration::from_secs(2)));
        assert_ne!(a, b);
        assert!(a.starts_with("W/\""));
    }

    #[test]
    fn test_if_none_match() {
        let etag = entity_tag(10, None);
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_str(&format!("\"x\", {}", etag)).unwrap());
        assert!(is_not_modified(&headers, &etag, None));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"other\""));
        assert!(!is_not_modified(&headers, &etag, None));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
        assert!(is_not_modified(&headers, &etag, None));
    }

    #[test]
    fn test_if_none_match_takes_precedence() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_000);
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"stale\""));
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&http_date(modified)).unwrap(),
        );
        assert!(!is_not_modified(&headers, "W/\"fresh\"", Some(modified)));
    }

    #[test]
    fn test_if_modified_since() {
        let modified = UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut headers = HeaderMap::new();

        headers.insert(header::IF_MODIFIED_SINCE, HeaderValue::from_str(&http_date(modified)).unwrap());
        assert!(is_not_modified(&headers, "W/\"x\"", Some(modified)));

        let earlier = modified - Duration::from_secs(60);
        headers.insert(header::IF_MODIFIED_SINCE, HeaderValue::from_str(&http_date(earlier)).unwrap());
        assert!(!is_not_modified(&headers, "W/\"x\"", Some(modified)));

        headers.insert(header::IF_MODIFIED_SINCE, HeaderValue::from_static("not a date"));
        assert!(!is_not_modified(&headers, "W/\"x\"", Some(modified)));
    }

    #[test]
    fn test_request_context_defaults() {
        let ctx = RequestContext::new(Method::GET, "/index.html");
        assert_eq!(ctx.requested_path, "/index.html");
        assert!(ctx.resolved.is_none());
        assert!(ctx.session.is_none());
    }

    #[test]
    fn test_io_failure_mapping() {
        let path = Path::new("levels/level1.data");

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(
            io_failure_response(&denied, path).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let vanished = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(io_failure_response(&vanished, path).status(), StatusCode::NOT_FOUND);

        let other = io::Error::new(io::ErrorKind::Other, "device error");
        assert_eq!(
            io_failure_response(&other, path).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    async fn serve_after_rewrite(content_caching: bool) -> (Option<u64>, usize) {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.js"), "a()").unwrap();
        let config = crate::asset::ServerConfig::new(dir.path()).with_content_caching(content_caching);
        let state = AssetServerState::new(config).unwrap();

        let asset = resolve_asset(&state, Path::new("a.js")).await.unwrap().unwrap();
        assert_eq!(asset.metadata.len(), 3);
        std::fs::write(dir.path().join("a.js"), "a();b();c()").unwrap();

        let response = serve_asset(&state, &Method::GET, &asset, "text/javascript", &HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let declared = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (declared, body.len())
    }

    #[tokio::test]
    async fn test_content_length_matches_body_after_rewrite_from_memory() {
        let (declared, body_len) = serve_after_rewrite(true).await;
        assert_eq!(body_len, 11);
        assert_eq!(declared, Some(11));
    }

    #[tokio::test]
    async fn test_content_length_matches_body_after_rewrite_streamed() {
        let (declared, body_len) = serve_after_rewrite(false).await;
        assert_eq!(body_len, 11);
        assert_eq!(declared, Some(11));
    }
}
