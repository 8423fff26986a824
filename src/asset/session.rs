//! Session affinity bookkeeping
//!
//! Advisory only: correlates repeated requests from one client through a
//! cookie. Nothing in the file-serving path depends on it.

use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderValue};
use dashmap::DashMap;
use parking_lot::Mutex;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "__session";

/// One tracked client session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub created_at: Instant,
    pub last_seen: Instant,
    pub request_count: u64,
}

/// Outcome of resolving the session for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTicket {
    pub token: String,
    /// True when the token was minted for this request and must be sent back
    pub issued: bool,
}

impl SessionTicket {
    /// `Set-Cookie` value for a freshly issued token
    pub fn set_cookie_header(&self) -> Option<HeaderValue> {
        if !self.issued {
            return None;
        }
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE, self.token
        ))
        .ok()
    }
}

/// Upper bound on tracked sessions; the least recently seen is evicted past it
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Longest gap between expiry sweeps
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Table of live sessions keyed by token
pub struct SessionManager {
    sessions: DashMap<String, Session>,
    ttl: Duration,
    max_sessions: usize,
    last_purge: Mutex<Instant>,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            max_sessions: DEFAULT_MAX_SESSIONS,
            last_purge: Mutex::new(Instant::now()),
        }
    }

    /// Bound the table size (at least one session is always allowed)
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Generate a cryptographically secure session token
    fn generate_token() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let bytes: [u8; 32] = rng.gen();
        hex::encode(bytes)
    }

    /// Touch the live session named by the request cookie.
    ///
    /// Never creates anything; an unknown or expired token yields `None`.
    pub fn resolve(&self, headers: &HeaderMap) -> Option<SessionTicket> {
        let token = cookie_token(headers)?;
        let now = Instant::now();

        if let Some(mut session) = self.sessions.get_mut(&token) {
            if now.duration_since(session.last_seen) <= self.ttl {
                session.last_seen = now;
                session.request_count += 1;
                return Some(SessionTicket {
                    token,
                    issued: false,
                });
            }
        }
        // Expired; the guard above is dropped before removal
        self.sessions.remove(&token);
        None
    }

    /// Start a new session, keeping the table within its bound
    pub fn issue(&self) -> SessionTicket {
        let now = Instant::now();
        self.purge_if_due(now);

        while self.sessions.len() >= self.max_sessions {
            if !self.evict_least_recent() {
                break;
            }
        }

        let token = Self::generate_token();
        self.sessions.insert(
            token.clone(),
            Session {
                token: token.clone(),
                created_at: now,
                last_seen: now,
                request_count: 1,
            },
        );
        tracing::debug!(token = &token[..8], "Issued new session");

        SessionTicket {
            token,
            issued: true,
        }
    }

    fn purge_if_due(&self, now: Instant) {
        let interval = self.ttl.min(PURGE_INTERVAL);
        {
            let mut last_purge = self.last_purge.lock();
            if now.duration_since(*last_purge) < interval {
                return;
            }
            *last_purge = now;
        }
        self.purge_expired();
    }

    fn evict_least_recent(&self) -> bool {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.last_seen)
            .map(|entry| entry.key().clone());
        match oldest {
            Some(token) => self.sessions.remove(&token).is_some(),
            None => false,
        }
    }

    /// Drop every session idle for longer than the TTL
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.sessions
            .retain(|_, session| now.duration_since(session.last_seen) <= ttl);
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Extract the session token from any `Cookie` header
fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
