//! Server lifecycle state and change notifications

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle state of the static asset server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
    Stopping,
    /// Terminal until [`StaticAssetServer::reset`](super::StaticAssetServer::reset)
    Failed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Stopped => "Stopped",
            ServerState::Starting => "Starting",
            ServerState::Listening => "Listening",
            ServerState::Stopping => "Stopping",
            ServerState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// A single state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub previous: ServerState,
    pub current: ServerState,
}

type Listener = Arc<dyn Fn(StateChange) + Send + Sync>;

/// Holds the current state and fans transitions out to listeners.
///
/// Listeners are for logging and observation only; they run synchronously on
/// the task performing the transition and must not call back into the server.
pub struct StateNotifier {
    current: RwLock<ServerState>,
    listeners: RwLock<Vec<Listener>>,
}

impl StateNotifier {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(ServerState::Stopped),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn current(&self) -> ServerState {
        *self.current.read()
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(StateChange) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Move to `next`, log it and notify every listener.
    pub fn transition(&self, next: ServerState) {
        let previous = {
            let mut current = self.current.write();
            std::mem::replace(&mut *current, next)
        };
        let change = StateChange {
            previous,
            current: next,
        };

        tracing::info!(
            previous = %previous,
            current = %next,
            "WebServer New State - {}",
            next
        );

        // Snapshot so a listener can subscribe without deadlocking
        let listeners: Vec<Listener> = self.listeners.read().clone();
        for listener in listeners {
            listener(change);
        }
    }
}

impl Default for StateNotifier {
    fn default() -> Self {
        Self::new()
    }
}
