//! Asset server error types

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use super::state::ServerState;

/// Asset server error type
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Invalid root directory {path:?}: {reason}")]
    Configuration { path: PathBuf, reason: String },

    #[error("Server bind failed on {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    #[error("Address {addr} already has an active listener in this process")]
    AddressInUse { addr: SocketAddr },

    #[error("Cannot {operation} while server is {state}")]
    InvalidState {
        operation: &'static str,
        state: ServerState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssetError {
    /// Check if this error happened while acquiring the listener
    pub fn is_bind_error(&self) -> bool {
        matches!(
            self,
            AssetError::BindFailed { .. } | AssetError::AddressInUse { .. }
        )
    }

    /// Check if this error is fatal to construction
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, AssetError::Configuration { .. })
    }
}
