//! Error types for the player host
//!
//! Aggregates the per-module errors and classifies them for the caller.

use thiserror::Error;

use crate::asset::AssetError;
use crate::config::ConfigError;
use crate::logging::LoggingError;

/// Result type alias for player host operations
pub type Result<T> = std::result::Result<T, PlayerHostError>;

/// Main error type for the player host
#[derive(Error, Debug)]
pub enum PlayerHostError {
    #[error("Asset server error: {0}")]
    Asset(#[from] AssetError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

/// Error recovery strategy
pub trait ErrorRecovery {
    /// Check if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Get suggested retry delay in milliseconds
    fn retry_delay_ms(&self) -> Option<u64>;

    /// Get recovery action suggestion
    fn recovery_action(&self) -> RecoveryAction;
}

/// Recovery action suggestions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Reset and retry the operation
    Retry,
    /// Notify user and wait for input
    NotifyUser,
    /// Abort the operation
    Abort,
}

impl ErrorRecovery for AssetError {
    fn is_retryable(&self) -> bool {
        // An OS-level bind failure can clear once the other owner exits
        matches!(self, AssetError::BindFailed { .. })
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            AssetError::BindFailed { .. } => Some(1000),
            _ => None,
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            AssetError::BindFailed { .. } => RecoveryAction::Retry,
            AssetError::Configuration { .. } | AssetError::AddressInUse { .. } => {
                RecoveryAction::NotifyUser
            }
            AssetError::InvalidState { .. } | AssetError::Io(_) => RecoveryAction::Abort,
        }
    }
}

impl ErrorRecovery for PlayerHostError {
    fn is_retryable(&self) -> bool {
        match self {
            PlayerHostError::Asset(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            PlayerHostError::Asset(e) => e.retry_delay_ms(),
            _ => None,
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            PlayerHostError::Asset(e) => e.recovery_action(),
            PlayerHostError::Config(_) | PlayerHostError::Logging(_) => RecoveryAction::NotifyUser,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::ServerState;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 9696))
    }

    #[test]
    fn test_bind_failure_is_retryable() {
        let err = AssetError::BindFailed {
            addr: addr(),
            reason: "Address already in use".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_delay_ms(), Some(1000));
        assert_eq!(err.recovery_action(), RecoveryAction::Retry);
    }

    #[test]
    fn test_configuration_errors_notify_user() {
        let err = AssetError::Configuration {
            path: PathBuf::from("/missing/game"),
            reason: "not found".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::NotifyUser);

        let err = AssetError::AddressInUse { addr: addr() };
        assert!(!err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::NotifyUser);
    }

    #[test]
    fn test_invalid_state_aborts() {
        let err = AssetError::InvalidState {
            operation: "start",
            state: ServerState::Failed,
        };
        assert_eq!(err.recovery_action(), RecoveryAction::Abort);
        assert!(err.to_string().contains("Failed"));
    }

    #[test]
    fn test_player_host_error_conversion() {
        let err: PlayerHostError = AssetError::BindFailed {
            addr: addr(),
            reason: "denied".to_string(),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::Retry);

        let err: PlayerHostError = ConfigError::Invalid("bad host".to_string()).into();
        assert!(!err.is_retryable());
        assert_eq!(err.recovery_action(), RecoveryAction::NotifyUser);
        assert!(err.to_string().contains("bad host"));
    }
}
