//! Player Host Core Module
//!
//! Crate-level error type and recovery hints shared by the binary.

pub mod error;

// Re-export commonly used items
pub use error::{ErrorRecovery, PlayerHostError, RecoveryAction, Result};
