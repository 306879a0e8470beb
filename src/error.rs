//! Error types for the interop relay monitor

use thiserror::Error;

/// Main error type for monitoring and workflow operations
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No client configured for chain {chain_id}")]
    ChainNotConfigured { chain_id: u64 },

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Execution failed on chain {chain_id}: {reason}")]
    Execution { chain_id: u64, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, MonitorError::ChainConnection { .. })
    }

    /// Check if error comes from missing or invalid configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MonitorError::Configuration(_) | MonitorError::ChainNotConfigured { .. }
        )
    }
}

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;
