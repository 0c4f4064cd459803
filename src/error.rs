//! Error types for the Pod Composer
//!
//! Provides structured error types for allocation, remote target provisioning,
//! node assembly and the external action adapters.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the composer
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Inventory Errors
    // =========================================================================
    #[error("Entity not found: {kind}/{id}")]
    EntityNotFound { kind: &'static str, id: String },

    #[error("Entity already exists: {kind}/{id}")]
    DuplicateEntity { kind: &'static str, id: String },

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // =========================================================================
    // Composed Node Lifecycle Errors
    // =========================================================================
    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Assembly failed: {0}")]
    Assembly(String),

    #[error("Disassembly failed: {0}")]
    Disassembly(String),

    #[error("Node action rejected: {0}")]
    NodeAction(String),

    // =========================================================================
    // External Action Errors
    // =========================================================================
    #[error("Compute action {action} failed on {blade}: {reason}")]
    ComputeAction {
        blade: String,
        action: String,
        reason: String,
    },

    #[error("Storage control plane action {operation} failed: {reason}")]
    ControlPlaneAction { operation: String, reason: String },

    #[error("Remote target provisioning failed for {node_id}: {reason}")]
    Provisioning { node_id: String, reason: String },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action a caller should take after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry the same request
    Retry,
    /// Retry after a specific duration
    RetryAfter(Duration),
    /// Don't retry, the request itself has to change
    NoRetry,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Nothing was mutated, shutdown can simply be attempted again
            Error::Disassembly(_) => ErrorAction::Retry,

            // Transient transport problems
            Error::Http(_) | Error::ControlPlaneAction { .. } | Error::ComputeAction { .. } => {
                ErrorAction::RetryAfter(Duration::from_secs(5))
            }

            // Allocation may succeed once the pool changes
            Error::Allocation(_) => ErrorAction::RetryAfter(Duration::from_secs(60)),

            // Node is FAILED, or the request is malformed
            Error::Assembly(_)
            | Error::NodeAction(_)
            | Error::Configuration(_)
            | Error::InvalidLocation(_)
            | Error::InvalidAddress(_)
            | Error::EntityNotFound { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::NoRetry,

            _ => ErrorAction::NoRetry,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRetry)
    }

    /// Shorthand for a missing inventory entity
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Error::EntityNotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result type alias for the composer
pub type Result<T> = std::result::Result<T, Error>;
