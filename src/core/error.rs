//! Custom error types for Foreman
//!
//! One crate-wide error enum; tool-level errors are NOT represented here,
//! they travel back to the model as structured `ToolOutcome` payloads.

use thiserror::Error;

use crate::request::RequestStatus;

/// Main error type for Foreman operations
#[derive(Error, Debug)]
pub enum ForemanError {
    /// Model backend request/response errors
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger persistence errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// A persisted document failed the read-time integrity check
    #[error("Ledger corrupt: {path}: {detail}")]
    LedgerCorrupt { path: String, detail: String },

    /// Illegal request lifecycle transition; a caller bug, never retryable
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    /// Amend or retry requested on a request whose status does not allow it
    #[error("Request {id} is {status} and cannot be {operation}")]
    Ineligible {
        id: String,
        status: RequestStatus,
        operation: &'static str,
    },

    /// Workspace git operations
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Pull-request hosting errors
    #[error("Hosting error: {0}")]
    Hosting(String),

    /// Unknown project name
    #[error("Project '{0}' is not registered")]
    UnknownProject(String),

    /// Unknown request identifier
    #[error("Request '{0}' not found in the ledger")]
    UnknownRequest(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases
    #[error("{0}")]
    Other(String),
}

/// Convenience Result type for Foreman operations
pub type Result<T> = std::result::Result<T, ForemanError>;

impl ForemanError {
    /// Create a provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a ledger error
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Create a workspace error
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    /// Create a hosting error
    pub fn hosting(msg: impl Into<String>) -> Self {
        Self::Hosting(msg.into())
    }
}
