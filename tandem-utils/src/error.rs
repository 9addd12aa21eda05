//! Error types for tandem
//!
//! Provides a unified error type used across all tandem crates.

use std::path::PathBuf;

/// Main error type for tandem operations
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Shared Store Errors ===

    #[error("Shared store error: {0}")]
    Store(String),

    #[error("Window {0:#010x} vanished before the operation completed")]
    PeerGone(u32),

    // === Protocol Errors ===

    #[error("Malformed record or frame: {0}")]
    Format(String),

    // === Discovery Errors ===

    #[error("No matching session: {0}")]
    NotFound(String),

    #[error("Session belongs to uid {theirs}, not uid {ours}")]
    PermissionDenied { theirs: u32, ours: u32 },

    // === Edit Errors ===

    #[error("Line {0} is in use by another view")]
    ConflictInUse(u64),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TandemError {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is transport-level (handled by skipping the
    /// candidate or frame) rather than semantic (surfaced to the user).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::PeerGone(_) | Self::Format(_))
    }
}

/// Result type alias using TandemError
pub type Result<T> = std::result::Result<T, TandemError>;
