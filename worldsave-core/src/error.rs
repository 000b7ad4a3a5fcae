/*!
Error types for the world-state persistence engine.
*/

use thiserror::Error;

use crate::resolver::TemplateKind;

/// Result type used throughout the persistence core.
pub type Result<T> = std::result::Result<T, SaveError>;

/// Errors that can occur while saving, loading or restoring a world.
#[derive(Error, Debug)]
pub enum SaveError {
    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// The stored bytes do not decode into a snapshot
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Integrity check failures
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Snapshot written by a newer format
    #[error("Incompatible snapshot format version {found} (supported up to {supported})")]
    IncompatibleVersion { found: u8, supported: u8 },

    /// No save with the given name
    #[error("Save not found: {0}")]
    NotFound(String),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Every resolver strategy missed
    #[error("No {kind} template named '{name}'")]
    TemplateNotFound { kind: TemplateKind, name: String },

    /// Fatal failure while rebuilding the world
    #[error("Restore failed: {0}")]
    Restore(String),
}

impl SaveError {
    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new corrupt snapshot error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Self::CorruptSnapshot(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new restore error
    pub fn restore<S: Into<String>>(msg: S) -> Self {
        Self::Restore(msg.into())
    }

    /// True for errors that mean the stored bytes are unusable.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptSnapshot(_)
                | Self::IntegrityCheckFailed { .. }
                | Self::IncompatibleVersion { .. }
        )
    }
}
