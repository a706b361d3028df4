//! Sync domain error model.

use thiserror::Error;

/// Result type used across the sync layers.
pub type SyncResult<T> = Result<T, SyncError>;

/// Domain-level error for the sync core.
///
/// Keep this focused on deterministic failures (validation, unknown types,
/// conflicts). Infrastructure concerns (database, queue) belong to the
/// store-level error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An entity tag is not present in the registry allow-list.
    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    /// An identifier was invalid (e.g. parse failure, pk-kind mismatch).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found.
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. two rows matched a unique-field lookup).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authentication failure at the peer boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl SyncError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unknown_entity(tag: impl Into<String>) -> Self {
        Self::UnknownEntity(tag.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
