//! Error types for the log sink.

use thiserror::Error;

/// Main error type for store and administrative operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Bulk delete failed: {0}")]
    BulkDeleteFailure(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure to reach the notification channel.
///
/// Never fatal: it only moves a [`ReconnectingSubscriber`](crate::ReconnectingSubscriber)
/// through its reconnect states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("notification hub refused the connection")]
    Refused,

    #[error("notification channel closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}
