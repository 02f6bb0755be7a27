//! Error types for mngov-sync.

use thiserror::Error;

/// Errors raised while encoding, decoding or persisting governance state.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed wire or snapshot bytes.
    #[error("codec error: {0}")]
    Codec(String),

    /// The peer speaks a newer wire protocol.
    #[error("unsupported wire version: {got} (max supported: {max})")]
    UnsupportedWireVersion {
        /// Version found in the envelope.
        got: u32,
        /// Highest version this node understands.
        max: u32,
    },

    /// Unknown message discriminator.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u32),

    /// An object payload exceeded the configured limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Allowed size in bytes.
        max: usize,
    },

    /// Snapshot could not be written or read.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl From<prost::DecodeError> for SyncError {
    fn from(err: prost::DecodeError) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
