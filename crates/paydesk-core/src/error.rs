// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Paydesk worker.

use thiserror::Error;

use crate::types::TransactionStatus;

/// The primary error type used across all Paydesk adapter traits and core operations.
#[derive(Debug, Error)]
pub enum PaydeskError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat-network protocol errors (handshake, send, download).
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// AI inference errors (HTTP failure, malformed response).
    #[error("inference error: {message}")]
    Inference {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Object store errors other than a missing bucket.
    #[error("object store error: {message}")]
    ObjectStore {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The target bucket does not exist yet.
    #[error("bucket not found: {bucket}")]
    BucketNotFound { bucket: String },

    /// A live session already exists for this channel.
    #[error("session already active for channel {channel_id}")]
    SessionAlreadyActive { channel_id: String },

    /// The registry already holds the maximum number of live sessions.
    #[error("session capacity reached ({max} channels)")]
    CapacityReached { max: usize },

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A transaction status change that would move backwards.
    #[error("invalid transaction transition {from} -> {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PaydeskError {
    /// Shorthand for a protocol error without an underlying source.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an inference error without an underlying source.
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference {
            message: message.into(),
            source: None,
        }
    }
}
