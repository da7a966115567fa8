//! Error types for the remote-side ingestion subsystem.
//!
//! One variant per failure domain from the error-handling design
//! (transient network faults, malformed protocol frames, invalid
//! sessions, fatal authentication failures, missing factories) plus the
//! ambient I/O/config variants every process needs.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Socket closed with a non-fatal code, or timed out. Caller retries with backoff.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Malformed frame or missing required field. Caller drops the frame and continues.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Gateway op 9 with resumable=false. Caller clears session state.
    #[error("session invalid: {0}")]
    SessionInvalid(String),

    /// Fatal close code (4004/4010/4011/4012/4013/4014). Ingestor transitions to failed.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// No factory registered for a `(type, protocol)` key.
    #[error("no factory registered for key: {0}")]
    FactoryMissing(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing secret: {0}")]
    MissingSecret(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
