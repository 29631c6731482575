//! Error taxonomy for the reader's fallible boundaries.
//!
//! The playback engine itself never fails: out-of-state calls are no-ops and
//! transient backend failures are recovered inside the backend.  These errors
//! surface only from configuration, persistence, and the HTTP layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    /// Missing or invalid configuration (e.g. an unset API key).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("remote service returned status {status}")]
    Status { status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audio encoding error: {0}")]
    Audio(#[from] hound::Error),

    /// A speed multiplier outside the supported set.
    #[error("unsupported speed multiplier {0}")]
    InvalidSpeed(f32),

    /// Malformed base64 audio payload from the upstream synthesiser.
    #[error("invalid audio payload: {0}")]
    Base64(String),
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, ReaderError>;
