//! Error types for streamspeak

use thiserror::Error;

/// Result type alias for streamspeak operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a speech session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Chunker invariant violated
    #[error("chunking error: {0}")]
    Chunking(String),

    /// Session lifecycle misuse (invalid state transition)
    #[error("session error: {0}")]
    Session(String),

    /// Text-to-speech conversion failed for one chunk
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Audio sink rejected a clip or failed mid-play
    #[error("playback error: {0}")]
    Playback(String),

    /// The LLM token source failed; fatal to the session
    #[error("token source error: {0}")]
    TokenSource(String),

    /// Session was cancelled before it finished
    #[error("session cancelled")]
    Cancelled,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Upstream TTS failure for a single chunk
///
/// Carries the chunk's sequence number so the coordinator can mark the slot
/// as skipped instead of stalling on it.
#[derive(Debug, Error)]
#[error("conversion of chunk {sequence} failed: {message}")]
pub struct ConversionError {
    /// Sequence number of the chunk that failed
    pub sequence: u64,
    /// HTTP status returned by the TTS service, if it answered
    pub status: Option<u16>,
    /// Response body returned alongside a non-success status
    pub body: Option<String>,
    /// Human readable reason
    pub message: String,
}

impl ConversionError {
    /// Failure that never reached a response (connect, timeout, body read)
    pub fn transport(sequence: u64, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };

        Self {
            sequence,
            status: err.status().map(|s| s.as_u16()),
            body: None,
            message,
        }
    }

    /// Non-success status from the TTS service
    pub fn upstream(sequence: u64, status: u16, body: String) -> Self {
        Self {
            sequence,
            status: Some(status),
            message: format!("TTS error {status}: {body}"),
            body: Some(body),
        }
    }

    /// Failure raised by a converter that is not HTTP backed
    pub fn other(sequence: u64, message: impl Into<String>) -> Self {
        Self {
            sequence,
            status: None,
            body: None,
            message: message.into(),
        }
    }
}
