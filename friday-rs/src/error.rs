//! Error types for friday-rs.

use thiserror::Error;

/// Result type alias for friday-rs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the external collaborators and the server plumbing
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Language model call failed
    #[error("generation error: {0}")]
    Generation(String),

    /// Text-to-speech call failed
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Text-to-speech call exceeded its deadline
    #[error("synthesis timed out after {0:?}")]
    SynthesisTimeout(std::time::Duration),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
