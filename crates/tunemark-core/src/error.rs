//! Error types for Tunemark

use thiserror::Error;

/// Result type alias for fingerprinting and catalog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty or degenerate audio, bad parameters
    InvalidInput,
    /// The external decoder rejected the payload
    Decode,
    /// The audio stream failed or was cancelled
    Stream,
    /// A catalog insert or match call failed
    Storage,
    /// Anything the caller cannot act on
    Internal,
}

/// Tunemark error types
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Decoder errors
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    // Stream errors
    #[error("Stream failed: {0}")]
    Stream(String),

    #[error("Stream source did not stop within {waited_ms}ms")]
    StreamTimeout { waited_ms: u64 },

    #[error("Stream cancelled")]
    Cancelled,

    // Catalog errors
    #[error("Catalog error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a catalog error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::InvalidConfig(_) => ErrorKind::InvalidInput,
            Error::Decode(_) => ErrorKind::Decode,
            Error::Stream(_) | Error::StreamTimeout { .. } | Error::Cancelled => ErrorKind::Stream,
            Error::Storage(_) | Error::Network(_) => ErrorKind::Storage,
            Error::Serialization(_) | Error::Internal(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Network(_) | Error::StreamTimeout { .. }
        )
    }

    /// Returns the error code for logs and CLI output
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Decode(_) => "DECODE",
            Error::Stream(_) => "STREAM",
            Error::StreamTimeout { .. } => "STREAM_TIMEOUT",
            Error::Cancelled => "CANCELLED",
            Error::Storage(_) => "STORAGE",
            Error::Network(_) => "NETWORK",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Internal(_) => "INTERNAL",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::invalid_input("empty").kind(), ErrorKind::InvalidInput);
        assert_eq!(Error::InvalidConfig("hop".into()).kind(), ErrorKind::InvalidInput);
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Stream);
        assert_eq!(Error::storage("down").kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::storage("timeout").is_recoverable());
        assert!(!Error::invalid_input("empty").is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::StreamTimeout { waited_ms: 500 };
        assert_eq!(err.to_string(), "Stream source did not stop within 500ms");
        assert_eq!(err.error_code(), "STREAM_TIMEOUT");
    }
}
