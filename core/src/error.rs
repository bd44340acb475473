//! Error types for the Convertio client.
//!
//! # Design
//! Failures split along where they were detected. `Transport` means no
//! application-level response arrived at all. `Service` means the API answered
//! with `status: "error"` (or a local integrity check on the result failed).
//! `Protocol` means an answer arrived but could not be understood. The
//! remaining variants are caller or local-filesystem preconditions.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by `Api` and `Conversion` operations.
#[derive(Debug, Error)]
pub enum ConvertioError {
    /// Empty API key or an invalid configuration value.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Network-level failure (DNS, connect, timeout, TLS, socket I/O).
    #[error("transport error {code}: {message}")]
    Transport { code: i32, message: String },

    /// The service reported `status: "error"`, or the downloaded result failed
    /// a local integrity check.
    #[error("{message}")]
    Service { message: String, code: Option<i64> },

    /// The response could not be decoded into the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local source file does not exist.
    #[error("file not found: '{}'", path.display())]
    FileNotFound { path: PathBuf },

    /// Reading a local source file failed after it was found.
    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation needs a conversion id, but no start call has succeeded.
    #[error("conversion has not been started")]
    NotStarted,

    /// A start call was made on a session that has already left `NotStarted`.
    #[error("conversion already started")]
    AlreadyStarted,

    /// `wait_with` observed its cancel token.
    #[error("wait cancelled")]
    Cancelled,
}

impl ConvertioError {
    pub(crate) fn service<S: Into<String>>(message: S) -> Self {
        Self::Service {
            message: message.into(),
            code: None,
        }
    }

    pub(crate) fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConvertioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_displays_service_message_verbatim() {
        let err = ConvertioError::Service {
            message: "Invalid API Key".to_string(),
            code: Some(401),
        };
        assert_eq!(err.to_string(), "Invalid API Key");
    }

    #[test]
    fn transport_error_display_includes_code() {
        let err = ConvertioError::Transport {
            code: 28,
            message: "timed out".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("28"), "got: {msg}");
        assert!(msg.contains("timed out"), "got: {msg}");
    }

    #[test]
    fn file_not_found_display_includes_path() {
        let err = ConvertioError::FileNotFound {
            path: PathBuf::from("/tmp/missing.docx"),
        };
        assert!(err.to_string().contains("/tmp/missing.docx"));
    }
}
