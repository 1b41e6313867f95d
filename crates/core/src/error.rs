//! Error types for bfs-core
//!
//! Provides a unified error type that can be converted to appropriate exit codes.

use thiserror::Error;

/// Result type alias for bfs-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for bfs-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed path text
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid argument, such as an unknown open mode
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Alias not found
    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    /// Alias already exists
    #[error("Alias already exists: {0}")]
    AliasExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// The store rejected the request itself (not retryable)
    #[error("Request rejected: {0}")]
    Request(String),

    /// Operation attempted on a handle in the wrong state
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// A read asked for more bytes than remain in the object
    #[error("End of stream: requested {requested} bytes, {available} available")]
    EndOfStream { requested: u64, available: u64 },

    /// Retry budget spent; carries the last failure
    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::InvalidArgument(_) => 2, // UsageError
            Error::Config(_) => 2,                                  // UsageError
            Error::Network(_) => 3,                                 // NetworkError
            Error::Auth(_) => 4,                                    // AuthError
            Error::NotFound(_) | Error::AliasNotFound(_) => 5,      // NotFound
            Error::AliasExists(_) | Error::Precondition(_) => 6,    // Conflict
            Error::RetriesExhausted { source, .. } => source.exit_code(),
            _ => 1, // GeneralError
        }
    }

    /// Whether this error means the object or bucket does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::RetriesExhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(Error::InvalidPath("test".into()).exit_code(), 2);
        assert_eq!(Error::InvalidArgument("test".into()).exit_code(), 2);
        assert_eq!(Error::Config("test".into()).exit_code(), 2);
        assert_eq!(Error::Network("test".into()).exit_code(), 3);
        assert_eq!(Error::Auth("test".into()).exit_code(), 4);
        assert_eq!(Error::NotFound("test".into()).exit_code(), 5);
        assert_eq!(Error::AliasNotFound("test".into()).exit_code(), 5);
        assert_eq!(Error::AliasExists("test".into()).exit_code(), 6);
        assert_eq!(Error::Precondition("test".into()).exit_code(), 6);
        assert_eq!(Error::Request("test".into()).exit_code(), 1);
        assert_eq!(Error::General("test".into()).exit_code(), 1);
    }

    #[test]
    fn test_retries_exhausted_delegates_exit_code() {
        let err = Error::RetriesExhausted {
            attempts: 4,
            source: Box::new(Error::Network("reset".into())),
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "Gave up after 4 attempts: Network error: reset");
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NotFound("s3://b/k".into()).is_not_found());
        assert!(!Error::Network("timeout".into()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::AliasNotFound("minio".into());
        assert_eq!(err.to_string(), "Alias not found: minio");

        let err = Error::EndOfStream {
            requested: 10,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "End of stream: requested 10 bytes, 3 available"
        );
    }
}
