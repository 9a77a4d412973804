//! Backend adapter error types.

use thiserror::Error;

/// Errors that can occur during backend adapter operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to connect to the upstream change source.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid adapter configuration.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Error reading from the upstream change feed.
    #[error("read error: {0}")]
    ReadError(String),

    /// A change payload could not be decoded.
    #[error("payload error: {0}")]
    Payload(String),

    /// The adapter is not in the expected state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// The expected state.
        expected: String,
        /// The actual state.
        actual: String,
    },

    /// Operation timed out.
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// The adapter has been stopped.
    #[error("adapter closed")]
    Closed,
}

impl From<serde_json::Error> for ConnectorError {
    fn from(e: serde_json::Error) -> Self {
        ConnectorError::Payload(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConnectorError::Timeout(6000);
        assert_eq!(err.to_string(), "timeout after 6000ms");

        let err = ConnectorError::InvalidState {
            expected: "started".into(),
            actual: "stopped".into(),
        };
        assert_eq!(err.to_string(), "invalid state: expected started, got stopped");
    }

    #[test]
    fn test_serde_error_converts_to_payload() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ConnectorError = parse_err.into();
        assert!(matches!(err, ConnectorError::Payload(_)));
    }
}
