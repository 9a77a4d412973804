//! Error types for the engine facade.

use liveselect_connectors::ConnectorError;
use liveselect_core::CoreError;

/// Errors from engine operations.
///
/// Construction-time errors return synchronously from the failing call;
/// runtime errors are delivered to subscribers through their sink's
/// error channel. The engine itself terminates only on [`Self::Shutdown`]
/// or loss of the backend.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid select arguments or engine configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend did not become ready within the init budget.
    #[error("backend failed to become ready within {0}ms")]
    BackendInitTimeout(u64),

    /// The stream of change events was interrupted.
    #[error("backend ingress error: {0}")]
    BackendIngress(String),

    /// A query failed during re-evaluation; the cache state is unchanged.
    #[error("re-evaluation failed: {0}")]
    ReEvaluation(String),

    /// An unsupported query shape was detected at match time.
    #[error("matcher error: {0}")]
    Matcher(#[from] CoreError),

    /// A backend adapter operation failed.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// The engine has been shut down.
    #[error("engine is shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        assert_eq!(
            EngineError::BackendInitTimeout(6000).to_string(),
            "backend failed to become ready within 6000ms"
        );
        assert_eq!(EngineError::Shutdown.to_string(), "engine is shut down");
    }

    #[test]
    fn test_core_error_converts_to_matcher() {
        let err: EngineError = CoreError::UnboundParameter(1).into();
        assert!(matches!(err, EngineError::Matcher(_)));
    }
}
