//! Error types for the core live-query machinery.

use thiserror::Error;

/// Errors raised by the pure core components (matchers, condition
/// evaluation, incremental re-computation).
///
/// These surface to subscribers as re-evaluation errors; they never
/// terminate the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The query uses a shape the matcher cannot evaluate (for example
    /// ordering or comparing against a JSON array or object).
    #[error("unsupported query shape: {0}")]
    UnsupportedQuery(String),

    /// A condition referenced a positional parameter that was not bound.
    #[error("parameter ${0} is not bound")]
    UnboundParameter(usize),
}
