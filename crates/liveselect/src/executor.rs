//! The query-execution contract.
//!
//! Connection and pool management stay with the host; the engine only
//! needs a way to re-issue a registered query and receive its rows as
//! JSON objects.

use async_trait::async_trait;
use serde_json::Value;

use liveselect_core::RowData;

use crate::error::EngineError;

/// Re-issues a registered query against the upstream database.
///
/// Invoked from re-evaluation tasks; implementations may run queries on
/// a pool, the loop never blocks on them directly.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Executes `query` under the positional `params` and returns the
    /// result rows as JSON objects, in result-set order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ReEvaluation`] (or any other variant) when
    /// the query fails; the error is surfaced to the cache's subscribers
    /// and the cache state is left unchanged.
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<RowData>, EngineError>;
}
