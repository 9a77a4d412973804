//! The backend adapter contract.
//!
//! An adapter is the pluggable ingress of an engine: it watches one
//! upstream change source, filters by the engine's schema interest-set,
//! and delivers normalized [`RowEvent`]s plus lifecycle signals over an
//! event channel. The engine owns exactly one adapter and is the only
//! caller of its lifecycle methods.

use async_trait::async_trait;
use tokio::sync::mpsc;

use liveselect_core::{InterestSet, RowEvent};

use crate::error::ConnectorError;

/// Events an adapter delivers to the engine.
#[derive(Debug)]
pub enum AdapterEvent {
    /// The adapter is connected and will produce events.
    Ready,
    /// A normalized change record.
    Event(RowEvent),
    /// The change feed failed; the engine surfaces this to subscribers.
    Error(ConnectorError),
}

/// Pluggable change-source ingress.
///
/// Implementations must only produce events covered by the most recent
/// interest-set; events already in flight when the set shrinks may still
/// be delivered and are re-filtered by the engine's matchers.
#[async_trait]
pub trait SourceAdapter: Send {
    /// Starts the feed, filtered to `interest`, delivering into `events`.
    ///
    /// Must send [`AdapterEvent::Ready`] once the feed is established;
    /// the engine bounds the wait with its init timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when the feed cannot be established.
    async fn start(
        &mut self,
        interest: &InterestSet,
        events: mpsc::Sender<AdapterEvent>,
    ) -> Result<(), ConnectorError>;

    /// Hot-swaps the interest-set on a started adapter.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidState`] when not started.
    async fn set_interest(&mut self, interest: &InterestSet) -> Result<(), ConnectorError>;

    /// Stops the feed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError`] when teardown fails.
    async fn stop(&mut self) -> Result<(), ConnectorError>;

    /// `true` when this adapter's events carry full row payloads, which
    /// lets caches re-evaluate incrementally instead of re-querying.
    fn supplies_row_data(&self) -> bool {
        false
    }
}
