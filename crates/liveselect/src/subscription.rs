//! Subscription handles and delivery sinks.
//!
//! A subscription binds one query cache to a delivery sink. Sinks are
//! invoked from the engine loop: implementations must not block, and
//! heavy work belongs on the subscriber's own executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use liveselect_core::{Diff, Row, SubscriptionId};

use crate::engine::Command;
use crate::error::EngineError;

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Delivery callbacks for one subscription.
///
/// # Example
///
/// ```rust,ignore
/// struct Mirror;
///
/// impl EventSink for Mirror {
///     fn on_update(&self, diff: &Diff, rows: &[Row]) {
///         println!("{} rows after {} additions", rows.len(), diff.added.len());
///     }
/// }
/// ```
pub trait EventSink: Send + Sync + 'static {
    /// Called with each delivered diff and the full result set after it.
    fn on_update(&self, diff: &Diff, rows: &[Row]);

    /// Called when a re-evaluation or the backend fails.
    ///
    /// Default implementation logs the error via `tracing::warn!`.
    fn on_error(&self, error: &EngineError) {
        tracing::warn!("subscription error: {error}");
    }
}

/// Adapter that wraps a closure into an [`EventSink`].
struct FnSink<F>(F);

impl<F: Fn(&Diff, &[Row]) + Send + Sync + 'static> EventSink for FnSink<F> {
    fn on_update(&self, diff: &Diff, rows: &[Row]) {
        (self.0)(diff, rows);
    }
}

/// Wraps a closure receiving `(diff, rows)` into an [`EventSink`].
///
/// Errors fall through to the default `tracing::warn!` handler.
pub fn sink_fn<F>(f: F) -> impl EventSink
where
    F: Fn(&Diff, &[Row]) + Send + Sync + 'static,
{
    FnSink(f)
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Client handle for one registered live query.
///
/// Dropping the handle stops the subscription as a safety net; prefer an
/// explicit [`stop`](Self::stop).
pub struct Subscription {
    id: SubscriptionId,
    commands: mpsc::UnboundedSender<Command>,
    stopped: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            id,
            commands,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the subscription id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Flag shared with the engine loop so a stop issued mid-flight
    /// suppresses the delivery of an already-running re-evaluation.
    pub(crate) fn stopped_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }

    /// Detaches from the cache and the engine registry.
    ///
    /// Idempotent; no delivery reaches this subscription afterwards, even
    /// from a re-evaluation already in flight.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Stop(self.id));
        }
    }

    /// `true` once [`stop`](Self::stop) has run (or the handle dropped).
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
