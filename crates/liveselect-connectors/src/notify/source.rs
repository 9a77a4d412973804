//! Notify-channel source adapter.
//!
//! Consumes raw [`ChannelNotification`]s from the external channel
//! listener, parses the JSON payloads, filters by the interest-set, and
//! emits [`RowEvent`]s that carry the changed rows themselves. Because
//! payloads ship full row data, this adapter reports
//! `supplies_row_data() == true` and caches can re-evaluate without
//! re-querying.

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use liveselect_core::InterestSet;

use crate::connector::{AdapterEvent, SourceAdapter};
use crate::error::ConnectorError;
use crate::notify::payload::{ChannelNotification, NotifyPayload};

/// Configuration for the notify adapter.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Schema assumed when a payload names none.
    pub default_schema: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            default_schema: "public".to_string(),
        }
    }
}

/// Notify-channel ingress for the engine.
pub struct NotifyAdapter {
    config: NotifyConfig,
    notifications: Option<mpsc::Receiver<ChannelNotification>>,
    interest_tx: Option<watch::Sender<InterestSet>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl NotifyAdapter {
    /// Creates an adapter over a notification feed.
    #[must_use]
    pub fn new(notifications: mpsc::Receiver<ChannelNotification>, config: NotifyConfig) -> Self {
        Self {
            config,
            notifications: Some(notifications),
            interest_tx: None,
            task: None,
        }
    }
}

#[async_trait]
impl SourceAdapter for NotifyAdapter {
    async fn start(
        &mut self,
        interest: &InterestSet,
        events: mpsc::Sender<AdapterEvent>,
    ) -> Result<(), ConnectorError> {
        let notifications = self
            .notifications
            .take()
            .ok_or(ConnectorError::InvalidState {
                expected: "created".into(),
                actual: "started".into(),
            })?;
        let (interest_tx, interest_rx) = watch::channel(interest.clone());
        self.interest_tx = Some(interest_tx);
        self.task = Some(tokio::spawn(forward(
            notifications,
            events.clone(),
            interest_rx,
            self.config.default_schema.clone(),
        )));

        events
            .send(AdapterEvent::Ready)
            .await
            .map_err(|_| ConnectorError::Closed)?;
        debug!(tables = interest.len(), "notify adapter started");
        Ok(())
    }

    async fn set_interest(&mut self, interest: &InterestSet) -> Result<(), ConnectorError> {
        let tx = self.interest_tx.as_ref().ok_or(ConnectorError::InvalidState {
            expected: "started".into(),
            actual: "created".into(),
        })?;
        tx.send(interest.clone()).map_err(|_| ConnectorError::Closed)?;
        debug!(tables = interest.len(), "notify interest updated");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ConnectorError> {
        self.interest_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!("notify adapter stopped");
        Ok(())
    }

    fn supplies_row_data(&self) -> bool {
        true
    }
}

/// Forward task: raw notifications → normalized row events.
async fn forward(
    mut notifications: mpsc::Receiver<ChannelNotification>,
    events: mpsc::Sender<AdapterEvent>,
    interest: watch::Receiver<InterestSet>,
    default_schema: String,
) {
    while let Some(notification) = notifications.recv().await {
        let event = match NotifyPayload::parse(&notification.payload)
            .and_then(|payload| payload.into_row_event(&default_schema))
        {
            Ok(event) => event,
            Err(error) => {
                warn!(channel = %notification.channel, %error, "undecodable notify payload");
                if events.send(AdapterEvent::Error(error)).await.is_err() {
                    return;
                }
                continue;
            }
        };

        if !interest.borrow().contains(&event.database, &event.table) {
            trace!(table = %event.qualified_table(), "outside interest-set, dropping");
            continue;
        }

        trace!(table = %event.qualified_table(), op = event.op.as_str(), "forwarding row event");
        if events.send(AdapterEvent::Event(event)).await.is_err() {
            debug!("engine dropped the event channel, notify forward task exiting");
            return;
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
