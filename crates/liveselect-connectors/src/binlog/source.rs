//! Replication-log source adapter.
//!
//! Consumes decoded [`BinlogMessage`]s from the external wire decoder,
//! resolves row events through the table-map cache, filters by the
//! engine's interest-set, and emits normalized [`RowEvent`]s. Events for
//! tables outside the interest-set are dropped here so the engine never
//! sees them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use liveselect_core::{InterestSet, RowEvent, RowImage, RowOp};

use crate::binlog::decoder::{
    row_to_payload, BinlogMessage, BinlogPosition, BinlogRows, BinlogUpdateRows, TableMapEvent,
};
use crate::connector::{AdapterEvent, SourceAdapter};
use crate::error::ConnectorError;

/// Replication-log ingress for the engine.
///
/// Fed by an mpsc channel of decoded messages; the decoding and the
/// upstream connection are external collaborators.
pub struct BinlogAdapter {
    messages: Option<mpsc::Receiver<BinlogMessage>>,
    interest_tx: Option<watch::Sender<InterestSet>>,
    task: Option<tokio::task::JoinHandle<()>>,
    position: Arc<Mutex<Option<BinlogPosition>>>,
}

impl BinlogAdapter {
    /// Creates an adapter over a decoded-message feed.
    #[must_use]
    pub fn new(messages: mpsc::Receiver<BinlogMessage>) -> Self {
        Self {
            messages: Some(messages),
            interest_tx: None,
            task: None,
            position: Arc::new(Mutex::new(None)),
        }
    }

    /// Last replication-log coordinate seen, for host resume bookkeeping.
    ///
    /// # Panics
    ///
    /// Panics if the internal position lock was poisoned by a panicking
    /// forward task. This should not occur under normal operation.
    #[must_use]
    pub fn last_position(&self) -> Option<BinlogPosition> {
        self.position.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceAdapter for BinlogAdapter {
    async fn start(
        &mut self,
        interest: &InterestSet,
        events: mpsc::Sender<AdapterEvent>,
    ) -> Result<(), ConnectorError> {
        let messages = self.messages.take().ok_or(ConnectorError::InvalidState {
            expected: "created".into(),
            actual: "started".into(),
        })?;
        let (interest_tx, interest_rx) = watch::channel(interest.clone());
        self.interest_tx = Some(interest_tx);
        self.task = Some(tokio::spawn(forward(messages, events.clone(), interest_rx, Arc::clone(&self.position))));

        events
            .send(AdapterEvent::Ready)
            .await
            .map_err(|_| ConnectorError::Closed)?;
        debug!(tables = interest.len(), "binlog adapter started");
        Ok(())
    }

    async fn set_interest(&mut self, interest: &InterestSet) -> Result<(), ConnectorError> {
        let tx = self.interest_tx.as_ref().ok_or(ConnectorError::InvalidState {
            expected: "started".into(),
            actual: "created".into(),
        })?;
        tx.send(interest.clone()).map_err(|_| ConnectorError::Closed)?;
        debug!(tables = interest.len(), "binlog interest updated");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ConnectorError> {
        self.interest_tx = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!("binlog adapter stopped");
        Ok(())
    }
}

/// Forward task: message feed → normalized row events.
async fn forward(
    mut messages: mpsc::Receiver<BinlogMessage>,
    events: mpsc::Sender<AdapterEvent>,
    interest: watch::Receiver<InterestSet>,
    position: Arc<Mutex<Option<BinlogPosition>>>,
) {
    let mut table_maps: HashMap<u64, TableMapEvent> = HashMap::new();
    let mut current_file = String::new();

    while let Some(message) = messages.recv().await {
        let event = match message {
            BinlogMessage::TableMap(map) => {
                trace!(table_id = map.table_id, table = %map.table, "table map cached");
                table_maps.insert(map.table_id, map);
                continue;
            }
            BinlogMessage::Rotate { next_file, position: at } => {
                debug!(file = %next_file, position = at, "binlog rotated");
                current_file = next_file;
                record_position(&position, &current_file, at);
                continue;
            }
            BinlogMessage::Heartbeat => continue,
            BinlogMessage::Insert(rows) => {
                record_position(&position, &current_file, rows.position);
                plain_event(&table_maps, &interest, RowOp::Insert, &rows)
            }
            BinlogMessage::Delete(rows) => {
                record_position(&position, &current_file, rows.position);
                plain_event(&table_maps, &interest, RowOp::Delete, &rows)
            }
            BinlogMessage::Update(rows) => {
                record_position(&position, &current_file, rows.position);
                update_event(&table_maps, &interest, &rows)
            }
        };

        if let Some(event) = event {
            trace!(table = %event.qualified_table(), op = event.op.as_str(), "forwarding row event");
            if events.send(AdapterEvent::Event(event)).await.is_err() {
                debug!("engine dropped the event channel, binlog forward task exiting");
                return;
            }
        }
    }
}

fn record_position(position: &Mutex<Option<BinlogPosition>>, file: &str, at: u64) {
    if let Ok(mut guard) = position.lock() {
        *guard = Some(BinlogPosition {
            file: file.to_string(),
            position: at,
        });
    }
}

fn lookup<'a>(
    table_maps: &'a HashMap<u64, TableMapEvent>,
    interest: &watch::Receiver<InterestSet>,
    table_id: u64,
) -> Option<&'a TableMapEvent> {
    let Some(map) = table_maps.get(&table_id) else {
        warn!(table_id, "row event without a prior table map, dropping");
        return None;
    };
    if !interest.borrow().contains(&map.database, &map.table) {
        trace!(table = %map.table, "outside interest-set, dropping");
        return None;
    }
    Some(map)
}

fn plain_event(
    table_maps: &HashMap<u64, TableMapEvent>,
    interest: &watch::Receiver<InterestSet>,
    op: RowOp,
    rows: &BinlogRows,
) -> Option<RowEvent> {
    let map = lookup(table_maps, interest, rows.table_id)?;
    let images = rows
        .rows
        .iter()
        .map(|values| {
            let payload = row_to_payload(values, &map.columns);
            match op {
                RowOp::Insert => RowImage::inserted(payload),
                _ => RowImage::deleted(payload),
            }
        })
        .collect();
    Some(RowEvent::new(
        op,
        map.database.clone(),
        map.table.clone(),
        map.columns.clone(),
        images,
    ))
}

fn update_event(
    table_maps: &HashMap<u64, TableMapEvent>,
    interest: &watch::Receiver<InterestSet>,
    rows: &BinlogUpdateRows,
) -> Option<RowEvent> {
    let map = lookup(table_maps, interest, rows.table_id)?;
    let images = rows
        .rows
        .iter()
        .map(|(before, after)| {
            RowImage::updated(
                row_to_payload(before, &map.columns),
                row_to_payload(after, &map.columns),
            )
        })
        .collect();
    Some(RowEvent::new(
        RowOp::Update,
        map.database.clone(),
        map.table.clone(),
        map.columns.clone(),
        images,
    ))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binlog::decoder::ColumnValue;
    use serde_json::json;

    fn users_map() -> BinlogMessage {
        BinlogMessage::TableMap(TableMapEvent {
            table_id: 9,
            database: "app".into(),
            table: "users".into(),
            columns: vec!["id".into(), "name".into()],
        })
    }

    fn interest(database: &str, table: &str) -> InterestSet {
        let mut set = InterestSet::new();
        set.insert(database, table);
        set
    }

    async fn started(
        interest: InterestSet,
    ) -> (
        mpsc::Sender<BinlogMessage>,
        mpsc::Receiver<AdapterEvent>,
        BinlogAdapter,
    ) {
        let (msg_tx, msg_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let mut adapter = BinlogAdapter::new(msg_rx);
        adapter.start(&interest, event_tx).await.unwrap();
        (msg_tx, event_rx, adapter)
    }

    #[tokio::test]
    async fn test_ready_then_normalized_insert() {
        let (msg_tx, mut events, _adapter) = started(interest("app", "users")).await;

        msg_tx.send(users_map()).await.unwrap();
        msg_tx
            .send(BinlogMessage::Insert(BinlogRows {
                table_id: 9,
                rows: vec![vec![
                    ColumnValue::SignedInt(1),
                    ColumnValue::String("ada".into()),
                ]],
                position: 400,
            }))
            .await
            .unwrap();

        assert!(matches!(events.recv().await, Some(AdapterEvent::Ready)));
        let Some(AdapterEvent::Event(event)) = events.recv().await else {
            panic!("expected row event");
        };
        assert_eq!(event.op, RowOp::Insert);
        assert_eq!(event.qualified_table(), "app.users");
        assert_eq!(event.column_names, vec!["id", "name"]);
        let new = event.rows[0].new.as_ref().unwrap();
        assert_eq!(new.get("id"), Some(&json!(1)));
        assert_eq!(new.get("name"), Some(&json!("ada")));
    }

    #[tokio::test]
    async fn test_update_carries_both_images() {
        let (msg_tx, mut events, _adapter) = started(interest("app", "users")).await;

        msg_tx.send(users_map()).await.unwrap();
        msg_tx
            .send(BinlogMessage::Update(BinlogUpdateRows {
                table_id: 9,
                rows: vec![(
                    vec![ColumnValue::SignedInt(1), ColumnValue::String("ada".into())],
                    vec![ColumnValue::SignedInt(1), ColumnValue::String("ava".into())],
                )],
                position: 410,
            }))
            .await
            .unwrap();

        assert!(matches!(events.recv().await, Some(AdapterEvent::Ready)));
        let Some(AdapterEvent::Event(event)) = events.recv().await else {
            panic!("expected row event");
        };
        assert_eq!(event.op, RowOp::Update);
        let image = &event.rows[0];
        assert_eq!(
            image.old.as_ref().unwrap().get("name"),
            Some(&json!("ada"))
        );
        assert_eq!(
            image.new.as_ref().unwrap().get("name"),
            Some(&json!("ava"))
        );
    }

    #[tokio::test]
    async fn test_outside_interest_is_dropped() {
        let (msg_tx, mut events, _adapter) = started(interest("app", "orders")).await;

        msg_tx.send(users_map()).await.unwrap();
        msg_tx
            .send(BinlogMessage::Insert(BinlogRows {
                table_id: 9,
                rows: vec![vec![ColumnValue::SignedInt(1), ColumnValue::Null]],
                position: 420,
            }))
            .await
            .unwrap();
        drop(msg_tx);

        assert!(matches!(events.recv().await, Some(AdapterEvent::Ready)));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_row_event_without_table_map_is_dropped() {
        let (msg_tx, mut events, _adapter) = started(interest("app", "users")).await;

        msg_tx
            .send(BinlogMessage::Insert(BinlogRows {
                table_id: 77,
                rows: vec![vec![ColumnValue::SignedInt(1)]],
                position: 430,
            }))
            .await
            .unwrap();
        drop(msg_tx);

        assert!(matches!(events.recv().await, Some(AdapterEvent::Ready)));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_set_interest_hot_swap() {
        let (msg_tx, mut events, mut adapter) = started(interest("app", "orders")).await;
        assert!(matches!(events.recv().await, Some(AdapterEvent::Ready)));

        adapter.set_interest(&interest("app", "users")).await.unwrap();
        // Give the watch update time to land before the row event.
        tokio::task::yield_now().await;

        msg_tx.send(users_map()).await.unwrap();
        msg_tx
            .send(BinlogMessage::Insert(BinlogRows {
                table_id: 9,
                rows: vec![vec![ColumnValue::SignedInt(5), ColumnValue::Null]],
                position: 440,
            }))
            .await
            .unwrap();

        assert!(matches!(events.recv().await, Some(AdapterEvent::Event(_))));
    }

    #[tokio::test]
    async fn test_rotate_tracks_position() {
        let (msg_tx, mut events, adapter) = started(interest("app", "users")).await;
        assert!(matches!(events.recv().await, Some(AdapterEvent::Ready)));

        msg_tx
            .send(BinlogMessage::Rotate {
                next_file: "binlog.000002".into(),
                position: 4,
            })
            .await
            .unwrap();
        msg_tx.send(users_map()).await.unwrap();
        msg_tx
            .send(BinlogMessage::Insert(BinlogRows {
                table_id: 9,
                rows: vec![vec![ColumnValue::SignedInt(1), ColumnValue::Null]],
                position: 99,
            }))
            .await
            .unwrap();

        assert!(matches!(events.recv().await, Some(AdapterEvent::Event(_))));
        let position = adapter.last_position().unwrap();
        assert_eq!(position.file, "binlog.000002");
        assert_eq!(position.position, 99);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let (_msg_tx, _events, mut adapter) = started(interest("app", "users")).await;
        let (tx, _rx) = mpsc::channel(4);
        let err = adapter.start(&InterestSet::new(), tx).await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidState { .. }));
    }
}
