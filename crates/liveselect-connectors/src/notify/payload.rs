//! Notify-channel payload model.
//!
//! Trigger-installed functions emit one JSON payload per row change on a
//! listen/notify channel. The payload names the operation and table and
//! carries the changed row itself: `data` for inserts and deletes,
//! `new_data` + `old_data` for updates.

use serde::Deserialize;

use liveselect_core::{RowData, RowEvent, RowImage, RowOp};

use crate::error::ConnectorError;

/// A raw notification as received from the channel listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelNotification {
    /// Channel the payload arrived on.
    pub channel: String,
    /// Raw JSON payload text.
    pub payload: String,
}

/// Operation tag inside a notify payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadOp {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
}

/// Deserialized notify payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyPayload {
    /// Operation performed.
    pub op: PayloadOp,
    /// Schema (database) name; falls back to the adapter default.
    #[serde(default)]
    pub schema: Option<String>,
    /// Table name.
    pub table: String,
    /// Changed row for inserts and deletes.
    #[serde(default)]
    pub data: Option<RowData>,
    /// Post-image for updates.
    #[serde(default)]
    pub new_data: Option<RowData>,
    /// Pre-image for updates.
    #[serde(default)]
    pub old_data: Option<RowData>,
}

impl NotifyPayload {
    /// Parses a payload from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Payload`] on malformed JSON.
    pub fn parse(payload: &str) -> Result<Self, ConnectorError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Converts the payload into a normalized row event.
    ///
    /// `default_schema` applies when the payload names none.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Payload`] when the row images required
    /// by the operation are missing.
    pub fn into_row_event(self, default_schema: &str) -> Result<RowEvent, ConnectorError> {
        let database = self
            .schema
            .unwrap_or_else(|| default_schema.to_string());

        let (op, image) = match self.op {
            PayloadOp::Insert => {
                let data = self.data.ok_or_else(|| {
                    ConnectorError::Payload("INSERT payload without data".into())
                })?;
                (RowOp::Insert, RowImage::inserted(data))
            }
            PayloadOp::Delete => {
                let data = self.data.ok_or_else(|| {
                    ConnectorError::Payload("DELETE payload without data".into())
                })?;
                (RowOp::Delete, RowImage::deleted(data))
            }
            PayloadOp::Update => {
                let new_data = self.new_data.ok_or_else(|| {
                    ConnectorError::Payload("UPDATE payload without new_data".into())
                })?;
                let old_data = self.old_data.ok_or_else(|| {
                    ConnectorError::Payload("UPDATE payload without old_data".into())
                })?;
                (RowOp::Update, RowImage::updated(old_data, new_data))
            }
        };

        let column_names = match &image {
            RowImage { new: Some(data), .. } | RowImage { old: Some(data), .. } => {
                data.keys().cloned().collect()
            }
            RowImage { new: None, old: None } => Vec::new(),
        };

        Ok(RowEvent::new(op, database, self.table, column_names, vec![image]))
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_insert_payload() {
        let payload = NotifyPayload::parse(
            r#"{"op":"INSERT","table":"users","data":{"id":1,"name":"ada"}}"#,
        )
        .unwrap();
        let event = payload.into_row_event("public").unwrap();
        assert_eq!(event.op, RowOp::Insert);
        assert_eq!(event.database, "public");
        assert_eq!(event.table, "users");
        assert_eq!(
            event.rows[0].new.as_ref().unwrap().get("name"),
            Some(&json!("ada"))
        );
    }

    #[test]
    fn test_parse_update_payload_with_schema() {
        let payload = NotifyPayload::parse(
            r#"{"op":"UPDATE","schema":"app","table":"users",
                "old_data":{"id":1,"v":"old"},"new_data":{"id":1,"v":"new"}}"#,
        )
        .unwrap();
        let event = payload.into_row_event("public").unwrap();
        assert_eq!(event.op, RowOp::Update);
        assert_eq!(event.database, "app");
        let image = &event.rows[0];
        assert_eq!(image.old.as_ref().unwrap().get("v"), Some(&json!("old")));
        assert_eq!(image.new.as_ref().unwrap().get("v"), Some(&json!("new")));
    }

    #[test]
    fn test_parse_delete_payload() {
        let payload = NotifyPayload::parse(
            r#"{"op":"DELETE","table":"users","data":{"id":3}}"#,
        )
        .unwrap();
        let event = payload.into_row_event("public").unwrap();
        assert_eq!(event.op, RowOp::Delete);
        assert_eq!(event.rows[0].old.as_ref().unwrap().get("id"), Some(&json!(3)));
    }

    #[test]
    fn test_malformed_json_is_payload_error() {
        assert!(matches!(
            NotifyPayload::parse("{"),
            Err(ConnectorError::Payload(_))
        ));
    }

    #[test]
    fn test_missing_images_are_payload_errors() {
        let insert = NotifyPayload::parse(r#"{"op":"INSERT","table":"t"}"#).unwrap();
        assert!(insert.into_row_event("public").is_err());

        let update = NotifyPayload::parse(
            r#"{"op":"UPDATE","table":"t","new_data":{"id":1}}"#,
        )
        .unwrap();
        assert!(update.into_row_event("public").is_err());
    }

    #[test]
    fn test_column_names_come_from_payload_keys() {
        let payload = NotifyPayload::parse(
            r#"{"op":"INSERT","table":"t","data":{"b":1,"a":2}}"#,
        )
        .unwrap();
        let event = payload.into_row_event("public").unwrap();
        let mut columns = event.column_names.clone();
        columns.sort();
        assert_eq!(columns, vec!["a", "b"]);
    }
}
