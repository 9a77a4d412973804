//! Decoded replication-log message model.
//!
//! The wire decoder (the component that speaks the binlog replication
//! protocol) is an external collaborator; it hands the adapter these
//! already-decoded messages. Row events reference a prior
//! [`TableMapEvent`] by table id, exactly as the log interleaves them.

use serde_json::Value;

use liveselect_core::RowData;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A decoded message from the replication log.
#[derive(Debug, Clone, PartialEq)]
pub enum BinlogMessage {
    /// Table map event (schema for subsequent row events).
    TableMap(TableMapEvent),
    /// Row insert event.
    Insert(BinlogRows),
    /// Row update event (before and after images).
    Update(BinlogUpdateRows),
    /// Row delete event.
    Delete(BinlogRows),
    /// Log file rotation.
    Rotate {
        /// New log filename.
        next_file: String,
        /// Position in the new file.
        position: u64,
    },
    /// Keep-alive from the upstream server.
    Heartbeat,
}

/// Table map event: column layout for subsequent row events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapEvent {
    /// Upstream-internal table identifier.
    pub table_id: u64,
    /// Database name.
    pub database: String,
    /// Table name.
    pub table: String,
    /// Column names in ordinal order.
    pub columns: Vec<String>,
}

/// Insert or delete rows for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct BinlogRows {
    /// References the prior [`TableMapEvent`].
    pub table_id: u64,
    /// Affected rows, each as column values in ordinal order.
    pub rows: Vec<Vec<ColumnValue>>,
    /// Log position of the event.
    pub position: u64,
}

/// Updated rows with before and after images.
#[derive(Debug, Clone, PartialEq)]
pub struct BinlogUpdateRows {
    /// References the prior [`TableMapEvent`].
    pub table_id: u64,
    /// Affected rows as `(before, after)` images.
    pub rows: Vec<(Vec<ColumnValue>, Vec<ColumnValue>)>,
    /// Log position of the event.
    pub position: u64,
}

/// Resume coordinate in the replication log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinlogPosition {
    /// Log filename.
    pub file: String,
    /// Byte position within the file.
    pub position: u64,
}

// ---------------------------------------------------------------------------
// Column values
// ---------------------------------------------------------------------------

/// A typed column value as decoded from the log.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// NULL value.
    Null,
    /// Signed integer.
    SignedInt(i64),
    /// Unsigned integer.
    UnsignedInt(u64),
    /// Floating point.
    Double(f64),
    /// String or text.
    String(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// JSON column (as its text form).
    Json(String),
}

/// Converts a typed column value to JSON.
///
/// Binary data is base64-encoded; JSON columns are parsed, falling back
/// to the raw text when malformed.
#[must_use]
pub fn column_value_to_json(value: &ColumnValue) -> Value {
    use base64::Engine as _;
    match value {
        ColumnValue::Null => Value::Null,
        ColumnValue::SignedInt(v) => serde_json::json!(v),
        ColumnValue::UnsignedInt(v) => serde_json::json!(v),
        ColumnValue::Double(v) => serde_json::json!(v),
        ColumnValue::String(s) => serde_json::json!(s),
        ColumnValue::Bytes(b) => {
            serde_json::json!(base64::engine::general_purpose::STANDARD.encode(b))
        }
        ColumnValue::Json(s) => serde_json::from_str(s).unwrap_or_else(|_| serde_json::json!(s)),
    }
}

/// Zips ordinal column values with the table map's column names into a
/// row payload. Surplus values without a name are dropped.
#[must_use]
pub fn row_to_payload(values: &[ColumnValue], columns: &[String]) -> RowData {
    let mut payload = RowData::new();
    for (name, value) in columns.iter().zip(values) {
        payload.insert(name.clone(), column_value_to_json(value));
    }
    payload
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_value_to_json() {
        assert_eq!(column_value_to_json(&ColumnValue::Null), Value::Null);
        assert_eq!(column_value_to_json(&ColumnValue::SignedInt(-42)), json!(-42));
        assert_eq!(column_value_to_json(&ColumnValue::UnsignedInt(42)), json!(42));
        assert_eq!(column_value_to_json(&ColumnValue::Double(1.5)), json!(1.5));
        assert_eq!(
            column_value_to_json(&ColumnValue::String("hello".into())),
            json!("hello")
        );
    }

    #[test]
    fn test_bytes_encode_as_base64() {
        assert_eq!(
            column_value_to_json(&ColumnValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])),
            json!("3q2+7w==")
        );
    }

    #[test]
    fn test_json_column_parses_with_text_fallback() {
        assert_eq!(
            column_value_to_json(&ColumnValue::Json(r#"{"a":1}"#.into())),
            json!({"a": 1})
        );
        assert_eq!(
            column_value_to_json(&ColumnValue::Json("not json".into())),
            json!("not json")
        );
    }

    #[test]
    fn test_row_to_payload_zips_names() {
        let payload = row_to_payload(
            &[ColumnValue::SignedInt(7), ColumnValue::String("ada".into())],
            &["id".to_string(), "name".to_string()],
        );
        assert_eq!(payload.get("id"), Some(&json!(7)));
        assert_eq!(payload.get("name"), Some(&json!("ada")));
    }

    #[test]
    fn test_row_to_payload_drops_unnamed_surplus() {
        let payload = row_to_payload(
            &[ColumnValue::SignedInt(1), ColumnValue::SignedInt(2)],
            &["id".to_string()],
        );
        assert_eq!(payload.len(), 1);
    }
}
