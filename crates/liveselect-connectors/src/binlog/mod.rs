//! Replication-log backend.
//!
//! The external wire decoder turns the upstream replication stream into
//! [`BinlogMessage`]s; the [`BinlogAdapter`] resolves them through the
//! table-map cache and normalizes them into engine row events. Only
//! tables in the interest-set pass through.

mod decoder;
mod source;

pub use decoder::{
    column_value_to_json, row_to_payload, BinlogMessage, BinlogPosition, BinlogRows,
    BinlogUpdateRows, ColumnValue, TableMapEvent,
};
pub use source::BinlogAdapter;
