//! # LiveSelect
//!
//! Live result sets for relational `SELECT`s: register a query once and
//! receive incremental `added / removed / moved / copied` diffs whenever
//! the underlying rows change.
//!
//! Two backends feed the same invalidation/diff engine: a
//! replication-log backend (decoded binlog events) and a publish/notify
//! backend (trigger-emitted change payloads that carry the changed rows,
//! letting caches re-evaluate without re-querying).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use liveselect::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::builder()
//!         .executor(pool)          // impl QueryExecutor
//!         .parser(parser)          // impl QueryParser
//!         .adapter(BinlogAdapter::new(decoded_messages))
//!         .default_database("app")
//!         .build()
//!         .await?;
//!
//!     let subscription = engine.select(
//!         "SELECT id, name FROM users WHERE score > $1",
//!         vec![json!(10)],
//!         &KeySelector::column("id"),
//!         vec![Trigger::on_table("users")],
//!         None,
//!         sink_fn(|diff, rows| {
//!             println!("{} added, {} rows total", diff.added.len(), rows.len());
//!         }),
//!     )?;
//!
//!     // ... later ...
//!     subscription.stop();
//!     engine.end();
//!     Ok(())
//! }
//! ```
//!
//! Clients that mirror the result set locally replay deliveries with
//! [`apply_diff`]; after every delivery the mirror equals the engine's
//! result set.

#![deny(missing_docs)]
#![warn(clippy::all)]

mod builder;
mod config;
mod engine;
mod error;
mod executor;
mod parser;
mod subscription;

pub use builder::EngineBuilder;
pub use config::EngineConfig;
pub use engine::{Engine, EngineMetrics};
pub use error::EngineError;
pub use executor::QueryExecutor;
pub use parser::QueryParser;
pub use subscription::{sink_fn, EventSink, Subscription};

// Core vocabulary, re-exported so hosts depend on one crate.
pub use liveselect_core::{
    apply_diff, diff_result_sets, CmpOp, Condition, CopiedRow, Diff, InterestSet, KeySelector,
    MovedRow, Operand, OrderBy, ParsedQuery, Row, RowData, RowEvent, RowHash, RowImage, RowOp,
    SelectField, SelectList, SortDirection, SubscriptionId, Trigger,
};

// Backend adapters.
pub use liveselect_connectors::{
    binlog::BinlogAdapter, notify::NotifyAdapter, notify::NotifyConfig, AdapterEvent,
    ConnectorError, SourceAdapter,
};

/// Commonly used types and traits.
///
/// ```rust,ignore
/// use liveselect::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        apply_diff, sink_fn, Diff, Engine, EngineConfig, EngineError, EventSink, KeySelector,
        ParsedQuery, QueryExecutor, QueryParser, Row, RowData, RowEvent, RowOp, Subscription,
        Trigger,
    };
    pub use liveselect_connectors::binlog::{BinlogAdapter, BinlogMessage};
    pub use liveselect_connectors::notify::{ChannelNotification, NotifyAdapter, NotifyConfig};
}
