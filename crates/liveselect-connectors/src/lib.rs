//! # LiveSelect Connectors
//!
//! Backend adapters for the live-query engine.
//!
//! An adapter turns one upstream change feed into normalized
//! [`RowEvent`](liveselect_core::RowEvent)s behind the common
//! [`SourceAdapter`] contract:
//!
//! - [`binlog`]: replication-log backend with decoded binlog messages,
//!   table-map resolution, and typed column values.
//! - [`notify`]: publish/notify backend with trigger-emitted JSON
//!   payloads carrying the changed rows themselves.
//!
//! Connections and wire decoding stay with the host; adapters consume
//! already-decoded feeds over channels and apply the engine's schema
//! interest-set.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod binlog;
pub mod connector;
pub mod error;
pub mod notify;

pub use connector::{AdapterEvent, SourceAdapter};
pub use error::ConnectorError;
