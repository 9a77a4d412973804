//! Publish/notify backend.
//!
//! Database triggers emit one JSON payload per row change on a
//! listen/notify channel; the [`NotifyAdapter`] parses and filters them.
//! Payloads carry the changed rows, so caches fed by this backend can
//! re-evaluate incrementally from the payloads alone.

mod payload;
mod source;

pub use payload::{ChannelNotification, NotifyPayload, PayloadOp};
pub use source::{NotifyAdapter, NotifyConfig};
