//! # LiveSelect Core
//!
//! The core live-query machinery: everything that turns a stream of row
//! change events into ordered, minimal result-set diffs.
//!
//! This crate provides:
//! - **Row model**: JSON-object rows with MD5 identity hashes and 1-based
//!   positions ([`row`])
//! - **Events**: normalized change records, subscriber triggers, and the
//!   schema interest-set ([`event`])
//! - **Query model**: the parsed-query contract and WHERE-tree evaluation
//!   ([`query`])
//! - **Differ**: structural diffs and client-side replay ([`diff`])
//! - **Matcher**: trigger matching and supplied-payload filtering
//!   ([`matcher`])
//! - **Incremental path**: next-result-set computation from queued
//!   payloads ([`incremental`])
//! - **Query cache**: per-query state and the rate-limit state machine
//!   ([`cache`])
//!
//! Everything here is synchronous and runtime-free; the engine crate owns
//! the event loop, timers, and backend I/O.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod diff;
pub mod error;
pub mod event;
pub mod incremental;
pub mod matcher;
pub mod query;
pub mod row;

pub use cache::{
    CacheState, CompleteDecision, InvalidateDecision, QueryCache, SubscriptionId,
};
pub use diff::{apply_diff, diff_result_sets, CopiedRow, Diff, MovedRow};
pub use error::CoreError;
pub use event::{InterestSet, RowEvent, RowImage, RowOp, Trigger, TriggerCondition};
pub use incremental::{next_result_set, IncrementalOutcome};
pub use matcher::{filter_candidates, flatten_events, matches_event, CandidateKind, CandidateRow};
pub use query::{
    json_cmp, CmpOp, Condition, Operand, OrderBy, ParsedQuery, SelectField, SelectList,
    SortDirection,
};
pub use row::{KeySelector, Row, RowData, RowHash};
