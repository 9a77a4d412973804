//! Normalized change events, subscriber triggers, and the schema
//! interest-set published to backends.
//!
//! Both backends funnel into the same [`RowEvent`] shape: an operation
//! tag, the originating `database.table`, the ordinal column names, and
//! one or more row images (new, old, or both for updates).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::row::RowData;

// ---------------------------------------------------------------------------
// RowOp / RowImage / RowEvent
// ---------------------------------------------------------------------------

/// Change operation carried by a [`RowEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RowOp {
    /// Row inserted.
    Insert,
    /// Row updated (before and after images).
    Update,
    /// Row deleted.
    Delete,
}

impl RowOp {
    /// Returns the operation name as emitted by trigger payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RowOp::Insert => "INSERT",
            RowOp::Update => "UPDATE",
            RowOp::Delete => "DELETE",
        }
    }
}

/// One affected row: the post-image for inserts, the pre-image for
/// deletes, both for updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowImage {
    /// Post-image columns.
    pub new: Option<RowData>,
    /// Pre-image columns.
    pub old: Option<RowData>,
}

impl RowImage {
    /// Image for an inserted row.
    #[must_use]
    pub fn inserted(new: RowData) -> Self {
        Self {
            new: Some(new),
            old: None,
        }
    }

    /// Image for a deleted row.
    #[must_use]
    pub fn deleted(old: RowData) -> Self {
        Self {
            new: None,
            old: Some(old),
        }
    }

    /// Image for an updated row.
    #[must_use]
    pub fn updated(old: RowData, new: RowData) -> Self {
        Self {
            new: Some(new),
            old: Some(old),
        }
    }
}

/// A normalized change record emitted by a backend adapter.
///
/// Immutable after creation; the engine only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct RowEvent {
    /// Change operation.
    pub op: RowOp,
    /// Originating database (schema) name.
    pub database: String,
    /// Originating table name.
    pub table: String,
    /// Column names in ordinal order.
    pub column_names: Vec<String>,
    /// Affected rows.
    pub rows: Vec<RowImage>,
}

impl RowEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(
        op: RowOp,
        database: impl Into<String>,
        table: impl Into<String>,
        column_names: Vec<String>,
        rows: Vec<RowImage>,
    ) -> Self {
        Self {
            op,
            database: database.into(),
            table: table.into(),
            column_names,
            rows,
        }
    }

    /// Returns `database.table`.
    #[must_use]
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// Row-level predicate attached to a trigger.
///
/// Invoked with one row image and, for updates, the opposite image.
pub type TriggerCondition = Arc<dyn Fn(&RowData, Option<&RowData>) -> bool + Send + Sync>;

/// Subscriber-supplied predicate selecting which events concern a
/// subscription.
///
/// A trigger matches a [`RowEvent`] when the table (and database, if set)
/// agree and the optional condition accepts at least one row of the event.
#[derive(Clone)]
pub struct Trigger {
    /// Database the trigger is bound to; `None` falls back to the engine
    /// default database.
    pub database: Option<String>,
    /// Table the trigger watches.
    pub table: String,
    /// Optional row condition.
    pub condition: Option<TriggerCondition>,
}

impl Trigger {
    /// Trigger matching every change on `table`.
    #[must_use]
    pub fn on_table(table: impl Into<String>) -> Self {
        Self {
            database: None,
            table: table.into(),
            condition: None,
        }
    }

    /// Binds the trigger to a specific database.
    #[must_use]
    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Adds a row condition.
    #[must_use]
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&RowData, Option<&RowData>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("database", &self.database)
            .field("table", &self.table)
            .field("condition", &self.condition.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InterestSet
// ---------------------------------------------------------------------------

/// The `{database → tables}` set published to a backend so it only
/// produces events the engine cares about.
///
/// Backed by sorted maps so repeated publications of the same set are
/// byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct InterestSet(BTreeMap<String, BTreeSet<String>>);

impl InterestSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `(database, table)` pair.
    pub fn insert(&mut self, database: impl Into<String>, table: impl Into<String>) {
        self.0.entry(database.into()).or_default().insert(table.into());
    }

    /// Returns `true` when the pair is covered.
    #[must_use]
    pub fn contains(&self, database: &str, table: &str) -> bool {
        self.0.get(database).is_some_and(|tables| tables.contains(table))
    }

    /// Returns `true` when no tables are covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of covered `(database, table)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    /// Iterates `(database, table)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(db, tables)| {
            tables.iter().map(move |table| (db.as_str(), table.as_str()))
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
