//! Structural diffs between two ordered result sets.
//!
//! [`diff_result_sets`] turns a prior hash sequence and a candidate row
//! sequence into the minimal `added / removed / moved / copied` mutation
//! lists; [`apply_diff`] replays such a diff onto a result set. Together
//! they satisfy `apply_diff(old, diff(old, new)) == new` for result sets
//! with stable row hashes, which is what lets clients maintain a local
//! mirror from diffs alone.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::row::{Row, RowHash};

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// A row that kept its hash but changed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MovedRow {
    /// 1-based position in the old result set.
    pub old_index: u64,
    /// 1-based position in the new result set.
    pub new_index: u64,
}

/// An extra occurrence of a hash already present in the old result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CopiedRow {
    /// 1-based position of the first old occurrence being copied.
    pub orig_index: u64,
    /// 1-based position of the copy in the new result set.
    pub new_index: u64,
}

/// Minimal mutation lists transforming one ordered result set into
/// another.
///
/// `added`, `moved`, and `copied` ascend by new-side index; `removed`
/// ascends by old-side index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diff {
    /// Rows whose hash did not appear in the old result set, positioned.
    pub added: Vec<Row>,
    /// Old 1-based positions whose hash is absent from the new rows.
    pub removed: Vec<u64>,
    /// Rows present in both result sets at different positions.
    pub moved: Vec<MovedRow>,
    /// Surplus new occurrences copying an old row.
    pub copied: Vec<CopiedRow>,
}

impl Diff {
    /// Returns `true` when all four lists are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.moved.is_empty()
            && self.copied.is_empty()
    }

    /// Diff presenting `rows` as an entirely new result set.
    ///
    /// Used for the initial delivery to a freshly attached subscription.
    #[must_use]
    pub fn all_added(rows: &[Row]) -> Self {
        Diff {
            added: rows.to_vec(),
            ..Diff::default()
        }
    }
}

// ---------------------------------------------------------------------------
// diff_result_sets
// ---------------------------------------------------------------------------

/// Computes the structural diff between the prior hash sequence and a
/// candidate row sequence.
///
/// `new_rows` must already be numbered `1..=N` in order. Occurrences of a
/// hash are matched first-to-first; a new occurrence with no unconsumed
/// old partner copies the first old occurrence.
///
/// Returns `None` when the sequences are structurally identical.
#[must_use]
pub fn diff_result_sets(old_hashes: &[RowHash], new_rows: &[Row]) -> Option<Diff> {
    let mut unconsumed: HashMap<&RowHash, VecDeque<usize>> = HashMap::new();
    let mut first_occurrence: HashMap<&RowHash, usize> = HashMap::new();
    for (position, hash) in old_hashes.iter().enumerate() {
        unconsumed.entry(hash).or_default().push_back(position);
        first_occurrence.entry(hash).or_insert(position);
    }

    let new_hashes: HashSet<&RowHash> = new_rows.iter().map(Row::hash).collect();

    let removed = old_hashes
        .iter()
        .enumerate()
        .filter(|(_, hash)| !new_hashes.contains(hash))
        .map(|(position, _)| position as u64 + 1)
        .collect();
    let mut diff = Diff {
        removed,
        ..Diff::default()
    };

    for (position, row) in new_rows.iter().enumerate() {
        let old_position = unconsumed
            .get_mut(row.hash())
            .and_then(VecDeque::pop_front);
        match old_position {
            Some(old) if old == position => {}
            Some(old) => diff.moved.push(MovedRow {
                old_index: old as u64 + 1,
                new_index: position as u64 + 1,
            }),
            None => match first_occurrence.get(row.hash()) {
                Some(&orig) => diff.copied.push(CopiedRow {
                    orig_index: orig as u64 + 1,
                    new_index: position as u64 + 1,
                }),
                None => diff.added.push(row.clone()),
            },
        }
    }

    if diff.is_empty() {
        None
    } else {
        Some(diff)
    }
}

// ---------------------------------------------------------------------------
// apply_diff
// ---------------------------------------------------------------------------

/// Replays a diff onto a result set, producing the next result set.
///
/// Pure function, exported for client-side mirror replay. Slots for
/// `removed` rows and `moved` sources are cleared before any write, and
/// every write reads from the pristine input, so a slot that doubles as a
/// `moved` source and a `copied` origin is never read after being
/// overwritten.
///
/// # Panics
///
/// Panics when the diff does not correspond to `old` (an index referring
/// past the end of the working set).
#[must_use]
pub fn apply_diff(old: &[Row], diff: &Diff) -> Vec<Row> {
    let target = |index: u64| index as usize;
    let capacity = diff
        .added
        .iter()
        .map(|row| target(row.index()))
        .chain(diff.moved.iter().map(|m| target(m.new_index)))
        .chain(diff.copied.iter().map(|c| target(c.new_index)))
        .max()
        .unwrap_or(0)
        .max(old.len());

    let mut slots: Vec<Option<Row>> = old.iter().cloned().map(Some).collect();
    slots.resize(capacity, None);

    for &index in &diff.removed {
        slots[target(index) - 1] = None;
    }
    for moved in &diff.moved {
        slots[target(moved.old_index) - 1] = None;
    }
    for copied in &diff.copied {
        let row = old[target(copied.orig_index) - 1]
            .clone()
            .at_index(copied.new_index);
        slots[target(copied.new_index) - 1] = Some(row);
    }
    for moved in &diff.moved {
        let row = old[target(moved.old_index) - 1]
            .clone()
            .at_index(moved.new_index);
        slots[target(moved.new_index) - 1] = Some(row);
    }
    for added in &diff.added {
        slots[target(added.index()) - 1] = Some(added.clone());
    }

    slots.into_iter().flatten().collect()
}

// ===========================================================================
// Tests
// ===========================================================================
