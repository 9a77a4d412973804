//! Incremental re-computation from supplied payloads.
//!
//! When the backend ships changed rows inside its notifications, a cache
//! can usually compute its next result set without re-issuing the query:
//! project the candidates onto the query's select-list, retract matching
//! hashes, append additions, then re-apply ORDER BY and LIMIT. The one
//! case the payloads cannot answer is a deletion from a result set
//! pinned at its LIMIT, where an unknown row would take the freed slot;
//! that case refuses and demands a full re-query.

use serde_json::Value;

use crate::error::CoreError;
use crate::event::RowEvent;
use crate::matcher::{self, CandidateRow};
use crate::query::{ParsedQuery, SelectList, SortDirection};
use crate::row::{Row, RowData, RowHash};

/// Result of an incremental pass over queued payload events.
#[derive(Debug, Clone, PartialEq)]
pub enum IncrementalOutcome {
    /// No queued candidate concerned the query.
    Unchanged,
    /// The next result set, renumbered `1..=N`.
    Updated(Vec<Row>),
    /// The payloads cannot determine the next result set; the caller must
    /// re-issue the query.
    RequiresRequery,
}

/// Computes the next result set from the current one plus queued events.
///
/// Follows the supplied-payload protocol: flatten events into tagged
/// candidates, filter through the WHERE clause, normalize and project each
/// match, retract deletions and update pre-images by hash, append
/// insertions and update post-images, then sort, truncate to LIMIT, and
/// renumber.
///
/// # Errors
///
/// Propagates condition-evaluation and ordering errors ([`CoreError`]).
pub fn next_result_set(
    old: &[Row],
    events: &[RowEvent],
    query: &ParsedQuery,
    params: &[Value],
) -> Result<IncrementalOutcome, CoreError> {
    let candidates = matcher::flatten_events(events);
    let matched = matcher::filter_candidates(query, params, candidates)?;
    if matched.is_empty() {
        return Ok(IncrementalOutcome::Unchanged);
    }

    let mut survivors: Vec<Option<&Row>> = old.iter().map(Some).collect();
    let mut appended: Vec<RowData> = Vec::new();
    let mut removed_any = false;

    for CandidateRow { kind, data } in matched {
        let projected = project(query, data);
        if kind.removes() {
            let hash = RowHash::of(&projected);
            if let Some(slot) = survivors
                .iter_mut()
                .find(|slot| slot.is_some_and(|row| *row.hash() == hash))
            {
                *slot = None;
                removed_any = true;
            }
        } else {
            appended.push(projected);
        }
    }

    if removed_any && query.limit == Some(old.len() as u64) {
        tracing::debug!(
            limit = old.len(),
            "deletion from a limit-pinned result set, falling back to re-query"
        );
        return Ok(IncrementalOutcome::RequiresRequery);
    }

    let mut next: Vec<RowData> = survivors
        .into_iter()
        .flatten()
        .map(|row| row.data().clone())
        .chain(appended)
        .collect();

    if !query.order.is_empty() {
        next = sort_rows(next, query)?;
    }
    if let Some(limit) = query.limit {
        next.truncate(limit as usize);
    }

    let rows = next
        .into_iter()
        .enumerate()
        .map(|(position, data)| Row::new(data, position as u64 + 1))
        .collect();
    Ok(IncrementalOutcome::Updated(rows))
}

/// Projects a payload onto the query's select-list, applying `AS`
/// renames and dropping synthetic fields. A `SELECT *` keeps all columns.
fn project(query: &ParsedQuery, mut data: RowData) -> RowData {
    data.remove("_hash");
    data.remove("_index");
    match &query.fields {
        SelectList::Star => data,
        SelectList::Fields(fields) => {
            let mut projected = RowData::new();
            for field in fields {
                let value = data.get(&field.field).cloned().unwrap_or(Value::Null);
                projected.insert(field.output_name().to_string(), value);
            }
            projected
        }
    }
}

/// Stable sort by the query's ORDER BY keys in declared direction.
fn sort_rows(rows: Vec<RowData>, query: &ParsedQuery) -> Result<Vec<RowData>, CoreError> {
    let mut keyed: Vec<(Vec<Value>, RowData)> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = query
            .order
            .iter()
            .map(|order| row.get(&order.column).cloned().unwrap_or(Value::Null))
            .collect::<Vec<_>>();
        // Surface unsupported key shapes before sorting.
        for value in &key {
            crate::query::json_cmp(value, value)?;
        }
        keyed.push((key, row));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        for (order, (left, right)) in query.order.iter().zip(a.iter().zip(b.iter())) {
            let ordering = crate::query::json_cmp(left, right)
                .unwrap_or(std::cmp::Ordering::Equal);
            let ordering = match order.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });

    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

// ===========================================================================
// Tests
// ===========================================================================
