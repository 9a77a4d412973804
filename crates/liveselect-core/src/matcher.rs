//! Row matching: deciding which change events concern which queries.
//!
//! Two modes exist. The replication-log backend only tells us *that* rows
//! changed, so caches are dirtied by trigger predicates over the event
//! ([`matches_event`]). The notify backend ships the changed rows
//! themselves, so candidates are additionally filtered through the
//! query's WHERE clause ([`filter_candidates`]) before the incremental
//! path consumes them.

use serde_json::Value;

use crate::error::CoreError;
use crate::event::{RowEvent, RowImage, RowOp, Trigger};
use crate::query::ParsedQuery;
use crate::row::RowData;

// ---------------------------------------------------------------------------
// Trigger matching
// ---------------------------------------------------------------------------

/// Returns `true` iff any trigger matches the event.
///
/// A trigger matches when its table (and database, if set) agree with the
/// event and either no condition is supplied or the condition accepts at
/// least one row. For updates the condition sees both images,
/// `(old, Some(new))` and `(new, Some(old))`, and matches if it accepts
/// either form.
#[must_use]
pub fn matches_event(triggers: &[Trigger], event: &RowEvent) -> bool {
    triggers.iter().any(|trigger| trigger_matches(trigger, event))
}

fn trigger_matches(trigger: &Trigger, event: &RowEvent) -> bool {
    if trigger.table != event.table {
        return false;
    }
    if let Some(database) = &trigger.database {
        if *database != event.database {
            return false;
        }
    }
    let Some(condition) = &trigger.condition else {
        return true;
    };
    event
        .rows
        .iter()
        .any(|image| image_accepted(condition, event.op, image))
}

fn image_accepted(
    condition: &crate::event::TriggerCondition,
    op: RowOp,
    image: &RowImage,
) -> bool {
    let accepts = condition.as_ref();
    match op {
        RowOp::Insert => image.new.as_ref().is_some_and(|new| accepts(new, None)),
        RowOp::Delete => image.old.as_ref().is_some_and(|old| accepts(old, None)),
        RowOp::Update => match (&image.old, &image.new) {
            (Some(old), Some(new)) => accepts(old, Some(new)) || accepts(new, Some(old)),
            (Some(old), None) => accepts(old, None),
            (None, Some(new)) => accepts(new, None),
            (None, None) => false,
        },
    }
}

// ---------------------------------------------------------------------------
// Supplied-payload candidates
// ---------------------------------------------------------------------------

/// Discriminates a candidate row extracted from a notify payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Inserted row.
    Insert,
    /// Deleted row (pre-image).
    Delete,
    /// Post-image of an update.
    UpdateNew,
    /// Pre-image of an update.
    UpdateOld,
}

impl CandidateKind {
    /// `true` for kinds that remove a row from the result set.
    #[must_use]
    pub fn removes(self) -> bool {
        matches!(self, CandidateKind::Delete | CandidateKind::UpdateOld)
    }

    /// `true` for kinds that add a row to the result set.
    #[must_use]
    pub fn adds(self) -> bool {
        matches!(self, CandidateKind::Insert | CandidateKind::UpdateNew)
    }
}

/// A candidate row extracted from queued notify payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRow {
    /// What the candidate does to the result set.
    pub kind: CandidateKind,
    /// Column values as shipped in the payload.
    pub data: RowData,
}

/// Flattens queued events into tagged candidate rows.
///
/// Updates contribute two candidates per row image: the pre-image tagged
/// [`CandidateKind::UpdateOld`] and the post-image tagged
/// [`CandidateKind::UpdateNew`].
#[must_use]
pub fn flatten_events(events: &[RowEvent]) -> Vec<CandidateRow> {
    let mut candidates = Vec::new();
    for event in events {
        for image in &event.rows {
            match event.op {
                RowOp::Insert => {
                    if let Some(new) = &image.new {
                        candidates.push(CandidateRow {
                            kind: CandidateKind::Insert,
                            data: new.clone(),
                        });
                    }
                }
                RowOp::Delete => {
                    if let Some(old) = &image.old {
                        candidates.push(CandidateRow {
                            kind: CandidateKind::Delete,
                            data: old.clone(),
                        });
                    }
                }
                RowOp::Update => {
                    if let Some(old) = &image.old {
                        candidates.push(CandidateRow {
                            kind: CandidateKind::UpdateOld,
                            data: old.clone(),
                        });
                    }
                    if let Some(new) = &image.new {
                        candidates.push(CandidateRow {
                            kind: CandidateKind::UpdateNew,
                            data: new.clone(),
                        });
                    }
                }
            }
        }
    }
    candidates
}

/// Keeps the candidates whose column values satisfy the query's WHERE
/// clause under the current parameter bindings.
///
/// # Errors
///
/// Propagates condition-evaluation errors ([`CoreError`]); these surface
/// to subscribers as re-evaluation errors.
pub fn filter_candidates(
    query: &ParsedQuery,
    params: &[Value],
    candidates: Vec<CandidateRow>,
) -> Result<Vec<CandidateRow>, CoreError> {
    let mut matched = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if query.row_matches(&candidate.data, params)? {
            matched.push(candidate);
        }
    }
    Ok(matched)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CmpOp, Condition, Operand};
    use serde_json::{json, Value};

    fn payload(value: Value) -> RowData {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn insert_event(db: &str, table: &str, row: Value) -> RowEvent {
        RowEvent::new(
            RowOp::Insert,
            db,
            table,
            vec![],
            vec![RowImage::inserted(payload(row))],
        )
    }

    // --- Trigger matching tests ---

    #[test]
    fn test_table_must_agree() {
        let triggers = [Trigger::on_table("users")];
        assert!(matches_event(
            &triggers,
            &insert_event("app", "users", json!({"id": 1}))
        ));
        assert!(!matches_event(
            &triggers,
            &insert_event("app", "orders", json!({"id": 1}))
        ));
    }

    #[test]
    fn test_database_constrains_when_set() {
        let triggers = [Trigger::on_table("users").in_database("app")];
        assert!(matches_event(
            &triggers,
            &insert_event("app", "users", json!({"id": 1}))
        ));
        assert!(!matches_event(
            &triggers,
            &insert_event("staging", "users", json!({"id": 1}))
        ));
    }

    #[test]
    fn test_condition_must_accept_some_row() {
        let triggers = [Trigger::on_table("users")
            .when(|row, _| row.get("vip") == Some(&json!(true)))];
        assert!(matches_event(
            &triggers,
            &insert_event("app", "users", json!({"vip": true}))
        ));
        assert!(!matches_event(
            &triggers,
            &insert_event("app", "users", json!({"vip": false}))
        ));
    }

    #[test]
    fn test_update_condition_sees_either_image() {
        let triggers = [Trigger::on_table("users")
            .when(|row, _| row.get("vip") == Some(&json!(true)))];
        // vip only in the pre-image: still a match.
        let event = RowEvent::new(
            RowOp::Update,
            "app",
            "users",
            vec![],
            vec![RowImage::updated(
                payload(json!({"vip": true})),
                payload(json!({"vip": false})),
            )],
        );
        assert!(matches_event(&triggers, &event));
    }

    #[test]
    fn test_delete_condition_sees_pre_image() {
        let triggers = [Trigger::on_table("users")
            .when(|row, _| row.get("id") == Some(&json!(7)))];
        let event = RowEvent::new(
            RowOp::Delete,
            "app",
            "users",
            vec![],
            vec![RowImage::deleted(payload(json!({"id": 7})))],
        );
        assert!(matches_event(&triggers, &event));
    }

    #[test]
    fn test_any_trigger_suffices() {
        let triggers = [
            Trigger::on_table("orders"),
            Trigger::on_table("users"),
        ];
        assert!(matches_event(
            &triggers,
            &insert_event("app", "users", json!({"id": 1}))
        ));
    }

    // --- Candidate tests ---

    #[test]
    fn test_flatten_update_yields_both_images() {
        let event = RowEvent::new(
            RowOp::Update,
            "app",
            "users",
            vec![],
            vec![RowImage::updated(
                payload(json!({"id": 1, "v": "old"})),
                payload(json!({"id": 1, "v": "new"})),
            )],
        );
        let candidates = flatten_events(&[event]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].kind, CandidateKind::UpdateOld);
        assert_eq!(candidates[1].kind, CandidateKind::UpdateNew);
        assert!(candidates[0].kind.removes());
        assert!(candidates[1].kind.adds());
    }

    #[test]
    fn test_filter_candidates_applies_where() {
        let query = ParsedQuery::select_star(vec!["users".into()])
            .filter(Condition::cmp("owner", CmpOp::Eq, Operand::Param(0)));
        let candidates = vec![
            CandidateRow {
                kind: CandidateKind::Insert,
                data: payload(json!({"owner": "u1", "id": 1})),
            },
            CandidateRow {
                kind: CandidateKind::Insert,
                data: payload(json!({"owner": "u2", "id": 2})),
            },
        ];
        let matched = filter_candidates(&query, &[json!("u1")], candidates).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].data.get("id"), Some(&json!(1)));
    }

    #[test]
    fn test_filter_candidates_propagates_errors() {
        let query = ParsedQuery::select_star(vec!["users".into()])
            .filter(Condition::cmp("owner", CmpOp::Eq, Operand::Param(2)));
        let candidates = vec![CandidateRow {
            kind: CandidateKind::Insert,
            data: payload(json!({"owner": "u1"})),
        }];
        assert!(filter_candidates(&query, &[], candidates).is_err());
    }
}
