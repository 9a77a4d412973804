//! Parsed-query model and condition evaluation.
//!
//! The engine never parses SQL itself; the host's parser hands it a
//! [`ParsedQuery`] decomposed into tables, a select-list, a WHERE tree,
//! ORDER BY keys, and a prefix LIMIT. Conditions evaluate directly
//! against JSON row payloads under the positional parameter bindings of
//! the registration.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::CoreError;
use crate::row::RowData;

// ---------------------------------------------------------------------------
// Select list
// ---------------------------------------------------------------------------

/// One projected column, optionally renamed with `AS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectField {
    /// Source column name.
    pub field: String,
    /// Output name when renamed.
    pub alias: Option<String>,
}

impl SelectField {
    /// Plain column reference.
    #[must_use]
    pub fn named(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: None,
        }
    }

    /// Column reference with an `AS` rename.
    #[must_use]
    pub fn aliased(field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            alias: Some(alias.into()),
        }
    }

    /// Name the column has in result rows.
    #[must_use]
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

/// The projection of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectList {
    /// `SELECT *`: keep all columns.
    Star,
    /// Explicit column list.
    Fields(Vec<SelectField>),
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Sort direction of one ORDER BY key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column the key sorts on.
    pub column: String,
    /// Declared direction.
    pub direction: SortDirection,
}

impl OrderBy {
    /// Ascending key on `column`.
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending key on `column`.
    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Total order over scalar JSON values: Null < Bool < Number < String.
///
/// Numbers compare as `f64`; strings lexicographically. Arrays and
/// objects have no defined order.
///
/// # Errors
///
/// Returns [`CoreError::UnsupportedQuery`] when either side is an array
/// or object.
pub fn json_cmp(a: &Value, b: &Value) -> Result<Ordering, CoreError> {
    fn rank(value: &Value) -> Result<u8, CoreError> {
        match value {
            Value::Null => Ok(0),
            Value::Bool(_) => Ok(1),
            Value::Number(_) => Ok(2),
            Value::String(_) => Ok(3),
            Value::Array(_) | Value::Object(_) => Err(CoreError::UnsupportedQuery(
                "cannot compare JSON arrays or objects".into(),
            )),
        }
    }

    let (ra, rb) = (rank(a)?, rank(b)?);
    if ra != rb {
        return Ok(ra.cmp(&rb));
    }
    Ok(match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Comparison operator of a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// Right-hand side of a leaf condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Literal value.
    Value(Value),
    /// Positional parameter (`$1` is index 0).
    Param(usize),
}

/// WHERE-clause expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column op operand`
    Cmp {
        /// Column the comparison reads.
        column: String,
        /// Comparison operator.
        op: CmpOp,
        /// Right-hand side.
        operand: Operand,
    },
    /// Both sides must hold.
    And(Box<Condition>, Box<Condition>),
    /// Either side must hold.
    Or(Box<Condition>, Box<Condition>),
    /// Negation.
    Not(Box<Condition>),
}

impl Condition {
    /// Leaf comparison.
    #[must_use]
    pub fn cmp(column: impl Into<String>, op: CmpOp, operand: Operand) -> Self {
        Condition::Cmp {
            column: column.into(),
            op,
            operand,
        }
    }

    /// `column = value` shorthand.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::cmp(column, CmpOp::Eq, Operand::Value(value))
    }

    /// Conjunction.
    #[must_use]
    pub fn and(self, other: Condition) -> Self {
        Condition::And(Box::new(self), Box::new(other))
    }

    /// Disjunction.
    #[must_use]
    pub fn or(self, other: Condition) -> Self {
        Condition::Or(Box::new(self), Box::new(other))
    }

    /// Negation.
    #[must_use]
    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Evaluates the tree against one row payload.
    ///
    /// A column absent from the payload evaluates as JSON null.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnboundParameter`] for an out-of-range
    /// parameter reference and [`CoreError::UnsupportedQuery`] for
    /// comparisons against arrays or objects.
    pub fn evaluate(&self, row: &RowData, params: &[Value]) -> Result<bool, CoreError> {
        match self {
            Condition::Cmp { column, op, operand } => {
                let left = row.get(column).unwrap_or(&Value::Null);
                let right = match operand {
                    Operand::Value(value) => value,
                    Operand::Param(index) => params
                        .get(*index)
                        .ok_or(CoreError::UnboundParameter(*index))?,
                };
                let ordering = json_cmp(left, right)?;
                Ok(match op {
                    CmpOp::Eq => ordering == Ordering::Equal,
                    CmpOp::Ne => ordering != Ordering::Equal,
                    CmpOp::Lt => ordering == Ordering::Less,
                    CmpOp::Le => ordering != Ordering::Greater,
                    CmpOp::Gt => ordering == Ordering::Greater,
                    CmpOp::Ge => ordering != Ordering::Less,
                })
            }
            Condition::And(a, b) => Ok(a.evaluate(row, params)? && b.evaluate(row, params)?),
            Condition::Or(a, b) => Ok(a.evaluate(row, params)? || b.evaluate(row, params)?),
            Condition::Not(inner) => Ok(!inner.evaluate(row, params)?),
        }
    }
}

// ---------------------------------------------------------------------------
// ParsedQuery
// ---------------------------------------------------------------------------

/// A query decomposed by the host's parser.
///
/// Queries with clauses outside this shape (OFFSET, aggregates, joins the
/// host cannot reduce) must be rejected upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// Tables the query reads.
    pub tables: Vec<String>,
    /// Projection.
    pub fields: SelectList,
    /// WHERE clause.
    pub where_clause: Option<Condition>,
    /// ORDER BY keys in declaration order.
    pub order: Vec<OrderBy>,
    /// Prefix LIMIT.
    pub limit: Option<u64>,
}

impl ParsedQuery {
    /// `SELECT * FROM tables` skeleton.
    #[must_use]
    pub fn select_star(tables: Vec<String>) -> Self {
        Self {
            tables,
            fields: SelectList::Star,
            where_clause: None,
            order: Vec::new(),
            limit: None,
        }
    }

    /// Replaces the projection.
    #[must_use]
    pub fn fields(mut self, fields: Vec<SelectField>) -> Self {
        self.fields = SelectList::Fields(fields);
        self
    }

    /// Sets the WHERE clause.
    #[must_use]
    pub fn filter(mut self, condition: Condition) -> Self {
        self.where_clause = Some(condition);
        self
    }

    /// Appends an ORDER BY key.
    #[must_use]
    pub fn order_by(mut self, key: OrderBy) -> Self {
        self.order.push(key);
        self
    }

    /// Sets the prefix LIMIT.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates the WHERE clause against a payload; `true` when the
    /// query has no WHERE clause.
    ///
    /// # Errors
    ///
    /// Propagates [`Condition::evaluate`] errors.
    pub fn row_matches(&self, row: &RowData, params: &[Value]) -> Result<bool, CoreError> {
        match &self.where_clause {
            Some(condition) => condition.evaluate(row, params),
            None => Ok(true),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> RowData {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    // --- json_cmp tests ---

    #[test]
    fn test_json_cmp_type_ranks() {
        assert_eq!(json_cmp(&json!(null), &json!(false)).unwrap(), Ordering::Less);
        assert_eq!(json_cmp(&json!(true), &json!(0)).unwrap(), Ordering::Less);
        assert_eq!(json_cmp(&json!(9), &json!("a")).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_json_cmp_numbers_and_strings() {
        assert_eq!(json_cmp(&json!(2), &json!(10)).unwrap(), Ordering::Less);
        assert_eq!(json_cmp(&json!(2.5), &json!(2)).unwrap(), Ordering::Greater);
        assert_eq!(json_cmp(&json!("abc"), &json!("abd")).unwrap(), Ordering::Less);
        assert_eq!(json_cmp(&json!("x"), &json!("x")).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_json_cmp_rejects_containers() {
        assert!(json_cmp(&json!([1]), &json!(1)).is_err());
        assert!(json_cmp(&json!(1), &json!({"a": 1})).is_err());
    }

    // --- Condition tests ---

    #[test]
    fn test_condition_literal_comparisons() {
        let row = payload(json!({"score": 10, "name": "ada"}));
        assert!(Condition::eq("name", json!("ada")).evaluate(&row, &[]).unwrap());
        assert!(Condition::cmp("score", CmpOp::Gt, Operand::Value(json!(5)))
            .evaluate(&row, &[])
            .unwrap());
        assert!(!Condition::cmp("score", CmpOp::Lt, Operand::Value(json!(5)))
            .evaluate(&row, &[])
            .unwrap());
    }

    #[test]
    fn test_condition_param_binding() {
        let row = payload(json!({"owner": "u1"}));
        let condition = Condition::cmp("owner", CmpOp::Eq, Operand::Param(0));
        assert!(condition.evaluate(&row, &[json!("u1")]).unwrap());
        assert!(!condition.evaluate(&row, &[json!("u2")]).unwrap());
    }

    #[test]
    fn test_condition_unbound_param_errors() {
        let row = payload(json!({"owner": "u1"}));
        let condition = Condition::cmp("owner", CmpOp::Eq, Operand::Param(3));
        let err = condition.evaluate(&row, &[json!("u1")]).unwrap_err();
        assert!(matches!(err, CoreError::UnboundParameter(3)));
    }

    #[test]
    fn test_condition_boolean_operators() {
        let row = payload(json!({"a": 1, "b": 2}));
        let both = Condition::eq("a", json!(1)).and(Condition::eq("b", json!(2)));
        assert!(both.evaluate(&row, &[]).unwrap());

        let either = Condition::eq("a", json!(9)).or(Condition::eq("b", json!(2)));
        assert!(either.evaluate(&row, &[]).unwrap());

        let negated = Condition::eq("a", json!(1)).negate();
        assert!(!negated.evaluate(&row, &[]).unwrap());
    }

    #[test]
    fn test_condition_missing_column_is_null() {
        let row = payload(json!({"a": 1}));
        assert!(Condition::eq("missing", json!(null)).evaluate(&row, &[]).unwrap());
    }

    // --- ParsedQuery tests ---

    #[test]
    fn test_row_matches_without_where() {
        let query = ParsedQuery::select_star(vec!["users".into()]);
        assert!(query.row_matches(&payload(json!({"x": 1})), &[]).unwrap());
    }

    #[test]
    fn test_select_field_output_name() {
        assert_eq!(SelectField::named("id").output_name(), "id");
        assert_eq!(SelectField::aliased("id", "user_id").output_name(), "user_id");
    }
}
