//! Metadata filtering for search results.
//!
//! A filter expression maps field names to operator objects:
//!
//! ```json
//! {"genre": {"==": "fiction"}, "year": {">=": 2000, "<": 2010}}
//! ```
//!
//! All constraints are AND-ed, both across fields and across the operators
//! of one field. Supported operators: `==`, `!=`, `<`, `<=`, `>`, `>=`,
//! `in`, `not_in`.
//!
//! A field missing from the metadata satisfies only `!=` and `not_in`.
//! Numbers compare numerically regardless of integer/float encoding,
//! strings compare lexicographically, and any other pairing fails ordered
//! comparisons.

use std::cmp::Ordering;

use ragstore_core::{Error, Result};
use serde_json::Value;

use crate::types::{Metadata, SearchResult};

/// Comparison operator in a filter constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `not_in`
    NotIn,
}

impl FilterOp {
    /// Every operator, in documentation order.
    pub const ALL: [FilterOp; 8] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Lt,
        FilterOp::Le,
        FilterOp::Gt,
        FilterOp::Ge,
        FilterOp::In,
        FilterOp::NotIn,
    ];

    /// The operator's token.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
            FilterOp::In => "in",
            FilterOp::NotIn => "not_in",
        }
    }

    /// Parse an operator token.
    pub fn parse(token: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == token)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(FilterOp::as_str).collect();
                Error::config(format!(
                    "unknown filter operator '{token}' (supported: {})",
                    known.join(", ")
                ))
            })
    }

    fn takes_list(&self) -> bool {
        matches!(self, FilterOp::In | FilterOp::NotIn)
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `field op value` constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Metadata key to look up.
    pub field: String,
    /// Operator to apply.
    pub op: FilterOp,
    /// Right-hand operand. An array for `in` / `not_in`.
    pub value: Value,
}

/// A parsed filter expression: a conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<Condition>,
}

impl MetadataFilter {
    /// The empty filter, which matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON filter expression.
    ///
    /// The expression must be an object whose values are non-empty
    /// operator objects; `in` / `not_in` operands must be arrays.
    pub fn from_value(expr: &Value) -> Result<Self> {
        let fields = expr
            .as_object()
            .ok_or_else(|| Error::config("filter expression must be an object"))?;

        let mut filter = Self::new();
        for (field, ops) in fields {
            let ops = ops.as_object().ok_or_else(|| {
                Error::config(format!("filter for field '{field}' must be an operator object"))
            })?;
            if ops.is_empty() {
                return Err(Error::config(format!(
                    "filter for field '{field}' has no operator"
                )));
            }
            for (token, value) in ops {
                let op = FilterOp::parse(token)?;
                filter = filter.try_and(field.clone(), op, value.clone())?;
            }
        }
        Ok(filter)
    }

    /// Add a constraint.
    ///
    /// Fails when `in` / `not_in` is given a non-array operand.
    pub fn try_and(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Result<Self> {
        let field = field.into();
        if op.takes_list() && !value.is_array() {
            return Err(Error::config(format!(
                "operator '{op}' on field '{field}' requires an array"
            )));
        }
        self.conditions.push(Condition { field, op, value });
        Ok(self)
    }

    /// The parsed conditions.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// True when there are no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate the filter against one metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions
            .iter()
            .all(|cond| evaluate(metadata.get(&cond.field), cond.op, &cond.value))
    }

    /// Render back to the JSON expression form.
    pub fn to_value(&self) -> Value {
        let mut fields = serde_json::Map::new();
        for cond in &self.conditions {
            let entry = fields
                .entry(cond.field.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(ops) = entry {
                ops.insert(cond.op.as_str().to_string(), cond.value.clone());
            }
        }
        Value::Object(fields)
    }
}

impl TryFrom<Value> for MetadataFilter {
    type Error = Error;

    fn try_from(expr: Value) -> Result<Self> {
        Self::from_value(&expr)
    }
}

impl std::str::FromStr for MetadataFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let expr: Value = serde_json::from_str(s)
            .map_err(|e| Error::config(format!("filter expression is not valid JSON: {e}")))?;
        Self::from_value(&expr)
    }
}

/// Check whether `metadata` satisfies `filter`.
pub fn matches(metadata: &Metadata, filter: &MetadataFilter) -> bool {
    filter.matches(metadata)
}

/// Keep the results whose metadata satisfies `filter`, in their original
/// order. Never re-queries: the output may be shorter than the input.
pub fn filter(mut results: Vec<SearchResult>, filter: &MetadataFilter) -> Vec<SearchResult> {
    if !filter.is_empty() {
        results.retain(|r| filter.matches(&r.metadata));
    }
    results
}

fn evaluate(field: Option<&Value>, op: FilterOp, operand: &Value) -> bool {
    let Some(field) = field else {
        return matches!(op, FilterOp::Ne | FilterOp::NotIn);
    };

    match op {
        FilterOp::Eq => values_eq(field, operand),
        FilterOp::Ne => !values_eq(field, operand),
        FilterOp::Lt => compare(field, operand) == Some(Ordering::Less),
        FilterOp::Le => matches!(compare(field, operand), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::Gt => compare(field, operand) == Some(Ordering::Greater),
        FilterOp::Ge => matches!(
            compare(field, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::In => in_list(field, operand),
        FilterOp::NotIn => !in_list(field, operand),
    }
}

fn values_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn in_list(field: &Value, list: &Value) -> bool {
    list.as_array()
        .is_some_and(|items| items.iter().any(|item| values_eq(field, item)))
}

// ============================================================================
// Tests
// ============================================================================
