//! Conjunctive record filters
//!
//! Matching is strict: no type coercion, numbers compare numerically,
//! strings compare lexically, and any other pairing never matches.
//! A missing or null field matches nothing except `Ne`.

use serde_json::Value;

use super::record::{Record, ID_FIELD};

/// Filter operation types
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// field = value
    Eq(Value),
    /// field != value (also true when the field is absent)
    Ne(Value),
    /// field > value
    Gt(Value),
    /// field >= value
    Gte(Value),
    /// field < value
    Lt(Value),
    /// field <= value
    Lte(Value),
    /// field is one of the listed values
    In(Vec<Value>),
}

impl FilterOp {
    /// Operation name, used in log fields and error messages
    pub fn op_name(&self) -> &'static str {
        match self {
            FilterOp::Eq(_) => "eq",
            FilterOp::Ne(_) => "ne",
            FilterOp::Gt(_) => "gt",
            FilterOp::Gte(_) => "gte",
            FilterOp::Lt(_) => "lt",
            FilterOp::Lte(_) => "lte",
            FilterOp::In(_) => "in",
        }
    }
}

/// A single predicate (field + operation)
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: FilterOp,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: FilterOp) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq(value))
    }

    pub fn ne(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Ne(value))
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Gt(value))
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Gte(value))
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Lt(value))
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Lte(value))
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOp::In(values))
    }

    /// Evaluate against a record
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.value_of(&self.field);

        let actual = match actual {
            Some(v) if !v.is_null() => v,
            _ => return matches!(self.op, FilterOp::Ne(_)),
        };

        match &self.op {
            FilterOp::Eq(expected) => &actual == expected,
            FilterOp::Ne(expected) => &actual != expected,
            FilterOp::In(candidates) => candidates.iter().any(|c| c == &actual),
            FilterOp::Gt(bound) => compare(&actual, bound).is_some_and(|o| o.is_gt()),
            FilterOp::Gte(bound) => compare(&actual, bound).is_some_and(|o| o.is_ge()),
            FilterOp::Lt(bound) => compare(&actual, bound).is_some_and(|o| o.is_lt()),
            FilterOp::Lte(bound) => compare(&actual, bound).is_some_and(|o| o.is_le()),
        }
    }
}

/// Ordering between two values of the same comparable kind
fn compare(actual: &Value, bound: &Value) -> Option<std::cmp::Ordering> {
    match (actual, bound) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                return Some(ai.cmp(&bi));
            }
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Conjunction of predicates. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Matches every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_predicates(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn and_eq(self, field: impl Into<String>, value: Value) -> Self {
        self.and(Predicate::eq(field, value))
    }

    /// This filter narrowed to the given identifiers.
    ///
    /// Used to re-fetch snapshot rows: the original predicates still apply,
    /// so a record that stopped matching drops out like a deleted one.
    pub fn restricted_to_ids(&self, ids: &[String]) -> Self {
        let predicate = match ids {
            [single] => Predicate::eq(ID_FIELD, Value::String(single.clone())),
            _ => Predicate::is_in(
                ID_FIELD,
                ids.iter().map(|id| Value::String(id.clone())).collect(),
            ),
        };
        self.clone().and(predicate)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// All predicates must match (AND semantics)
    pub fn matches(&self, record: &Record) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}
