//! Declarative queries over the JSON view of stored records
//!
//! Closure predicates (`DocumentStore::query`) cover most needs. `Query`
//! adds serializable filters plus sort, skip and limit for callers that
//! build queries at runtime.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter operators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    /// String contains
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    /// Field present (or absent, with `false`)
    Exists(bool),
}

/// A single filter condition.
///
/// `field` is a top-level key, a dotted path (`address.city`), or `_id`
/// for the document id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp) -> Self {
        Self { field: field.to_string(), op }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq(value.into()))
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Ne(value.into()))
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gt(value.into()))
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lt(value.into()))
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, FilterOp::Contains(value.to_string()))
    }

    /// Check if a document matches this filter
    pub fn matches(&self, id: &str, view: &Value) -> bool {
        let id_value;
        let value = if self.field == "_id" {
            id_value = Value::String(id.to_string());
            Some(&id_value)
        } else {
            lookup(view, &self.field)
        };

        match (&self.op, value) {
            (FilterOp::Exists(should_exist), val) => val.is_some() == *should_exist,
            (_, None) => false,
            (FilterOp::Eq(expected), Some(actual)) => values_equal(actual, expected),
            (FilterOp::Ne(expected), Some(actual)) => !values_equal(actual, expected),
            (FilterOp::Gt(expected), Some(actual)) => {
                compare_values(actual, expected) == Some(Ordering::Greater)
            }
            (FilterOp::Gte(expected), Some(actual)) => {
                matches!(compare_values(actual, expected), Some(Ordering::Greater | Ordering::Equal))
            }
            (FilterOp::Lt(expected), Some(actual)) => {
                compare_values(actual, expected) == Some(Ordering::Less)
            }
            (FilterOp::Lte(expected), Some(actual)) => {
                matches!(compare_values(actual, expected), Some(Ordering::Less | Ordering::Equal))
            }
            (FilterOp::Contains(substr), Some(Value::String(s))) => s.contains(substr.as_str()),
            (FilterOp::StartsWith(prefix), Some(Value::String(s))) => s.starts_with(prefix.as_str()),
            (FilterOp::EndsWith(suffix), Some(Value::String(s))) => s.ends_with(suffix.as_str()),
            (FilterOp::In(values), Some(actual)) => values.iter().any(|v| values_equal(actual, v)),
            (FilterOp::NotIn(values), Some(actual)) => !values.iter().any(|v| values_equal(actual, v)),
            _ => false,
        }
    }
}

fn lookup<'v>(view: &'v Value, field: &str) -> Option<&'v Value> {
    if field.contains('.') {
        let pointer = format!("/{}", field.replace('.', "/"));
        view.pointer(&pointer)
    } else {
        view.get(field)
    }
}

// 30 and 30.0 serialize differently but should compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Compare two JSON values
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64()?;
            let b = b.as_f64()?;
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// A decoded record with its id and JSON view, as fed to `Query::execute`.
#[derive(Debug, Clone)]
pub struct QueryRow<T> {
    pub id: String,
    pub view: Value,
    pub record: T,
}

/// Query with multiple filters and options
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Query {
    /// All filters must match (AND)
    #[serde(default)]
    pub filters: Vec<Filter>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,

    #[serde(default)]
    pub sort_desc: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default)]
    pub skip: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, field: &str, desc: bool) -> Self {
        self.sort_by = Some(field.to_string());
        self.sort_desc = desc;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn matches(&self, id: &str, view: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(id, view))
    }

    /// Filter, sort, skip and limit rows. Without `sort_by`, input order is kept;
    /// sorting is stable, so ties also keep input order.
    pub fn execute<T>(&self, rows: Vec<QueryRow<T>>) -> Vec<T> {
        let mut results: Vec<QueryRow<T>> = rows
            .into_iter()
            .filter(|row| self.matches(&row.id, &row.view))
            .collect();

        if let Some(ref field) = self.sort_by {
            results.sort_by(|a, b| {
                let a_val = lookup(&a.view, field);
                let b_val = lookup(&b.view, field);

                // Rows missing the field sort last in either direction
                match (a_val, b_val) {
                    (Some(a), Some(b)) => {
                        let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
                        if self.sort_desc { ordering.reverse() } else { ordering }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            });
        }

        let results = results.into_iter().skip(self.skip).map(|row| row.record);
        match self.limit {
            Some(n) => results.take(n).collect(),
            None => results.collect(),
        }
    }
}
