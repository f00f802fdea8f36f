use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::ReviewDocument;
use crate::error::Result;
use crate::storage::{Storage, MASTER_TABLE};

/// Closed set of filter operators, evaluated by one dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equals,
    GreaterOrEqual,
    LessOrEqual,
    InSet,
}

/// A single field/operator/value triple. Multiple conditions are conjunctive.
#[derive(Debug, Clone)]
pub struct FilterCondition {
    pub field: String,
    pub comparator: Comparator,
    pub value: Value,
}

impl FilterCondition {
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            comparator: Comparator::Equals,
            value,
        }
    }

    pub fn gte(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            comparator: Comparator::GreaterOrEqual,
            value,
        }
    }

    pub fn lte(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            comparator: Comparator::LessOrEqual,
            value,
        }
    }

    /// Matches documents whose field value is one of the given values.
    pub fn in_set(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            comparator: Comparator::InSet,
            value: Value::Array(values),
        }
    }

    /// Evaluates this condition against a document. Documents without the
    /// field never match.
    pub fn matches(&self, document: &ReviewDocument) -> bool {
        let Some(actual) = document.field(&self.field) else {
            return false;
        };
        match self.comparator {
            Comparator::Equals => values_equal(&actual, &self.value),
            Comparator::GreaterOrEqual => compare(&actual, &self.value)
                .map(|ordering| ordering.is_ge())
                .unwrap_or(false),
            Comparator::LessOrEqual => compare(&actual, &self.value)
                .map(|ordering| ordering.is_le())
                .unwrap_or(false),
            Comparator::InSet => self
                .value
                .as_array()
                .map(|set| set.iter().any(|candidate| values_equal(&actual, candidate)))
                .unwrap_or(false),
        }
    }
}

/// Numeric-aware equality: `5` equals `5.0`; everything else is strict JSON
/// equality.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

/// Ordering for comparable values: numeric when both sides are numbers,
/// lexicographic for strings. Mixed or non-comparable types yield `None`.
fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l.partial_cmp(&r);
    }
    if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
        return Some(l.cmp(r));
    }
    None
}

/// Aggregation function applied per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Average,
    Count,
}

/// Per-group aggregate result. A group with no usable numeric values is
/// reported as `NoData` rather than zero or NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue {
    Value(f64),
    Count(u64),
    NoData,
}

impl Serialize for AggregateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AggregateValue::Value(v) => serializer.serialize_f64(*v),
            AggregateValue::Count(n) => serializer.serialize_u64(*n),
            AggregateValue::NoData => serializer.serialize_str("no_data"),
        }
    }
}

/// Read-only filter and aggregate queries over the document store.
pub struct QueryEngine {
    storage: Arc<dyn Storage>,
}

impl QueryEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Conjunctive filter query; results keep the table's insertion order.
    pub async fn filter(
        &self,
        table: &str,
        conditions: &[FilterCondition],
    ) -> Result<Vec<ReviewDocument>> {
        self.storage.query(table, conditions).await
    }

    /// Groups a table by `group_field` and aggregates `target_field` per
    /// group. `Count` counts documents carrying the target field; `Average`
    /// averages its numeric values and reports `NoData` for groups without
    /// any.
    pub async fn aggregate(
        &self,
        table: &str,
        group_field: &str,
        function: AggregateFn,
        target_field: &str,
    ) -> Result<BTreeMap<String, AggregateValue>> {
        let documents = self.storage.get_all(table).await?;

        let mut groups: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for document in &documents {
            let Some(group_value) = document.field(group_field) else {
                continue;
            };
            let target = document.field(target_field).map(|v| v.as_f64());
            if let Some(target) = target {
                groups
                    .entry(group_key(&group_value))
                    .or_default()
                    .push(target);
            } else {
                // Group membership counts even when the target is absent
                groups.entry(group_key(&group_value)).or_default();
            }
        }

        let mut results = BTreeMap::new();
        for (key, values) in groups {
            let aggregate = match function {
                AggregateFn::Count => AggregateValue::Count(values.len() as u64),
                AggregateFn::Average => {
                    let numeric: Vec<f64> = values.into_iter().flatten().collect();
                    if numeric.is_empty() {
                        AggregateValue::NoData
                    } else {
                        AggregateValue::Value(numeric.iter().sum::<f64>() / numeric.len() as f64)
                    }
                }
            };
            results.insert(key, aggregate);
        }
        Ok(results)
    }

    /// Reviews at or above a rating threshold, master table by default.
    pub async fn high_rating_reviews(
        &self,
        table: Option<&str>,
        min_rating: f64,
    ) -> Result<Vec<ReviewDocument>> {
        self.filter(
            table.unwrap_or(MASTER_TABLE),
            &[FilterCondition::gte("rating", Value::from(min_rating))],
        )
        .await
    }

    /// Mean rating per source category over the master table.
    pub async fn average_rating_by_category(&self) -> Result<BTreeMap<String, AggregateValue>> {
        self.aggregate(MASTER_TABLE, "category", AggregateFn::Average, "rating")
            .await
    }
}

/// Stable string key for a grouping value.
fn group_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
