//! Filter values and raw input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::query::FilterOperator;

/// Structured value of one active filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum FilterValue {
    Text(String),
    SingleSelect(String),
    MultiSelect(Vec<String>),
    /// Tri-state; `None` means "any".
    Boolean(Option<bool>),
    DateRange { from: String, to: String },
    NumberRange { min: String, max: String },
}

impl FilterValue {
    /// The operator this kind of value is matched with.
    pub fn operator(&self) -> FilterOperator {
        match self {
            FilterValue::Text(_) => FilterOperator::Contains,
            FilterValue::SingleSelect(_) | FilterValue::Boolean(_) => FilterOperator::Equals,
            FilterValue::MultiSelect(_) => FilterOperator::In,
            FilterValue::DateRange { .. } | FilterValue::NumberRange { .. } => {
                FilterOperator::Between
            }
        }
    }

    pub fn number_range(min: impl Into<String>, max: impl Into<String>) -> Self {
        FilterValue::NumberRange {
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn date_range(from: impl Into<String>, to: impl Into<String>) -> Self {
        FilterValue::DateRange {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Active filters keyed by field.
///
/// Kept sorted by field so queries and URLs come out the same for the same
/// state regardless of the order filters were applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FilterMap(BTreeMap<String, FilterValue>);

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Insert a value that has already been checked for emptiness.
    ///
    /// Only the registry-driven parsers call this; they never pass empty
    /// values, which keeps "no filter" structural.
    pub(crate) fn insert(&mut self, field: impl Into<String>, value: FilterValue) {
        self.0.insert(field.into(), value);
    }

    /// Remove a filter. Removing an absent field is a no-op.
    pub fn remove(&mut self, field: &str) -> Option<FilterValue> {
        self.0.remove(field)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

/// Raw input for one field, after type-specific preprocessing of form or URL
/// text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawInput {
    Missing,
    Text(String),
    List(Vec<String>),
    Range { low: String, high: String },
}

/// Submitted form data: ordered `(key, value)` pairs, repeated keys allowed
/// (multi-select widgets submit one pair per chosen option).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormPayload(Vec<(String, String)>);

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// First value submitted under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value submitted under `key`, in submission order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormPayload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
