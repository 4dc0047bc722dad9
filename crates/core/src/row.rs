//! Row structure for Keel.
//!
//! This module defines the `Row` struct which represents the content of a single
//! row: an ordered map from column name to value.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// A row in a table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    /// Values keyed by column name.
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column and returns the row, for building rows inline.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    /// Gets the value of a column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Sets a column, returning the previous value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.columns.insert(column.into(), value.into())
    }

    /// Removes a column.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.remove(column)
    }

    /// Returns true if the column is present and not null.
    pub fn has_value(&self, column: &str) -> bool {
        self.columns.get(column).map_or(false, |v| !v.is_null())
    }

    /// Iterates columns in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.columns.iter()
    }

    /// Returns the number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if this row has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl From<BTreeMap<String, Value>> for Row {
    fn from(columns: BTreeMap<String, Value>) -> Self {
        Self { columns }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_builder() {
        let row = Row::new().with("id", 1i64).with("name", "Alice");
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("name").and_then(|v| v.as_str()), Some("Alice"));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_row_set_and_remove() {
        let mut row = Row::new();
        assert_eq!(row.set("age", 30i64), None);
        assert_eq!(row.set("age", 31i64), Some(Value::Int(30)));
        assert_eq!(row.remove("age"), Some(Value::Int(31)));
        assert!(row.is_empty());
    }

    #[test]
    fn test_has_value_ignores_null() {
        let row = Row::new().with("a", Value::Null).with("b", 0i64);
        assert!(!row.has_value("a"));
        assert!(row.has_value("b"));
        assert!(!row.has_value("c"));
    }

    #[test]
    fn test_row_serializes_as_object() {
        let row: Row = [("id", Value::Int(1)), ("ok", Value::Bool(true))]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":1,"ok":true}"#);
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
