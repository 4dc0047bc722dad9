//! Column model entries for Keel tables.

use crate::types::DataType;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A property flag on a column model entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnProp {
    /// Primary key.
    #[serde(rename = "pk")]
    PrimaryKey,
    /// Auto-increment.
    #[serde(rename = "ai")]
    AutoIncrement,
}

/// One entry of a declarative column model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnModel {
    /// Column name.
    pub key: String,
    /// Type tag.
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Property flags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub props: Vec<ColumnProp>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ColumnModel {
    /// Creates a column model entry with no flags and no default.
    pub fn new(key: impl Into<String>, data_type: DataType) -> Self {
        Self {
            key: key.into(),
            data_type,
            props: Vec::new(),
            default: None,
        }
    }

    /// Flags this column as the primary key.
    pub fn primary_key(mut self) -> Self {
        if !self.props.contains(&ColumnProp::PrimaryKey) {
            self.props.push(ColumnProp::PrimaryKey);
        }
        self
    }

    /// Flags this column as auto-increment.
    pub fn auto_increment(mut self) -> Self {
        if !self.props.contains(&ColumnProp::AutoIncrement) {
            self.props.push(ColumnProp::AutoIncrement);
        }
        self
    }

    /// Sets the default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns a copy with every property flag removed.
    pub fn without_props(&self) -> Self {
        Self {
            props: Vec::new(),
            ..self.clone()
        }
    }

    /// Returns whether this column carries the primary key flag.
    #[inline]
    pub fn is_primary_key(&self) -> bool {
        self.props.contains(&ColumnProp::PrimaryKey)
    }

    /// Returns whether this column carries the auto-increment flag.
    #[inline]
    pub fn is_auto_increment(&self) -> bool {
        self.props.contains(&ColumnProp::AutoIncrement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_builder() {
        let col = ColumnModel::new("id", DataType::Int)
            .primary_key()
            .auto_increment()
            .primary_key();
        assert!(col.is_primary_key());
        assert!(col.is_auto_increment());
        assert_eq!(col.props.len(), 2);
    }

    #[test]
    fn test_without_props() {
        let col = ColumnModel::new("id", DataType::Int)
            .primary_key()
            .default_value(0i64);
        let stripped = col.without_props();
        assert!(!stripped.is_primary_key());
        assert_eq!(stripped.default, Some(Value::Int(0)));
        assert_eq!(stripped.key, "id");
    }

    #[test]
    fn test_deserialize_model_entry() {
        let col: ColumnModel =
            serde_json::from_str(r#"{"key":"id","type":"int","props":["pk","ai"]}"#).unwrap();
        assert_eq!(col.data_type, DataType::Int);
        assert!(col.is_primary_key());
        assert!(col.is_auto_increment());

        let col: ColumnModel =
            serde_json::from_str(r#"{"key":"name","type":"string","default":"none"}"#).unwrap();
        assert!(col.props.is_empty());
        assert_eq!(col.default, Some(Value::from("none")));
    }
}
