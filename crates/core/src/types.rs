//! Column type tags for Keel tables.
//!
//! Column models carry a loose type tag rather than a strict storage type. The
//! tag matters in two places: the primary key type decides how row keys are
//! minted and coerced, and an index key type decides numeric vs string ordering.

use crate::error::{Error, Result};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Type tag attached to a column model entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Signed integer
    Int,
    /// Floating point number
    Float,
    /// UUID string, minted by the store when no key is supplied
    Uuid,
    /// UTF-8 string
    String,
    /// Boolean
    Bool,
    /// Array of values
    Array,
    /// Nested map of values
    Map,
    /// Opaque value, stored as-is
    Blob,
    /// No type constraint
    Any,
}

impl DataType {
    /// Returns the tag used in column models.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Uuid => "uuid",
            DataType::String => "string",
            DataType::Bool => "bool",
            DataType::Array => "array",
            DataType::Map => "map",
            DataType::Blob => "blob",
            DataType::Any => "any",
        }
    }

    /// Returns whether keys of this type are ordered numerically.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Returns whether this type can be used as a row or index key.
    pub fn is_keyable(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Float | DataType::Uuid | DataType::String | DataType::Any
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "int" | "integer" => Ok(DataType::Int),
            "float" | "number" => Ok(DataType::Float),
            "uuid" => Ok(DataType::Uuid),
            "string" => Ok(DataType::String),
            "bool" | "boolean" => Ok(DataType::Bool),
            "array" => Ok(DataType::Array),
            "map" => Ok(DataType::Map),
            "blob" => Ok(DataType::Blob),
            "any" => Ok(DataType::Any),
            other => Err(Error::invalid_schema(format!("unknown type tag: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int);
        assert_eq!("number".parse::<DataType>().unwrap(), DataType::Float);
        assert_eq!("uuid".parse::<DataType>().unwrap(), DataType::Uuid);
        assert!("varchar".parse::<DataType>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for dt in [DataType::Int, DataType::String, DataType::Blob, DataType::Array] {
            assert_eq!(dt.to_string().parse::<DataType>().unwrap(), dt);
        }
    }

    #[test]
    fn test_numeric() {
        assert!(DataType::Int.is_numeric());
        assert!(DataType::Float.is_numeric());
        assert!(!DataType::Uuid.is_numeric());
        assert!(!DataType::String.is_numeric());
    }

    #[test]
    fn test_keyable() {
        assert!(DataType::Int.is_keyable());
        assert!(DataType::Uuid.is_keyable());
        assert!(!DataType::Array.is_keyable());
        assert!(!DataType::Blob.is_keyable());
    }
}
