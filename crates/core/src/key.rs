//! Row keys.
//!
//! Every row is addressed by a `RowKey`. Keys are numbers or strings. Integer
//! and float keys share one numeric order, string keys order lexically, and
//! numbers sort before strings so a mixed table still has one total order.

use crate::error::{Error, Result};
use crate::types::DataType;
use crate::value::Value;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};

/// Identifier of one row within a table, or of one value within an index.
///
/// `Float` only holds values that are not whole integers in `i64` range;
/// build float keys with [`RowKey::from_f64`] so `3.0` and `3` are one key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowKey {
    /// Integer key (auto-increment and `int` primary keys)
    Int(i64),
    /// Fractional numeric key (`float` primary keys and index values)
    Float(f64),
    /// String key (`uuid` and `string` primary keys)
    Str(String),
}

impl RowKey {
    /// Builds a numeric key, folding whole values into `Int`.
    ///
    /// Returns `None` for NaN and infinities.
    pub fn from_f64(f: f64) -> Option<RowKey> {
        if !f.is_finite() {
            return None;
        }
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            Some(RowKey::Int(f as i64))
        } else {
            Some(RowKey::Float(f))
        }
    }

    /// Returns the integer if this is an integer key.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RowKey::Int(i) => Some(*i),
            RowKey::Float(_) | RowKey::Str(_) => None,
        }
    }

    /// Returns the number if this is a numeric key.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RowKey::Int(i) => Some(*i as f64),
            RowKey::Float(f) => Some(*f),
            RowKey::Str(_) => None,
        }
    }

    /// Returns the string if this is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RowKey::Str(s) => Some(s.as_str()),
            RowKey::Int(_) | RowKey::Float(_) => None,
        }
    }

    /// Returns true for integer and float keys.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, RowKey::Str(_))
    }

    /// Converts this key so it matches the given key type.
    ///
    /// Numeric key types parse numeric strings. `string` and `uuid` key types
    /// render numbers as strings. Without a key type the key is untouched.
    pub fn coerce(self, key_type: Option<DataType>) -> Result<RowKey> {
        match (key_type, self) {
            (Some(dt), RowKey::Str(s)) if dt.is_numeric() => {
                let trimmed = s.trim();
                let parsed = match trimmed.parse::<i64>() {
                    Ok(i) => Some(RowKey::Int(i)),
                    Err(_) => trimmed.parse::<f64>().ok().and_then(RowKey::from_f64),
                };
                parsed.ok_or_else(|| Error::invalid_key(s, format!("expected a {} key", dt)))
            }
            (Some(DataType::String | DataType::Uuid), key @ (RowKey::Int(_) | RowKey::Float(_))) => {
                Ok(RowKey::Str(key.to_string()))
            }
            (_, key) => Ok(key),
        }
    }

    /// Builds a key from a cell value.
    ///
    /// Finite numbers and strings are keys. Other values are rejected.
    pub fn from_value(value: &Value) -> Result<RowKey> {
        match value {
            Value::Int(i) => Ok(RowKey::Int(*i)),
            Value::Float(f) => RowKey::from_f64(*f)
                .ok_or_else(|| Error::invalid_key(f.to_string(), "float keys must be finite")),
            Value::String(s) => Ok(RowKey::Str(s.clone())),
            other => Err(Error::invalid_key(
                format!("{:?}", other),
                "only numbers and strings can be used as keys",
            )),
        }
    }

    /// Returns the key as a cell value.
    pub fn to_value(&self) -> Value {
        self.clone().into()
    }

    fn rank(&self) -> u8 {
        match self {
            RowKey::Int(_) => 0,
            RowKey::Float(_) => 1,
            RowKey::Str(_) => 2,
        }
    }
}

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RowKey::Int(a), RowKey::Int(b)) => a.cmp(b),
            (RowKey::Float(a), RowKey::Float(b)) => a.total_cmp(b),
            // Ties only occur at the edge of the i64 range; Int goes first.
            (RowKey::Int(a), RowKey::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (RowKey::Float(a), RowKey::Int(b)) => {
                a.total_cmp(&(*b as f64)).then(Ordering::Greater)
            }
            (RowKey::Str(a), RowKey::Str(b)) => a.cmp(b),
            _ => self.is_numeric().cmp(&other.is_numeric()).reverse(),
        }
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RowKey {}

impl Hash for RowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            RowKey::Int(i) => i.hash(state),
            RowKey::Float(f) => f.to_bits().hash(state),
            RowKey::Str(s) => s.hash(state),
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Int(i) => write!(f, "{}", i),
            RowKey::Float(v) => write!(f, "{}", v),
            RowKey::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RowKey {
    fn from(v: i64) -> Self {
        RowKey::Int(v)
    }
}

impl From<i32> for RowKey {
    fn from(v: i32) -> Self {
        RowKey::Int(v as i64)
    }
}

impl From<String> for RowKey {
    fn from(v: String) -> Self {
        RowKey::Str(v)
    }
}

impl From<&str> for RowKey {
    fn from(v: &str) -> Self {
        RowKey::Str(v.to_string())
    }
}

impl From<RowKey> for Value {
    fn from(key: RowKey) -> Self {
        match key {
            RowKey::Int(i) => Value::Int(i),
            RowKey::Float(f) => Value::Float(f),
            RowKey::Str(s) => Value::String(s),
        }
    }
}
