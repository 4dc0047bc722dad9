//! Keel Core - Core types and schema definitions for the Keel storage core.
//!
//! This crate provides the foundational types shared by the index engine and
//! the row store:
//!
//! - `Value`: Dynamic cell values (null, bool, int, float, string, array, map)
//! - `Row`: Row content, an ordered map of column name to value
//! - `RowKey`: Numeric or string row identifier
//! - `DataType`: Column type tags
//! - `schema`: Column models and the table schema derived from them
//! - `Error`: Error types for storage operations
//!
//! # Example
//!
//! ```rust
//! use keel_core::schema::{ColumnModel, TableKind, TableSchema};
//! use keel_core::{DataType, Row, RowKey, Value};
//!
//! let schema = TableSchema::derive(
//!     "users",
//!     TableKind::User,
//!     vec![
//!         ColumnModel::new("id", DataType::Int).primary_key().auto_increment(),
//!         ColumnModel::new("name", DataType::String),
//!     ],
//! );
//! assert_eq!(schema.pk(), Some("id"));
//!
//! let row = Row::new().with("id", 1i64).with("name", "Alice");
//! assert_eq!(row.get("name"), Some(&Value::from("Alice")));
//!
//! let key = RowKey::from("7").coerce(schema.pk_type()).unwrap();
//! assert_eq!(key, RowKey::Int(7));
//! ```

mod error;
mod key;
mod row;
pub mod schema;
mod types;
mod value;

pub use error::{Error, Result};
pub use key::RowKey;
pub use row::Row;
pub use types::DataType;
pub use value::Value;
