//! Schema module for Keel.
//!
//! Column models are declarative; `TableSchema` is what the registry derives
//! from them (primary key, column order, defaults).

mod column;
mod table;

pub use column::{ColumnModel, ColumnProp};
pub use table::{
    history_data_name, history_meta_name, table_hash, TableKind, TableSchema,
    HISTORY_POINTS_TABLE, UTILITY_TABLE,
};
