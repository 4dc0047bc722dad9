//! Table schema derived from a column model.

use super::column::ColumnModel;
use crate::types::DataType;
use crate::value::Value;

/// Name of the store-wide key/value settings table.
pub const UTILITY_TABLE: &str = "_utility";

/// Name of the store-wide history point table.
pub const HISTORY_POINTS_TABLE: &str = "_historyPoints";

/// Returns the name of the history data table shadowing `table`.
pub fn history_data_name(table: &str) -> String {
    format!("_{}_hist__data", table)
}

/// Returns the name of the history meta table shadowing `table`.
pub fn history_meta_name(table: &str) -> String {
    format!("_{}_hist__meta", table)
}

/// Stable 32-bit hash of a table name.
///
/// Persisted history points refer to tables by this value, so the function
/// must never change.
pub fn table_hash(name: &str) -> i32 {
    name.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// What a table is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableKind {
    /// Declared by the user.
    User,
    /// One version snapshot per historical write of a user table.
    HistoryData,
    /// Per-row pointers into the history data table.
    HistoryMeta,
    /// Store-wide settings.
    Utility,
    /// Store-wide history point log.
    HistoryPoints,
    /// Postings rows of one secondary index.
    Index,
}

impl TableKind {
    /// Returns whether this table belongs to the per-table history pair.
    pub fn is_history(&self) -> bool {
        matches!(self, TableKind::HistoryData | TableKind::HistoryMeta)
    }
}

/// A table definition derived from its column model.
#[derive(Clone, Debug)]
pub struct TableSchema {
    /// Table name.
    name: String,
    /// Stable hash of the name.
    hash: i32,
    /// What the table is for.
    kind: TableKind,
    /// Primary key column, if the model declares one.
    pk: Option<String>,
    /// Type tag of the primary key column.
    pk_type: Option<DataType>,
    /// Column names in declaration order.
    keys: Vec<String>,
    /// Column defaults, parallel to `keys`.
    defaults: Vec<Option<Value>>,
    /// The model this schema was derived from.
    columns: Vec<ColumnModel>,
}

impl TableSchema {
    /// Derives a schema from a column model.
    ///
    /// The model is scanned back to front and every primary key flag overwrites
    /// the previous match, so the first declared primary key wins. A model
    /// without one yields a schema without a primary key; callers decide
    /// whether that is acceptable.
    pub fn derive(name: impl Into<String>, kind: TableKind, columns: Vec<ColumnModel>) -> Self {
        let name = name.into();
        let mut pk = None;
        let mut pk_type = None;
        for col in columns.iter().rev() {
            if col.is_primary_key() {
                pk = Some(col.key.clone());
                pk_type = Some(col.data_type);
            }
        }

        Self {
            hash: table_hash(&name),
            keys: columns.iter().map(|c| c.key.clone()).collect(),
            defaults: columns.iter().map(|c| c.default.clone()).collect(),
            name,
            kind,
            pk,
            pk_type,
            columns,
        }
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stable name hash.
    #[inline]
    pub fn hash(&self) -> i32 {
        self.hash
    }

    /// Returns what the table is for.
    #[inline]
    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Returns the primary key column name.
    #[inline]
    pub fn pk(&self) -> Option<&str> {
        self.pk.as_deref()
    }

    /// Returns the primary key type tag.
    #[inline]
    pub fn pk_type(&self) -> Option<DataType> {
        self.pk_type
    }

    /// Returns the column names in declaration order.
    #[inline]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns the column defaults, parallel to `keys`.
    #[inline]
    pub fn defaults(&self) -> &[Option<Value>] {
        &self.defaults
    }

    /// Returns the column model.
    #[inline]
    pub fn columns(&self) -> &[ColumnModel] {
        &self.columns
    }

    /// Returns the default value of a column.
    pub fn default_of(&self, column: &str) -> Option<&Value> {
        self.keys
            .iter()
            .position(|k| k == column)
            .and_then(|i| self.defaults[i].as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_model() -> Vec<ColumnModel> {
        vec![
            ColumnModel::new("id", DataType::Int).primary_key().auto_increment(),
            ColumnModel::new("name", DataType::String).default_value("anon"),
            ColumnModel::new("age", DataType::Int),
        ]
    }

    #[test]
    fn test_derive_primary_key() {
        let schema = TableSchema::derive("users", TableKind::User, users_model());
        assert_eq!(schema.pk(), Some("id"));
        assert_eq!(schema.pk_type(), Some(DataType::Int));
        assert_eq!(schema.keys(), &["id", "name", "age"]);
        assert_eq!(schema.defaults()[1], Some(Value::from("anon")));
        assert_eq!(schema.default_of("name"), Some(&Value::from("anon")));
        assert_eq!(schema.default_of("age"), None);
    }

    #[test]
    fn test_first_declared_pk_wins() {
        let schema = TableSchema::derive(
            "t",
            TableKind::User,
            vec![
                ColumnModel::new("a", DataType::Uuid).primary_key(),
                ColumnModel::new("b", DataType::Int).primary_key(),
            ],
        );
        assert_eq!(schema.pk(), Some("a"));
        assert_eq!(schema.pk_type(), Some(DataType::Uuid));
    }

    #[test]
    fn test_model_without_pk() {
        let schema = TableSchema::derive(
            "t",
            TableKind::HistoryData,
            vec![ColumnModel::new("a", DataType::String)],
        );
        assert_eq!(schema.pk(), None);
        assert_eq!(schema.pk_type(), None);
    }

    #[test]
    fn test_table_hash_is_stable() {
        // Same recurrence as Java's String.hashCode.
        assert_eq!(table_hash(""), 0);
        assert_eq!(table_hash("a"), 97);
        assert_eq!(table_hash("users"), 111578632);
        assert_eq!(table_hash("users"), table_hash("users"));
        assert_ne!(table_hash("users"), table_hash("orders"));
    }

    #[test]
    fn test_history_names() {
        assert_eq!(history_data_name("users"), "_users_hist__data");
        assert_eq!(history_meta_name("users"), "_users_hist__meta");
        assert!(TableKind::HistoryData.is_history());
        assert!(!TableKind::HistoryPoints.is_history());
        assert!(!TableKind::Index.is_history());
    }
}
