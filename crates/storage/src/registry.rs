//! Table registry.
//!
//! The registry owns every table's runtime state: the derived schema, the
//! auto-increment counter, the ordered key index (`_index`) and, when the store
//! keeps rows in memory, the row mirror. Tables are addressed by `TableId`
//! handles into an arena; a dropped table leaves its slot vacant so stale
//! handles never alias a newer table.

use hashbrown::{HashMap, HashSet};
use keel_core::schema::{
    history_data_name, history_meta_name, ColumnModel, TableKind, TableSchema,
    HISTORY_POINTS_TABLE, UTILITY_TABLE,
};
use keel_core::{DataType, Row, RowKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Handle of a table inside one registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableId(usize);

/// A declared table: name plus column model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableModel {
    pub name: String,
    pub columns: Vec<ColumnModel>,
}

impl TableModel {
    /// Creates a table model.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnModel>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

/// Slot of the row mirror. `None` is a tombstone.
pub type RowSlot = Option<Arc<Row>>;

/// Runtime state of one table.
#[derive(Debug)]
pub struct TableState {
    schema: TableSchema,
    increment: i64,
    index: Vec<RowKey>,
    index_set: HashSet<RowKey>,
    rows: Option<HashMap<RowKey, RowSlot>>,
    query_cache: HashMap<String, Vec<Arc<Row>>>,
}

impl TableState {
    fn new(schema: TableSchema, memory: bool) -> Self {
        Self {
            schema,
            increment: 1,
            index: Vec::new(),
            index_set: HashSet::new(),
            rows: if memory { Some(HashMap::new()) } else { None },
            query_cache: HashMap::new(),
        }
    }

    /// Returns the table schema.
    #[inline]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Returns the table name.
    #[inline]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Returns what the table is for.
    #[inline]
    pub fn kind(&self) -> TableKind {
        self.schema.kind()
    }

    /// Returns the next auto-increment value without consuming it.
    #[inline]
    pub fn increment(&self) -> i64 {
        self.increment
    }

    /// Returns the existing keys in insertion order.
    #[inline]
    pub fn index(&self) -> &[RowKey] {
        &self.index
    }

    /// Returns whether `key` is in the key index.
    pub fn contains(&self, key: &RowKey) -> bool {
        self.index_set.contains(key)
    }

    /// Returns whether rows are mirrored in memory.
    #[inline]
    pub fn is_memory_resident(&self) -> bool {
        self.rows.is_some()
    }

    /// Consumes and returns the next counter value.
    pub fn take_increment(&mut self) -> i64 {
        let next = self.increment;
        self.increment += 1;
        next
    }

    /// Key for a row of a table with no primary key: one past the last indexed integer.
    pub fn next_unkeyed(&self) -> RowKey {
        let last = self.index.last().and_then(RowKey::as_int).unwrap_or(0);
        RowKey::Int(last + 1)
    }

    /// Advances the counter past an explicitly supplied integer key.
    pub fn observe_key(&mut self, key: &RowKey) {
        if let Some(i) = key.as_int() {
            if i >= self.increment {
                self.increment = i + 1;
            }
        }
    }

    /// Appends `key` to the index. Returns false if it was already there.
    pub fn push_key(&mut self, key: RowKey) -> bool {
        if !self.index_set.insert(key.clone()) {
            return false;
        }
        self.index.push(key);
        true
    }

    /// Removes `key` from the index. Returns false if it was absent.
    pub fn remove_key(&mut self, key: &RowKey) -> bool {
        if !self.index_set.remove(key) {
            return false;
        }
        if let Some(pos) = self.index.iter().position(|k| k == key) {
            self.index.remove(pos);
        }
        true
    }

    /// Replaces the index wholesale and resets the counter from it.
    pub fn set_index(&mut self, keys: Vec<RowKey>) {
        self.index.clear();
        self.index_set.clear();
        for key in keys {
            self.push_key(key);
        }
        self.reset_increment();
    }

    /// Sets the counter to one past the largest integer key.
    pub fn reset_increment(&mut self) {
        let max = self.index.iter().filter_map(RowKey::as_int).max().unwrap_or(0);
        self.increment = max + 1;
    }

    /// Stores a row slot in the mirror. No-op when rows are not mirrored.
    pub fn put_row(&mut self, key: RowKey, slot: RowSlot) {
        if let Some(rows) = self.rows.as_mut() {
            rows.insert(key, slot);
        }
    }

    /// Removes a row from the mirror.
    pub fn remove_row(&mut self, key: &RowKey) {
        if let Some(rows) = self.rows.as_mut() {
            rows.remove(key);
        }
    }

    /// Looks a key up in the mirror. `None` when rows are not mirrored.
    pub fn row(&self, key: &RowKey) -> Option<&RowSlot> {
        self.rows.as_ref().and_then(|rows| rows.get(key))
    }

    /// Live mirrored rows in index order.
    pub fn live_rows(&self) -> impl Iterator<Item = &Arc<Row>> + '_ {
        self.index
            .iter()
            .filter_map(move |key| self.rows.as_ref()?.get(key)?.as_ref())
    }

    /// Caches the rows of a query result under `key`.
    pub fn cache_query(&mut self, key: impl Into<String>, rows: Vec<Arc<Row>>) {
        self.query_cache.insert(key.into(), rows);
    }

    /// Returns a cached query result.
    pub fn cached_query(&self, key: &str) -> Option<&[Arc<Row>]> {
        self.query_cache.get(key).map(Vec::as_slice)
    }

    /// Drops every cached query result.
    pub fn clear_query_cache(&mut self) {
        self.query_cache.clear();
    }
}

/// Arena of table states with a name lookup.
#[derive(Debug, Default)]
pub struct TableRegistry {
    tables: Vec<Option<TableState>>,
    by_name: HashMap<String, TableId>,
}

impl TableRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry for a set of declared tables.
    ///
    /// Order: declared tables, then the history pair of each declared table,
    /// then `_utility`, then `_historyPoints`.
    pub fn from_models(models: &[TableModel], memory: bool) -> Self {
        let mut registry = Self::new();
        for model in models {
            registry.define_table(
                TableSchema::derive(model.name.clone(), TableKind::User, model.columns.clone()),
                memory,
            );
        }
        for model in models {
            let [data, meta] = history_schemas(model);
            registry.define_table(data, memory);
            registry.define_table(meta, memory);
        }
        registry.define_table(utility_schema(), memory);
        registry.define_table(history_points_schema(), memory);
        registry
    }

    /// Registers a table and returns its handle.
    ///
    /// Redefining a name replaces the old table; the old handle goes stale.
    pub fn define_table(&mut self, schema: TableSchema, memory: bool) -> TableId {
        if let Some(old) = self.by_name.get(schema.name()).copied() {
            self.tables[old.0] = None;
        }
        let id = TableId(self.tables.len());
        self.by_name.insert(schema.name().to_string(), id);
        self.tables.push(Some(TableState::new(schema, memory)));
        id
    }

    /// Looks up a table by name.
    pub fn id_of(&self, name: &str) -> Option<TableId> {
        self.by_name.get(name).copied()
    }

    /// Returns a table's state.
    pub fn get(&self, id: TableId) -> Option<&TableState> {
        self.tables.get(id.0).and_then(Option::as_ref)
    }

    /// Returns a table's state mutably.
    pub fn get_mut(&mut self, id: TableId) -> Option<&mut TableState> {
        self.tables.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Removes a table. Its handle stays vacant.
    pub fn drop_table(&mut self, id: TableId) -> Option<TableState> {
        let state = self.tables.get_mut(id.0)?.take()?;
        self.by_name.remove(state.name());
        Some(state)
    }

    /// Iterates live tables in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (TableId, &TableState)> + '_ {
        self.tables
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (TableId(i), t)))
    }

    /// Handles of live tables in registry order.
    pub fn ids(&self) -> Vec<TableId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Returns the number of live tables.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if no table is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// History data and meta schemas shadowing `model`.
pub fn history_schemas(model: &TableModel) -> [TableSchema; 2] {
    let data = TableSchema::derive(
        history_data_name(&model.name),
        TableKind::HistoryData,
        model.columns.iter().map(ColumnModel::without_props).collect(),
    );
    let meta = TableSchema::derive(
        history_meta_name(&model.name),
        TableKind::HistoryMeta,
        vec![
            ColumnModel::new("id", DataType::Int).primary_key().auto_increment(),
            ColumnModel::new("_pointer", DataType::Int),
            ColumnModel::new("_historyDataRowIDs", DataType::Array),
        ],
    );
    [data, meta]
}

fn utility_schema() -> TableSchema {
    TableSchema::derive(
        UTILITY_TABLE,
        TableKind::Utility,
        vec![
            ColumnModel::new("key", DataType::String).primary_key(),
            ColumnModel::new("value", DataType::Blob),
        ],
    )
}

fn history_points_schema() -> TableSchema {
    TableSchema::derive(
        HISTORY_POINTS_TABLE,
        TableKind::HistoryPoints,
        vec![
            ColumnModel::new("id", DataType::Int).primary_key().auto_increment(),
            ColumnModel::new("tableID", DataType::Int),
            ColumnModel::new("historyPoint", DataType::Int),
            ColumnModel::new("rowKeys", DataType::Array),
            ColumnModel::new("type", DataType::String),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> Vec<TableModel> {
        vec![
            TableModel::new(
                "users",
                vec![
                    ColumnModel::new("id", DataType::Int).primary_key().auto_increment(),
                    ColumnModel::new("name", DataType::String),
                ],
            ),
            TableModel::new("posts", vec![ColumnModel::new("id", DataType::Uuid).primary_key()]),
        ]
    }

    #[test]
    fn test_registry_order() {
        let registry = TableRegistry::from_models(&models(), true);
        let names: Vec<&str> = registry.iter().map(|(_, t)| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "users",
                "posts",
                "_users_hist__data",
                "_users_hist__meta",
                "_posts_hist__data",
                "_posts_hist__meta",
                "_utility",
                "_historyPoints",
            ]
        );
    }

    #[test]
    fn test_history_data_has_no_pk() {
        let registry = TableRegistry::from_models(&models(), true);
        let id = registry.id_of("_users_hist__data").unwrap();
        let table = registry.get(id).unwrap();
        assert_eq!(table.schema().pk(), None);
        assert_eq!(table.schema().keys(), &["id", "name"]);
        assert_eq!(table.kind(), TableKind::HistoryData);

        let meta = registry.get(registry.id_of("_users_hist__meta").unwrap()).unwrap();
        assert_eq!(meta.schema().pk(), Some("id"));
    }

    #[test]
    fn test_new_table_state() {
        let registry = TableRegistry::from_models(&models(), false);
        let table = registry.get(registry.id_of("users").unwrap()).unwrap();
        assert_eq!(table.increment(), 1);
        assert!(table.index().is_empty());
        assert!(!table.is_memory_resident());
    }

    #[test]
    fn test_index_has_no_duplicates() {
        let mut registry = TableRegistry::from_models(&models(), true);
        let id = registry.id_of("users").unwrap();
        let table = registry.get_mut(id).unwrap();
        assert!(table.push_key(RowKey::Int(1)));
        assert!(!table.push_key(RowKey::Int(1)));
        assert!(table.push_key(RowKey::Int(2)));
        assert_eq!(table.index().len(), 2);

        assert!(table.remove_key(&RowKey::Int(1)));
        assert!(!table.remove_key(&RowKey::Int(1)));
        assert_eq!(table.index(), &[RowKey::Int(2)]);
    }

    #[test]
    fn test_counter_tracking() {
        let mut registry = TableRegistry::from_models(&models(), true);
        let table = registry.get_mut(registry.id_of("users").unwrap()).unwrap();
        assert_eq!(table.take_increment(), 1);
        table.observe_key(&RowKey::Int(10));
        assert_eq!(table.take_increment(), 11);
        table.observe_key(&RowKey::Int(3));
        assert_eq!(table.increment(), 12);

        table.set_index(vec![RowKey::Int(0), RowKey::Int(41), RowKey::from("x")]);
        assert_eq!(table.increment(), 42);
        assert_eq!(table.next_unkeyed(), RowKey::Int(1));
    }

    #[test]
    fn test_drop_leaves_vacant_slot() {
        let mut registry = TableRegistry::from_models(&models(), true);
        let users = registry.id_of("users").unwrap();
        assert!(registry.drop_table(users).is_some());
        assert!(registry.get(users).is_none());
        assert!(registry.id_of("users").is_none());
        assert_eq!(registry.len(), 7);

        let again = registry.define_table(
            TableSchema::derive("users", TableKind::User, Vec::new()),
            true,
        );
        assert_ne!(again, users);
    }

    #[test]
    fn test_mirror_and_query_cache() {
        let mut registry = TableRegistry::from_models(&models(), true);
        let table = registry.get_mut(registry.id_of("users").unwrap()).unwrap();
        let row = Arc::new(Row::new().with("id", 1i64));
        table.push_key(RowKey::Int(1));
        table.put_row(RowKey::Int(1), Some(row.clone()));
        table.push_key(RowKey::Int(0));
        table.put_row(RowKey::Int(0), None);
        assert_eq!(table.live_rows().count(), 1);

        table.cache_query("all", vec![row]);
        assert_eq!(table.cached_query("all").map(<[_]>::len), Some(1));
        table.clear_query_cache();
        assert!(table.cached_query("all").is_none());
    }
}
