//! Pure in-memory adapter.

use super::{scan, Adapter, MemTable, ReadRange, RowCallback};
use async_trait::async_trait;
use hashbrown::HashMap;
use keel_core::schema::TableSchema;
use keel_core::{Error, Result, Row, RowKey};
use tracing::debug;

/// Adapter that keeps every table in process memory.
///
/// Nothing survives the process, so `connect` always reports a new store.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    tables: HashMap<String, MemTable>,
}

impl MemoryAdapter {
    /// Creates an adapter with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables.get(name).ok_or_else(|| Error::table_not_found(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| Error::table_not_found(name))
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&mut self, id: &str) -> Result<bool> {
        debug!(store = id, "memory adapter connected");
        Ok(false)
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn create_table(&mut self, name: &str, _schema: &TableSchema) -> Result<()> {
        self.tables.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables.remove(name);
        Ok(())
    }

    async fn disconnect_table(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn write(&mut self, table: &str, key: &RowKey, row: Option<&Row>) -> Result<RowKey> {
        self.table_mut(table)?.insert(key.clone(), row.cloned());
        Ok(key.clone())
    }

    async fn read(&self, table: &str, key: &RowKey) -> Result<Option<Row>> {
        Ok(self.table(table)?.get(key).cloned().flatten())
    }

    async fn delete(&mut self, table: &str, key: &RowKey) -> Result<()> {
        self.table_mut(table)?.remove(key);
        Ok(())
    }

    async fn read_multi(
        &self,
        table: &str,
        range: &ReadRange,
        reverse: bool,
        on_row: &mut RowCallback<'_>,
    ) -> Result<()> {
        scan(self.table(table)?, range, reverse, on_row);
        Ok(())
    }

    async fn get_table_index(&self, table: &str) -> Result<Vec<RowKey>> {
        Ok(self.table(table)?.keys().cloned().collect())
    }

    async fn get_table_index_length(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.len())
    }

    async fn destroy(&mut self) -> Result<()> {
        self.tables.clear();
        Ok(())
    }
}
