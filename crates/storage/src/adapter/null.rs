//! Adapter that refuses every operation.

use super::{Adapter, IndexAdapter, IndexCallback, PkCallback, ReadRange, RowCallback};
use async_trait::async_trait;
use keel_core::schema::TableSchema;
use keel_core::{DataType, Error, Result, Row, RowKey, Value};

/// Placeholder backend. Every call fails with `Error::Unsupported`.
///
/// Useful as the inner adapter of an engine that must never touch storage,
/// and for checking that adapter errors surface unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAdapter;

impl NullAdapter {
    const NAME: &'static str = "null";

    fn refuse<T>(operation: &'static str) -> Result<T> {
        Err(Error::unsupported(Self::NAME, operation))
    }
}

#[async_trait]
impl Adapter for NullAdapter {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn connect(&mut self, _id: &str) -> Result<bool> {
        Self::refuse("connect")
    }

    async fn disconnect(&mut self) -> Result<()> {
        Self::refuse("disconnect")
    }

    async fn create_table(&mut self, _name: &str, _schema: &TableSchema) -> Result<()> {
        Self::refuse("create_table")
    }

    async fn drop_table(&mut self, _name: &str) -> Result<()> {
        Self::refuse("drop_table")
    }

    async fn disconnect_table(&mut self, _name: &str) -> Result<()> {
        Self::refuse("disconnect_table")
    }

    async fn write(&mut self, _table: &str, _key: &RowKey, _row: Option<&Row>) -> Result<RowKey> {
        Self::refuse("write")
    }

    async fn read(&self, _table: &str, _key: &RowKey) -> Result<Option<Row>> {
        Self::refuse("read")
    }

    async fn delete(&mut self, _table: &str, _key: &RowKey) -> Result<()> {
        Self::refuse("delete")
    }

    async fn read_multi(
        &self,
        _table: &str,
        _range: &ReadRange,
        _reverse: bool,
        _on_row: &mut RowCallback<'_>,
    ) -> Result<()> {
        Self::refuse("read_multi")
    }

    async fn get_table_index(&self, _table: &str) -> Result<Vec<RowKey>> {
        Self::refuse("get_table_index")
    }

    async fn get_table_index_length(&self, _table: &str) -> Result<usize> {
        Self::refuse("get_table_index_length")
    }

    async fn destroy(&mut self) -> Result<()> {
        Self::refuse("destroy")
    }
}

#[async_trait]
impl IndexAdapter for NullAdapter {
    async fn create_index(&mut self, _name: &str, _key_type: DataType) -> Result<()> {
        Self::refuse("create_index")
    }

    async fn delete_index(&mut self, _name: &str) -> Result<()> {
        Self::refuse("delete_index")
    }

    async fn add_index_value(&mut self, _name: &str, _pk: &RowKey, _value: &Value) -> Result<()> {
        Self::refuse("add_index_value")
    }

    async fn delete_index_value(&mut self, _name: &str, _pk: &RowKey, _value: &Value) -> Result<()> {
        Self::refuse("delete_index_value")
    }

    async fn read_index_key(
        &self,
        _name: &str,
        _value: &Value,
        _on_pk: &mut PkCallback<'_>,
    ) -> Result<()> {
        Self::refuse("read_index_key")
    }

    async fn read_index_keys(
        &self,
        _name: &str,
        _range: &ReadRange,
        _reverse: bool,
        _on_pk: &mut IndexCallback<'_>,
    ) -> Result<()> {
        Self::refuse("read_index_keys")
    }
}
