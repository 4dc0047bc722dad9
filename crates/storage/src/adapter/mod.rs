//! Backend adapters.
//!
//! An adapter is a key/row store addressed by table name. The row store and the
//! index engine talk to persistence only through the `Adapter` and
//! `IndexAdapter` traits, so a backend is chosen once at boot and never
//! switched on inside a storage method.
//!
//! A row slot holds either a row or a tombstone (`None`). Tombstones count as
//! existing keys for `get_table_index` but are never passed to `read_multi`
//! callbacks.

mod log;
mod memory;
mod null;
mod snapshot;

pub use log::LogAdapter;
pub use memory::MemoryAdapter;
pub use null::NullAdapter;
pub use snapshot::SnapshotAdapter;

use async_trait::async_trait;
use keel_core::schema::TableSchema;
use keel_core::{DataType, Result, Row, RowKey, Value};
use std::collections::BTreeMap;

/// Rows of one table as the in-process adapters keep them.
pub(crate) type MemTable = BTreeMap<RowKey, Option<Row>>;

/// Callback receiving each live row of a multi-row read.
pub type RowCallback<'a> = dyn FnMut(&RowKey, &Row) + Send + 'a;

/// Callback receiving each primary key of a postings list.
pub type PkCallback<'a> = dyn FnMut(&RowKey) + Send + 'a;

/// Callback receiving each primary key of a ranged index read, with the
/// indexed value it was found under.
pub type IndexCallback<'a> = dyn FnMut(&RowKey, &RowKey) + Send + 'a;

/// Which rows a multi-row read visits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadRange {
    /// Every row.
    All,
    /// Rows whose key lies in `low..=high`.
    Range { low: RowKey, high: RowKey },
    /// `limit` rows starting after the first `offset` rows, counted in read order.
    Offset { offset: usize, limit: usize },
}

/// Implementation-agnostic key/row store.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Opens the store `id`. Returns true if it already held data.
    async fn connect(&mut self, id: &str) -> Result<bool>;

    /// Releases every open table.
    async fn disconnect(&mut self) -> Result<()>;

    /// Creates a table, or opens it if it already exists.
    async fn create_table(&mut self, name: &str, schema: &TableSchema) -> Result<()>;

    /// Removes a table and its rows.
    async fn drop_table(&mut self, name: &str) -> Result<()>;

    /// Releases a table without removing its rows.
    async fn disconnect_table(&mut self, name: &str) -> Result<()>;

    /// Writes a row, or a tombstone when `row` is `None`. Returns the key written.
    async fn write(&mut self, table: &str, key: &RowKey, row: Option<&Row>) -> Result<RowKey>;

    /// Reads one row. Missing keys and tombstones both read as `None`.
    async fn read(&self, table: &str, key: &RowKey) -> Result<Option<Row>>;

    /// Removes one row. Removing a missing key succeeds.
    async fn delete(&mut self, table: &str, key: &RowKey) -> Result<()>;

    /// Streams live rows in key order (descending when `reverse`).
    async fn read_multi(
        &self,
        table: &str,
        range: &ReadRange,
        reverse: bool,
        on_row: &mut RowCallback<'_>,
    ) -> Result<()>;

    /// Returns every stored key, tombstones included, in key order.
    async fn get_table_index(&self, table: &str) -> Result<Vec<RowKey>>;

    /// Returns the number of stored keys, tombstones included.
    async fn get_table_index_length(&self, table: &str) -> Result<usize>;

    /// Removes all underlying storage. The adapter can be connected again afterwards.
    async fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

/// An adapter that also maintains secondary indexes.
#[async_trait]
pub trait IndexAdapter: Adapter {
    /// Creates an index whose values are keys of `key_type`.
    async fn create_index(&mut self, name: &str, key_type: DataType) -> Result<()>;

    /// Forgets an index and drops its backing table.
    async fn delete_index(&mut self, name: &str) -> Result<()>;

    /// Adds `pk` to the postings list of `value`.
    async fn add_index_value(&mut self, name: &str, pk: &RowKey, value: &Value) -> Result<()>;

    /// Removes `pk` from the postings list of `value`.
    async fn delete_index_value(&mut self, name: &str, pk: &RowKey, value: &Value) -> Result<()>;

    /// Calls `on_pk` once per primary key stored under `value`, in ascending order.
    async fn read_index_key(&self, name: &str, value: &Value, on_pk: &mut PkCallback<'_>)
        -> Result<()>;

    /// Calls `on_pk(pk, value)` for every postings entry of every value in `range`.
    async fn read_index_keys(
        &self,
        name: &str,
        range: &ReadRange,
        reverse: bool,
        on_pk: &mut IndexCallback<'_>,
    ) -> Result<()>;
}

/// Walks a table image the way `Adapter::read_multi` specifies.
pub(crate) fn scan(table: &MemTable, range: &ReadRange, reverse: bool, on_row: &mut RowCallback<'_>) {
    fn live<'a>((key, slot): (&'a RowKey, &'a Option<Row>)) -> Option<(&'a RowKey, &'a Row)> {
        slot.as_ref().map(|row| (key, row))
    }
    match range {
        ReadRange::All => {
            visit(table.iter().filter_map(live), reverse, on_row);
        }
        ReadRange::Range { low, high } => {
            if low > high {
                return;
            }
            visit(table.range(low.clone()..=high.clone()).filter_map(live), reverse, on_row);
        }
        ReadRange::Offset { offset, limit } => {
            let rows = table.iter().filter_map(live);
            if reverse {
                for (key, row) in rows.rev().skip(*offset).take(*limit) {
                    on_row(key, row);
                }
            } else {
                for (key, row) in rows.skip(*offset).take(*limit) {
                    on_row(key, row);
                }
            }
        }
    }
}

fn visit<'a, I>(rows: I, reverse: bool, on_row: &mut RowCallback<'_>)
where
    I: DoubleEndedIterator<Item = (&'a RowKey, &'a Row)>,
{
    if reverse {
        for (key, row) in rows.rev() {
            on_row(key, row);
        }
    } else {
        for (key, row) in rows {
            on_row(key, row);
        }
    }
}
