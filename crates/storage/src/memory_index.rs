//! Secondary index engine.
//!
//! `MemoryIndex` wraps any `Adapter` and adds index maintenance on top of it.
//! Each index is a backend table with one row per indexed value:
//!
//! ```text
//! { "id": <indexed value>, "pks": [<pk>, <pk>, ...] }
//! ```
//!
//! An index is either warm (every postings list mirrored in memory) or cold
//! (every operation reads the postings row back from the adapter first). The
//! load policy decides at `create_index` time; a vetoed index stays cold.

use crate::adapter::{
    Adapter, IndexAdapter, IndexCallback, PkCallback, ReadRange, RowCallback,
};
use async_trait::async_trait;
use hashbrown::HashMap;
use keel_core::schema::{ColumnModel, TableKind, TableSchema};
use keel_core::{DataType, Error, Result, Row, RowKey, Value};
use keel_index::PostingList;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

const VALUE_COLUMN: &str = "id";
const POSTINGS_COLUMN: &str = "pks";

/// Decides whether an index is loaded into memory when it is created.
pub type IndexLoadPolicy = Arc<dyn Fn(&str) -> bool + Send + Sync>;

struct IndexState {
    key_type: DataType,
    postings: BTreeMap<RowKey, PostingList>,
    loaded: bool,
}

/// Index engine decorating a backend adapter.
pub struct MemoryIndex<A> {
    inner: A,
    indexes: HashMap<String, IndexState>,
    load_policy: IndexLoadPolicy,
}

impl<A: Adapter> MemoryIndex<A> {
    /// Wraps `inner`, loading every index into memory.
    pub fn new(inner: A) -> Self {
        Self::with_load_policy(inner, Arc::new(|_: &str| true))
    }

    /// Wraps `inner` with a custom load policy.
    pub fn with_load_policy(inner: A, load_policy: IndexLoadPolicy) -> Self {
        Self {
            inner,
            indexes: HashMap::new(),
            load_policy,
        }
    }

    /// Returns the wrapped adapter.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Returns whether `name` is mirrored in memory.
    pub fn is_loaded(&self, name: &str) -> Option<bool> {
        self.indexes.get(name).map(|s| s.loaded)
    }

    fn state(&self, name: &str) -> Result<&IndexState> {
        self.indexes
            .get(name)
            .ok_or_else(|| Error::index_not_found(name))
    }

    /// Turns an indexed value into a key of the index's key type.
    fn index_key(&self, name: &str, value: &Value) -> Result<RowKey> {
        let key_type = self.state(name)?.key_type;
        RowKey::from_value(value)?.coerce(Some(key_type))
    }

    async fn fetch(&self, name: &str, key: &RowKey) -> Result<PostingList> {
        match self.inner.read(name, key).await? {
            Some(row) => postings_from_row(&row),
            None => Ok(PostingList::new()),
        }
    }
}

fn postings_from_row(row: &Row) -> Result<PostingList> {
    let keys = match row.get(POSTINGS_COLUMN) {
        Some(Value::Array(items)) => items
            .iter()
            .map(RowKey::from_value)
            .collect::<Result<Vec<_>>>()?,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(Error::corrupt(format!(
                "postings column holds {:?}, expected an array",
                other
            )))
        }
    };
    Ok(PostingList::from_keys(keys))
}

fn postings_row(key: &RowKey, postings: &PostingList) -> Row {
    Row::new().with(VALUE_COLUMN, key.to_value()).with(
        POSTINGS_COLUMN,
        Value::Array(postings.iter().map(RowKey::to_value).collect()),
    )
}

fn index_schema(name: &str, key_type: DataType) -> TableSchema {
    TableSchema::derive(
        name,
        TableKind::Index,
        vec![
            ColumnModel::new(VALUE_COLUMN, key_type).primary_key(),
            ColumnModel::new(POSTINGS_COLUMN, DataType::Array),
        ],
    )
}

impl<A> fmt::Debug for MemoryIndex<A>
where
    A: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryIndex")
            .field("inner", &self.inner)
            .field("indexes", &self.indexes.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl<A: Adapter> Adapter for MemoryIndex<A> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn connect(&mut self, id: &str) -> Result<bool> {
        self.inner.connect(id).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.indexes.clear();
        self.inner.disconnect().await
    }

    async fn create_table(&mut self, name: &str, schema: &TableSchema) -> Result<()> {
        self.inner.create_table(name, schema).await
    }

    async fn drop_table(&mut self, name: &str) -> Result<()> {
        self.inner.drop_table(name).await
    }

    async fn disconnect_table(&mut self, name: &str) -> Result<()> {
        self.inner.disconnect_table(name).await
    }

    async fn write(&mut self, table: &str, key: &RowKey, row: Option<&Row>) -> Result<RowKey> {
        self.inner.write(table, key, row).await
    }

    async fn read(&self, table: &str, key: &RowKey) -> Result<Option<Row>> {
        self.inner.read(table, key).await
    }

    async fn delete(&mut self, table: &str, key: &RowKey) -> Result<()> {
        self.inner.delete(table, key).await
    }

    async fn read_multi(
        &self,
        table: &str,
        range: &ReadRange,
        reverse: bool,
        on_row: &mut RowCallback<'_>,
    ) -> Result<()> {
        self.inner.read_multi(table, range, reverse, on_row).await
    }

    async fn get_table_index(&self, table: &str) -> Result<Vec<RowKey>> {
        self.inner.get_table_index(table).await
    }

    async fn get_table_index_length(&self, table: &str) -> Result<usize> {
        self.inner.get_table_index_length(table).await
    }

    async fn destroy(&mut self) -> Result<()> {
        self.indexes.clear();
        self.inner.destroy().await
    }
}

#[async_trait]
impl<A: Adapter> IndexAdapter for MemoryIndex<A> {
    async fn create_index(&mut self, name: &str, key_type: DataType) -> Result<()> {
        if !key_type.is_keyable() {
            return Err(Error::invalid_schema(format!(
                "index {} cannot be keyed by {} values",
                name, key_type
            )));
        }
        self.inner
            .create_table(name, &index_schema(name, key_type))
            .await?;
        self.indexes.insert(
            name.to_string(),
            IndexState {
                key_type,
                postings: BTreeMap::new(),
                loaded: false,
            },
        );

        if !(self.load_policy)(name) {
            debug!(index = name, "index left cold by load policy");
            return Ok(());
        }

        let mut rows = Vec::new();
        self.inner
            .read_multi(name, &ReadRange::All, false, &mut |key: &RowKey, row: &Row| {
                rows.push((key.clone(), row.clone()))
            })
            .await?;

        let mut postings = BTreeMap::new();
        for (key, row) in &rows {
            postings.insert(key.clone(), postings_from_row(row)?);
        }
        if let Some(state) = self.indexes.get_mut(name) {
            state.postings = postings;
            state.loaded = true;
        }
        debug!(index = name, values = rows.len(), "index loaded");
        Ok(())
    }

    async fn delete_index(&mut self, name: &str) -> Result<()> {
        self.indexes.remove(name);
        self.inner.drop_table(name).await
    }

    async fn add_index_value(&mut self, name: &str, pk: &RowKey, value: &Value) -> Result<()> {
        let key = self.index_key(name, value)?;
        let loaded = self.state(name)?.loaded;

        let row = if loaded {
            let state = self
                .indexes
                .get_mut(name)
                .ok_or_else(|| Error::index_not_found(name))?;
            let postings = state.postings.entry(key.clone()).or_default();
            if !postings.insert(pk.clone()) {
                return Ok(());
            }
            postings_row(&key, postings)
        } else {
            let mut postings = self.fetch(name, &key).await?;
            if !postings.insert(pk.clone()) {
                return Ok(());
            }
            postings_row(&key, &postings)
        };

        trace!(index = name, value = %key, %pk, "postings insert");
        self.inner.write(name, &key, Some(&row)).await?;
        Ok(())
    }

    async fn delete_index_value(&mut self, name: &str, pk: &RowKey, value: &Value) -> Result<()> {
        let key = self.index_key(name, value)?;
        let loaded = self.state(name)?.loaded;

        let row = if loaded {
            let state = self
                .indexes
                .get_mut(name)
                .ok_or_else(|| Error::index_not_found(name))?;
            match state.postings.get_mut(&key) {
                Some(postings) => {
                    if !postings.remove(pk) {
                        return Ok(());
                    }
                    postings_row(&key, postings)
                }
                None => return Ok(()),
            }
        } else {
            let mut postings = self.fetch(name, &key).await?;
            if !postings.remove(pk) {
                return Ok(());
            }
            postings_row(&key, &postings)
        };

        trace!(index = name, value = %key, %pk, "postings remove");
        self.inner.write(name, &key, Some(&row)).await?;
        Ok(())
    }

    async fn read_index_key(
        &self,
        name: &str,
        value: &Value,
        on_pk: &mut PkCallback<'_>,
    ) -> Result<()> {
        let key = self.index_key(name, value)?;
        let state = self.state(name)?;
        if state.loaded {
            if let Some(postings) = state.postings.get(&key) {
                postings.iter().for_each(|pk| on_pk(pk));
            }
        } else {
            self.fetch(name, &key).await?.iter().for_each(|pk| on_pk(pk));
        }
        Ok(())
    }

    async fn read_index_keys(
        &self,
        name: &str,
        range: &ReadRange,
        reverse: bool,
        on_pk: &mut IndexCallback<'_>,
    ) -> Result<()> {
        let state = self.state(name)?;
        let range = &match range {
            ReadRange::Range { low, high } => ReadRange::Range {
                low: low.clone().coerce(Some(state.key_type))?,
                high: high.clone().coerce(Some(state.key_type))?,
            },
            other => other.clone(),
        };
        if state.loaded {
            let entries: Vec<(&RowKey, &PostingList)> = match range {
                ReadRange::All | ReadRange::Offset { .. } => state.postings.iter().collect(),
                ReadRange::Range { low, high } if low <= high => {
                    state.postings.range(low.clone()..=high.clone()).collect()
                }
                ReadRange::Range { .. } => Vec::new(),
            };
            let mut entries: Box<dyn Iterator<Item = (&RowKey, &PostingList)> + Send> = if reverse {
                Box::new(entries.into_iter().rev())
            } else {
                Box::new(entries.into_iter())
            };
            if let ReadRange::Offset { offset, limit } = range {
                entries = Box::new(entries.skip(*offset).take(*limit));
            }
            for (value, postings) in entries {
                postings.iter().for_each(|pk| on_pk(pk, value));
            }
            return Ok(());
        }

        let mut rows = Vec::new();
        self.inner
            .read_multi(name, range, reverse, &mut |key: &RowKey, row: &Row| {
                rows.push((key.clone(), row.clone()))
            })
            .await?;
        for (value, row) in &rows {
            postings_from_row(row)?.iter().for_each(|pk| on_pk(pk, value));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;

    async fn engine(load: bool) -> MemoryIndex<MemoryAdapter> {
        let mut engine = MemoryIndex::with_load_policy(MemoryAdapter::new(), Arc::new(move |_: &str| load));
        engine.connect("test").await.unwrap();
        engine.create_index("byAge", DataType::Int).await.unwrap();
        engine
    }

    async fn pks(engine: &MemoryIndex<MemoryAdapter>, value: i64) -> Vec<RowKey> {
        let mut out = Vec::new();
        engine
            .read_index_key("byAge", &Value::Int(value), &mut |pk: &RowKey| out.push(pk.clone()))
            .await
            .unwrap();
        out
    }

    async fn by_age(load: bool) {
        let mut engine = engine(load).await;
        assert_eq!(engine.is_loaded("byAge"), Some(load));

        for pk in [7, 3, 5] {
            engine
                .add_index_value("byAge", &RowKey::Int(pk), &Value::Int(30))
                .await
                .unwrap();
        }
        assert_eq!(pks(&engine, 30).await, vec![RowKey::Int(3), RowKey::Int(5), RowKey::Int(7)]);

        engine
            .delete_index_value("byAge", &RowKey::Int(5), &Value::Int(30))
            .await
            .unwrap();
        assert_eq!(pks(&engine, 30).await, vec![RowKey::Int(3), RowKey::Int(7)]);

        let stored = engine.read("byAge", &RowKey::Int(30)).await.unwrap().unwrap();
        assert_eq!(
            stored.get("pks"),
            Some(&Value::Array(vec![Value::Int(3), Value::Int(7)]))
        );
    }

    #[tokio::test]
    async fn test_by_age_warm() {
        by_age(true).await;
    }

    #[tokio::test]
    async fn test_by_age_cold() {
        by_age(false).await;
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let mut engine = engine(true).await;
        engine
            .add_index_value("byAge", &RowKey::Int(1), &Value::Int(20))
            .await
            .unwrap();
        engine
            .delete_index_value("byAge", &RowKey::Int(99), &Value::Int(20))
            .await
            .unwrap();
        engine
            .delete_index_value("byAge", &RowKey::Int(1), &Value::Int(21))
            .await
            .unwrap();
        assert_eq!(pks(&engine, 20).await, vec![RowKey::Int(1)]);
        // No postings row is written for a value that never had one.
        assert_eq!(engine.read("byAge", &RowKey::Int(21)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_list_persists() {
        let mut engine = engine(false).await;
        engine
            .add_index_value("byAge", &RowKey::Int(1), &Value::Int(20))
            .await
            .unwrap();
        engine
            .delete_index_value("byAge", &RowKey::Int(1), &Value::Int(20))
            .await
            .unwrap();
        let stored = engine.read("byAge", &RowKey::Int(20)).await.unwrap().unwrap();
        assert_eq!(stored.get("pks"), Some(&Value::Array(Vec::new())));
    }

    #[tokio::test]
    async fn test_warm_load_reads_existing_rows() {
        let mut adapter = MemoryAdapter::new();
        adapter.connect("test").await.unwrap();
        adapter
            .create_table("byName", &index_schema("byName", DataType::String))
            .await
            .unwrap();
        let row = postings_row(
            &RowKey::from("ada"),
            &PostingList::from_keys(vec![RowKey::Int(2), RowKey::Int(1)]),
        );
        adapter.write("byName", &RowKey::from("ada"), Some(&row)).await.unwrap();

        let mut engine = MemoryIndex::new(adapter);
        engine.create_index("byName", DataType::String).await.unwrap();
        assert_eq!(engine.is_loaded("byName"), Some(true));

        let mut out = Vec::new();
        engine
            .read_index_key("byName", &Value::from("ada"), &mut |pk: &RowKey| out.push(pk.clone()))
            .await
            .unwrap();
        assert_eq!(out, vec![RowKey::Int(1), RowKey::Int(2)]);
    }

    #[tokio::test]
    async fn test_read_index_keys_range() {
        for load in [true, false] {
            let mut engine = engine(load).await;
            for (pk, age) in [(1, 20), (2, 30), (3, 30), (4, 40)] {
                engine
                    .add_index_value("byAge", &RowKey::Int(pk), &Value::Int(age))
                    .await
                    .unwrap();
            }

            let mut out = Vec::new();
            let range = ReadRange::Range {
                low: RowKey::Int(25),
                high: RowKey::Int(40),
            };
            engine
                .read_index_keys("byAge", &range, true, &mut |pk: &RowKey, value: &RowKey| {
                    out.push((pk.clone(), value.clone()))
                })
                .await
                .unwrap();
            assert_eq!(
                out,
                vec![
                    (RowKey::Int(4), RowKey::Int(40)),
                    (RowKey::Int(2), RowKey::Int(30)),
                    (RowKey::Int(3), RowKey::Int(30)),
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_values_coerced_to_key_type() {
        let mut engine = engine(true).await;
        engine
            .add_index_value("byAge", &RowKey::Int(1), &Value::from("30"))
            .await
            .unwrap();
        engine
            .add_index_value("byAge", &RowKey::Int(2), &Value::Float(30.0))
            .await
            .unwrap();
        assert_eq!(pks(&engine, 30).await, vec![RowKey::Int(1), RowKey::Int(2)]);

        let err = engine
            .add_index_value("byAge", &RowKey::Int(3), &Value::from("thirty"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
    }

    async fn float_index(load: bool) {
        let mut engine =
            MemoryIndex::with_load_policy(MemoryAdapter::new(), Arc::new(move |_: &str| load));
        engine.connect("test").await.unwrap();
        engine.create_index("byScore", DataType::Float).await.unwrap();

        for (pk, score) in [(1, Value::Float(3.5)), (2, Value::Int(3)), (3, Value::Float(-0.25))] {
            engine
                .add_index_value("byScore", &RowKey::Int(pk), &score)
                .await
                .unwrap();
        }
        engine
            .add_index_value("byScore", &RowKey::Int(4), &Value::from("3.5"))
            .await
            .unwrap();

        let mut out = Vec::new();
        engine
            .read_index_key("byScore", &Value::Float(3.5), &mut |pk: &RowKey| out.push(pk.clone()))
            .await
            .unwrap();
        assert_eq!(out, vec![RowKey::Int(1), RowKey::Int(4)]);

        let mut pairs = Vec::new();
        engine
            .read_index_keys("byScore", &ReadRange::All, false, &mut |pk: &RowKey, v: &RowKey| {
                pairs.push((pk.clone(), v.clone()))
            })
            .await
            .unwrap();
        assert_eq!(
            pairs,
            vec![
                (RowKey::Int(3), RowKey::Float(-0.25)),
                (RowKey::Int(2), RowKey::Int(3)),
                (RowKey::Int(1), RowKey::Float(3.5)),
                (RowKey::Int(4), RowKey::Float(3.5)),
            ]
        );
    }

    #[tokio::test]
    async fn test_float_index_warm() {
        float_index(true).await;
    }

    #[tokio::test]
    async fn test_float_index_cold() {
        float_index(false).await;
    }

    #[tokio::test]
    async fn test_string_index_orders_numbers_as_text() {
        let mut engine = MemoryIndex::new(MemoryAdapter::new());
        engine.connect("test").await.unwrap();
        engine.create_index("byTag", DataType::String).await.unwrap();

        engine
            .add_index_value("byTag", &RowKey::Int(1), &Value::Int(30))
            .await
            .unwrap();
        engine
            .add_index_value("byTag", &RowKey::Int(2), &Value::Int(9))
            .await
            .unwrap();
        engine
            .add_index_value("byTag", &RowKey::Int(3), &Value::Int(10))
            .await
            .unwrap();

        let mut out = Vec::new();
        engine
            .read_index_key("byTag", &Value::from("30"), &mut |pk: &RowKey| out.push(pk.clone()))
            .await
            .unwrap();
        assert_eq!(out, vec![RowKey::Int(1)]);

        let mut values = Vec::new();
        engine
            .read_index_keys("byTag", &ReadRange::All, false, &mut |_: &RowKey, v: &RowKey| {
                values.push(v.clone())
            })
            .await
            .unwrap();
        assert_eq!(values, vec![RowKey::from("10"), RowKey::from("30"), RowKey::from("9")]);
    }

    #[tokio::test]
    async fn test_unkeyable_index_type_rejected() {
        let mut engine = MemoryIndex::new(MemoryAdapter::new());
        engine.connect("test").await.unwrap();
        for key_type in [DataType::Array, DataType::Blob] {
            let err = engine.create_index("bad", key_type).await.unwrap_err();
            assert!(matches!(err, Error::InvalidSchema { .. }));
        }
        assert_eq!(engine.is_loaded("bad"), None);
    }

    #[tokio::test]
    async fn test_unknown_index() {
        let mut engine = engine(true).await;
        let err = engine
            .add_index_value("missing", &RowKey::Int(1), &Value::Int(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IndexNotFound { .. }));

        engine.delete_index("byAge").await.unwrap();
        assert_eq!(engine.is_loaded("byAge"), None);
    }
}
