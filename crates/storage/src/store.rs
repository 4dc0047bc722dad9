//! Row store.
//!
//! `Store` ties the registry, the memory mirror and a backend adapter together.
//! Every mutation updates `_index` and the mirror before its first await, then
//! replicates to the adapter. In pure memory mode the adapter never sees row
//! writes; the mirror is the store.
//!
//! # Boot
//!
//! 1. connect (the adapter reports whether the store already exists) and create
//!    every table in registry order
//! 2. existing store: rehydrate every table in registry order
//! 3. new store: seed a tombstone at key `0` in every history data table
//! 4. with history on, load the history pointer from `_utility`

use crate::adapter::{
    Adapter, IndexAdapter, LogAdapter, MemoryAdapter, ReadRange, SnapshotAdapter,
};
use crate::config::{BackendMode, StoreConfig};
use crate::environment::{Environment, HostEnvironment};
use crate::memory_index::MemoryIndex;
use crate::registry::{history_schemas, TableId, TableModel, TableRegistry, TableState};
use keel_core::schema::{
    history_data_name, history_meta_name, ColumnModel, TableKind, TableSchema,
    HISTORY_POINTS_TABLE, UTILITY_TABLE,
};
use keel_core::{DataType, Error, Result, Row, RowKey, Value};
use std::sync::Arc;
use tracing::{debug, info, trace};
use uuid::Uuid;

const HISTORY_POINT_KEY: &str = "historyPoint";
const HISTORY_LENGTH_KEY: &str = "historyLength";

/// Row predicate used by `Selection::Filter`.
pub type RowFilter<'a> = &'a (dyn Fn(&Row) -> bool + Send + Sync);

/// Which rows `Store::read` returns.
pub enum Selection<'a> {
    /// The row with this key.
    Key(RowKey),
    /// Every live row.
    All,
    /// Every live row accepted by the predicate.
    Filter(RowFilter<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HistoryOp {
    Upsert,
    Delete,
}

impl HistoryOp {
    fn as_str(&self) -> &'static str {
        match self {
            HistoryOp::Upsert => "upsert",
            HistoryOp::Delete => "delete",
        }
    }
}

#[derive(Debug)]
struct PendingPoint {
    table_hash: i32,
    op: HistoryOp,
    key: RowKey,
}

/// Embedded row store.
pub struct Store {
    config: StoreConfig,
    mode: Option<BackendMode>,
    models: Vec<TableModel>,
    adapter: Box<dyn IndexAdapter>,
    registry: TableRegistry,
    history_point: i64,
    history_length: i64,
    transaction: Option<Vec<PendingPoint>>,
}

fn table(registry: &TableRegistry, id: TableId) -> Result<&TableState> {
    registry
        .get(id)
        .ok_or_else(|| Error::corrupt(format!("stale table handle {:?}", id)))
}

fn table_mut(registry: &mut TableRegistry, id: TableId) -> Result<&mut TableState> {
    registry
        .get_mut(id)
        .ok_or_else(|| Error::corrupt(format!("stale table handle {:?}", id)))
}

fn build_adapter(mode: BackendMode, config: &StoreConfig) -> Box<dyn IndexAdapter> {
    match mode {
        BackendMode::Memory => Box::new(MemoryIndex::new(MemoryAdapter::new())),
        BackendMode::Snapshot => Box::new(MemoryIndex::new(SnapshotAdapter::new(
            config.base_dir.clone(),
        ))),
        BackendMode::Log => Box::new(MemoryIndex::new(LogAdapter::new(config.base_dir.clone()))),
    }
}

impl Store {
    /// Opens a store on the local host.
    pub async fn open(config: StoreConfig, models: Vec<TableModel>) -> Result<Self> {
        Self::open_in(config, models, &HostEnvironment).await
    }

    /// Opens a store, asking `env` which backends are available.
    pub async fn open_in(
        mut config: StoreConfig,
        models: Vec<TableModel>,
        env: &dyn Environment,
    ) -> Result<Self> {
        let mode = config.resolve_mode(env);
        let adapter = build_adapter(mode, &config);
        Self::boot(config, Some(mode), models, adapter).await
    }

    /// Opens a store on a caller-supplied adapter.
    ///
    /// The adapter is treated as the authority for every row; `config.mode`
    /// is ignored.
    pub async fn open_with(
        config: StoreConfig,
        models: Vec<TableModel>,
        adapter: Box<dyn IndexAdapter>,
    ) -> Result<Self> {
        Self::boot(config, None, models, adapter).await
    }

    async fn boot(
        config: StoreConfig,
        mode: Option<BackendMode>,
        models: Vec<TableModel>,
        adapter: Box<dyn IndexAdapter>,
    ) -> Result<Self> {
        let mut store = Self {
            config,
            mode,
            models,
            adapter,
            registry: TableRegistry::new(),
            history_point: 0,
            history_length: 0,
            transaction: None,
        };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&mut self) -> Result<()> {
        self.registry = TableRegistry::from_models(&self.models, self.config.memory);
        self.history_point = 0;
        self.history_length = 0;
        self.transaction = None;

        let existing = self.adapter.connect(&self.config.id).await?;
        for id in self.registry.ids() {
            let state = table(&self.registry, id)?;
            self.adapter.create_table(state.name(), state.schema()).await?;
        }

        if existing {
            let mut rows = 0;
            for id in self.registry.ids() {
                rows += self.rehydrate(id).await?;
            }
            info!(
                store = %self.config.id,
                backend = self.adapter.name(),
                rows,
                "opened existing store"
            );
        } else {
            for id in self.registry.ids() {
                if table(&self.registry, id)?.kind() == TableKind::HistoryData {
                    self.put(id, RowKey::Int(0), None).await?;
                }
            }
            info!(
                store = %self.config.id,
                backend = self.adapter.name(),
                "created new store"
            );
        }

        if self.config.history {
            self.history_point = self.utility_int(HISTORY_POINT_KEY).await?;
            self.history_length = self.utility_int(HISTORY_LENGTH_KEY).await?;
        }
        Ok(())
    }

    /// Loads one table from the adapter. Returns the number of keys loaded.
    async fn rehydrate(&mut self, id: TableId) -> Result<usize> {
        let state = table(&self.registry, id)?;
        let kind = state.kind();
        if kind.is_history() && !self.config.history {
            return Ok(0);
        }
        let name = state.name().to_string();

        let loaded = if self.config.memory {
            let mut rows = Vec::new();
            self.adapter
                .read_multi(&name, &ReadRange::All, false, &mut |key: &RowKey, row: &Row| {
                    rows.push((key.clone(), row.clone()))
                })
                .await?;

            let state = table_mut(&mut self.registry, id)?;
            if kind == TableKind::HistoryData {
                state.push_key(RowKey::Int(0));
                state.put_row(RowKey::Int(0), None);
            }
            let loaded = rows.len();
            for (key, row) in rows {
                state.push_key(key.clone());
                state.put_row(key, Some(Arc::new(row)));
            }
            state.reset_increment();
            loaded
        } else {
            let keys = self.adapter.get_table_index(&name).await?;
            let loaded = keys.len();
            table_mut(&mut self.registry, id)?.set_index(keys);
            loaded
        };

        debug!(table = %name, keys = loaded, "table rehydrated");
        Ok(loaded)
    }

    fn is_pure_memory(&self) -> bool {
        self.mode == Some(BackendMode::Memory)
    }

    fn table_id(&self, name: &str) -> Result<TableId> {
        self.registry
            .id_of(name)
            .ok_or_else(|| Error::table_not_found(name))
    }

    fn records_history(&self, id: TableId) -> bool {
        self.config.history
            && self
                .registry
                .get(id)
                .map_or(false, |t| t.kind() == TableKind::User)
    }

    /// Writes a row slot under an already final key.
    async fn put(&mut self, id: TableId, key: RowKey, row: Option<Row>) -> Result<RowKey> {
        let pure_memory = self.is_pure_memory();
        let state = table_mut(&mut self.registry, id)?;
        state.observe_key(&key);
        state.push_key(key.clone());
        let row = row.map(Arc::new);
        state.put_row(key.clone(), row.clone());
        state.clear_query_cache();
        if pure_memory {
            return Ok(key);
        }

        trace!(table = state.name(), %key, tombstone = row.is_none(), "row write");
        self.adapter
            .write(state.name(), &key, row.as_deref())
            .await
    }

    /// Removes a row. Returns whether the key was indexed.
    async fn remove(&mut self, id: TableId, key: &RowKey) -> Result<bool> {
        let pure_memory = self.is_pure_memory();
        let state = table_mut(&mut self.registry, id)?;
        let existed = state.remove_key(key);
        state.remove_row(key);
        state.clear_query_cache();
        if !pure_memory {
            trace!(table = state.name(), %key, "row delete");
            self.adapter.delete(state.name(), key).await?;
        }
        Ok(existed)
    }

    async fn fetch(&self, id: TableId, key: &RowKey) -> Result<Option<Arc<Row>>> {
        let state = table(&self.registry, id)?;
        if state.is_memory_resident() {
            return Ok(state.row(key).cloned().flatten());
        }
        Ok(self.adapter.read(state.name(), key).await?.map(Arc::new))
    }

    /// Inserts or replaces a row and returns its key.
    ///
    /// Without a key one is minted: a v4 UUID for `uuid` primary keys, the
    /// table counter for other primary keys, and one past the last indexed
    /// integer for tables without a primary key. The key is stamped into the
    /// primary key column when the row leaves it empty.
    pub async fn upsert(&mut self, table: &str, key: Option<RowKey>, mut row: Row) -> Result<RowKey> {
        let id = self.table_id(table)?;
        let state = table_mut(&mut self.registry, id)?;
        let pk = state.schema().pk().map(str::to_string);
        let pk_type = state.schema().pk_type();

        let key = match key {
            Some(key) => key.coerce(pk_type)?,
            None => match (&pk, pk_type) {
                (Some(_), Some(DataType::Uuid)) => RowKey::Str(Uuid::new_v4().to_string()),
                (Some(_), _) => RowKey::Int(state.take_increment()),
                (None, _) => state.next_unkeyed(),
            },
        };
        if let Some(pk) = pk {
            if !row.has_value(&pk) {
                row.set(pk, key.to_value());
            }
        }

        let snapshot = self.records_history(id).then(|| row.clone());
        let key = self.put(id, key, Some(row)).await?;
        if let Some(snapshot) = snapshot {
            self.record_history(id, HistoryOp::Upsert, key.clone(), Some(snapshot))
                .await?;
        }
        Ok(key)
    }

    /// Deletes a row. Deleting a missing key succeeds.
    pub async fn delete(&mut self, table: &str, key: RowKey) -> Result<()> {
        let id = self.table_id(table)?;
        let key = key.coerce(table_mut(&mut self.registry, id)?.schema().pk_type())?;
        let existed = self.remove(id, &key).await?;
        if existed && self.records_history(id) {
            self.record_history(id, HistoryOp::Delete, key, None).await?;
        }
        Ok(())
    }

    /// Reads rows. Tombstones are never returned.
    ///
    /// History tables read as empty while history is disabled.
    pub async fn read(&self, table: &str, selection: Selection<'_>) -> Result<Vec<Arc<Row>>> {
        let id = self.table_id(table)?;
        let state = self::table(&self.registry, id)?;
        if state.kind().is_history() && !self.config.history {
            return Ok(Vec::new());
        }

        match selection {
            Selection::Key(key) => {
                let key = key.coerce(state.schema().pk_type())?;
                Ok(self.fetch(id, &key).await?.into_iter().collect())
            }
            Selection::All => self.scan_rows(state, None).await,
            Selection::Filter(filter) => self.scan_rows(state, Some(filter)).await,
        }
    }

    async fn scan_rows(
        &self,
        state: &TableState,
        filter: Option<RowFilter<'_>>,
    ) -> Result<Vec<Arc<Row>>> {
        let keep = |row: &Row| filter.map_or(true, |f| f(row));
        if state.is_memory_resident() {
            return Ok(state.live_rows().filter(|row| keep(row)).cloned().collect());
        }

        let mut rows = Vec::new();
        self.adapter
            .read_multi(state.name(), &ReadRange::All, false, &mut |_: &RowKey, row: &Row| {
                if keep(row) {
                    rows.push(Arc::new(row.clone()));
                }
            })
            .await?;
        Ok(rows)
    }

    /// Reads one row by key.
    pub async fn get(&self, table: &str, key: RowKey) -> Result<Option<Arc<Row>>> {
        Ok(self.read(table, Selection::Key(key)).await?.pop())
    }

    /// Destroys all backend storage and boots again from the saved
    /// configuration and table models. Indexes are dropped with it.
    pub async fn clear_all(&mut self) -> Result<()> {
        self.adapter.destroy().await?;
        info!(store = %self.config.id, "store cleared");
        self.initialize().await
    }

    /// Reads a store-wide setting.
    pub async fn utility(&self, key: &str) -> Result<Option<Value>> {
        let id = self.table_id(UTILITY_TABLE)?;
        Ok(self
            .fetch(id, &RowKey::from(key))
            .await?
            .and_then(|row| row.get("value").cloned()))
    }

    async fn utility_int(&self, key: &str) -> Result<i64> {
        Ok(self.utility(key).await?.and_then(|v| v.as_i64()).unwrap_or(0))
    }

    /// Writes a store-wide setting.
    pub async fn set_utility(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let id = self.table_id(UTILITY_TABLE)?;
        let row = Row::new().with("key", key).with("value", value);
        self.put(id, RowKey::from(key), Some(row)).await?;
        Ok(())
    }

    /// Defines a table at runtime, with its history pair.
    ///
    /// The model is remembered so `clear_all` recreates the table.
    pub async fn create_table(&mut self, name: &str, columns: Vec<ColumnModel>) -> Result<()> {
        if self.registry.id_of(name).is_some() {
            return Err(Error::invalid_schema(format!("table already exists: {}", name)));
        }
        let model = TableModel::new(name, columns);
        let [data, meta] = history_schemas(&model);
        let user = TableSchema::derive(name, TableKind::User, model.columns.clone());

        let mut ids = Vec::with_capacity(3);
        for schema in [user, data, meta] {
            self.adapter.create_table(schema.name(), &schema).await?;
            ids.push(self.registry.define_table(schema, self.config.memory));
        }
        for id in &ids {
            self.rehydrate(*id).await?;
        }

        // The mirror always carries key 0, so ask the backend whether it was written.
        let data_name = history_data_name(name);
        let data_id = self.table_id(&data_name)?;
        let seeded = if self.is_pure_memory() {
            table(&self.registry, data_id)?.contains(&RowKey::Int(0))
        } else {
            self.adapter
                .get_table_index(&data_name)
                .await?
                .contains(&RowKey::Int(0))
        };
        if !seeded {
            self.put(data_id, RowKey::Int(0), None).await?;
        }
        self.models.push(model);
        debug!(table = name, "table created");
        Ok(())
    }

    /// Drops a user table. Its history tables are left in place.
    pub async fn drop_table(&mut self, name: &str) -> Result<()> {
        let id = self.table_id(name)?;
        if table(&self.registry, id)?.kind() != TableKind::User {
            return Err(Error::invalid_schema(format!(
                "{} is an internal table and cannot be dropped",
                name
            )));
        }
        self.registry.drop_table(id);
        self.models.retain(|m| m.name != name);
        self.adapter.drop_table(name).await?;
        debug!(table = name, "table dropped");
        Ok(())
    }

    /// Caches a query result on `table`. The cache is cleared by any write to the table.
    pub fn cache_query(&mut self, table: &str, key: &str, rows: Vec<Arc<Row>>) -> Result<()> {
        let id = self.table_id(table)?;
        table_mut(&mut self.registry, id)?.cache_query(key, rows);
        Ok(())
    }

    /// Returns a cached query result.
    pub fn cached_query(&self, table: &str, key: &str) -> Result<Option<Vec<Arc<Row>>>> {
        let id = self.table_id(table)?;
        Ok(self::table(&self.registry, id)?
            .cached_query(key)
            .map(<[_]>::to_vec))
    }

    /// Starts staging history points.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(Error::TransactionInProgress);
        }
        self.transaction = Some(Vec::new());
        Ok(())
    }

    /// Writes the staged history points, one per table and operation type.
    pub async fn commit_transaction(&mut self) -> Result<()> {
        let pending = self.transaction.take().ok_or(Error::NoTransaction)?;
        self.write_history_points(pending).await
    }

    /// Returns whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    async fn record_history(
        &mut self,
        id: TableId,
        op: HistoryOp,
        key: RowKey,
        snapshot: Option<Row>,
    ) -> Result<()> {
        let state = table(&self.registry, id)?;
        let table_hash = state.schema().hash();
        let data_id = self.table_id(&history_data_name(state.name()))?;
        let meta_id = self.table_id(&history_meta_name(state.name()))?;

        let data_key = table(&self.registry, data_id)?.next_unkeyed();
        self.put(data_id, data_key.clone(), snapshot).await?;

        let mut versions = match self.fetch(meta_id, &key).await? {
            Some(meta) => meta
                .get("_historyDataRowIDs")
                .and_then(Value::as_array)
                .map(<[Value]>::to_vec)
                .unwrap_or_default(),
            None => Vec::new(),
        };
        versions.insert(0, data_key.to_value());
        let meta = Row::new()
            .with("id", key.to_value())
            .with("_pointer", 0i64)
            .with("_historyDataRowIDs", Value::Array(versions));
        self.put(meta_id, key.clone(), Some(meta)).await?;

        let point = PendingPoint { table_hash, op, key };
        match self.transaction.as_mut() {
            Some(pending) => {
                pending.push(point);
                Ok(())
            }
            None => self.write_history_points(vec![point]).await,
        }
    }

    async fn write_history_points(&mut self, points: Vec<PendingPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        self.history_point += 1;
        self.history_length = self.history_point;

        let mut groups: Vec<(i32, HistoryOp, Vec<Value>)> = Vec::new();
        for point in points {
            match groups
                .iter_mut()
                .find(|(hash, op, _)| *hash == point.table_hash && *op == point.op)
            {
                Some((_, _, keys)) => keys.push(point.key.to_value()),
                None => groups.push((point.table_hash, point.op, vec![point.key.to_value()])),
            }
        }

        let points_id = self.table_id(HISTORY_POINTS_TABLE)?;
        for (hash, op, keys) in groups {
            let key = RowKey::Int(table_mut(&mut self.registry, points_id)?.take_increment());
            let row = Row::new()
                .with("id", key.to_value())
                .with("tableID", hash)
                .with("historyPoint", self.history_point)
                .with("rowKeys", Value::Array(keys))
                .with("type", op.as_str());
            self.put(points_id, key, Some(row)).await?;
        }

        self.set_utility(HISTORY_POINT_KEY, self.history_point).await?;
        self.set_utility(HISTORY_LENGTH_KEY, self.history_length).await?;
        Ok(())
    }

    /// Creates a secondary index.
    pub async fn create_index(&mut self, name: &str, key_type: DataType) -> Result<()> {
        self.adapter.create_index(name, key_type).await
    }

    /// Drops a secondary index.
    pub async fn delete_index(&mut self, name: &str) -> Result<()> {
        self.adapter.delete_index(name).await
    }

    /// Adds `pk` under `value` in an index.
    pub async fn add_index_value(&mut self, name: &str, pk: &RowKey, value: &Value) -> Result<()> {
        self.adapter.add_index_value(name, pk, value).await
    }

    /// Removes `pk` from under `value` in an index.
    pub async fn delete_index_value(&mut self, name: &str, pk: &RowKey, value: &Value) -> Result<()> {
        self.adapter.delete_index_value(name, pk, value).await
    }

    /// Returns the primary keys stored under `value`, ascending.
    pub async fn read_index_key(&self, name: &str, value: &Value) -> Result<Vec<RowKey>> {
        let mut pks = Vec::new();
        self.adapter
            .read_index_key(name, value, &mut |pk: &RowKey| pks.push(pk.clone()))
            .await?;
        Ok(pks)
    }

    /// Returns `(pk, value)` pairs for every indexed value in `range`.
    pub async fn read_index_keys(
        &self,
        name: &str,
        range: &ReadRange,
        reverse: bool,
    ) -> Result<Vec<(RowKey, RowKey)>> {
        let mut pairs = Vec::new();
        self.adapter
            .read_index_keys(name, range, reverse, &mut |pk: &RowKey, value: &RowKey| {
                pairs.push((pk.clone(), value.clone()))
            })
            .await?;
        Ok(pairs)
    }

    /// Releases the backend.
    pub async fn close(mut self) -> Result<()> {
        self.adapter.disconnect().await
    }

    /// Returns the effective configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the selected backend, or `None` for a caller-supplied adapter.
    pub fn mode(&self) -> Option<BackendMode> {
        self.mode
    }

    /// Returns the backend name.
    pub fn backend_name(&self) -> &'static str {
        self.adapter.name()
    }

    /// Returns a table's runtime state.
    pub fn table(&self, name: &str) -> Option<&TableState> {
        self.registry.id_of(name).and_then(|id| self.registry.get(id))
    }

    /// Returns the current history point.
    pub fn history_point(&self) -> i64 {
        self.history_point
    }

    /// Returns the number of history points that can be replayed.
    pub fn history_length(&self) -> i64 {
        self.history_length
    }
}
