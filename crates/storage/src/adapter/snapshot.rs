//! Snapshot adapter.
//!
//! Each table lives in one JSON file that is rewritten in full on every write.
//! The rewrite goes to a temp file first and is renamed over the old snapshot,
//! so a table file is always either the previous or the next state.
//!
//! ```text
//! <base_dir>/keel_<id>/
//! ├── dbID            # store id marker
//! ├── users.json      # [[key, row|null], ...]
//! └── _utility.json
//! ```

use super::{scan, Adapter, MemTable, ReadRange, RowCallback};
use async_trait::async_trait;
use hashbrown::HashMap;
use keel_core::schema::TableSchema;
use keel_core::{Error, Result, Row, RowKey};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, trace};

const MARKER_FILE: &str = "dbID";

/// Adapter committing whole-table snapshots to disk.
#[derive(Debug)]
pub struct SnapshotAdapter {
    base_dir: PathBuf,
    dir: Option<PathBuf>,
    tables: HashMap<String, MemTable>,
}

impl SnapshotAdapter {
    /// Creates an adapter rooted at `base_dir`. Nothing is touched until `connect`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            dir: None,
            tables: HashMap::new(),
        }
    }

    /// Returns the store directory for `id`.
    pub fn store_dir(base_dir: &Path, id: &str) -> PathBuf {
        base_dir.join(format!("keel_{}", id))
    }

    fn dir(&self) -> Result<&Path> {
        self.dir
            .as_deref()
            .ok_or_else(|| Error::corrupt("snapshot adapter used before connect"))
    }

    fn table_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.dir()?.join(format!("{}.json", name)))
    }

    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables.get(name).ok_or_else(|| Error::table_not_found(name))
    }

    /// Writes the current image of `name` and swaps it in.
    async fn commit(&self, name: &str) -> Result<()> {
        let image = self.table(name)?;
        let entries: Vec<(&RowKey, &Option<Row>)> = image.iter().collect();
        let bytes = serde_json::to_vec(&entries)?;

        let path = self.table_path(name)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(path: &Path) -> Result<MemTable> {
        let bytes = fs::read(path).await?;
        let entries: Vec<(RowKey, Option<Row>)> = serde_json::from_slice(&bytes)?;
        Ok(entries.into_iter().collect())
    }
}

#[async_trait]
impl Adapter for SnapshotAdapter {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn connect(&mut self, id: &str) -> Result<bool> {
        let dir = Self::store_dir(&self.base_dir, id);
        let marker = dir.join(MARKER_FILE);

        let existing = match fs::read_to_string(&marker).await {
            Ok(stored) => stored == id,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };

        if !existing {
            if fs::try_exists(&dir).await? {
                info!(dir = %dir.display(), "snapshot directory has no matching marker, clearing it");
                fs::remove_dir_all(&dir).await?;
            }
            fs::create_dir_all(&dir).await?;
            fs::write(&marker, id).await?;
        }

        debug!(dir = %dir.display(), existing, "snapshot adapter connected");
        self.dir = Some(dir);
        Ok(existing)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.tables.clear();
        self.dir = None;
        Ok(())
    }

    async fn create_table(&mut self, name: &str, _schema: &TableSchema) -> Result<()> {
        if self.tables.contains_key(name) {
            return Ok(());
        }
        let path = self.table_path(name)?;
        let image = if fs::try_exists(&path).await? {
            Self::load(&path).await?
        } else {
            MemTable::new()
        };
        let fresh = image.is_empty();
        self.tables.insert(name.to_string(), image);
        if fresh {
            self.commit(name).await?;
        }
        Ok(())
    }

    async fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables.remove(name);
        let path = self.table_path(name)?;
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn disconnect_table(&mut self, name: &str) -> Result<()> {
        self.tables.remove(name);
        Ok(())
    }

    async fn write(&mut self, table: &str, key: &RowKey, row: Option<&Row>) -> Result<RowKey> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| Error::table_not_found(table))?
            .insert(key.clone(), row.cloned());
        trace!(table, %key, "snapshot write");
        self.commit(table).await?;
        Ok(key.clone())
    }

    async fn read(&self, table: &str, key: &RowKey) -> Result<Option<Row>> {
        Ok(self.table(table)?.get(key).cloned().flatten())
    }

    async fn delete(&mut self, table: &str, key: &RowKey) -> Result<()> {
        let removed = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::table_not_found(table))?
            .remove(key);
        if removed.is_some() {
            self.commit(table).await?;
        }
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
        if let Some(dir) = self.dir.take() {
            if fs::try_exists(&dir).await? {
                fs::remove_dir_all(&dir).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::schema::TableKind;

    fn schema() -> TableSchema {
        TableSchema::derive("users", TableKind::User, Vec::new())
    }

    #[tokio::test]
    async fn test_reopen_sees_rows() {
        let tmp = tempfile::tempdir().unwrap();

        let mut adapter = SnapshotAdapter::new(tmp.path());
        assert!(!adapter.connect("app").await.unwrap());
        adapter.create_table("users", &schema()).await.unwrap();
        let row = Row::new().with("name", "Ada");
        adapter.write("users", &RowKey::Int(1), Some(&row)).await.unwrap();
        adapter.write("users", &RowKey::Int(0), None).await.unwrap();
        adapter.disconnect().await.unwrap();

        let mut adapter = SnapshotAdapter::new(tmp.path());
        assert!(adapter.connect("app").await.unwrap());
        adapter.create_table("users", &schema()).await.unwrap();
        assert_eq!(adapter.read("users", &RowKey::Int(1)).await.unwrap(), Some(row));
        assert_eq!(
            adapter.get_table_index("users").await.unwrap(),
            vec![RowKey::Int(0), RowKey::Int(1)]
        );
    }

    #[tokio::test]
    async fn test_mismatched_marker_starts_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SnapshotAdapter::store_dir(tmp.path(), "app");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MARKER_FILE), "other").unwrap();
        std::fs::write(dir.join("stale.json"), "[]").unwrap();

        let mut adapter = SnapshotAdapter::new(tmp.path());
        assert!(!adapter.connect("app").await.unwrap());
        assert!(!dir.join("stale.json").exists());
    }

    #[tokio::test]
    async fn test_destroy_removes_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut adapter = SnapshotAdapter::new(tmp.path());
        adapter.connect("app").await.unwrap();
        adapter.create_table("users", &schema()).await.unwrap();
        adapter.destroy().await.unwrap();
        assert!(!SnapshotAdapter::store_dir(tmp.path(), "app").exists());

        // Still usable after destroy.
        assert!(!adapter.connect("app").await.unwrap());
    }
}
