//! Append-log adapter.
//!
//! Every table is one newline-delimited JSON log. A write appends one record
//! and the table image is rebuilt by replaying the log when the table is opened.
//!
//! ```text
//! <base_dir>/db_<id>/
//! ├── users.log
//! └── _utility.log
//! ```
//!
//! Records:
//!
//! ```text
//! {"op":"put","key":1,"row":{"id":1,"name":"Ada"}}
//! {"op":"put","key":0,"row":null}
//! {"op":"del","key":1}
//! ```

use super::{scan, Adapter, MemTable, ReadRange, RowCallback};
use async_trait::async_trait;
use hashbrown::HashMap;
use keel_core::schema::TableSchema;
use keel_core::{Error, Result, Row, RowKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

/// Logs with fewer records than this are never compacted.
const COMPACT_MIN_RECORDS: usize = 1024;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum LogRecord {
    Put { key: RowKey, row: Option<Row> },
    Del { key: RowKey },
}

#[derive(Debug)]
struct LogTable {
    image: MemTable,
    file: File,
    /// Records in the log file, live or not.
    records: usize,
}

/// Adapter persisting each table as an append-only log.
#[derive(Debug)]
pub struct LogAdapter {
    base_dir: PathBuf,
    dir: Option<PathBuf>,
    tables: HashMap<String, LogTable>,
}

/// Result of replaying one log file.
struct Replay {
    image: MemTable,
    records: usize,
    torn: bool,
}

impl LogAdapter {
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
        base_dir.join(format!("db_{}", id))
    }

    fn log_path(&self, name: &str) -> Result<PathBuf> {
        let dir = self
            .dir
            .as_deref()
            .ok_or_else(|| Error::corrupt("log adapter used before connect"))?;
        Ok(dir.join(format!("{}.log", name)))
    }

    fn table(&self, name: &str) -> Result<&LogTable> {
        self.tables.get(name).ok_or_else(|| Error::table_not_found(name))
    }

    fn replay(name: &str, text: &str) -> Result<Replay> {
        let mut image = MemTable::new();
        let mut records = 0;
        let mut torn = false;

        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len().saturating_sub(1);
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(line) {
                Ok(LogRecord::Put { key, row }) => {
                    image.insert(key, row);
                    records += 1;
                }
                Ok(LogRecord::Del { key }) => {
                    image.remove(&key);
                    records += 1;
                }
                // Only the final line can be a half-written append.
                Err(_) if i == last => {
                    warn!(table = name, "ignoring torn record at end of log");
                    torn = true;
                }
                Err(e) => {
                    return Err(Error::corrupt(format!(
                        "{}.log line {}: {}",
                        name,
                        i + 1,
                        e
                    )))
                }
            }
        }

        Ok(Replay {
            image,
            records,
            torn,
        })
    }

    /// Rewrites `path` so it holds one put record per key of `image`.
    async fn rewrite(path: &Path, image: &MemTable) -> Result<()> {
        let mut buf = Vec::new();
        for (key, row) in image {
            let record = LogRecord::Put {
                key: key.clone(),
                row: row.clone(),
            };
            serde_json::to_writer(&mut buf, &record)?;
            buf.push(b'\n');
        }
        let tmp = path.with_extension("log.tmp");
        fs::write(&tmp, buf).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn open_append(path: &Path) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?)
    }

    async fn append(&mut self, table: &str, record: &LogRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let log = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::table_not_found(table))?;
        log.file.write_all(&line).await?;
        log.file.flush().await?;
        log.records += 1;
        Ok(())
    }
}

#[async_trait]
impl Adapter for LogAdapter {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn connect(&mut self, id: &str) -> Result<bool> {
        let dir = Self::store_dir(&self.base_dir, id);
        let existing = fs::try_exists(&dir).await?;
        if !existing {
            fs::create_dir_all(&dir).await?;
        }
        debug!(dir = %dir.display(), existing, "log adapter connected");
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
        let path = self.log_path(name)?;

        let (image, mut records) = if fs::try_exists(&path).await? {
            let text = fs::read_to_string(&path).await?;
            let replay = Self::replay(name, &text)?;
            let dead = replay.records.saturating_sub(replay.image.len());
            let compact = dead > replay.image.len() && replay.records > COMPACT_MIN_RECORDS;
            if compact || replay.torn {
                if compact {
                    warn!(table = name, records = replay.records, live = replay.image.len(), "compacting log");
                }
                Self::rewrite(&path, &replay.image).await?;
                let live = replay.image.len();
                (replay.image, live)
            } else {
                (replay.image, replay.records)
            }
        } else {
            (MemTable::new(), 0)
        };
        if image.is_empty() {
            records = 0;
            Self::rewrite(&path, &image).await?;
        }

        let file = Self::open_append(&path).await?;
        debug!(table = name, rows = image.len(), "log table opened");
        self.tables.insert(
            name.to_string(),
            LogTable {
                image,
                file,
                records,
            },
        );
        Ok(())
    }

    async fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables.remove(name);
        let path = self.log_path(name)?;
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
        let record = LogRecord::Put {
            key: key.clone(),
            row: row.cloned(),
        };
        self.append(table, &record).await?;
        if let Some(log) = self.tables.get_mut(table) {
            log.image.insert(key.clone(), row.cloned());
        }
        trace!(table, %key, "log append");
        Ok(key.clone())
    }

    async fn read(&self, table: &str, key: &RowKey) -> Result<Option<Row>> {
        Ok(self.table(table)?.image.get(key).cloned().flatten())
    }

    async fn delete(&mut self, table: &str, key: &RowKey) -> Result<()> {
        if !self.table(table)?.image.contains_key(key) {
            return Ok(());
        }
        self.append(table, &LogRecord::Del { key: key.clone() }).await?;
        if let Some(log) = self.tables.get_mut(table) {
            log.image.remove(key);
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
        scan(&self.table(table)?.image, range, reverse, on_row);
        Ok(())
    }

    async fn get_table_index(&self, table: &str) -> Result<Vec<RowKey>> {
        Ok(self.table(table)?.image.keys().cloned().collect())
    }

    async fn get_table_index_length(&self, table: &str) -> Result<usize> {
        Ok(self.table(table)?.image.len())
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
