//! Keel Storage - Row store, backend adapters and secondary indexes.
//!
//! This crate provides the storage core:
//!
//! - `Store`: Memory mirror, key index and write-through to a backend
//! - `TableRegistry`: Derived table state, including history and utility tables
//! - `Adapter` / `IndexAdapter`: Backend abstraction
//! - `MemoryAdapter`, `SnapshotAdapter`, `LogAdapter`, `NullAdapter`: Backends
//! - `MemoryIndex`: Secondary index engine over any adapter
//! - `StoreConfig` / `Environment`: Configuration and backend selection
//!
//! # Example
//!
//! ```rust
//! use keel_core::schema::ColumnModel;
//! use keel_core::{DataType, Row, RowKey, Value};
//! use keel_storage::{Selection, Store, StoreConfig, TableModel};
//!
//! # tokio_test_block(async {
//! let users = TableModel::new(
//!     "users",
//!     vec![
//!         ColumnModel::new("id", DataType::Int).primary_key().auto_increment(),
//!         ColumnModel::new("name", DataType::String),
//!     ],
//! );
//! let mut store = Store::open(StoreConfig::new("app"), vec![users]).await.unwrap();
//!
//! let key = store
//!     .upsert("users", None, Row::new().with("name", "Alice"))
//!     .await
//!     .unwrap();
//! assert_eq!(key, RowKey::Int(1));
//!
//! let rows = store.read("users", Selection::All).await.unwrap();
//! assert_eq!(rows[0].get("name"), Some(&Value::from("Alice")));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod environment;
pub mod memory_index;
pub mod registry;
pub mod store;

pub use adapter::{
    Adapter, IndexAdapter, LogAdapter, MemoryAdapter, NullAdapter, ReadRange, SnapshotAdapter,
};
pub use config::{BackendMode, StoreConfig};
pub use environment::{Environment, HostEnvironment, StaticEnvironment};
pub use memory_index::{IndexLoadPolicy, MemoryIndex};
pub use registry::{TableId, TableModel, TableRegistry, TableState};
pub use store::{RowFilter, Selection, Store};
