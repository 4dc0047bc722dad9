//! Store configuration.
//!
//! `StoreConfig` is plain data with serde defaults so it can be embedded in an
//! application's own config file. Backend selection happens once, at boot, in
//! `StoreConfig::resolve_mode`.

use crate::environment::Environment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Persistence backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Process memory only.
    Memory,
    /// Whole-table snapshots on disk.
    Snapshot,
    /// Append-only logs on disk.
    Log,
}

impl BackendMode {
    /// Backends tried, best first, when no mode is configured.
    pub const PREFERENCE: [BackendMode; 3] =
        [BackendMode::Log, BackendMode::Snapshot, BackendMode::Memory];

    /// Returns the lowercase mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Memory => "memory",
            BackendMode::Snapshot => "snapshot",
            BackendMode::Log => "log",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store identifier; names the on-disk directory.
    #[serde(default = "default_id")]
    pub id: String,

    /// Keep data across restarts.
    #[serde(default)]
    pub persistent: bool,

    /// Record history points for user-table mutations.
    #[serde(default = "default_true")]
    pub history: bool,

    /// Mirror every row in memory.
    #[serde(default = "default_true")]
    pub memory: bool,

    /// Backend to use. Chosen automatically when unset.
    #[serde(default)]
    pub mode: Option<BackendMode>,

    /// Advisory storage size hint in MB.
    #[serde(default = "default_size")]
    pub size: u64,

    /// Root directory for on-disk backends.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
}

fn default_id() -> String {
    "keel".to_string()
}

fn default_true() -> bool {
    true
}

fn default_size() -> u64 {
    5
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            persistent: false,
            history: true,
            memory: true,
            mode: None,
            size: default_size(),
            base_dir: default_base_dir(),
        }
    }
}

impl StoreConfig {
    /// Creates a default configuration for store `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets whether data survives restarts.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Sets whether history points are recorded.
    pub fn history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    /// Sets whether rows are mirrored in memory.
    pub fn memory(mut self, memory: bool) -> Self {
        self.memory = memory;
        self
    }

    /// Pins the backend.
    pub fn mode(mut self, mode: BackendMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Sets the advisory size hint.
    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Sets the root directory for on-disk backends.
    pub fn base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Picks the backend for this configuration.
    ///
    /// A non-persistent store always runs in memory. A pinned mode the
    /// environment cannot provide falls back to memory. Otherwise the best
    /// supported backend wins. Memory mode forces `memory` on, since the mirror
    /// is then the only copy of the data.
    pub fn resolve_mode(&mut self, env: &dyn Environment) -> BackendMode {
        let mode = if !self.persistent {
            BackendMode::Memory
        } else {
            match self.mode {
                Some(mode) if env.supports(mode, self) => mode,
                Some(mode) => {
                    warn!(requested = %mode, "backend not supported here, falling back to memory");
                    BackendMode::Memory
                }
                None => {
                    let mode = BackendMode::PREFERENCE
                        .into_iter()
                        .find(|m| env.supports(*m, self))
                        .unwrap_or(BackendMode::Memory);
                    info!(%mode, "backend selected automatically");
                    mode
                }
            }
        };

        if mode == BackendMode::Memory && !self.memory {
            warn!("memory mirror is required by the memory backend, enabling it");
            self.memory = true;
        }
        mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::StaticEnvironment;

    #[test]
    fn test_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.id, "keel");
        assert!(!config.persistent);
        assert!(config.history);
        assert!(config.memory);
        assert_eq!(config.mode, None);
        assert_eq!(config.size, 5);
    }

    #[test]
    fn test_deserialize_mode() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"id":"app","persistent":true,"mode":"snapshot"}"#).unwrap();
        assert_eq!(config.mode, Some(BackendMode::Snapshot));
        assert_eq!(config.id, "app");
    }

    #[test]
    fn test_not_persistent_is_memory() {
        let env = StaticEnvironment::all();
        let mut config = StoreConfig::new("t").mode(BackendMode::Log);
        assert_eq!(config.resolve_mode(&env), BackendMode::Memory);
    }

    #[test]
    fn test_pinned_mode() {
        let env = StaticEnvironment::all();
        let mut config = StoreConfig::new("t").persistent(true).mode(BackendMode::Snapshot);
        assert_eq!(config.resolve_mode(&env), BackendMode::Snapshot);
    }

    #[test]
    fn test_unsupported_mode_downgrades() {
        let env = StaticEnvironment::only(&[BackendMode::Memory]);
        let mut config = StoreConfig::new("t")
            .persistent(true)
            .memory(false)
            .mode(BackendMode::Log);
        assert_eq!(config.resolve_mode(&env), BackendMode::Memory);
        assert!(config.memory);
    }

    #[test]
    fn test_auto_detect_prefers_log() {
        let mut config = StoreConfig::new("t").persistent(true);
        assert_eq!(config.resolve_mode(&StaticEnvironment::all()), BackendMode::Log);

        let env = StaticEnvironment::only(&[BackendMode::Memory, BackendMode::Snapshot]);
        assert_eq!(config.resolve_mode(&env), BackendMode::Snapshot);
    }
}
