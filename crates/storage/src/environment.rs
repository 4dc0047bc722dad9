//! Host capability detection.

use crate::config::{BackendMode, StoreConfig};
use std::path::Path;

/// Reports which backends the running host can provide.
pub trait Environment: Send + Sync {
    /// Returns whether `mode` can be used with `config`.
    fn supports(&self, mode: BackendMode, config: &StoreConfig) -> bool;
}

/// The local filesystem.
///
/// On-disk backends are available when the base directory exists or its
/// nearest existing ancestor is a writable directory. Nothing is created here;
/// the adapter makes the directory when it connects.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostEnvironment;

impl Environment for HostEnvironment {
    fn supports(&self, mode: BackendMode, config: &StoreConfig) -> bool {
        match mode {
            BackendMode::Memory => true,
            BackendMode::Snapshot | BackendMode::Log => creatable(&config.base_dir),
        }
    }
}

fn creatable(dir: &Path) -> bool {
    let existing = dir
        .ancestors()
        .map(|p| if p.as_os_str().is_empty() { Path::new(".") } else { p })
        .find(|p| p.exists());
    match existing {
        Some(p) if p.is_dir() => std::fs::metadata(p)
            .map(|m| !m.permissions().readonly())
            .unwrap_or(false),
        _ => false,
    }
}

/// An environment with a fixed set of backends.
#[derive(Debug, Clone)]
pub struct StaticEnvironment {
    modes: Vec<BackendMode>,
}

impl StaticEnvironment {
    /// Supports every backend.
    pub fn all() -> Self {
        Self {
            modes: BackendMode::PREFERENCE.to_vec(),
        }
    }

    /// Supports only `modes`.
    pub fn only(modes: &[BackendMode]) -> Self {
        Self {
            modes: modes.to_vec(),
        }
    }
}

impl Environment for StaticEnvironment {
    fn supports(&self, mode: BackendMode, _config: &StoreConfig) -> bool {
        self.modes.contains(&mode)
    }
}
