//! JSON file persistence for the module registry.
//!
//! # Responsibility
//! - Load the registry file keyed by module name.
//! - Rewrite the whole file after each registry mutation.
//!
//! # Invariants
//! - A missing file loads as an empty registry.
//! - Writes go to a sibling temp file first, then rename over the target.

use super::RegistryEntry;
use log::{error, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

/// Registry file I/O failures.
#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "registry file io error: {err}"),
            Self::Json(err) => write!(f, "registry file is not valid json: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// File-backed snapshot of registry entries.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all entries; an absent file yields an empty map.
    ///
    /// # Errors
    /// - `Io` when the file exists but cannot be read.
    /// - `Json` when the content is not a registry mapping.
    pub fn load(&self) -> StoreResult<BTreeMap<String, RegistryEntry>> {
        let started_at = Instant::now();
        if !self.path.exists() {
            info!("event=registry_load module=registry status=ok mode=empty");
            return Ok(BTreeMap::new());
        }

        let entries = fs::read_to_string(&self.path)
            .map_err(StoreError::from)
            .and_then(|raw| {
                serde_json::from_str::<BTreeMap<String, RegistryEntry>>(&raw)
                    .map_err(StoreError::from)
            });
        match entries {
            Ok(entries) => {
                info!(
                    "event=registry_load module=registry status=ok mode=file entries={} duration_ms={}",
                    entries.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(entries)
            }
            Err(err) => {
                error!(
                    "event=registry_load module=registry status=error mode=file duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Replaces the file content with `entries`.
    ///
    /// # Side effects
    /// - Creates missing parent directories.
    pub fn save(&self, entries: &BTreeMap<String, RegistryEntry>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(entries)?;
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, raw)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
