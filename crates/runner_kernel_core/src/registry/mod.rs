//! Module registry: name to `{version, status, manifest}` records.
//!
//! # Responsibility
//! - Track which modules are known and their lifecycle status.
//! - Optionally mirror every mutation into a JSON file.
//!
//! # Invariants
//! - Names are unique; `registered_at` never changes after insert.
//! - `updated_at` refreshes on every status or version mutation.
//! - Status writes here are unconditional; transition rules live in
//!   `status::StatusMachine`.
//! - A failed file write never rolls back the in-memory mutation.
//! - A failed file load never fails `open`.

pub mod store;

use crate::module::ModuleManifest;
use crate::status::LifecycleStatus;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use store::{RegistryStore, StoreError, StoreResult};

/// One registered module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub name: String,
    pub version: String,
    pub status: LifecycleStatus,
    pub manifest: ModuleManifest,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory registry with optional write-through file persistence.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<String, RegistryEntry>,
    store: Option<RegistryStore>,
    last_persist_error: Option<String>,
}

impl Registry {
    /// Memory-only registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a file-backed registry, loading existing entries.
    ///
    /// An unreadable or corrupt file is not fatal: the registry starts empty,
    /// the failure is kept in `last_persist_error`, and the file is left
    /// untouched until the next mutation rewrites it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = RegistryStore::new(path);
        let (entries, last_persist_error) = match store.load() {
            Ok(entries) => (entries, None),
            Err(err) => {
                warn!(
                    "event=registry_open module=registry status=degraded path={} error={}",
                    store.path().display(),
                    err
                );
                (BTreeMap::new(), Some(err.to_string()))
            }
        };
        Self {
            entries,
            store: Some(store),
            last_persist_error,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.store.as_ref().map(RegistryStore::path)
    }

    /// Registers a module as `active`.
    pub fn register(&mut self, name: &str, version: &str, manifest: ModuleManifest) -> bool {
        self.register_with_status(name, version, manifest, LifecycleStatus::Active)
    }

    /// Returns `false` when `name` is already registered; the existing entry
    /// stays untouched.
    pub fn register_with_status(
        &mut self,
        name: &str,
        version: &str,
        manifest: ModuleManifest,
        status: LifecycleStatus,
    ) -> bool {
        if self.entries.contains_key(name) {
            warn!("event=registry_register module=registry status=rejected error_code=duplicate name={name}");
            return false;
        }
        let now = Utc::now();
        self.entries.insert(
            name.to_string(),
            RegistryEntry {
                name: name.to_string(),
                version: version.to_string(),
                status,
                manifest,
                registered_at: now,
                updated_at: now,
            },
        );
        info!("event=registry_register module=registry status=ok name={name} lifecycle={status}");
        self.persist();
        true
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        if self.entries.remove(name).is_none() {
            return false;
        }
        info!("event=registry_unregister module=registry status=ok name={name}");
        self.persist();
        true
    }

    /// Overwrites the stored status without consulting the transition table.
    pub fn update_status(&mut self, name: &str, status: LifecycleStatus) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        entry.status = status;
        entry.updated_at = Utc::now();
        info!("event=registry_update module=registry status=ok name={name} lifecycle={status}");
        self.persist();
        true
    }

    pub fn update_version(&mut self, name: &str, version: &str) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        entry.version = version.to_string();
        entry.updated_at = Utc::now();
        info!("event=registry_update module=registry status=ok name={name} version={version}");
        self.persist();
        true
    }

    /// Replaces the stored manifest and takes the version from it.
    pub fn update_manifest(&mut self, name: &str, manifest: ModuleManifest) -> bool {
        let Some(entry) = self.entries.get_mut(name) else {
            return false;
        };
        entry.version = manifest.version.clone();
        entry.manifest = manifest;
        entry.updated_at = Utc::now();
        info!(
            "event=registry_update module=registry status=ok name={name} version={}",
            entry.version
        );
        self.persist();
        true
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    pub fn get_by_status(&self, status: LifecycleStatus) -> Vec<&RegistryEntry> {
        self.entries
            .values()
            .filter(|entry| entry.status == status)
            .collect()
    }

    pub fn list_all(&self) -> Vec<&RegistryEntry> {
        self.entries.values().collect()
    }

    /// Registered names in ascending order.
    pub fn list_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.get(name)
            .is_some_and(|entry| entry.status == LifecycleStatus::Active)
    }

    pub fn count(&self, status: Option<LifecycleStatus>) -> usize {
        match status {
            Some(status) => self.get_by_status(status).len(),
            None => self.entries.len(),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    /// Message of the most recent failed file load or write, cleared by the
    /// next successful write.
    pub fn last_persist_error(&self) -> Option<&str> {
        self.last_persist_error.as_deref()
    }

    fn persist(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        match store.save(&self.entries) {
            Ok(()) => self.last_persist_error = None,
            Err(err) => {
                warn!(
                    "event=registry_persist module=registry status=error entries={} error={}",
                    self.entries.len(),
                    err
                );
                self.last_persist_error = Some(err.to_string());
            }
        }
    }
}
