//! Kernel boot configuration.
//!
//! Values come from defaults or `RUNNER_KERNEL_*` environment variables.
//! Blank variables are treated as unset.

use crate::logging::default_log_level;
use std::env;
use std::path::PathBuf;

pub const REGISTRY_PATH_ENV: &str = "RUNNER_KERNEL_REGISTRY_PATH";
pub const LOG_LEVEL_ENV: &str = "RUNNER_KERNEL_LOG_LEVEL";
pub const LOG_DIR_ENV: &str = "RUNNER_KERNEL_LOG_DIR";

/// Settings consumed by `KernelContext::new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Registry JSON file; `None` keeps the registry in memory.
    pub registry_path: Option<PathBuf>,
    pub log_level: String,
    /// Directory for rotating log files; `None` leaves logging uninitialized.
    pub log_dir: Option<PathBuf>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            registry_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl KernelConfig {
    /// Defaults overridden by any non-blank `RUNNER_KERNEL_*` variable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(path) = read(REGISTRY_PATH_ENV) {
            config.registry_path = Some(PathBuf::from(path));
        }
        if let Some(level) = read(LOG_LEVEL_ENV) {
            config.log_level = level;
        }
        if let Some(dir) = read(LOG_DIR_ENV) {
            config.log_dir = Some(PathBuf::from(dir));
        }
        config
    }

    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}
