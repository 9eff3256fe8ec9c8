//! Module contract the kernel dispatches through.
//!
//! A module is any type implementing [`KernelModule`]: it declares a manifest,
//! accepts an initialization config and executes named actions over JSON
//! payloads. The kernel never inspects a module beyond these entry points.

pub mod manifest;

use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use manifest::{ManifestError, ManifestReport, ModuleManifest};

/// Capability interface every registered module implements.
pub trait KernelModule: Send {
    fn manifest(&self) -> ModuleManifest;

    /// Returns `false` when the module refuses the given config.
    fn initialize(&mut self, config: &Map<String, Value>) -> bool;

    fn execute(&mut self, action: &str, params: &Value, context: &Value)
        -> Result<Value, ModuleError>;

    /// Whether `action` can be routed to this module.
    ///
    /// Defaults to the manifest's declared action list.
    fn has_action(&self, action: &str) -> bool {
        self.manifest().declares_action(action)
    }
}

/// Produces a fresh module instance for one invocation.
pub type ModuleFactory = Box<dyn Fn() -> Box<dyn KernelModule> + Send + Sync>;

/// Failure raised by a module while executing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleError {
    message: String,
}

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ModuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for ModuleError {}

impl From<String> for ModuleError {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for ModuleError {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
