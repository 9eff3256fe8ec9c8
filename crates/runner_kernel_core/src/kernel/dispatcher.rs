//! Module handler table and action dispatch.
//!
//! # Responsibility
//! - Map module names to module factories.
//! - Route `(module, action, params, context)` calls and wrap every outcome
//!   in an `ExecutionResult`.
//!
//! # Invariants
//! - Every `execute` call consumes exactly one execution id, failures included.
//! - Execution ids are gap-free and unique across threads.
//! - Module errors and panics never escape `execute`.
//! - No lock is held while module code runs.

use crate::error::KernelError;
use crate::kernel::envelope::ExecutionResult;
use crate::logging::{panic_payload_text, sanitize_message};
use crate::module::{KernelModule, ModuleFactory, ModuleManifest};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Version of the kernel execution contract.
pub const KERNEL_VERSION: &str = "1.0.0";

const MAX_PANIC_MESSAGE_CHARS: usize = 200;

struct RegisteredModule {
    factory: ModuleFactory,
    config: Map<String, Value>,
}

/// Snapshot returned by `Kernel::status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelStatus {
    pub version: String,
    pub registered_modules: Vec<String>,
    pub execution_count: u64,
}

/// In-process action router.
#[derive(Default)]
pub struct Kernel {
    modules: RwLock<BTreeMap<String, Arc<RegisteredModule>>>,
    execution_count: AtomicU64,
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module factory with an empty init config.
    ///
    /// Returns `false` for blank names or names already registered.
    pub fn register_module<F>(&self, name: &str, factory: F) -> bool
    where
        F: Fn() -> Box<dyn KernelModule> + Send + Sync + 'static,
    {
        self.register_module_with_config(name, factory, Map::new())
    }

    /// Registers a module factory; `config` is passed to `initialize` on
    /// every invocation.
    pub fn register_module_with_config<F>(
        &self,
        name: &str,
        factory: F,
        config: Map<String, Value>,
    ) -> bool
    where
        F: Fn() -> Box<dyn KernelModule> + Send + Sync + 'static,
    {
        if name.trim().is_empty() {
            warn!("event=module_register module=kernel status=rejected error_code=empty_name");
            return false;
        }
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        if modules.contains_key(name) {
            warn!("event=module_register module=kernel status=rejected error_code=duplicate name={name}");
            return false;
        }
        modules.insert(
            name.to_string(),
            Arc::new(RegisteredModule {
                factory: Box::new(factory),
                config,
            }),
        );
        info!("event=module_register module=kernel status=ok name={name}");
        true
    }

    pub fn unregister_module(&self, name: &str) -> bool {
        let removed = self
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            info!("event=module_unregister module=kernel status=ok name={name}");
        }
        removed
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Sorted registered module names.
    pub fn module_names(&self) -> Vec<String> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Instantiates the module once to read its manifest.
    pub fn manifest_of(&self, name: &str) -> Option<ModuleManifest> {
        let entry = self.lookup(name)?;
        panic::catch_unwind(AssertUnwindSafe(|| (entry.factory)().manifest())).ok()
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::SeqCst)
    }

    /// Routes one action call.
    ///
    /// Never fails: lookup misses, init refusals, module errors and module
    /// panics all come back as error envelopes with
    /// `{module, action, execution_id}` metadata.
    pub fn execute(
        &self,
        module_name: &str,
        action: &str,
        params: Option<Value>,
        context: Option<Value>,
    ) -> ExecutionResult {
        let execution_id = self.execution_count.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Instant::now();
        let metadata = execution_metadata(module_name, action, execution_id);

        let Some(entry) = self.lookup(module_name) else {
            warn!(
                "event=kernel_execute module=kernel status=error execution_id={execution_id} error_code=module_not_found name={module_name}"
            );
            return ExecutionResult::from_kernel_error(
                &KernelError::module_not_found(module_name),
                metadata,
            );
        };

        let params = params.unwrap_or_else(|| json!({}));
        let context = context.unwrap_or_else(|| json!({}));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            invoke(&entry, module_name, action, &params, &context)
        }))
        .unwrap_or_else(|payload| {
            Err(KernelError::execution_failed(sanitize_message(
                &panic_payload_text(payload.as_ref()),
                MAX_PANIC_MESSAGE_CHARS,
            )))
        });

        let duration_ms = started_at.elapsed().as_millis();
        match outcome {
            Ok(data) => {
                info!(
                    "event=kernel_execute module=kernel status=ok execution_id={execution_id} name={module_name} action={action} duration_ms={duration_ms}"
                );
                ExecutionResult::ok(data, metadata)
            }
            Err(err) => {
                warn!(
                    "event=kernel_execute module=kernel status=error execution_id={execution_id} name={module_name} action={action} duration_ms={duration_ms} error_code={}",
                    err.code.kind()
                );
                ExecutionResult::from_kernel_error(&err, metadata)
            }
        }
    }

    pub fn status(&self) -> KernelStatus {
        KernelStatus {
            version: KERNEL_VERSION.to_string(),
            registered_modules: self.module_names(),
            execution_count: self.execution_count(),
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<RegisteredModule>> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

fn invoke(
    entry: &RegisteredModule,
    module_name: &str,
    action: &str,
    params: &Value,
    context: &Value,
) -> Result<Value, KernelError> {
    let mut module = (entry.factory)();
    if !module.has_action(action) {
        return Err(KernelError::action_not_found(module_name, action));
    }
    if !module.initialize(&entry.config) {
        return Err(KernelError::execution_failed(format!(
            "Module initialization failed: {module_name}"
        )));
    }
    debug!("event=module_invoke module=kernel status=start name={module_name} action={action}");
    module
        .execute(action, params, context)
        .map_err(KernelError::from)
}

fn execution_metadata(module: &str, action: &str, execution_id: u64) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("module".to_string(), json!(module));
    metadata.insert("action".to_string(), json!(action));
    metadata.insert("execution_id".to_string(), json!(execution_id));
    metadata
}
