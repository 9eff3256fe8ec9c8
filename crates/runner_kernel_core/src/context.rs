//! Process-level kernel wiring.
//!
//! # Responsibility
//! - Own one instance of every kernel component, each behind its own lock.
//! - Provide the guarded dispatch path: validate, authorize, check lifecycle,
//!   then execute.
//! - Keep registry status a mirror of the status machine when transitions go
//!   through `transition_module`.
//!
//! # Invariants
//! - `invoke` never fails; every rejection is an error envelope.
//! - Lock order is status machine before registry.
//! - Lock poisoning is recovered, never propagated as a panic.

use crate::config::KernelConfig;
use crate::error::{ErrorCode, ErrorHandler, KernelError, KernelResult};
use crate::kernel::{ExecutionResult, Kernel, KernelStatus, KERNEL_VERSION};
use crate::logging::init_logging;
use crate::module::{KernelModule, ModuleManifest};
use crate::permission::PermissionGate;
use crate::registry::Registry;
use crate::status::{LifecycleStatus, StatusMachine, StatusTransition};
use crate::validation::validate_execution_request;
use crate::version::{Version, VersionControl};
use log::{info, warn};
use serde_json::{json, Map, Value};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Kernel plus its governance components.
pub struct KernelContext {
    kernel: Kernel,
    registry: Mutex<Registry>,
    status: Mutex<StatusMachine>,
    permissions: RwLock<PermissionGate>,
    versions: Mutex<VersionControl>,
    errors: Mutex<ErrorHandler>,
}

impl Default for KernelContext {
    fn default() -> Self {
        Self::with_registry(Registry::new())
    }
}

impl KernelContext {
    /// Boots a context from `config`.
    ///
    /// # Errors
    /// - `InvalidInput` when logging cannot start with the given level or dir.
    ///
    /// An unreadable registry file does not fail boot; see
    /// `Registry::last_persist_error`.
    pub fn new(config: &KernelConfig) -> KernelResult<Self> {
        if let Some(log_dir) = &config.log_dir {
            init_logging(&config.log_level, log_dir)
                .map_err(|err| KernelError::invalid_input(err.to_string()))?;
        }
        let registry = match &config.registry_path {
            Some(path) => Registry::open(path),
            None => Registry::new(),
        };
        info!(
            "event=context_init module=context status=ok registry_entries={} persistent={}",
            registry.count(None),
            registry.path().is_some()
        );
        Ok(Self::with_registry(registry))
    }

    /// Memory-only context with no logging side effects.
    pub fn in_memory() -> Self {
        Self::default()
    }

    fn with_registry(registry: Registry) -> Self {
        Self {
            kernel: Kernel::new(),
            registry: Mutex::new(registry),
            status: Mutex::new(StatusMachine::new()),
            permissions: RwLock::new(PermissionGate::new()),
            versions: Mutex::new(VersionControl::new()),
            errors: Mutex::new(ErrorHandler::new()),
        }
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status_machine(&self) -> MutexGuard<'_, StatusMachine> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn permissions(&self) -> RwLockReadGuard<'_, PermissionGate> {
        self.permissions.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn permissions_mut(&self) -> RwLockWriteGuard<'_, PermissionGate> {
        self.permissions.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn versions(&self) -> MutexGuard<'_, VersionControl> {
        self.versions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn error_handler(&self) -> MutexGuard<'_, ErrorHandler> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> KernelStatus {
        self.kernel.status()
    }

    /// Registers a module with the dispatcher, registry and version history.
    ///
    /// New modules enter the registry as `experimental` and are promoted to
    /// `active`. A module already present in a loaded registry keeps its
    /// persisted status; the status machine is replayed up to it.
    ///
    /// # Errors
    /// - `Validation` when the manifest is invalid or the name is taken.
    pub fn install_module<F>(
        &self,
        factory: F,
        config: Map<String, Value>,
    ) -> KernelResult<ModuleManifest>
    where
        F: Fn() -> Box<dyn KernelModule> + Send + Sync + 'static,
    {
        let manifest = factory().manifest();
        manifest.validate()?;
        let name = manifest.name.clone();

        let kernel_version = Version::parse(KERNEL_VERSION)
            .map_err(|err| KernelError::new(ErrorCode::Unknown, err.to_string()))?;
        let mut report = manifest.report();
        report.merge(manifest.kernel_compatibility(kernel_version));
        if !report.valid {
            return Err(KernelError::validation(report.errors.join("; "))
                .with_detail("module", name.as_str()));
        }
        for warning in &report.warnings {
            warn!("event=module_install module=context status=warning name={name} warning={warning}");
        }

        if !self.kernel.register_module_with_config(&name, factory, config) {
            return Err(KernelError::validation(format!(
                "module already installed: {name}"
            )));
        }

        let mut status = self.status_machine();
        let mut registry = self.registry();
        let persisted = registry.get(&name).map(|entry| entry.status);
        match persisted {
            Some(target) => {
                registry.update_manifest(&name, manifest.clone());
                replay_status(&mut status, &name, target);
            }
            None => {
                registry.register_with_status(
                    &name,
                    &manifest.version,
                    manifest.clone(),
                    LifecycleStatus::Experimental,
                );
                status.transition(&name, LifecycleStatus::Active, "installed")?;
                registry.update_status(&name, LifecycleStatus::Active);
            }
        }
        drop(registry);
        drop(status);

        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("install"));
        self.versions()
            .register_version(&name, &manifest.version, Some(metadata));

        info!(
            "event=module_install module=context status=ok name={name} version={}",
            manifest.version
        );
        Ok(manifest)
    }

    /// Moves a registered module through the status machine, then mirrors
    /// the result into the registry.
    ///
    /// Returns the audit record, or `None` for a self-transition.
    ///
    /// # Errors
    /// - `ModuleNotFound` when the registry has no such module.
    /// - `InvalidInput` when the transition table forbids the move.
    pub fn transition_module(
        &self,
        name: &str,
        to: LifecycleStatus,
        reason: &str,
    ) -> KernelResult<Option<StatusTransition>> {
        let mut status = self.status_machine();
        let mut registry = self.registry();
        if !registry.exists(name) {
            return Err(KernelError::module_not_found(name));
        }
        let transition = status.transition(name, to, reason)?;
        registry.update_status(name, to);
        Ok(transition)
    }

    /// Guarded dispatch of a `{module, action, params?, context?}` request.
    ///
    /// Checks run in order: request shape, principal access, registry
    /// lifecycle. Rejections are returned as error envelopes; accepted requests
    /// go to `Kernel::execute`. Every failure, before or after dispatch, is
    /// recorded by the error handler.
    pub fn invoke(&self, principal: &str, request: &Value) -> ExecutionResult {
        match self.authorize(principal, request) {
            Ok((module, action)) => {
                let params = request.get("params").cloned();
                let context = request.get("context").filter(|c| !c.is_null()).cloned();
                let result = self.kernel.execute(module, action, params, context);
                if !result.success {
                    self.record_failure(principal, &result);
                }
                result
            }
            Err(err) => self.reject(principal, request, &err),
        }
    }

    fn authorize<'r>(&self, principal: &str, request: &'r Value) -> KernelResult<(&'r str, &'r str)> {
        validate_execution_request(request)?;
        let module = request["module"].as_str().unwrap_or_default();
        let action = request["action"].as_str().unwrap_or_default();

        self.permissions().require_access(principal, module, action)?;

        let lifecycle = self.registry().get(module).map(|entry| entry.status);
        match lifecycle {
            Some(LifecycleStatus::Disabled) => {
                return Err(
                    KernelError::permission_denied(&format!("{module}:{action}"))
                        .with_detail("status", LifecycleStatus::Disabled.as_str()),
                );
            }
            Some(LifecycleStatus::Deprecated) => {
                warn!("event=module_invoke module=context status=deprecated name={module} action={action}");
            }
            _ => {}
        }
        Ok((module, action))
    }

    fn reject(&self, principal: &str, request: &Value, err: &KernelError) -> ExecutionResult {
        let mut metadata = Map::new();
        metadata.insert("principal".to_string(), json!(principal));
        for key in ["module", "action"] {
            if let Some(value) = request.get(key).filter(|value| value.is_string()) {
                metadata.insert(key.to_string(), value.clone());
            }
        }

        let response = self
            .error_handler()
            .handle(err, Some(Value::Object(metadata.clone())));
        if !response.details.is_empty() {
            metadata.insert("details".to_string(), Value::Object(response.details));
        }
        ExecutionResult::from_kernel_error(err, metadata)
    }

    fn record_failure(&self, principal: &str, result: &ExecutionResult) {
        let err = KernelError::new(
            result.code().unwrap_or(ErrorCode::Unknown),
            result.error.clone().unwrap_or_default(),
        );
        let mut context = Map::new();
        context.insert("principal".to_string(), json!(principal));
        for key in ["module", "action", "execution_id"] {
            if let Some(value) = result.metadata.get(key) {
                context.insert(key.to_string(), value.clone());
            }
        }
        self.error_handler().handle(&err, Some(Value::Object(context)));
    }
}

/// Drives a fresh module from `experimental` to `target` along allowed edges.
///
/// `experimental` itself is recorded as an explicit state without audit.
fn replay_status(status: &mut StatusMachine, name: &str, target: LifecycleStatus) {
    let path: &[LifecycleStatus] = match target {
        LifecycleStatus::Experimental => &[LifecycleStatus::Experimental],
        LifecycleStatus::Active => &[LifecycleStatus::Active],
        LifecycleStatus::Deprecated => &[LifecycleStatus::Active, LifecycleStatus::Deprecated],
        LifecycleStatus::Disabled => &[LifecycleStatus::Disabled],
    };
    for step in path {
        if let Err(err) = status.transition(name, *step, "restored from registry") {
            warn!("event=status_restore module=context status=error name={name} error={err}");
            return;
        }
    }
}
