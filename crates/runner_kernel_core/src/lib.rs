//! Core of the runner kernel.
//! This crate is the single source of truth for dispatch, permission,
//! validation and lifecycle invariants.

pub mod config;
pub mod context;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod module;
pub mod permission;
pub mod registry;
pub mod status;
pub mod validation;
pub mod version;

pub use config::KernelConfig;
pub use context::KernelContext;
pub use error::{ErrorCode, ErrorHandler, ErrorResponse, KernelError, KernelResult};
pub use kernel::{ExecutionResult, Kernel, KernelStatus, KERNEL_VERSION};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use module::{KernelModule, ManifestReport, ModuleError, ModuleFactory, ModuleManifest};
pub use permission::{PermissionDenied, PermissionGate, PermissionGrant};
pub use registry::{Registry, RegistryEntry};
pub use status::{LifecycleStatus, StatusMachine, StatusTransition};
pub use validation::{validate_execution_request, ValidationError};
pub use version::{Version, VersionControl, VersionError, VersionField};
