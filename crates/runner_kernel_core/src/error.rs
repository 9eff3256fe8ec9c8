//! Kernel error taxonomy and the uniform error handler.
//!
//! # Responsibility
//! - Classify every failure that can reach the dispatch boundary.
//! - Normalize failures into the `{success, error, code, details, timestamp}`
//!   response shape and keep an in-memory error history.
//!
//! # Invariants
//! - Every `KernelError` carries exactly one `ErrorCode`.
//! - `ErrorHandler::handle` never fails and never panics.

use crate::module::{ManifestError, ModuleError};
use crate::permission::PermissionDenied;
use crate::status::StatusError;
use crate::validation::ValidationError;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type KernelResult<T> = Result<T, KernelError>;

/// Stable error codes exposed in error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "E000")]
    Unknown,
    #[serde(rename = "E001")]
    Validation,
    #[serde(rename = "E002")]
    ModuleNotFound,
    #[serde(rename = "E003")]
    ActionNotFound,
    #[serde(rename = "E004")]
    PermissionDenied,
    #[serde(rename = "E005")]
    ExecutionFailed,
    /// Reserved; nothing in the kernel raises it yet.
    #[serde(rename = "E006")]
    Timeout,
    #[serde(rename = "E007")]
    InvalidInput,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "E000",
            Self::Validation => "E001",
            Self::ModuleNotFound => "E002",
            Self::ActionNotFound => "E003",
            Self::PermissionDenied => "E004",
            Self::ExecutionFailed => "E005",
            Self::Timeout => "E006",
            Self::InvalidInput => "E007",
        }
    }

    /// Taxonomy name used in log lines.
    pub fn kind(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Validation => "validation",
            Self::ModuleNotFound => "module_not_found",
            Self::ActionNotFound => "action_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::ExecutionFailed => "execution_failed",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure at the kernel boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelError {
    pub message: String,
    pub code: ErrorCode,
    pub details: Map<String, Value>,
}

impl KernelError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn module_not_found(module: &str) -> Self {
        Self::new(ErrorCode::ModuleNotFound, format!("Module not found: {module}"))
            .with_detail("module", module)
    }

    pub fn action_not_found(module: &str, action: &str) -> Self {
        Self::new(ErrorCode::ActionNotFound, format!("Action not found: {action}"))
            .with_detail("module", module)
            .with_detail("action", action)
    }

    pub fn permission_denied(permission: &str) -> Self {
        Self::new(
            ErrorCode::PermissionDenied,
            format!("Permission denied: {permission}"),
        )
        .with_detail("required", permission)
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for KernelError {}

impl From<ValidationError> for KernelError {
    fn from(value: ValidationError) -> Self {
        let keys = value.keys();
        let error = Self::validation(value.to_string());
        if keys.is_empty() {
            return error;
        }
        error.with_detail("keys", keys)
    }
}

impl From<PermissionDenied> for KernelError {
    fn from(value: PermissionDenied) -> Self {
        Self::permission_denied(&value.permission).with_detail("principal", value.principal)
    }
}

impl From<ManifestError> for KernelError {
    fn from(value: ManifestError) -> Self {
        Self::validation(value.to_string())
    }
}

impl From<StatusError> for KernelError {
    fn from(value: StatusError) -> Self {
        Self::invalid_input(value.to_string())
    }
}

impl From<ModuleError> for KernelError {
    fn from(value: ModuleError) -> Self {
        Self::execution_failed(value.message())
    }
}

/// Wire shape returned by `ErrorHandler::handle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: ErrorCode,
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// One handled error, kept in the handler history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub error_id: Uuid,
    pub code: ErrorCode,
    pub message: String,
    pub details: Map<String, Value>,
    pub context: Value,
    pub timestamp: DateTime<Utc>,
}

/// Records failures and normalizes them into `ErrorResponse`.
#[derive(Debug, Default)]
pub struct ErrorHandler {
    history: Vec<ErrorRecord>,
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, error: &KernelError, context: Option<Value>) -> ErrorResponse {
        let record = ErrorRecord {
            error_id: Uuid::new_v4(),
            code: error.code,
            message: error.message.clone(),
            details: error.details.clone(),
            context: context.unwrap_or_else(|| json!({})),
            timestamp: Utc::now(),
        };
        warn!(
            "event=error_handled module=error status=error error_id={} error_code={} kind={}",
            record.error_id,
            record.code,
            record.code.kind()
        );
        let response = ErrorResponse {
            success: false,
            error: record.message.clone(),
            code: record.code,
            details: record.details.clone(),
            timestamp: record.timestamp,
        };
        self.history.push(record);
        response
    }

    pub fn history(&self) -> &[ErrorRecord] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
