//! Uniform success/error envelope returned by every dispatch call.

use crate::error::{ErrorCode, KernelError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dispatcher outcome: `{success, data, error, metadata, timestamp}`.
///
/// `data` is meaningful only when `success`; `error` only when not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn ok(data: Value, metadata: Map<String, Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Error envelope tagged with the error's `code` in metadata.
    pub fn from_kernel_error(error: &KernelError, mut metadata: Map<String, Value>) -> Self {
        metadata.insert(
            "code".to_string(),
            Value::String(error.code.as_str().to_string()),
        );
        Self::error(error.message.clone(), metadata)
    }

    pub fn execution_id(&self) -> Option<u64> {
        self.metadata.get("execution_id").and_then(Value::as_u64)
    }

    /// Error code recorded in metadata, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        let raw = self.metadata.get("code")?.clone();
        serde_json::from_value(raw).ok()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
