//! Structural checks applied to every invocation request.
//!
//! All functions here are pure: no state, no logging, no side effects.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static MODULE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid module name regex"));
static ACTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid action regex"));

/// Context keys accepted by `validate_context`; anything else fails closed.
pub const ALLOWED_CONTEXT_KEYS: &[&str] =
    &["user", "session", "request_id", "permissions", "environment"];

const REQUIRED_REQUEST_FIELDS: &[&str] = &["module", "action"];

/// Returns whether `name` is a well-formed module name.
pub fn is_valid_module_name(name: &str) -> bool {
    MODULE_NAME_RE.is_match(name)
}

pub fn validate_module_name(name: &Value) -> Result<(), ValidationError> {
    let Some(name) = name.as_str() else {
        return Err(ValidationError::NotAString("module"));
    };
    if name.is_empty() {
        return Err(ValidationError::Empty("module"));
    }
    if !is_valid_module_name(name) {
        return Err(ValidationError::InvalidModuleName(name.to_string()));
    }
    Ok(())
}

pub fn validate_action(action: &Value) -> Result<(), ValidationError> {
    let Some(action) = action.as_str() else {
        return Err(ValidationError::NotAString("action"));
    };
    if action.is_empty() {
        return Err(ValidationError::Empty("action"));
    }
    if !ACTION_RE.is_match(action) {
        return Err(ValidationError::InvalidAction(action.to_string()));
    }
    Ok(())
}

/// Requires a JSON object containing every `required_keys` entry.
pub fn validate_params(params: &Value, required_keys: &[&str]) -> Result<(), ValidationError> {
    let Some(map) = params.as_object() else {
        return Err(ValidationError::NotAMapping("params"));
    };
    let missing = required_keys
        .iter()
        .filter(|key| !map.contains_key(**key))
        .map(|key| (*key).to_string())
        .collect::<BTreeSet<_>>();
    if !missing.is_empty() {
        return Err(ValidationError::MissingKeys(missing));
    }
    Ok(())
}

/// `None` and JSON `null` are valid; otherwise an object with allow-listed keys.
pub fn validate_context(context: Option<&Value>) -> Result<(), ValidationError> {
    let Some(context) = context else {
        return Ok(());
    };
    if context.is_null() {
        return Ok(());
    }
    let Some(map) = context.as_object() else {
        return Err(ValidationError::NotAMapping("context"));
    };
    let unknown = map
        .keys()
        .filter(|key| !ALLOWED_CONTEXT_KEYS.contains(&key.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>();
    if !unknown.is_empty() {
        return Err(ValidationError::UnknownContextKeys(unknown));
    }
    Ok(())
}

/// Validates `{module, action, params?, context?}` in order, stopping at the
/// first failure.
pub fn validate_execution_request(request: &Value) -> Result<(), ValidationError> {
    let Some(map) = request.as_object() else {
        return Err(ValidationError::NotAMapping("request"));
    };
    let missing = REQUIRED_REQUEST_FIELDS
        .iter()
        .filter(|field| !map.contains_key(**field))
        .map(|field| (*field).to_string())
        .collect::<BTreeSet<_>>();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    validate_module_name(&map["module"])?;
    validate_action(&map["action"])?;
    if let Some(params) = map.get("params") {
        validate_params(params, &[])?;
    }
    validate_context(map.get("context"))
}

/// Structural validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NotAString(&'static str),
    NotAMapping(&'static str),
    Empty(&'static str),
    InvalidModuleName(String),
    InvalidAction(String),
    MissingKeys(BTreeSet<String>),
    MissingFields(BTreeSet<String>),
    UnknownContextKeys(BTreeSet<String>),
}

impl ValidationError {
    /// Offending keys for set-valued failures, empty otherwise.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Self::MissingKeys(keys) | Self::MissingFields(keys) | Self::UnknownContextKeys(keys) => {
                keys.iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAString(field) => write!(f, "{field} must be a string"),
            Self::NotAMapping(field) => write!(f, "{field} must be a key-value mapping"),
            Self::Empty(field) => write!(f, "{field} cannot be empty"),
            Self::InvalidModuleName(value) => write!(
                f,
                "invalid module name `{value}`: must start with a letter and contain only alphanumeric, underscore, or hyphen"
            ),
            Self::InvalidAction(value) => write!(
                f,
                "invalid action `{value}`: must start with a letter and contain only alphanumeric or underscore"
            ),
            Self::MissingKeys(keys) => write!(f, "missing required keys: {}", join(keys)),
            Self::MissingFields(keys) => write!(f, "missing required fields: {}", join(keys)),
            Self::UnknownContextKeys(keys) => write!(f, "unknown context keys: {}", join(keys)),
        }
    }
}

impl Error for ValidationError {}

fn join(keys: &BTreeSet<String>) -> String {
    keys.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::{
        validate_action, validate_context, validate_execution_request, validate_module_name,
        validate_params, ValidationError,
    };
    use serde_json::json;
    use std::collections::BTreeSet;

    fn keys(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn module_name_accepts_letters_digits_underscore_hyphen() {
        validate_module_name(&json!("test_module")).expect("underscore name");
        validate_module_name(&json!("TestModule123")).expect("mixed case name");
        validate_module_name(&json!("calc-v2")).expect("hyphen name");
    }

    #[test]
    fn module_name_rejects_bad_shapes() {
        assert_eq!(
            validate_module_name(&json!("")),
            Err(ValidationError::Empty("module"))
        );
        assert_eq!(
            validate_module_name(&json!(null)),
            Err(ValidationError::NotAString("module"))
        );
        assert!(matches!(
            validate_module_name(&json!("123_invalid")),
            Err(ValidationError::InvalidModuleName(_))
        ));
        assert!(matches!(
            validate_module_name(&json!("has space")),
            Err(ValidationError::InvalidModuleName(_))
        ));
    }

    #[test]
    fn action_rejects_hyphen_and_empty() {
        validate_action(&json!("execute_test")).expect("underscore action");
        assert_eq!(validate_action(&json!("")), Err(ValidationError::Empty("action")));
        assert!(matches!(
            validate_action(&json!("do-it")),
            Err(ValidationError::InvalidAction(_))
        ));
    }

    #[test]
    fn params_report_every_missing_key() {
        validate_params(&json!({"a": 1}), &["a"]).expect("present key");
        validate_params(&json!({}), &[]).expect("no required keys");

        let err = validate_params(&json!({"a": 1}), &["a", "b", "c"])
            .expect_err("missing keys must fail");
        assert_eq!(err, ValidationError::MissingKeys(keys(&["b", "c"])));
        assert_eq!(err.keys(), vec!["b".to_string(), "c".to_string()]);

        assert_eq!(
            validate_params(&json!("not a map"), &[]),
            Err(ValidationError::NotAMapping("params"))
        );
    }

    #[test]
    fn context_fails_closed_on_unknown_keys() {
        validate_context(None).expect("absent context");
        validate_context(Some(&json!(null))).expect("null context");
        validate_context(Some(&json!({"user": "alice", "request_id": "r-1"})))
            .expect("allow-listed keys");

        let err = validate_context(Some(&json!({"user": "alice", "debug": true})))
            .expect_err("unknown key must fail");
        assert_eq!(err, ValidationError::UnknownContextKeys(keys(&["debug"])));

        assert_eq!(
            validate_context(Some(&json!([1, 2]))),
            Err(ValidationError::NotAMapping("context"))
        );
    }

    #[test]
    fn execution_request_checks_in_order() {
        validate_execution_request(&json!({
            "module": "calc",
            "action": "add",
            "params": {"a": 5, "b": 3},
            "context": {"user": "alice"}
        }))
        .expect("valid request");

        assert_eq!(
            validate_execution_request(&json!({"action": "add"})),
            Err(ValidationError::MissingFields(keys(&["module"])))
        );

        // Bad module and bad action: module is reported first.
        assert!(matches!(
            validate_execution_request(&json!({"module": "1bad", "action": "-"})),
            Err(ValidationError::InvalidModuleName(_))
        ));
        assert!(matches!(
            validate_execution_request(&json!({"module": "calc", "action": "-", "params": 3})),
            Err(ValidationError::InvalidAction(_))
        ));
        assert_eq!(
            validate_execution_request(&json!({"module": "calc", "action": "add", "params": 3})),
            Err(ValidationError::NotAMapping("params"))
        );
        assert!(matches!(
            validate_execution_request(&json!({
                "module": "calc",
                "action": "add",
                "context": {"token": "x"}
            })),
            Err(ValidationError::UnknownContextKeys(_))
        ));
        assert_eq!(
            validate_execution_request(&json!("calc.add")),
            Err(ValidationError::NotAMapping("request"))
        );
    }
}
