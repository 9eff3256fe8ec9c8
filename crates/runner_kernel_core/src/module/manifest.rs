//! Module manifest declaration and validation.

use crate::validation::is_valid_module_name;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Manifest fields that must be present at construction.
pub const REQUIRED_MANIFEST_FIELDS: &[&str] = &["name", "version", "description", "author"];

/// Declarative module manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module name, unique within one kernel (`^[A-Za-z][A-Za-z0-9_-]*$`).
    pub name: String,
    /// Module version string, expected as `major.minor.patch`.
    pub version: String,
    pub description: String,
    pub author: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Actions the dispatcher may route to this module.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Kernel version this module was built against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_version: Option<String>,
}

impl ModuleManifest {
    /// Creates a manifest with the mandatory fields and no actions.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            author: author.into(),
            dependencies: Vec::new(),
            actions: Vec::new(),
            kernel_version: None,
        }
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_kernel_version(mut self, kernel_version: impl Into<String>) -> Self {
        self.kernel_version = Some(kernel_version.into());
        self
    }

    /// Builds a manifest from a JSON mapping.
    ///
    /// # Errors
    /// - `MissingField` when a mandatory field is absent; never defaulted.
    /// - `InvalidField` when a mandatory field is not a string.
    /// - `Malformed` when optional fields have the wrong shape.
    pub fn from_value(value: &Value) -> Result<Self, ManifestError> {
        let Some(map) = value.as_object() else {
            return Err(ManifestError::Malformed(
                "manifest must be a key-value mapping".to_string(),
            ));
        };
        for field in REQUIRED_MANIFEST_FIELDS {
            match map.get(*field) {
                None => return Err(ManifestError::MissingField(*field)),
                Some(Value::String(_)) => {}
                Some(_) => return Err(ManifestError::InvalidField(*field)),
            }
        }
        let manifest: Self = serde_json::from_value(value.clone())
            .map_err(|err| ManifestError::Malformed(err.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates declaration-level invariants.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mandatory = [
            ("name", &self.name),
            ("version", &self.version),
            ("description", &self.description),
            ("author", &self.author),
        ];
        for (field, value) in mandatory {
            if value.trim().is_empty() {
                return Err(ManifestError::MissingField(field));
            }
        }
        if !is_valid_module_name(&self.name) {
            return Err(ManifestError::InvalidName(self.name.clone()));
        }
        Ok(())
    }

    pub fn declares_action(&self, action: &str) -> bool {
        self.actions.iter().any(|declared| declared == action)
    }

    /// Full review: hard errors plus soft warnings (non-semver version).
    pub fn report(&self) -> ManifestReport {
        let mut report = ManifestReport::default();
        if let Err(err) = self.validate() {
            report.add_error(err.to_string());
        }
        if Version::parse(&self.version).is_err() {
            report.add_warning(format!("version should follow semver: {}", self.version));
        }
        for action in &self.actions {
            if action.trim().is_empty() {
                report.add_error("manifest contains empty action name".to_string());
            }
        }
        report
    }

    /// Warns when the declared kernel version is not same-major compatible.
    pub fn kernel_compatibility(&self, kernel_version: Version) -> ManifestReport {
        let mut report = ManifestReport::default();
        let Some(required) = self.kernel_version.as_deref() else {
            return report;
        };
        match Version::parse(required) {
            Ok(required) if required.is_compatible_with(&kernel_version) => {}
            Ok(required) => report.add_warning(format!(
                "module requires kernel {required}, current is {kernel_version}"
            )),
            Err(err) => report.add_warning(err.to_string()),
        }
        report
    }
}

/// Accumulated manifest review outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Default for ManifestReport {
    fn default() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

impl ManifestReport {
    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
        self.valid = false;
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ManifestReport) {
        self.valid &= other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Manifest construction/validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    MissingField(&'static str),
    InvalidField(&'static str),
    InvalidName(String),
    Malformed(String),
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "manifest missing required field: {field}"),
            Self::InvalidField(field) => write!(f, "manifest field must be a string: {field}"),
            Self::InvalidName(value) => write!(f, "invalid module name: {value}"),
            Self::Malformed(message) => write!(f, "malformed manifest: {message}"),
        }
    }
}

impl Error for ManifestError {}

#[cfg(test)]
mod tests {
    use super::{ManifestError, ModuleManifest};
    use crate::version::Version;
    use serde_json::json;

    fn valid_manifest() -> ModuleManifest {
        ModuleManifest::new("calc", "1.0.0", "Simple calculator", "Runner")
            .with_actions(["add", "subtract"])
    }

    #[test]
    fn validates_baseline_manifest() {
        let manifest = valid_manifest();
        assert!(manifest.validate().is_ok());
        assert!(manifest.declares_action("add"));
        assert!(!manifest.declares_action("divide"));
    }

    #[test]
    fn from_value_rejects_each_missing_mandatory_field() {
        for field in ["name", "version", "description", "author"] {
            let mut value = json!({
                "name": "calc",
                "version": "1.0.0",
                "description": "Simple calculator",
                "author": "Runner"
            });
            value.as_object_mut().expect("object").remove(field);
            let err = ModuleManifest::from_value(&value).expect_err("missing field must fail");
            assert_eq!(err, ManifestError::MissingField(field));
        }
    }

    #[test]
    fn from_value_defaults_optional_sequences() {
        let manifest = ModuleManifest::from_value(&json!({
            "name": "calc",
            "version": "1.0.0",
            "description": "Simple calculator",
            "author": "Runner"
        }))
        .expect("mandatory fields only");
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.actions.is_empty());
        assert_eq!(manifest.kernel_version, None);
    }

    #[test]
    fn from_value_rejects_non_string_and_malformed_fields() {
        let err = ModuleManifest::from_value(&json!({
            "name": 7,
            "version": "1.0.0",
            "description": "d",
            "author": "a"
        }))
        .expect_err("numeric name must fail");
        assert_eq!(err, ManifestError::InvalidField("name"));

        let err = ModuleManifest::from_value(&json!({
            "name": "calc",
            "version": "1.0.0",
            "description": "d",
            "author": "a",
            "dependencies": "core"
        }))
        .expect_err("string dependencies must fail");
        assert!(matches!(err, ManifestError::Malformed(_)));
    }

    #[test]
    fn rejects_invalid_name_format() {
        let mut manifest = valid_manifest();
        manifest.name = "9lives".to_string();
        assert_eq!(
            manifest.validate(),
            Err(ManifestError::InvalidName("9lives".to_string()))
        );
    }

    #[test]
    fn report_warns_on_non_semver_version() {
        let mut manifest = valid_manifest();
        manifest.version = "v1".to_string();
        let report = manifest.report();
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);

        manifest.author = "  ".to_string();
        let report = manifest.report();
        assert!(!report.valid);
    }

    #[test]
    fn kernel_compatibility_uses_same_major_policy() {
        let kernel = Version::new(1, 0, 0);
        let manifest = valid_manifest().with_kernel_version("1.4.0");
        assert!(manifest.kernel_compatibility(kernel).warnings.is_empty());

        let manifest = valid_manifest().with_kernel_version("2.0.0");
        let report = manifest.kernel_compatibility(kernel);
        assert!(report.valid);
        assert_eq!(
            report.warnings,
            vec!["module requires kernel 2.0.0, current is 1.0.0".to_string()]
        );

        assert!(valid_manifest().kernel_compatibility(kernel).warnings.is_empty());
    }
}
