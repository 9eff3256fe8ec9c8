//! Semantic version values and per-module version tracking.
//!
//! # Responsibility
//! - Parse and order `major.minor.patch` version triples.
//! - Track the registered version history of each module.
//!
//! # Invariants
//! - `Version` is immutable; equality and ordering are structural on the triple.
//! - A trailing `-suffix` is accepted by `parse` but never captured.
//! - Compatibility is same-major only; minor/patch are ignored on purpose.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)(?:-(.+))?$").expect("valid version regex")
});

/// Immutable `major.minor.patch` version value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
}

/// Version component selector for `Version::increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionField {
    Major,
    Minor,
    Patch,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses `major.minor.patch` with an optional ignored `-suffix`.
    ///
    /// # Errors
    /// - `VersionError::InvalidFormat` when the pattern does not match or a
    ///   component does not fit in `u64`.
    pub fn parse(value: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidFormat(value.to_string());
        let captures = VERSION_RE.captures(value).ok_or_else(invalid)?;
        let component = |index: usize| -> Result<u64, VersionError> {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .ok_or_else(invalid)
        };
        Ok(Self::new(component(1)?, component(2)?, component(3)?))
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn as_tuple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// Returns a new version with `field` bumped and lower fields reset.
    pub fn increment(&self, field: VersionField) -> Self {
        match field {
            VersionField::Major => Self::new(self.major.saturating_add(1), 0, 0),
            VersionField::Minor => Self::new(self.major, self.minor.saturating_add(1), 0),
            VersionField::Patch => {
                Self::new(self.major, self.minor, self.patch.saturating_add(1))
            }
        }
    }

    /// Three-way comparison as `-1 | 0 | 1`.
    pub fn compare(&self, other: &Self) -> i8 {
        match self.cmp(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    /// Same-major compatibility check.
    ///
    /// Lax on purpose: `required = 2.9.0` is compatible with `current = 2.0.0`.
    pub fn is_compatible_with(&self, current: &Self) -> bool {
        self.major == current.major
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Compatibility check over version strings.
///
/// Returns `false` when either side fails to parse.
pub fn is_compatible(required: &str, current: &str) -> bool {
    match (Version::parse(required), Version::parse(current)) {
        (Ok(required), Ok(current)) => required.is_compatible_with(&current),
        _ => false,
    }
}

/// Compares two version strings as `-1 | 0 | 1`; unparsable input compares as `0`.
pub fn compare_versions(left: &str, right: &str) -> i8 {
    match (Version::parse(left), Version::parse(right)) {
        (Ok(left), Ok(right)) => left.compare(&right),
        _ => 0,
    }
}

/// Version parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    InvalidFormat(String),
}

impl Display for VersionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat(value) => write!(
                f,
                "invalid version string: `{value}` (expected major.minor.patch)"
            ),
        }
    }
}

impl Error for VersionError {}

/// One registered version of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    pub metadata: Map<String, Value>,
}

/// Per-module version history with a movable "current" pointer.
#[derive(Debug, Default)]
pub struct VersionControl {
    history: BTreeMap<String, Vec<VersionRecord>>,
    current: BTreeMap<String, Version>,
}

impl VersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new version and makes it current.
    ///
    /// Returns `false` for unparsable versions or a version already recorded
    /// for this module.
    pub fn register_version(
        &mut self,
        module: &str,
        version: &str,
        metadata: Option<Map<String, Value>>,
    ) -> bool {
        let parsed = match Version::parse(version) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("event=version_register module=version status=rejected name={module} error={err}");
                return false;
            }
        };

        let records = self.history.entry(module.to_string()).or_default();
        if records.iter().any(|record| record.version == parsed) {
            return false;
        }
        records.push(VersionRecord {
            version: parsed,
            timestamp: Utc::now(),
            metadata: metadata.unwrap_or_default(),
        });
        self.current.insert(module.to_string(), parsed);
        debug!("event=version_register module=version status=ok name={module} version={parsed}");
        true
    }

    pub fn versions(&self, module: &str) -> &[VersionRecord] {
        self.history.get(module).map_or(&[], Vec::as_slice)
    }

    pub fn current_version(&self, module: &str) -> Option<Version> {
        self.current.get(module).copied()
    }

    /// Moves the current pointer to an already registered version.
    pub fn set_current_version(&mut self, module: &str, version: &str) -> bool {
        let Ok(parsed) = Version::parse(version) else {
            return false;
        };
        let known = self
            .versions(module)
            .iter()
            .any(|record| record.version == parsed);
        if !known {
            return false;
        }
        self.current.insert(module.to_string(), parsed);
        true
    }

    /// Highest registered version, independent of the current pointer.
    pub fn latest_version(&self, module: &str) -> Option<Version> {
        self.versions(module)
            .iter()
            .map(|record| record.version)
            .max()
    }

    /// Registers the bumped current version and returns it.
    ///
    /// Returns `None` when the module has no current version.
    pub fn increment(&mut self, module: &str, field: VersionField) -> Option<Version> {
        let next = self.current_version(module)?.increment(field);
        self.register_version(module, &next.to_string(), None);
        Some(next)
    }

    pub fn module_count(&self) -> usize {
        self.history.len()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        compare_versions, is_compatible, Version, VersionControl, VersionError, VersionField,
    };

    #[test]
    fn parses_triplet_and_ignores_prerelease_suffix() {
        let version = Version::parse("1.2.3").expect("plain triplet");
        assert_eq!(version.as_tuple(), (1, 2, 3));

        let suffixed = Version::parse("1.2.3-beta.1").expect("suffix is accepted");
        assert_eq!(suffixed, version);
        assert_eq!(suffixed.to_string(), "1.2.3");
    }

    #[test]
    fn rejects_malformed_versions() {
        for raw in ["1.2", "a.b.c", "", "1.2.3.4", "v1.2.3", " 1.2.3"] {
            let err = Version::parse(raw).expect_err("malformed version must fail");
            assert_eq!(err, VersionError::InvalidFormat(raw.to_string()));
        }
    }

    #[test]
    fn rejects_component_overflow() {
        assert!(Version::parse("99999999999999999999999.0.0").is_err());
    }

    #[test]
    fn orders_numerically_not_lexically() {
        let newer = Version::parse("2.0.0").expect("parse");
        let older = Version::parse("1.9.9").expect("parse");
        assert!(newer > older);
        assert!(Version::parse("1.10.0").expect("parse") > Version::parse("1.9.0").expect("parse"));
        assert_eq!(older.compare(&newer), -1);
        assert_eq!(newer.compare(&older), 1);
        assert_eq!(newer.compare(&newer), 0);
    }

    #[test]
    fn increment_resets_lower_fields() {
        let base = Version::new(1, 4, 7);
        assert_eq!(base.increment(VersionField::Major), Version::new(2, 0, 0));
        assert_eq!(base.increment(VersionField::Minor), Version::new(1, 5, 0));
        assert_eq!(base.increment(VersionField::Patch), Version::new(1, 4, 8));
        assert_eq!(base, Version::new(1, 4, 7));
    }

    #[test]
    fn compatibility_is_same_major_only() {
        assert!(is_compatible("2.0.0", "2.5.1"));
        assert!(is_compatible("2.9.0", "2.0.0"));
        assert!(!is_compatible("2.0.0", "1.9.0"));
        assert!(!is_compatible("2.0", "2.0.0"));
    }

    #[test]
    fn compare_versions_treats_unparsable_as_equal() {
        assert_eq!(compare_versions("1.0.0", "1.0.1"), -1);
        assert_eq!(compare_versions("bad", "1.0.1"), 0);
    }

    #[test]
    fn serializes_as_plain_string() {
        let version = Version::new(3, 1, 0);
        let json = serde_json::to_value(version).expect("serialize");
        assert_eq!(json, serde_json::json!("3.1.0"));
        let decoded: Version = serde_json::from_value(json).expect("deserialize");
        assert_eq!(decoded, version);
    }

    #[test]
    fn version_control_tracks_history_and_current() {
        let mut control = VersionControl::new();
        assert!(control.register_version("calc", "1.0.0", None));
        assert!(control.register_version("calc", "1.2.0", None));
        assert!(!control.register_version("calc", "1.2.0", None));
        assert!(!control.register_version("calc", "not-a-version", None));

        assert_eq!(control.versions("calc").len(), 2);
        assert_eq!(control.current_version("calc"), Some(Version::new(1, 2, 0)));

        assert!(control.set_current_version("calc", "1.0.0"));
        assert!(!control.set_current_version("calc", "9.9.9"));
        assert_eq!(control.current_version("calc"), Some(Version::new(1, 0, 0)));
        assert_eq!(control.latest_version("calc"), Some(Version::new(1, 2, 0)));
    }

    #[test]
    fn version_control_increment_registers_bumped_version() {
        let mut control = VersionControl::new();
        assert_eq!(control.increment("calc", VersionField::Patch), None);

        control.register_version("calc", "1.0.0", None);
        let bumped = control
            .increment("calc", VersionField::Minor)
            .expect("current version exists");
        assert_eq!(bumped, Version::new(1, 1, 0));
        assert_eq!(control.current_version("calc"), Some(bumped));
        assert_eq!(control.module_count(), 1);

        control.clear();
        assert_eq!(control.module_count(), 0);
    }
}
