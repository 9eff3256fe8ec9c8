//! Module lifecycle status and its transition table.
//!
//! # Responsibility
//! - Define the lifecycle states a module can be in.
//! - Enforce the allowed transition table and keep an audit trail.
//!
//! # Invariants
//! - A module with no recorded status is implicitly `experimental`.
//! - Self-transitions always succeed and never append an audit record.
//! - Rejected transitions leave the current state untouched.
//! - No state is terminal.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Module lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Experimental,
    Active,
    Deprecated,
    Disabled,
}

impl LifecycleStatus {
    pub const ALL: [LifecycleStatus; 4] = [
        Self::Experimental,
        Self::Active,
        Self::Deprecated,
        Self::Disabled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Experimental => "experimental",
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Disabled => "disabled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "experimental" => Some(Self::Experimental),
            "active" => Some(Self::Active),
            "deprecated" => Some(Self::Deprecated),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Outgoing edges of the transition table.
    pub fn allowed_transitions(self) -> &'static [LifecycleStatus] {
        match self {
            Self::Experimental => &[Self::Active, Self::Disabled],
            Self::Active => &[Self::Deprecated, Self::Disabled],
            Self::Deprecated => &[Self::Disabled, Self::Active],
            Self::Disabled => &[Self::Active, Self::Experimental],
        }
    }

    /// Whether the module may be dispatched to in this state.
    pub fn is_runnable(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl Display for LifecycleStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| StatusError::UnknownStatus(s.to_string()))
    }
}

/// Returns whether `from -> to` is allowed; self-transitions always are.
pub fn can_transition(from: LifecycleStatus, to: LifecycleStatus) -> bool {
    from == to || from.allowed_transitions().contains(&to)
}

/// Append-only audit record of one effective status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub module: String,
    pub from_status: LifecycleStatus,
    pub to_status: LifecycleStatus,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Status transition failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    UnknownStatus(String),
    TransitionNotAllowed {
        module: String,
        from: LifecycleStatus,
        to: LifecycleStatus,
    },
}

impl Display for StatusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStatus(value) => write!(f, "unknown lifecycle status: {value}"),
            Self::TransitionNotAllowed { module, from, to } => {
                write!(f, "status transition not allowed for {module}: {from} -> {to}")
            }
        }
    }
}

impl Error for StatusError {}

/// Process-wide lifecycle state for every module plus the transition audit log.
#[derive(Debug, Default)]
pub struct StatusMachine {
    current: BTreeMap<String, LifecycleStatus>,
    transitions: Vec<StatusTransition>,
}

impl StatusMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// String-typed entry point; returns `false` on unknown status or a
    /// rejected transition.
    pub fn set_status(&mut self, module: &str, status: &str, reason: &str) -> bool {
        let Some(status) = LifecycleStatus::parse(status) else {
            warn!("event=status_set module=status status=rejected name={module} error=unknown_status");
            return false;
        };
        self.transition(module, status, reason).is_ok()
    }

    /// Applies one transition.
    ///
    /// Returns `Ok(Some(record))` for an effective change, `Ok(None)` for a
    /// self-transition.
    ///
    /// # Errors
    /// - `StatusError::TransitionNotAllowed` when the edge is not in the table.
    pub fn transition(
        &mut self,
        module: &str,
        status: LifecycleStatus,
        reason: &str,
    ) -> Result<Option<StatusTransition>, StatusError> {
        let from = self.effective_status(module);
        if from == status {
            self.current.insert(module.to_string(), status);
            return Ok(None);
        }
        if !can_transition(from, status) {
            warn!(
                "event=status_set module=status status=rejected name={module} from={from} to={status}"
            );
            return Err(StatusError::TransitionNotAllowed {
                module: module.to_string(),
                from,
                to: status,
            });
        }

        let record = StatusTransition {
            module: module.to_string(),
            from_status: from,
            to_status: status,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        };
        self.transitions.push(record.clone());
        self.current.insert(module.to_string(), status);
        info!("event=status_set module=status status=ok name={module} from={from} to={status}");
        Ok(Some(record))
    }

    /// Recorded status; `None` when the module was never set.
    pub fn status(&self, module: &str) -> Option<LifecycleStatus> {
        self.current.get(module).copied()
    }

    /// Recorded status, defaulting to `experimental`.
    pub fn effective_status(&self, module: &str) -> LifecycleStatus {
        self.status(module).unwrap_or(LifecycleStatus::Experimental)
    }

    pub fn modules_with_status(&self, status: LifecycleStatus) -> Vec<String> {
        self.current
            .iter()
            .filter(|(_, current)| **current == status)
            .map(|(module, _)| module.clone())
            .collect()
    }

    /// Audit trail, optionally filtered to one module.
    pub fn history(&self, module: Option<&str>) -> Vec<&StatusTransition> {
        self.transitions
            .iter()
            .filter(|record| module.map_or(true, |m| record.module == m))
            .collect()
    }

    pub fn can_transition(&self, from: LifecycleStatus, to: LifecycleStatus) -> bool {
        can_transition(from, to)
    }

    pub fn allowed_transitions(&self, from: LifecycleStatus) -> &'static [LifecycleStatus] {
        from.allowed_transitions()
    }

    pub fn is_valid_status(&self, value: &str) -> bool {
        LifecycleStatus::parse(value).is_some()
    }

    pub fn reset(&mut self) {
        self.current.clear();
        self.transitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{can_transition, LifecycleStatus, StatusError, StatusMachine};
    use super::LifecycleStatus::{Active, Deprecated, Disabled, Experimental};

    #[test]
    fn transition_table_matches_allowed_edges_exactly() {
        let allowed = [
            (Experimental, Active),
            (Experimental, Disabled),
            (Active, Deprecated),
            (Active, Disabled),
            (Deprecated, Disabled),
            (Deprecated, Active),
            (Disabled, Active),
            (Disabled, Experimental),
        ];
        for from in LifecycleStatus::ALL {
            for to in LifecycleStatus::ALL {
                let expected = from == to || allowed.contains(&(from, to));
                assert_eq!(can_transition(from, to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn every_sequence_audits_only_effective_changes() {
        for from in LifecycleStatus::ALL {
            for to in LifecycleStatus::ALL {
                let mut machine = StatusMachine::new();
                // Reach `from` through a known path from the implicit start.
                let path: &[LifecycleStatus] = match from {
                    Experimental => &[],
                    Active => &[Active],
                    Deprecated => &[Active, Deprecated],
                    Disabled => &[Disabled],
                };
                for step in path {
                    machine.transition("m", *step, "setup").expect("setup path");
                }
                let audit_before = machine.history(Some("m")).len();

                let accepted = machine.set_status("m", to.as_str(), "matrix");
                assert_eq!(accepted, can_transition(from, to), "{from} -> {to}");

                let audit_after = machine.history(Some("m")).len();
                let changed = accepted && from != to;
                assert_eq!(audit_after - audit_before, usize::from(changed));
                let expected_state = if accepted { to } else { from };
                assert_eq!(machine.effective_status("m"), expected_state);
            }
        }
    }

    #[test]
    fn implicit_start_is_experimental() {
        let mut machine = StatusMachine::new();
        assert_eq!(machine.status("fresh"), None);
        assert_eq!(machine.effective_status("fresh"), Experimental);
        assert!(!machine.set_status("fresh", "deprecated", "skip ahead"));
        assert_eq!(machine.status("fresh"), None);
        assert!(machine.history(None).is_empty());
    }

    #[test]
    fn self_transition_succeeds_without_audit() {
        let mut machine = StatusMachine::new();
        assert!(machine.set_status("m", "experimental", "noop"));
        assert_eq!(machine.status("m"), Some(Experimental));
        assert!(machine.history(None).is_empty());
    }

    #[test]
    fn rejects_unknown_status_values() {
        let mut machine = StatusMachine::new();
        assert!(!machine.set_status("m", "retired", "bad"));
        assert!(!machine.set_status("m", "Active", "case matters"));
        assert!(!machine.is_valid_status("retired"));
        assert_eq!(
            "retired".parse::<LifecycleStatus>(),
            Err(StatusError::UnknownStatus("retired".to_string()))
        );
    }

    #[test]
    fn disabled_is_not_terminal() {
        let mut machine = StatusMachine::new();
        assert!(machine.set_status("m", "disabled", "incident"));
        assert!(machine.set_status("m", "experimental", "retry"));
        assert!(machine.set_status("m", "active", "promote"));

        let history = machine.history(Some("m"));
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].from_status, Experimental);
        assert_eq!(history[0].to_status, Disabled);
        assert_eq!(history[0].reason, "incident");
        assert_eq!(machine.modules_with_status(Active), vec!["m".to_string()]);
    }

    #[test]
    fn typed_transition_reports_rejected_edge() {
        let mut machine = StatusMachine::new();
        let err = machine
            .transition("m", Deprecated, "skip")
            .expect_err("experimental -> deprecated is not allowed");
        assert_eq!(
            err,
            StatusError::TransitionNotAllowed {
                module: "m".to_string(),
                from: Experimental,
                to: Deprecated,
            }
        );

        machine.reset();
        assert!(machine.history(None).is_empty());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Deprecated).expect("serialize"),
            serde_json::json!("deprecated")
        );
        assert_eq!(Active.allowed_transitions(), &[Deprecated, Disabled]);
        assert!(!Disabled.is_runnable());
    }
}
