//! Per-principal permission gate.
//!
//! # Responsibility
//! - Hold granted, whitelisted and blacklisted permissions per principal.
//! - Hold time-bounded governance grants, including the admin wildcard.
//! - Answer `module:action` access checks with wildcard fallback.
//!
//! # Invariants
//! - A blacklisted permission is denied regardless of grants or whitelist.
//! - Expired grants never satisfy a check; absent `expires_at` never expires.
//! - All mutations are idempotent set operations.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Global wildcard checked last by `check_access`.
pub const PERMISSION_WILDCARD: &str = "*";

/// Governance registry read access.
pub const GOVERNANCE_READ: &str = "governance:read";
/// Governance registry write access.
pub const GOVERNANCE_WRITE: &str = "governance:write";
/// Permission to register modules.
pub const GOVERNANCE_REGISTER: &str = "governance:register";
/// Permission to unregister modules.
pub const GOVERNANCE_UNREGISTER: &str = "governance:unregister";
/// Permission to change module lifecycle status.
pub const GOVERNANCE_STATUS: &str = "governance:status";
/// Permission to change module versions.
pub const GOVERNANCE_VERSION: &str = "governance:version";
/// Admin wildcard: an unexpired grant satisfies every check.
pub const GOVERNANCE_ADMIN: &str = "governance:admin";

/// Time-bounded permission assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub principal: String,
    pub permission: String,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Serializable view of every permission set held by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSnapshot {
    pub granted: BTreeMap<String, BTreeSet<String>>,
    pub whitelists: BTreeMap<String, BTreeSet<String>>,
    pub blacklists: BTreeMap<String, BTreeSet<String>>,
    pub grants: Vec<PermissionGrant>,
}

/// Raised by `require_permission` guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDenied {
    pub principal: String,
    pub permission: String,
}

impl Display for PermissionDenied {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Permission denied: {}", self.permission)
    }
}

impl Error for PermissionDenied {}

/// In-process permission gate.
#[derive(Debug, Default)]
pub struct PermissionGate {
    granted: BTreeMap<String, BTreeSet<String>>,
    whitelist: BTreeMap<String, BTreeSet<String>>,
    blacklist: BTreeMap<String, BTreeSet<String>>,
    grants: Vec<PermissionGrant>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a direct, non-expiring permission. Returns `false` if already held.
    pub fn grant(&mut self, principal: &str, permission: &str) -> bool {
        let added = self
            .granted
            .entry(principal.to_string())
            .or_default()
            .insert(permission.to_string());
        if added {
            info!("event=permission_grant module=permission status=ok principal={principal} permission={permission}");
        }
        added
    }

    /// Records a governance grant with optional expiry.
    ///
    /// Re-granting the same `principal + permission` replaces the older grant.
    pub fn grant_with_expiry(
        &mut self,
        principal: &str,
        permission: &str,
        granted_by: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> PermissionGrant {
        self.grants
            .retain(|grant| !(grant.principal == principal && grant.permission == permission));
        let grant = PermissionGrant {
            principal: principal.to_string(),
            permission: permission.to_string(),
            granted_by: granted_by.to_string(),
            granted_at: Utc::now(),
            expires_at,
        };
        self.grants.push(grant.clone());
        info!(
            "event=permission_grant module=permission status=ok principal={principal} permission={permission} granted_by={granted_by} expiring={}",
            expires_at.is_some()
        );
        grant
    }

    /// Removes a direct permission. Returns `false` when nothing was held.
    pub fn revoke(&mut self, principal: &str, permission: &str) -> bool {
        let removed = self
            .granted
            .get_mut(principal)
            .is_some_and(|set| set.remove(permission));
        if removed {
            info!("event=permission_revoke module=permission status=ok principal={principal} permission={permission}");
        }
        removed
    }

    /// Removes a governance grant. Returns `false` when nothing was held.
    pub fn revoke_grant(&mut self, principal: &str, permission: &str) -> bool {
        let before = self.grants.len();
        self.grants
            .retain(|grant| !(grant.principal == principal && grant.permission == permission));
        before != self.grants.len()
    }

    pub fn whitelist<I, S>(&mut self, principal: &str, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist
            .entry(principal.to_string())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
    }

    pub fn blacklist<I, S>(&mut self, principal: &str, permissions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist
            .entry(principal.to_string())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
        debug!("event=permission_blacklist module=permission status=ok principal={principal}");
    }

    pub fn remove_from_whitelist(&mut self, principal: &str, permissions: &[&str]) {
        if let Some(set) = self.whitelist.get_mut(principal) {
            for permission in permissions {
                set.remove(*permission);
            }
        }
    }

    pub fn remove_from_blacklist(&mut self, principal: &str, permissions: &[&str]) {
        if let Some(set) = self.blacklist.get_mut(principal) {
            for permission in permissions {
                set.remove(*permission);
            }
        }
    }

    pub fn has_permission(&self, principal: &str, permission: &str) -> bool {
        self.has_permission_at(principal, permission, Utc::now())
    }

    /// Same as `has_permission`, evaluating grant expiry against `now`.
    pub fn has_permission_at(
        &self,
        principal: &str,
        permission: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if contains(&self.blacklist, principal, permission) {
            return false;
        }
        if contains(&self.granted, principal, permission)
            || contains(&self.whitelist, principal, permission)
        {
            return true;
        }
        self.grants.iter().any(|grant| {
            grant.principal == principal
                && !grant.is_expired_at(now)
                && (grant.permission == permission || grant.permission == GOVERNANCE_ADMIN)
        })
    }

    /// `module:action`, then `module:*`, then `*`.
    pub fn check_access(&self, principal: &str, module: &str, action: &str) -> bool {
        self.has_permission(principal, &format!("{module}:{action}"))
            || self.has_permission(principal, &format!("{module}:{PERMISSION_WILDCARD}"))
            || self.has_permission(principal, PERMISSION_WILDCARD)
    }

    /// Guard form of `has_permission`.
    ///
    /// # Errors
    /// - `PermissionDenied` when the principal lacks `permission`.
    pub fn require_permission(
        &self,
        principal: &str,
        permission: &str,
    ) -> Result<(), PermissionDenied> {
        if self.has_permission(principal, permission) {
            return Ok(());
        }
        Err(PermissionDenied {
            principal: principal.to_string(),
            permission: permission.to_string(),
        })
    }

    /// Governance spelling of `require_permission`.
    pub fn check_permission(
        &self,
        principal: &str,
        permission: &str,
    ) -> Result<(), PermissionDenied> {
        self.require_permission(principal, permission)
    }

    /// Guard form of `check_access`, reporting the specific permission.
    pub fn require_access(
        &self,
        principal: &str,
        module: &str,
        action: &str,
    ) -> Result<(), PermissionDenied> {
        if self.check_access(principal, module, action) {
            return Ok(());
        }
        Err(PermissionDenied {
            principal: principal.to_string(),
            permission: format!("{module}:{action}"),
        })
    }

    pub fn permissions_of(&self, principal: &str) -> BTreeSet<String> {
        self.granted.get(principal).cloned().unwrap_or_default()
    }

    pub fn whitelisted(&self, principal: &str) -> BTreeSet<String> {
        self.whitelist.get(principal).cloned().unwrap_or_default()
    }

    pub fn blacklisted(&self, principal: &str) -> BTreeSet<String> {
        self.blacklist.get(principal).cloned().unwrap_or_default()
    }

    /// Governance grants, optionally filtered by principal.
    pub fn grants(&self, principal: Option<&str>) -> Vec<&PermissionGrant> {
        self.grants
            .iter()
            .filter(|grant| principal.map_or(true, |p| grant.principal == p))
            .collect()
    }

    pub fn snapshot(&self) -> PermissionSnapshot {
        PermissionSnapshot {
            granted: self.granted.clone(),
            whitelists: self.whitelist.clone(),
            blacklists: self.blacklist.clone(),
            grants: self.grants.clone(),
        }
    }

    pub fn clear(&mut self) {
        self.granted.clear();
        self.whitelist.clear();
        self.blacklist.clear();
        self.grants.clear();
    }
}

fn contains(sets: &BTreeMap<String, BTreeSet<String>>, principal: &str, permission: &str) -> bool {
    sets.get(principal)
        .is_some_and(|set| set.contains(permission))
}
