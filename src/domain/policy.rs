//! Invocation policy and per-member deletion/management policy types.

use std::path::PathBuf;

use serde_json::Value;
use tracing::warn;

use crate::document;

/// Which members are eligible for external-name backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackupScope {
    /// Only members that survive deletion of their composite.
    #[default]
    Orphaned,
    /// Every member, regardless of deletion policy.
    All,
}

impl BackupScope {
    /// Parse an annotation value, defaulting to `Orphaned` on absence.
    /// Unknown values fall back to the default rather than failing, matching
    /// the defaulted-not-fatal behavior of the rest of policy resolution.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("orphaned") => Self::Orphaned,
            Some("all") => Self::All,
            Some(other) => {
                warn!(scope = other, "Unknown backup scope, defaulting to 'orphaned'");
                Self::Orphaned
            }
        }
    }
}

/// A member's deletion policy, from `spec.deletionPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    Delete,
    Orphan,
}

impl DeletionPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Delete" => Some(Self::Delete),
            "Orphan" => Some(Self::Orphan),
            _ => None,
        }
    }
}

/// A member's management-policy set, from `spec.managementPolicies`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagementPolicies(pub Vec<String>);

impl ManagementPolicies {
    /// Whether the set permits deletion of the backing resource: an explicit
    /// `Delete` entry or the wildcard.
    pub fn allows_delete(&self) -> bool {
        self.0.iter().any(|p| p == "*" || p == "Delete")
    }
}

/// The deletion-relevant policy fields of one graph member.
#[derive(Debug, Clone, Default)]
pub struct MemberPolicy {
    pub deletion_policy: Option<DeletionPolicy>,
    pub management_policies: Option<ManagementPolicies>,
}

impl MemberPolicy {
    /// Read policy fields from a member document's `spec`.
    pub fn from_document(doc: &Value) -> Self {
        let deletion_policy =
            document::str_at(doc, &["spec", "deletionPolicy"]).and_then(DeletionPolicy::parse);

        let management_policies = doc
            .get("spec")
            .and_then(|spec| spec.get("managementPolicies"))
            .and_then(Value::as_array)
            .map(|items| {
                ManagementPolicies(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect(),
                )
            });

        Self {
            deletion_policy,
            management_policies,
        }
    }

    /// Read policy fields preferring the desired copy, falling back to the
    /// observed copy when the desired document carries no `spec` at all
    /// (intermediate pipeline steps may emit spec-less patches).
    pub fn from_pair(desired: Option<&Value>, observed: Option<&Value>) -> Self {
        desired
            .filter(|d| d.get("spec").is_some())
            .or_else(|| observed.filter(|o| o.get("spec").is_some()))
            .map(Self::from_document)
            .unwrap_or_default()
    }

    /// Whether the member's stored identity is now destined for deletion: an
    /// explicit delete-on-removal policy AND a management-policy set that does
    /// not exclude deletion.
    pub fn delete_destined(&self) -> bool {
        self.deletion_policy == Some(DeletionPolicy::Delete)
            && self
                .management_policies
                .as_ref()
                .is_some_and(ManagementPolicies::allows_delete)
    }

    /// Whether the member will survive deletion of its composite: an explicit
    /// preserve-on-delete policy, OR a present management-policy set that
    /// excludes deletion. Absence of both fields means it will not survive.
    pub fn survives_deletion(&self) -> bool {
        self.deletion_policy == Some(DeletionPolicy::Orphan)
            || self
                .management_policies
                .as_ref()
                .is_some_and(|mp| !mp.allows_delete())
    }
}

/// Per-invocation configuration, resolved once from composite metadata and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Cluster identifier scoping the persisted records.
    pub cluster_id: String,

    /// Store backend selection (`file`, `memory`).
    pub store: String,

    /// File backend data directory, when overridden per composite.
    pub store_path: Option<PathBuf>,

    /// Which members are eligible for external-name backup.
    pub scope: BackupScope,

    /// Integrity guard: turn "no record found" into a fatal error and skip
    /// capture, so a misconfigured migration cannot silently duplicate
    /// backing resources.
    pub require_restore: bool,
}
