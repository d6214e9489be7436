//! Persisted identity records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The stable per-member identifier inside a composition: the member's name
/// as assigned by the orchestrator's pipeline. Stable across invocations even
/// when the member's spec changes.
pub type ResourceKey = String;

/// All records for one composition, keyed by resource key.
///
/// Created on first capture, updated whenever identities change, and deleted
/// wholesale once it becomes empty after retirements or on explicit purge.
pub type RecordSet = BTreeMap<ResourceKey, IdentityRecord>;

/// The identity values preserved for one graph member.
///
/// `external_name` is the provider-assigned identifier that never changes for
/// the life of the backing resource. `resource_name` is the locally generated
/// name that must survive recreation of the parent. Either field may be
/// absent; a record with neither is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(
        rename = "externalName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub external_name: Option<String>,

    #[serde(
        rename = "resourceName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_name: Option<String>,
}

impl IdentityRecord {
    pub fn is_empty(&self) -> bool {
        self.external_name.is_none() && self.resource_name.is_none()
    }

    /// Per-field merge: fields present in `other` win; fields absent in
    /// `other` keep their existing value. A capture of one field must not
    /// erase the previously stored other field.
    pub fn merge_from(&mut self, other: &IdentityRecord) {
        if let Some(v) = &other.external_name {
            self.external_name = Some(v.clone());
        }
        if let Some(v) = &other.resource_name {
            self.resource_name = Some(v.clone());
        }
    }
}

/// Merge a batch of newly captured records onto an existing set, field by
/// field.
pub fn merge_records(into: &mut RecordSet, batch: &RecordSet) {
    for (key, record) in batch {
        into.entry(key.clone()).or_default().merge_from(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_preserves_other_field() {
        let mut existing = RecordSet::new();
        existing.insert(
            "db".to_string(),
            IdentityRecord {
                external_name: None,
                resource_name: Some("db-abc123".to_string()),
            },
        );

        let mut batch = RecordSet::new();
        batch.insert(
            "db".to_string(),
            IdentityRecord {
                external_name: Some("db-123".to_string()),
                resource_name: None,
            },
        );

        merge_records(&mut existing, &batch);

        let merged = &existing["db"];
        assert_eq!(merged.external_name.as_deref(), Some("db-123"));
        assert_eq!(merged.resource_name.as_deref(), Some("db-abc123"));
    }

    #[test]
    fn test_serde_skips_absent_fields() {
        let record = IdentityRecord {
            external_name: Some("x".to_string()),
            resource_name: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"externalName":"x"}"#);

        let parsed: IdentityRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
