//! Annotation names and tracking helpers.
//!
//! Two families of annotations exist. Configuration annotations live on the
//! composite and carry the engine's entire configuration (there is no
//! separate config channel). Tracking annotations live on graph members and
//! record what has already been captured, restored, or retired; they are the
//! engine's only "have I already written this" state besides the store
//! itself, and therefore the basis for idempotence. All names are a stable
//! contract with the orchestrator's audit tooling.

use serde_json::Value;

use crate::document;

// Configuration annotations on the composite.

/// Opt-in gate; identity backup/restore is disabled unless present.
pub const ENABLE: &str = "fn.namevault.io/enable";

/// Purge all stored identities for this composition and return early.
pub const PURGE: &str = "fn.namevault.io/purge";

pub const CLUSTER_ID: &str = "fn.namevault.io/cluster-id";
pub const STORE: &str = "fn.namevault.io/store";
pub const STORE_PATH: &str = "fn.namevault.io/store-path";
pub const BACKUP_SCOPE: &str = "fn.namevault.io/backup-scope";
pub const REQUIRE_RESTORE: &str = "fn.namevault.io/require-restore";

/// Key override: replace the kind segment of the composition key, so a
/// migrated composite keeps reading data stored under its previous shape.
pub const OVERRIDE_KIND: &str = "fn.namevault.io/override-kind";

/// Key override: replace the namespace segment of the composition key.
pub const OVERRIDE_NAMESPACE: &str = "fn.namevault.io/override-namespace";

// Orchestrator identity contract on graph members.

/// The provider-assigned external name of a member's backing resource.
pub const EXTERNAL_NAME: &str = "reconcile.namevault.io/external-name";

/// Claim identity labels on the composite, used for key derivation.
pub const CLAIM_NAMESPACE_LABEL: &str = "reconcile.namevault.io/claim-namespace";
pub const CLAIM_NAME_LABEL: &str = "reconcile.namevault.io/claim-name";

// Tracking annotations on graph members.

/// Last external-name value captured to the store.
pub const STORED_EXTERNAL_NAME: &str = "fn.namevault.io/stored-external-name";
/// When the external name was captured (RFC 3339).
pub const EXTERNAL_NAME_STORED_AT: &str = "fn.namevault.io/external-name-stored";
/// When the external name was restored from the store.
pub const EXTERNAL_NAME_RESTORED_AT: &str = "fn.namevault.io/external-name-restored";
/// When the stored external name was retired.
pub const EXTERNAL_NAME_RETIRED_AT: &str = "fn.namevault.io/external-name-retired";

/// Last resource-name value captured to the store.
pub const STORED_RESOURCE_NAME: &str = "fn.namevault.io/stored-resource-name";
/// When the resource name was captured.
pub const RESOURCE_NAME_STORED_AT: &str = "fn.namevault.io/resource-name-stored";
/// When the resource name was restored from the store.
pub const RESOURCE_NAME_RESTORED_AT: &str = "fn.namevault.io/resource-name-restored";
/// When the stored resource name was retired.
pub const RESOURCE_NAME_RETIRED_AT: &str = "fn.namevault.io/resource-name-retired";

/// Every tracking annotation the engine owns, in one place for the merge and
/// strip passes.
pub const TRACKING: &[&str] = &[
    STORED_EXTERNAL_NAME,
    EXTERNAL_NAME_STORED_AT,
    EXTERNAL_NAME_RESTORED_AT,
    EXTERNAL_NAME_RETIRED_AT,
    STORED_RESOURCE_NAME,
    RESOURCE_NAME_STORED_AT,
    RESOURCE_NAME_RESTORED_AT,
    RESOURCE_NAME_RETIRED_AT,
];

/// The capture-tracking pairs stripped at retirement, so a retired member no
/// longer claims its identity is persisted.
pub const CAPTURE_TRACKING: &[&str] = &[
    STORED_EXTERNAL_NAME,
    EXTERNAL_NAME_STORED_AT,
    STORED_RESOURCE_NAME,
    RESOURCE_NAME_STORED_AT,
];

/// Strip the capture-tracking annotations from a member document.
pub fn strip_capture_tracking(doc: &mut Value) {
    document::remove_annotations(doc, CAPTURE_TRACKING);
}

/// Copy tracking annotations the engine stamped in a prior invocation from
/// the observed copy onto the desired copy, where the desired copy lacks
/// them. Later pipeline steps regenerate the desired graph from scratch and
/// do not echo back annotations set here; without this merge every
/// invocation would look like a first capture.
pub fn merge_tracking(desired: &mut Value, observed: &Value) {
    for name in TRACKING {
        if document::annotation(desired, name).is_none() {
            if let Some(value) = document::annotation(observed, name) {
                let value = value.to_string();
                document::set_annotation(desired, name, &value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_strip_capture_tracking_leaves_timestamps() {
        let mut doc = json!({"metadata": {"annotations": {
            "fn.namevault.io/stored-external-name": "x",
            "fn.namevault.io/external-name-stored": "2026-01-01T00:00:00Z",
            "fn.namevault.io/external-name-restored": "2026-01-02T00:00:00Z",
            "unrelated": "keep"
        }}});

        strip_capture_tracking(&mut doc);

        assert_eq!(document::annotation(&doc, STORED_EXTERNAL_NAME), None);
        assert_eq!(document::annotation(&doc, EXTERNAL_NAME_STORED_AT), None);
        assert!(document::annotation(&doc, EXTERNAL_NAME_RESTORED_AT).is_some());
        assert_eq!(document::annotation(&doc, "unrelated"), Some("keep"));
    }

    #[test]
    fn test_merge_tracking_does_not_overwrite() {
        let mut desired = json!({"metadata": {"annotations": {
            "fn.namevault.io/stored-external-name": "desired-value"
        }}});
        let observed = json!({"metadata": {"annotations": {
            "fn.namevault.io/stored-external-name": "observed-value",
            "fn.namevault.io/external-name-stored": "2026-01-01T00:00:00Z",
            "unrelated": "ignored"
        }}});

        merge_tracking(&mut desired, &observed);

        assert_eq!(
            document::annotation(&desired, STORED_EXTERNAL_NAME),
            Some("desired-value")
        );
        assert_eq!(
            document::annotation(&desired, EXTERNAL_NAME_STORED_AT),
            Some("2026-01-01T00:00:00Z")
        );
        // Only the engine's own annotations are merged.
        assert_eq!(document::annotation(&desired, "unrelated"), None);
    }
}
