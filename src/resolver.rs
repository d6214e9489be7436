//! Key and policy resolution from composite metadata.
//!
//! Pure function of the request: derive the composition's durable lookup key
//! and the effective per-invocation policy. Values are read preferring the
//! observed composite (authoritative, previously persisted) and falling back
//! to the desired one, because intermediate pipeline steps may not echo back
//! metadata set by earlier steps. Missing values are defaulted, never fatal;
//! failures are deferred to the engine.

use std::path::PathBuf;

use tracing::debug;

use crate::annotations;
use crate::document::Fallback;
use crate::domain::{BackupScope, CompositionKey, Policy, Request};

/// Default cluster identifier when the composite names none.
pub const DEFAULT_CLUSTER_ID: &str = "default";

/// Default store backend.
pub const DEFAULT_STORE: &str = "file";

/// Segment used when the composite is fully unscoped.
const UNSCOPED: &str = "none";

/// Resolve `(CompositionKey, Policy)` from the request.
pub fn resolve(req: &Request) -> (CompositionKey, Policy) {
    let composite = Fallback::new(
        req.observed.composite.as_ref(),
        req.desired.composite.as_ref(),
    );

    let policy = Policy {
        cluster_id: composite
            .annotation(annotations::CLUSTER_ID)
            .unwrap_or(DEFAULT_CLUSTER_ID)
            .to_string(),
        store: composite
            .annotation(annotations::STORE)
            .unwrap_or(DEFAULT_STORE)
            .to_string(),
        store_path: composite
            .annotation(annotations::STORE_PATH)
            .map(PathBuf::from),
        scope: BackupScope::parse(composite.annotation(annotations::BACKUP_SCOPE)),
        require_restore: composite.flag(annotations::REQUIRE_RESTORE),
    };

    let api_version = composite.str_at(&["apiVersion"]).unwrap_or_default();
    let name = composite.str_at(&["metadata", "name"]).unwrap_or_default();

    // Kind and namespace segments are replaced by override annotations when
    // present, so a reshaped composite can keep its previously stored key.
    let kind = composite
        .annotation(annotations::OVERRIDE_KIND)
        .or_else(|| composite.str_at(&["kind"]))
        .unwrap_or_default();
    let namespace = composite
        .annotation(annotations::OVERRIDE_NAMESPACE)
        .or_else(|| composite.label(annotations::CLAIM_NAMESPACE_LABEL))
        .or_else(|| composite.str_at(&["metadata", "namespace"]))
        .unwrap_or(UNSCOPED);
    let claim_name = composite
        .label(annotations::CLAIM_NAME_LABEL)
        .unwrap_or(UNSCOPED);

    let key = CompositionKey::new(namespace, claim_name, api_version, kind, name);

    debug!(
        composition_key = %key,
        cluster_id = %policy.cluster_id,
        store = %policy.store,
        scope = ?policy.scope,
        require_restore = policy.require_restore,
        "Resolved key and policy from composite metadata"
    );

    (key, policy)
}
