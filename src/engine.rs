//! The identity reconciliation engine.
//!
//! One invocation runs the following phases over the desired and observed
//! graphs, mutating the desired graph in place:
//!
//! - Phase 0, gate: skip everything unless the composite opts in; a purge
//!   signal short-circuits the whole pass.
//! - Phase 1, retire: members whose policy flipped to delete lose their
//!   stored identity and get a retirement timestamp.
//! - Phase 2, restore: members lacking an identity get it back from the
//!   store, never overwriting an existing value.
//! - Phase 3, capture: identities that appeared or changed since the last
//!   pass are persisted with a single save.
//! - Phase 4, merge: tracking annotations echoed back only on the observed
//!   copy are carried over so the next pass still sees them.
//!
//! The store is injected at construction; the engine holds no other state
//! and invocations are independent of each other.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::annotations;
use crate::document::{self, Fallback};
use crate::domain::{
    merge_records, BackupScope, CompositionKey, IdentityRecord, MemberPolicy, Policy, RecordSet,
    Request, Response,
};
use crate::error::Error;
use crate::resolver;
use crate::store::IdentityStore;

/// Tracks which identity fields were under capture tracking when a member
/// was retired, so only those get a retirement stamp.
struct TrackedFields {
    external: bool,
    resource: bool,
}

/// Runs one reconciliation pass per call.
pub struct Reconciler {
    store: Arc<dyn IdentityStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Execute one invocation. Fatal conditions abort with a structured
    /// error and no mutated graph; soft absence never does.
    pub async fn reconcile(&self, mut req: Request) -> Result<Response, Error> {
        let desired_count = req.desired.resources.len();
        let observed_count = req.observed.resources.len();

        // Phase 0: gate. Composite-level reads prefer observed.
        let composite = Fallback::new(
            req.observed.composite.as_ref(),
            req.desired.composite.as_ref(),
        );
        if !composite.flag(annotations::ENABLE) {
            info!("Skipping identity store operations - not enabled on the composite");
            return Ok(Response {
                desired: req.desired,
                message: format!(
                    "Processed {} desired and {} observed resources (identity store disabled)",
                    desired_count, observed_count
                ),
            });
        }
        let purge_requested = composite.flag(annotations::PURGE);

        let (key, policy) = resolver::resolve(&req);
        let timestamp = Utc::now().to_rfc3339();

        if purge_requested {
            self.store
                .purge(&policy.cluster_id, &key)
                .await
                .map_err(Error::Store)?;
            info!(composition_key = %key, "Purged identity store for composition");
            return Ok(Response {
                desired: req.desired,
                message: format!("Purged stored identities for composition \"{}\"", key),
            });
        }

        let mut records = self
            .store
            .load(&policy.cluster_id, &key)
            .await
            .map_err(Error::Store)?;
        debug!(composition_key = %key, count = records.len(), "Loaded records from store");

        // Phase 1: retire.
        let retired = self
            .retire(&mut req, &key, &policy, &mut records, &timestamp)
            .await;

        // Retiring the last entry leaves no reason to keep the composition
        // key around at all.
        if !retired.is_empty() && records.is_empty() {
            match self.store.purge(&policy.cluster_id, &key).await {
                Ok(()) => info!(composition_key = %key, "Purged empty composition from store"),
                Err(err) => warn!(
                    composition_key = %key,
                    error = %format!("{err:#}"),
                    "Failed to purge empty composition from store"
                ),
            }
        }

        // Phase 2: restore. Scope eligibility is computed once per member
        // here and reused during capture.
        let mut eligible: BTreeMap<String, bool> = BTreeMap::new();
        self.restore(
            &mut req,
            &key,
            &policy,
            &records,
            &retired,
            &mut eligible,
            &timestamp,
        )?;

        // Phase 3: capture. Skipped under require-restore, which exists to
        // stop writes until a misconfigured key has been fixed.
        if !policy.require_restore {
            self.capture(
                &mut req,
                &key,
                &policy,
                &mut records,
                &retired,
                &mut eligible,
                &timestamp,
            )
            .await?;
        }

        // Phase 4: merge tracking annotations from observed into desired.
        let observed_resources = &req.observed.resources;
        for (name, desired_doc) in req.desired.resources.iter_mut() {
            if let Some(observed_doc) = observed_resources.get(name) {
                annotations::merge_tracking(desired_doc, observed_doc);
            }
        }

        Ok(Response {
            desired: req.desired,
            message: format!(
                "Processed {} desired and {} observed resources",
                desired_count, observed_count
            ),
        })
    }

    /// Phase 1: delete stored identities for members whose policy now
    /// destines them for deletion, stripping capture tracking and stamping a
    /// retirement timestamp. Per-member delete failures are logged, not
    /// fatal; the desired-side cleanup happens regardless.
    async fn retire(
        &self,
        req: &mut Request,
        key: &CompositionKey,
        policy: &Policy,
        records: &mut RecordSet,
        timestamp: &str,
    ) -> BTreeSet<String> {
        // Decide first, mutate after: the analysis reads both graphs.
        let mut candidates: Vec<(String, TrackedFields)> = Vec::new();
        for (name, desired_doc) in &req.desired.resources {
            let observed_doc = req.observed.resources.get(name);
            let pair = Fallback::new(Some(desired_doc), observed_doc);

            let tracked = TrackedFields {
                external: pair.annotation(annotations::STORED_EXTERNAL_NAME).is_some(),
                resource: pair.annotation(annotations::STORED_RESOURCE_NAME).is_some(),
            };
            if !tracked.external && !tracked.resource {
                continue;
            }

            let member = MemberPolicy::from_pair(Some(desired_doc), observed_doc);
            if member.delete_destined() {
                debug!(
                    resource = name.as_str(),
                    "Member with tracked identity is destined for deletion"
                );
                candidates.push((name.clone(), tracked));
            }
        }

        let mut retired = BTreeSet::new();
        for (name, tracked) in candidates {
            match self
                .store
                .delete_resource(&policy.cluster_id, key, &name)
                .await
            {
                Ok(()) => {
                    records.remove(&name);
                    // Strip the observed copy too, so Phase 4 cannot merge
                    // the stale tracking back onto desired.
                    if let Some(observed_doc) = req.observed.resources.get_mut(&name) {
                        annotations::strip_capture_tracking(observed_doc);
                    }
                    info!(
                        composition_key = %key,
                        resource = name.as_str(),
                        "Retired stored identity"
                    );
                }
                Err(err) => {
                    warn!(
                        resource = name.as_str(),
                        error = %format!("{err:#}"),
                        "Failed to delete resource from store"
                    );
                }
            }

            if let Some(desired_doc) = req.desired.resources.get_mut(&name) {
                annotations::strip_capture_tracking(desired_doc);
                if tracked.external {
                    document::set_annotation(
                        desired_doc,
                        annotations::EXTERNAL_NAME_RETIRED_AT,
                        timestamp,
                    );
                }
                if tracked.resource {
                    document::set_annotation(
                        desired_doc,
                        annotations::RESOURCE_NAME_RETIRED_AT,
                        timestamp,
                    );
                }
            }
            retired.insert(name);
        }
        retired
    }

    /// Phase 2: write stored identities onto desired members that lack them.
    /// Existing values are never overwritten. Under require-restore, a
    /// missing record is fatal instead of soft.
    #[allow(clippy::too_many_arguments)]
    fn restore(
        &self,
        req: &mut Request,
        key: &CompositionKey,
        policy: &Policy,
        records: &RecordSet,
        retired: &BTreeSet<String>,
        eligible: &mut BTreeMap<String, bool>,
        timestamp: &str,
    ) -> Result<(), Error> {
        let any_remaining = req.desired.resources.keys().any(|n| !retired.contains(n));
        if policy.require_restore && records.is_empty() && any_remaining {
            return Err(Error::RestoreRequired {
                composition_key: key.to_string(),
            });
        }

        let observed_resources = &req.observed.resources;
        for (name, desired_doc) in req.desired.resources.iter_mut() {
            if retired.contains(name) {
                continue;
            }
            let observed_doc = observed_resources.get(name);

            let member = MemberPolicy::from_pair(Some(&*desired_doc), observed_doc);
            let scope_ok = match policy.scope {
                BackupScope::All => true,
                BackupScope::Orphaned => member.survives_deletion(),
            };
            eligible.insert(name.clone(), scope_ok);

            let pair = Fallback::new(Some(&*desired_doc), observed_doc);
            let has_external = pair.annotation(annotations::EXTERNAL_NAME).is_some();
            let has_resource_name = pair.str_at(&["metadata", "name"]).is_some();
            let record = records.get(name);

            // Require-restore bypasses the scope check: always attempt.
            if !has_external && (scope_ok || policy.require_restore) {
                match record.and_then(|r| r.external_name.clone()) {
                    Some(value) => {
                        document::set_annotation(desired_doc, annotations::EXTERNAL_NAME, &value);
                        document::set_annotation(
                            desired_doc,
                            annotations::STORED_EXTERNAL_NAME,
                            &value,
                        );
                        document::set_annotation(
                            desired_doc,
                            annotations::EXTERNAL_NAME_RESTORED_AT,
                            timestamp,
                        );
                        info!(
                            resource = name.as_str(),
                            external_name = value.as_str(),
                            "Restored external name from store"
                        );
                    }
                    None if policy.require_restore => {
                        return Err(Error::RestoreRequiredForResource {
                            composition_key: key.to_string(),
                            resource_key: name.clone(),
                        });
                    }
                    None => {
                        debug!(
                            resource = name.as_str(),
                            composition_key = %key,
                            "No stored external name for resource"
                        );
                    }
                }
            }

            // Locally generated names have no deletion-policy concept, so
            // scope never gates their restoration.
            if !has_resource_name {
                if let Some(value) = record.and_then(|r| r.resource_name.clone()) {
                    document::set_str(desired_doc, &["metadata", "name"], &value);
                    document::set_annotation(
                        desired_doc,
                        annotations::STORED_RESOURCE_NAME,
                        &value,
                    );
                    document::set_annotation(
                        desired_doc,
                        annotations::RESOURCE_NAME_RESTORED_AT,
                        timestamp,
                    );
                    info!(
                        resource = name.as_str(),
                        resource_name = value.as_str(),
                        "Restored resource name from store"
                    );
                }
            }
        }
        Ok(())
    }

    /// Phase 3: persist identities whose observed value differs from the
    /// last-tracked one. At most one save per invocation, merged field by
    /// field onto the existing set.
    #[allow(clippy::too_many_arguments)]
    async fn capture(
        &self,
        req: &mut Request,
        key: &CompositionKey,
        policy: &Policy,
        records: &mut RecordSet,
        retired: &BTreeSet<String>,
        eligible: &mut BTreeMap<String, bool>,
        timestamp: &str,
    ) -> Result<(), Error> {
        let mut batch = RecordSet::new();

        for (name, observed_doc) in &req.observed.resources {
            if retired.contains(name) {
                continue;
            }

            let desired_doc = req.desired.resources.get(name);
            let scope_ok = match eligible.get(name) {
                Some(ok) => *ok,
                None => {
                    // Observed-only member, not seen during restore.
                    let member = MemberPolicy::from_pair(desired_doc, Some(observed_doc));
                    let ok = match policy.scope {
                        BackupScope::All => true,
                        BackupScope::Orphaned => member.survives_deletion(),
                    };
                    eligible.insert(name.clone(), ok);
                    ok
                }
            };

            let tracked = Fallback::new(desired_doc, Some(observed_doc));
            let mut record = IdentityRecord::default();

            if let Some(candidate) = document::annotation(observed_doc, annotations::EXTERNAL_NAME)
            {
                if !scope_ok {
                    debug!(
                        resource = name.as_str(),
                        "Member not eligible under backup scope, skipping external name"
                    );
                } else if tracked.annotation(annotations::STORED_EXTERNAL_NAME) != Some(candidate) {
                    record.external_name = Some(candidate.to_string());
                } else {
                    debug!(
                        resource = name.as_str(),
                        "External name already captured, skipping store write"
                    );
                }
            }

            if let Some(candidate) = document::str_at(observed_doc, &["metadata", "name"]) {
                if tracked.annotation(annotations::STORED_RESOURCE_NAME) != Some(candidate) {
                    record.resource_name = Some(candidate.to_string());
                }
            }

            if !record.is_empty() {
                batch.insert(name.clone(), record);
            }
        }

        if batch.is_empty() {
            debug!(composition_key = %key, "No new identities to capture");
            return Ok(());
        }

        merge_records(records, &batch);
        self.store
            .save(&policy.cluster_id, key, records)
            .await
            .map_err(Error::Store)?;
        info!(
            composition_key = %key,
            new = batch.len(),
            total = records.len(),
            "Saved captured identities to store"
        );

        for (name, record) in &batch {
            if let Some(desired_doc) = req.desired.resources.get_mut(name) {
                if let Some(value) = &record.external_name {
                    document::set_annotation(
                        desired_doc,
                        annotations::STORED_EXTERNAL_NAME,
                        value,
                    );
                    document::set_annotation(
                        desired_doc,
                        annotations::EXTERNAL_NAME_STORED_AT,
                        timestamp,
                    );
                }
                if let Some(value) = &record.resource_name {
                    document::set_annotation(
                        desired_doc,
                        annotations::STORED_RESOURCE_NAME,
                        value,
                    );
                    document::set_annotation(
                        desired_doc,
                        annotations::RESOURCE_NAME_STORED_AT,
                        timestamp,
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::State;
    use crate::store::MemoryStore;

    fn enabled_composite() -> serde_json::Value {
        json!({
            "apiVersion": "example.org/v1",
            "kind": "Database",
            "metadata": {
                "name": "xr1",
                "annotations": {"fn.namevault.io/enable": "true"}
            }
        })
    }

    #[tokio::test]
    async fn test_disabled_composite_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let engine = Reconciler::new(store);

        let req = Request {
            desired: State {
                composite: Some(json!({"apiVersion": "v1", "kind": "X", "metadata": {"name": "xr1"}})),
                resources: std::collections::BTreeMap::from([(
                    "db".to_string(),
                    json!({"kind": "Instance"}),
                )]),
            },
            ..Default::default()
        };

        let rsp = engine.reconcile(req).await.unwrap();
        assert!(rsp.message.contains("disabled"));
        assert_eq!(rsp.desired.resources["db"], json!({"kind": "Instance"}));
    }

    #[tokio::test]
    async fn test_purge_signal_short_circuits() {
        let store = Arc::new(MemoryStore::new());
        let key = CompositionKey::new("none", "none", "example.org/v1", "Database", "xr1");
        let mut records = RecordSet::new();
        records.insert(
            "db".to_string(),
            IdentityRecord {
                external_name: Some("db-123".to_string()),
                resource_name: None,
            },
        );
        store.save("default", &key, &records).await.unwrap();

        let mut composite = enabled_composite();
        document::set_annotation(&mut composite, annotations::PURGE, "true");

        let engine = Reconciler::new(store.clone());
        let rsp = engine
            .reconcile(Request {
                observed: State {
                    composite: Some(composite),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(rsp.message.contains("Purged"));
        assert!(!store.composition_exists("default", &key).await);
    }
}
