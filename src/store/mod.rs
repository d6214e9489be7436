//! Persistence backends for identity records.
//!
//! The engine only sees the [`IdentityStore`] trait; backends are injected
//! at construction so tests can run in parallel against their own instances.

mod file;
mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::config;
use crate::domain::{CompositionKey, Policy, RecordSet};
use crate::error::Error;

/// The persistence contract consumed by the reconciliation engine.
///
/// Every backend must provide read-after-write visibility within one
/// invocation: no caching layer may serve stale data back to the same call.
/// Writes are last-writer-wins at composition granularity.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Replace the entire record set for a composition.
    async fn save(
        &self,
        cluster_id: &str,
        key: &CompositionKey,
        records: &RecordSet,
    ) -> Result<()>;

    /// Load all records for a composition. Absence is not exceptional: an
    /// empty set is returned when no data exists, never an error.
    async fn load(&self, cluster_id: &str, key: &CompositionKey) -> Result<RecordSet>;

    /// Remove one resource's record. Idempotent: succeeds when the
    /// composition or the entry is already absent.
    async fn delete_resource(
        &self,
        cluster_id: &str,
        key: &CompositionKey,
        resource: &str,
    ) -> Result<()>;

    /// Remove the entire record set for a composition. Idempotent on absence.
    async fn purge(&self, cluster_id: &str, key: &CompositionKey) -> Result<()>;
}

/// Open the backend selected by the resolved policy.
pub fn open_store(policy: &Policy) -> Result<Arc<dyn IdentityStore>, Error> {
    match policy.store.as_str() {
        "file" => {
            let dir = match &policy.store_path {
                Some(path) => path.clone(),
                None => config::data_dir().map_err(|e| Error::Config(format!("{e:#}")))?,
            };
            Ok(Arc::new(FileStore::new(dir)))
        }
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(Error::UnsupportedStore {
            name: other.to_string(),
        }),
    }
}
