//! In-memory store backend.
//!
//! The injected test double: each instance owns its own data, so concurrent
//! tests (or invocations) never share state through a global registry.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{CompositionKey, RecordSet};

use super::IdentityStore;

type ClusterData = HashMap<String, RecordSet>;

/// `IdentityStore` backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, ClusterData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any record set exists for the composition. Lets tests
    /// distinguish "absent" from "present but empty".
    pub async fn composition_exists(&self, cluster_id: &str, key: &CompositionKey) -> bool {
        self.data
            .read()
            .await
            .get(cluster_id)
            .is_some_and(|cluster| cluster.contains_key(key.as_str()))
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn save(
        &self,
        cluster_id: &str,
        key: &CompositionKey,
        records: &RecordSet,
    ) -> Result<()> {
        let mut data = self.data.write().await;
        data.entry(cluster_id.to_string())
            .or_default()
            .insert(key.as_str().to_string(), records.clone());
        Ok(())
    }

    async fn load(&self, cluster_id: &str, key: &CompositionKey) -> Result<RecordSet> {
        let data = self.data.read().await;
        Ok(data
            .get(cluster_id)
            .and_then(|cluster| cluster.get(key.as_str()))
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_resource(
        &self,
        cluster_id: &str,
        key: &CompositionKey,
        resource: &str,
    ) -> Result<()> {
        let mut data = self.data.write().await;
        if let Some(records) = data
            .get_mut(cluster_id)
            .and_then(|cluster| cluster.get_mut(key.as_str()))
        {
            records.remove(resource);
        }
        Ok(())
    }

    async fn purge(&self, cluster_id: &str, key: &CompositionKey) -> Result<()> {
        let mut data = self.data.write().await;
        if let Some(cluster) = data.get_mut(cluster_id) {
            cluster.remove(key.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IdentityRecord;

    fn record(external: &str) -> IdentityRecord {
        IdentityRecord {
            external_name: Some(external.to_string()),
            resource_name: None,
        }
    }

    #[tokio::test]
    async fn test_load_absent_returns_empty_set() {
        let store = MemoryStore::new();
        let key = CompositionKey::new("ns", "c", "v1", "K", "n");
        let records = store.load("default", &key).await.unwrap();
        assert!(records.is_empty());
        assert!(!store.composition_exists("default", &key).await);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = MemoryStore::new();
        let key = CompositionKey::new("ns", "c", "v1", "K", "n");

        let mut records = RecordSet::new();
        records.insert("db".to_string(), record("db-123"));
        store.save("default", &key, &records).await.unwrap();

        let loaded = store.load("default", &key).await.unwrap();
        assert_eq!(loaded, records);

        // Cluster ids are isolated.
        assert!(store.load("other", &key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_resource_is_idempotent() {
        let store = MemoryStore::new();
        let key = CompositionKey::new("ns", "c", "v1", "K", "n");

        // Absent composition: no error.
        store.delete_resource("default", &key, "db").await.unwrap();

        let mut records = RecordSet::new();
        records.insert("db".to_string(), record("db-123"));
        records.insert("bucket".to_string(), record("b-1"));
        store.save("default", &key, &records).await.unwrap();

        store.delete_resource("default", &key, "db").await.unwrap();
        store.delete_resource("default", &key, "db").await.unwrap();

        let loaded = store.load("default", &key).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("bucket"));
    }

    #[tokio::test]
    async fn test_purge_removes_the_composition() {
        let store = MemoryStore::new();
        let key = CompositionKey::new("ns", "c", "v1", "K", "n");

        let mut records = RecordSet::new();
        records.insert("db".to_string(), record("db-123"));
        store.save("default", &key, &records).await.unwrap();
        assert!(store.composition_exists("default", &key).await);

        store.purge("default", &key).await.unwrap();
        assert!(!store.composition_exists("default", &key).await);

        // Idempotent on absence.
        store.purge("default", &key).await.unwrap();
    }
}
