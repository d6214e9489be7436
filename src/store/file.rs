//! File-based store backend.
//!
//! On-disk layout mirrors the namespaced-configuration-object backend this
//! replaces: one JSON document per cluster id, mapping the base64-encoded
//! composition key to that composition's record set. Documents are rewritten
//! atomically (temp file + rename) under an exclusive advisory lock, so
//! concurrent invocations for the same cluster are last-writer-wins at
//! composition granularity rather than interleaved.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use fs2::FileExt;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::{CompositionKey, RecordSet};

use super::IdentityStore;

/// One cluster document: base64(composition key) -> record set.
type ClusterDoc = BTreeMap<String, RecordSet>;

/// `IdentityStore` backed by per-cluster JSON documents on disk.
pub struct FileStore {
    dir: PathBuf,
}

/// Exclusive advisory lock over one cluster document, released on drop.
struct ClusterLock {
    file: std::fs::File,
}

impl Drop for ClusterLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl FileStore {
    /// Create a store rooted at `dir`. Nothing touches the filesystem until
    /// the first operation.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn cluster_path(&self, cluster_id: &str) -> PathBuf {
        self.dir.join(format!("cluster-{}.json", cluster_id))
    }

    fn data_key(key: &CompositionKey) -> String {
        BASE64.encode(key.as_str())
    }

    fn lock_cluster(&self, cluster_id: &str) -> Result<ClusterLock> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create data directory: {}", self.dir.display()))?;

        let lock_path = self.dir.join(format!("cluster-{}.lock", cluster_id));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to acquire lock: {}", lock_path.display()))?;

        Ok(ClusterLock { file })
    }

    async fn read_doc(&self, cluster_id: &str) -> Result<ClusterDoc> {
        let path = self.cluster_path(cluster_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ClusterDoc::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read cluster file: {}", path.display()));
            }
        };

        serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse cluster file: {}", path.display()))
    }

    fn write_doc(&self, cluster_id: &str, doc: &ClusterDoc) -> Result<()> {
        let path = self.cluster_path(cluster_id);

        // An empty cluster document is removed rather than left as a shell.
        if doc.is_empty() {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Failed to remove cluster file: {}", path.display())
                    });
                }
            }
            return Ok(());
        }

        let raw = serde_json::to_vec_pretty(doc).context("Failed to serialize cluster data")?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to create temp file in: {}", self.dir.display()))?;
        tmp.write_all(&raw).context("Failed to write cluster data")?;
        tmp.flush().context("Failed to flush cluster data")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to replace cluster file: {}", path.display()))?;

        Ok(())
    }
}

#[async_trait]
impl IdentityStore for FileStore {
    async fn save(
        &self,
        cluster_id: &str,
        key: &CompositionKey,
        records: &RecordSet,
    ) -> Result<()> {
        let _lock = self.lock_cluster(cluster_id)?;
        let mut doc = self.read_doc(cluster_id).await?;

        // Saving an empty set is equivalent to purging the composition.
        if records.is_empty() {
            doc.remove(&Self::data_key(key));
        } else {
            doc.insert(Self::data_key(key), records.clone());
        }
        self.write_doc(cluster_id, &doc)?;

        debug!(
            cluster_id,
            composition_key = %key,
            count = records.len(),
            "Saved records to cluster file"
        );
        Ok(())
    }

    async fn load(&self, cluster_id: &str, key: &CompositionKey) -> Result<RecordSet> {
        let _lock = self.lock_cluster(cluster_id)?;
        let doc = self.read_doc(cluster_id).await?;
        Ok(doc.get(&Self::data_key(key)).cloned().unwrap_or_default())
    }

    async fn delete_resource(
        &self,
        cluster_id: &str,
        key: &CompositionKey,
        resource: &str,
    ) -> Result<()> {
        let _lock = self.lock_cluster(cluster_id)?;
        let mut doc = self.read_doc(cluster_id).await?;

        let data_key = Self::data_key(key);
        if let Some(records) = doc.get_mut(&data_key) {
            records.remove(resource);
            // Deleting the last entry purges the composition key entirely.
            if records.is_empty() {
                doc.remove(&data_key);
            }
            self.write_doc(cluster_id, &doc)?;
            debug!(
                cluster_id,
                composition_key = %key,
                resource,
                "Deleted resource from cluster file"
            );
        }
        Ok(())
    }

    async fn purge(&self, cluster_id: &str, key: &CompositionKey) -> Result<()> {
        let _lock = self.lock_cluster(cluster_id)?;
        let mut doc = self.read_doc(cluster_id).await?;

        if doc.remove(&Self::data_key(key)).is_some() {
            self.write_doc(cluster_id, &doc)?;
            debug!(cluster_id, composition_key = %key, "Purged composition from cluster file");
        }
        Ok(())
    }
}
