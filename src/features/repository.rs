//! Feature record repositories
//!
//! Two adapters for the [`FeatureRepository`] port: an in-memory map and a
//! JSON document on local disk. The relational store used in production
//! sits behind the same trait.

use crate::domain::feature::FeatureRecord;
use crate::domain::ports::FeatureRepository;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

fn not_found(cluster_group_id: u32, name: &str) -> Error {
    Error::FeatureNotFound {
        cluster_group_id,
        feature: name.to_string(),
    }
}

// =============================================================================
// Memory Repository
// =============================================================================

/// In-memory feature records keyed by (cluster group, feature name)
#[derive(Debug, Default)]
pub struct MemoryFeatureRepository {
    records: DashMap<(u32, String), FeatureRecord>,
    writes: AtomicU64,
}

impl MemoryFeatureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl FeatureRepository for MemoryFeatureRepository {
    async fn get_all_features(&self, cluster_group_id: u32) -> Result<Vec<FeatureRecord>> {
        let mut records: Vec<FeatureRecord> = self
            .records
            .iter()
            .filter(|entry| entry.key().0 == cluster_group_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn get_feature(&self, cluster_group_id: u32, name: &str) -> Result<FeatureRecord> {
        self.records
            .get(&(cluster_group_id, name.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| not_found(cluster_group_id, name))
    }

    async fn save_feature(&self, record: &FeatureRecord) -> Result<()> {
        self.records.insert(
            (record.cluster_group_id, record.name.clone()),
            record.clone(),
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// =============================================================================
// File Repository
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct FeatureDocument {
    #[serde(default)]
    features: Vec<FeatureRecord>,
}

/// Feature records stored in a single JSON file
///
/// Reads and writes go through one lock, so saves from the same process
/// never interleave. A missing file reads as an empty document.
#[derive(Debug)]
pub struct FileFeatureRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileFeatureRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<FeatureDocument> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(FeatureDocument::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FeatureDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, document: &FeatureDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl FeatureRepository for FileFeatureRepository {
    async fn get_all_features(&self, cluster_group_id: u32) -> Result<Vec<FeatureRecord>> {
        let _guard = self.lock.lock().await;
        let document = self.load().await?;
        Ok(document
            .features
            .into_iter()
            .filter(|r| r.cluster_group_id == cluster_group_id)
            .collect())
    }

    async fn get_feature(&self, cluster_group_id: u32, name: &str) -> Result<FeatureRecord> {
        let _guard = self.lock.lock().await;
        let document = self.load().await?;
        document
            .features
            .into_iter()
            .find(|r| r.cluster_group_id == cluster_group_id && r.name == name)
            .ok_or_else(|| not_found(cluster_group_id, name))
    }

    async fn save_feature(&self, record: &FeatureRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.load().await?;

        match document
            .features
            .iter_mut()
            .find(|r| r.cluster_group_id == record.cluster_group_id && r.name == record.name)
        {
            Some(existing) => *existing = record.clone(),
            None => document.features.push(record.clone()),
        }

        self.store(&document).await?;
        debug!(
            path = %self.path.display(),
            feature = %record.name,
            cluster_group_id = record.cluster_group_id,
            "feature record saved"
        );
        Ok(())
    }
}
