//! Dataset lookup

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::PortError;

/// Where a dataset lives and which retrieval source it maps to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub dataset_id: String,
    pub source_id: String,
    pub storage_path: PathBuf,
}

/// Read-only dataset lookup
#[async_trait]
pub trait DatasetRegistry: Send + Sync {
    /// Resolve a dataset id or a source id. `Ok(None)` means unknown.
    async fn resolve(&self, id: &str) -> Result<Option<DatasetRecord>, PortError>;
}

/// In-memory registry, optionally seeded from a JSON manifest
#[derive(Debug, Default)]
pub struct InMemoryDatasetRegistry {
    records: RwLock<HashMap<String, DatasetRecord>>,
}

impl InMemoryDatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = DatasetRecord>) -> Self {
        let registry = Self::new();
        for record in records {
            registry.register(record);
        }
        registry
    }

    /// Load a manifest: a JSON array of dataset records
    pub async fn from_manifest(path: &Path) -> Result<Self, PortError> {
        let content = tokio::fs::read_to_string(path).await?;
        let records: Vec<DatasetRecord> = serde_json::from_str(&content)?;
        log::info!(
            "Loaded {} dataset records from {}",
            records.len(),
            path.display()
        );
        Ok(Self::with_records(records))
    }

    /// Insert or replace a record keyed by its dataset id
    pub fn register(&self, record: DatasetRecord) {
        self.records.write().insert(record.dataset_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl DatasetRegistry for InMemoryDatasetRegistry {
    async fn resolve(&self, id: &str) -> Result<Option<DatasetRecord>, PortError> {
        let records = self.records.read();
        if let Some(record) = records.get(id) {
            return Ok(Some(record.clone()));
        }
        Ok(records.values().find(|r| r.source_id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(dataset_id: &str, source_id: &str) -> DatasetRecord {
        DatasetRecord {
            dataset_id: dataset_id.to_string(),
            source_id: source_id.to_string(),
            storage_path: PathBuf::from(format!("/data/{}.csv", dataset_id)),
        }
    }

    #[tokio::test]
    async fn test_resolve_by_either_id() {
        let registry = InMemoryDatasetRegistry::with_records([record("7", "src-7")]);
        assert_eq!(registry.resolve("7").await.unwrap(), Some(record("7", "src-7")));
        assert_eq!(
            registry.resolve("src-7").await.unwrap(),
            Some(record("7", "src-7"))
        );
        assert_eq!(registry.resolve("8").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_from_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("datasets.json");
        let json = serde_json::to_string(&vec![record("a", "sa"), record("b", "sb")]).unwrap();
        tokio::fs::write(&path, json).await.unwrap();

        let registry = InMemoryDatasetRegistry::from_manifest(&path).await.unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("sb").await.unwrap().is_some());
    }
}
