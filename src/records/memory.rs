//! In-memory backends for the external boundary traits.
//!
//! Fast, non-persistent implementations used by tests and by hosts that
//! embed the engine without a relational store.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::Result;
use crate::query::ProjectDirectory;
use crate::records::{AssetCatalog, AssetLocation, EmbeddingRecord, EmbeddingRecordStore};
use crate::vector::{AssetId, FolderId, ProjectId, UserId, Vector};

/// In-memory embedding record store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<AHashMap<AssetId, EmbeddingRecord>>,
    next_id: AtomicU64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all projects.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl EmbeddingRecordStore for MemoryRecordStore {
    fn list_records(&self, project_id: ProjectId) -> Result<Vec<EmbeddingRecord>> {
        let mut records: Vec<EmbeddingRecord> = self
            .records
            .read()
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        records.sort_unstable_by_key(|r| r.id);
        Ok(records)
    }

    fn save_record(
        &self,
        asset_id: AssetId,
        project_id: ProjectId,
        folder_id: Option<FolderId>,
        vector: Vector,
    ) -> Result<EmbeddingRecord> {
        let record = EmbeddingRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            asset_id,
            project_id,
            folder_id,
            vector,
            created_at: Utc::now(),
        };
        self.records.write().insert(asset_id, record.clone());
        Ok(record)
    }

    fn delete_record(&self, asset_id: AssetId) -> Result<Option<EmbeddingRecord>> {
        Ok(self.records.write().remove(&asset_id))
    }

    fn find_record(&self, asset_id: AssetId) -> Result<Option<EmbeddingRecord>> {
        Ok(self.records.read().get(&asset_id).cloned())
    }
}

/// In-memory asset catalog.
#[derive(Debug, Default)]
pub struct MemoryAssetCatalog {
    locations: RwLock<AHashMap<AssetId, AssetLocation>>,
}

impl MemoryAssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset's location.
    pub fn insert_asset(&self, asset_id: AssetId, location: AssetLocation) {
        self.locations.write().insert(asset_id, location);
    }

    /// Forget an asset, e.g. to simulate a deleted folder.
    pub fn remove_asset(&self, asset_id: AssetId) {
        self.locations.write().remove(&asset_id);
    }
}

impl AssetCatalog for MemoryAssetCatalog {
    fn locate_asset(&self, asset_id: AssetId) -> Result<Option<AssetLocation>> {
        Ok(self.locations.read().get(&asset_id).copied())
    }
}

/// In-memory project ownership directory.
#[derive(Debug, Default)]
pub struct MemoryProjectDirectory {
    owners: RwLock<AHashMap<UserId, Vec<ProjectId>>>,
}

impl MemoryProjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a user owns a project.
    pub fn add_project(&self, user_id: UserId, project_id: ProjectId) {
        let mut owners = self.owners.write();
        let projects = owners.entry(user_id).or_default();
        if !projects.contains(&project_id) {
            projects.push(project_id);
        }
    }
}

impl ProjectDirectory for MemoryProjectDirectory {
    fn projects_owned_by(&self, user_id: UserId) -> Result<Vec<ProjectId>> {
        Ok(self.owners.read().get(&user_id).cloned().unwrap_or_default())
    }
}
