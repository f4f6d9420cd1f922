//! Embedding records and the manager that keeps the durable store and the
//! tenant indexes consistent.
//!
//! The durable [`EmbeddingRecordStore`] is the source of truth: one record
//! per embedded asset, never mutated in place (updates are delete +
//! reinsert). The in-memory tenant index is a derived, rebuildable cache
//! over those records. [`EmbeddingManager`] mediates between the two: insert
//! writes the durable record first and then mirrors it into the index,
//! delete does the reverse, and a full per-project rebuild recovers the
//! index from the records whenever it is untrustworthy.

pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::embedding::{ImageEmbedder, decode_image};
use crate::error::Result;
use crate::index::IndexRegistry;
use crate::vector::{AssetId, FolderId, ProjectId, Vector};

/// One durable embedding record. Owned by the external record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Store-assigned record id.
    pub id: u64,
    /// The embedded asset. Unique per asset.
    pub asset_id: AssetId,
    /// Tenant scope.
    pub project_id: ProjectId,
    /// Folder the asset lived in at embedding time, if any.
    pub folder_id: Option<FolderId>,
    /// Unit-normalized embedding vector.
    pub vector: Vector,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Where an asset lives: its owning project and (optional) folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetLocation {
    pub project_id: ProjectId,
    pub folder_id: Option<FolderId>,
}

/// Boundary contract of the durable embedding record store.
///
/// Implemented externally (relational storage in production,
/// [`memory::MemoryRecordStore`] in tests and embedded setups).
pub trait EmbeddingRecordStore: Send + Sync {
    /// All records for one project, in creation order.
    fn list_records(&self, project_id: ProjectId) -> Result<Vec<EmbeddingRecord>>;

    /// Persist a new record for an asset.
    fn save_record(
        &self,
        asset_id: AssetId,
        project_id: ProjectId,
        folder_id: Option<FolderId>,
        vector: Vector,
    ) -> Result<EmbeddingRecord>;

    /// Delete the record for an asset, returning it if one existed.
    fn delete_record(&self, asset_id: AssetId) -> Result<Option<EmbeddingRecord>>;

    /// Look up the record for an asset.
    fn find_record(&self, asset_id: AssetId) -> Result<Option<EmbeddingRecord>>;
}

/// Boundary contract for resolving an asset to its project and folder.
pub trait AssetCatalog: Send + Sync {
    /// Resolve an asset's owning project/folder. `Ok(None)` when the asset
    /// or its folder no longer exists.
    fn locate_asset(&self, asset_id: AssetId) -> Result<Option<AssetLocation>>;
}

/// Keeps the durable record store and the tenant indexes in sync.
pub struct EmbeddingManager {
    store: Arc<dyn EmbeddingRecordStore>,
    catalog: Arc<dyn AssetCatalog>,
    embedder: Arc<dyn ImageEmbedder>,
    registry: Arc<IndexRegistry>,
}

impl EmbeddingManager {
    /// Wire a manager over the given collaborators.
    pub fn new(
        store: Arc<dyn EmbeddingRecordStore>,
        catalog: Arc<dyn AssetCatalog>,
        embedder: Arc<dyn ImageEmbedder>,
        registry: Arc<IndexRegistry>,
    ) -> Self {
        Self {
            store,
            catalog,
            embedder,
            registry,
        }
    }

    /// The index registry this manager mirrors into.
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Embed an uploaded asset: encode its image, persist the durable
    /// record, and mirror it into the project's index.
    ///
    /// Embedding is best-effort, additive functionality: an asset whose
    /// folder/project cannot be resolved, or whose image fails to decode or
    /// encode, yields `Ok(None)` with a logged warning so the surrounding
    /// upload flow proceeds without an embedding. The asset simply will not
    /// surface in search.
    ///
    /// An asset that already has a record is re-embedded as delete +
    /// reinsert; records are never mutated in place.
    pub fn create(&self, asset_id: AssetId, image_bytes: &[u8]) -> Result<Option<EmbeddingRecord>> {
        let Some(location) = self.catalog.locate_asset(asset_id)? else {
            warn!("asset {asset_id} has no resolvable folder/project, skipping embedding");
            return Ok(None);
        };

        let vector = match decode_image(image_bytes)
            .and_then(|img| self.embedder.embed_image(&img))
        {
            Ok(vector) => vector,
            Err(e) => {
                warn!("embedding asset {asset_id} failed, upload proceeds without it: {e}");
                return Ok(None);
            }
        };

        if self.store.find_record(asset_id)?.is_some() {
            self.delete(asset_id)?;
        }

        let record = self.store.save_record(
            asset_id,
            location.project_id,
            location.folder_id,
            vector.clone(),
        )?;

        // The record is durable at this point; a failed index mirror is
        // recoverable via rebuild and must not fail the upload.
        if let Err(e) = self
            .registry
            .add(record.project_id, asset_id, record.folder_id, vector)
        {
            warn!(
                "index mirror for asset {asset_id} in project {} failed, rebuild to recover: {e}",
                record.project_id
            );
        }

        debug!(
            "added embedding for asset {asset_id} in project {}",
            record.project_id
        );
        Ok(Some(record))
    }

    /// Delete an asset's embedding from the durable store and its project
    /// index. A no-op if no record exists.
    pub fn delete(&self, asset_id: AssetId) -> Result<()> {
        let Some(record) = self.store.delete_record(asset_id)? else {
            return Ok(());
        };
        self.registry.remove(record.project_id, asset_id)?;
        debug!(
            "removed embedding for asset {asset_id} from project {}",
            record.project_id
        );
        Ok(())
    }

    /// Reconstruct one project's index from its durable records.
    ///
    /// The recovery mechanism for tombstone accumulation and snapshot
    /// corruption. Returns the number of records indexed; a project with no
    /// records resets to an empty index.
    pub fn rebuild_for_project(&self, project_id: ProjectId) -> Result<usize> {
        let records = self.store.list_records(project_id)?;
        let count = records.len();
        self.registry.rebuild(
            project_id,
            records
                .into_iter()
                .map(|r| (r.asset_id, r.folder_id, r.vector))
                .collect(),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::embedding::hashed::HashedEmbedder;
    use crate::records::memory::{MemoryAssetCatalog, MemoryRecordStore};

    fn png_bytes(color: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb(color));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        bytes
    }

    fn test_manager() -> (tempfile::TempDir, Arc<MemoryRecordStore>, Arc<MemoryAssetCatalog>, EmbeddingManager)
    {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SearchConfig::with_index_dir(dir.path());
        config.dimension = 32;

        let store = Arc::new(MemoryRecordStore::new());
        let catalog = Arc::new(MemoryAssetCatalog::new());
        let manager = EmbeddingManager::new(
            store.clone(),
            catalog.clone(),
            Arc::new(HashedEmbedder::new(32)),
            Arc::new(IndexRegistry::new(config)),
        );
        (dir, store, catalog, manager)
    }

    #[test]
    fn test_create_persists_and_indexes() {
        let (_dir, store, catalog, manager) = test_manager();
        catalog.insert_asset(
            1,
            AssetLocation {
                project_id: 9,
                folder_id: Some(4),
            },
        );

        let record = manager.create(1, &png_bytes([255, 0, 0])).unwrap().unwrap();
        assert_eq!(record.asset_id, 1);
        assert_eq!(record.project_id, 9);
        assert_eq!(record.folder_id, Some(4));
        assert!((record.vector.norm() - 1.0).abs() < 1e-5);

        assert!(store.find_record(1).unwrap().is_some());
        assert_eq!(manager.registry().stats(9).live_entries, 1);
    }

    #[test]
    fn test_create_unresolvable_asset_is_soft_failure() {
        let (_dir, store, _catalog, manager) = test_manager();

        // Folder lookup fails (asset never cataloged).
        let result = manager.create(42, &png_bytes([0, 255, 0])).unwrap();
        assert!(result.is_none());
        assert!(store.find_record(42).unwrap().is_none());
    }

    #[test]
    fn test_create_corrupt_image_is_soft_failure() {
        let (_dir, store, catalog, manager) = test_manager();
        catalog.insert_asset(
            1,
            AssetLocation {
                project_id: 9,
                folder_id: None,
            },
        );

        let result = manager.create(1, b"definitely not an image").unwrap();
        assert!(result.is_none());
        assert!(store.find_record(1).unwrap().is_none());
        assert_eq!(manager.registry().stats(9).live_entries, 0);
    }

    #[test]
    fn test_recreate_replaces_record() {
        let (_dir, store, catalog, manager) = test_manager();
        catalog.insert_asset(
            1,
            AssetLocation {
                project_id: 9,
                folder_id: None,
            },
        );

        let first = manager.create(1, &png_bytes([255, 0, 0])).unwrap().unwrap();
        let second = manager.create(1, &png_bytes([0, 0, 255])).unwrap().unwrap();
        assert_ne!(first.id, second.id);

        assert_eq!(store.list_records(9).unwrap().len(), 1);
        assert_eq!(manager.registry().stats(9).live_entries, 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, store, catalog, manager) = test_manager();
        catalog.insert_asset(
            1,
            AssetLocation {
                project_id: 9,
                folder_id: None,
            },
        );
        manager.create(1, &png_bytes([255, 0, 0])).unwrap();

        manager.delete(1).unwrap();
        assert!(store.find_record(1).unwrap().is_none());
        assert_eq!(manager.registry().stats(9).live_entries, 0);

        // Second delete, and deleting an asset that never existed.
        manager.delete(1).unwrap();
        manager.delete(999).unwrap();
    }

    #[test]
    fn test_rebuild_for_project_compacts_tombstones() {
        let (_dir, _store, catalog, manager) = test_manager();
        for asset_id in 1..=3 {
            catalog.insert_asset(
                asset_id,
                AssetLocation {
                    project_id: 9,
                    folder_id: None,
                },
            );
            manager
                .create(asset_id, &png_bytes([asset_id as u8 * 40, 10, 10]))
                .unwrap();
        }
        manager.delete(2).unwrap();
        assert!(manager.registry().stats(9).tombstone_ratio > 0.0);

        let count = manager.rebuild_for_project(9).unwrap();
        assert_eq!(count, 2);

        let stats = manager.registry().stats(9);
        assert_eq!(stats.total_vectors, 2);
        assert_eq!(stats.tombstone_ratio, 0.0);
    }

    #[test]
    fn test_rebuild_unknown_project_resets_empty() {
        let (_dir, _store, _catalog, manager) = test_manager();
        assert_eq!(manager.rebuild_for_project(77).unwrap(), 0);
        assert_eq!(manager.registry().stats(77).total_vectors, 0);
    }
}
