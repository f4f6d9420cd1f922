//! Process-wide registry of per-tenant indexes.
//!
//! [`IndexRegistry`] owns the map from project id to live [`TenantIndex`],
//! giving concurrent request handlers O(1) tenant lookup. Every tenant sits
//! behind its own `RwLock`: mutations on one project serialize (and hold the
//! lock through the snapshot write, so snapshots are never interleaved)
//! while operations on other projects proceed untouched. Searches take the
//! per-tenant read lock for the duration of the scan, which gives each call
//! a consistent view of vectors and maps.
//!
//! Indexes load lazily: the first touch of a project reads its snapshot
//! from disk, or starts empty if there is none or it is unreadable. The
//! registry never rebuilds from the durable record store on its own; that
//! is the explicit [`IndexRegistry::rebuild`] operation.

use std::sync::Arc;

use ahash::AHashMap;
use log::{info, warn};
use parking_lot::RwLock;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::index::{SearchHit, TenantIndex, TenantIndexStats, snapshot};
use crate::vector::{AssetId, FolderId, ProjectId, Vector};

/// Thread-safe registry of live tenant indexes with snapshot persistence.
#[derive(Debug)]
pub struct IndexRegistry {
    config: SearchConfig,
    indices: RwLock<AHashMap<ProjectId, Arc<RwLock<TenantIndex>>>>,
}

impl IndexRegistry {
    /// Create a registry rooted at the config's snapshot directory.
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            indices: RwLock::new(AHashMap::new()),
        }
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Get the live index for a project, loading its snapshot or creating an
    /// empty index on first access.
    ///
    /// Never consults the durable record store; a full rebuild is a separate
    /// explicit operation.
    pub fn get_or_create(&self, project_id: ProjectId) -> Arc<RwLock<TenantIndex>> {
        if let Some(index) = self.indices.read().get(&project_id) {
            return index.clone();
        }

        let mut indices = self.indices.write();
        // Another thread may have loaded it while we waited for the lock.
        if let Some(index) = indices.get(&project_id) {
            return index.clone();
        }

        let index = self.load_or_empty(project_id);
        let index = Arc::new(RwLock::new(index));
        indices.insert(project_id, index.clone());
        index
    }

    fn load_or_empty(&self, project_id: ProjectId) -> TenantIndex {
        match snapshot::load(&self.config.index_dir, project_id, self.config.dimension) {
            Ok(Some(index)) => {
                info!(
                    "loaded index for project {} from snapshot ({} live entries)",
                    project_id,
                    index.live_entries()
                );
                index
            }
            Ok(None) => TenantIndex::new(self.config.dimension),
            Err(e) => {
                // Data-loss-safe degradation: start empty, let an explicit
                // rebuild restore from durable records.
                warn!(
                    "snapshot for project {project_id} unusable, starting empty \
                     (rebuild to recover): {e}"
                );
                TenantIndex::new(self.config.dimension)
            }
        }
    }

    /// Add a vector for an asset to a project's index and persist the
    /// snapshot. Auto-creates the index for a project with no prior state.
    pub fn add(
        &self,
        project_id: ProjectId,
        asset_id: AssetId,
        folder_id: Option<FolderId>,
        vector: Vector,
    ) -> Result<()> {
        let tenant = self.get_or_create(project_id);
        let mut index = tenant.write();
        index.insert(asset_id, folder_id, vector)?;
        self.persist(project_id, &index)
    }

    /// Remove an asset from a project's index and persist the snapshot.
    ///
    /// Removing an absent asset (or from an unknown project) is a no-op;
    /// returns whether an entry was actually removed.
    pub fn remove(&self, project_id: ProjectId, asset_id: AssetId) -> Result<bool> {
        let tenant = self.get_or_create(project_id);
        let mut index = tenant.write();
        if !index.remove(asset_id) {
            return Ok(false);
        }
        self.persist(project_id, &index)?;
        Ok(true)
    }

    /// Exact top-k search in one project's index.
    ///
    /// An unknown project or an empty index yields an empty result.
    pub fn search(
        &self,
        project_id: ProjectId,
        query: &Vector,
        k: usize,
        folder_id: Option<FolderId>,
        similarity_floor: f32,
    ) -> Result<Vec<SearchHit>> {
        let tenant = self.get_or_create(project_id);
        let index = tenant.read();
        index.search(query, k, folder_id, similarity_floor)
    }

    /// Discard a project's live index and reconstruct it from the given
    /// authoritative record list, then persist.
    ///
    /// This is the recovery path for tombstone accumulation and snapshot
    /// corruption. An empty record list resets the project to an empty
    /// index.
    pub fn rebuild(
        &self,
        project_id: ProjectId,
        records: Vec<(AssetId, Option<FolderId>, Vector)>,
    ) -> Result<()> {
        let record_count = records.len();
        let rebuilt = TenantIndex::from_records(self.config.dimension, records)?;

        let tenant = self.get_or_create(project_id);
        let mut index = tenant.write();
        *index = rebuilt;
        self.persist(project_id, &index)?;
        info!("rebuilt index for project {project_id} from {record_count} records");
        Ok(())
    }

    /// Statistics for one project's index, no side effects.
    pub fn stats(&self, project_id: ProjectId) -> TenantIndexStats {
        self.get_or_create(project_id).read().stats()
    }

    /// Fraction of a project's physical slots that are tombstones. Callers
    /// use this to decide when to trigger a compacting rebuild.
    pub fn tombstone_ratio(&self, project_id: ProjectId) -> f64 {
        self.get_or_create(project_id).read().tombstone_ratio()
    }

    /// Eagerly load every project snapshot found under the index directory.
    ///
    /// Optional warm-start pass for a new process; indexes otherwise load on
    /// first touch. Returns the number of projects now resident.
    pub fn load_all(&self) -> Result<usize> {
        let ids = snapshot::scan_project_ids(&self.config.index_dir)?;
        for project_id in &ids {
            self.get_or_create(*project_id);
        }
        info!("loaded {} project indices from disk", ids.len());
        Ok(ids.len())
    }

    /// Project ids currently resident in memory.
    pub fn resident_projects(&self) -> Vec<ProjectId> {
        let mut ids: Vec<ProjectId> = self.indices.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn persist(&self, project_id: ProjectId, index: &TenantIndex) -> Result<()> {
        snapshot::save(
            &self.config.index_dir,
            project_id,
            index,
            self.config.snapshot_write_retries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> (tempfile::TempDir, IndexRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SearchConfig::with_index_dir(dir.path());
        config.dimension = 2;
        (dir, IndexRegistry::new(config))
    }

    fn unit(data: Vec<f32>) -> Vector {
        Vector::new(data).normalized()
    }

    #[test]
    fn test_add_then_search_round_trip() {
        let (_dir, registry) = test_registry();
        let v = unit(vec![0.6, 0.8]);
        registry.add(7, 1, None, v.clone()).unwrap();

        let hits = registry.search(7, &v, 1, None, 0.0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].asset_id, 1);
        assert!((hits[0].similarity - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_projects_are_isolated() {
        let (_dir, registry) = test_registry();
        registry.add(1, 100, None, unit(vec![1.0, 0.0])).unwrap();
        registry.add(2, 200, None, unit(vec![1.0, 0.0])).unwrap();

        let hits = registry.search(1, &unit(vec![1.0, 0.0]), 10, None, 0.0).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.asset_id).collect();
        assert_eq!(ids, vec![100]);
    }

    #[test]
    fn test_search_unknown_project_is_empty() {
        let (_dir, registry) = test_registry();
        assert!(registry
            .search(99, &unit(vec![1.0, 0.0]), 10, None, 0.0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_remove_is_idempotent_no_op() {
        let (_dir, registry) = test_registry();
        registry.add(1, 5, None, unit(vec![1.0, 0.0])).unwrap();

        assert!(registry.remove(1, 5).unwrap());
        let stats = registry.stats(1);
        assert!(!registry.remove(1, 5).unwrap());
        assert_eq!(registry.stats(1), stats);

        // Unknown project is also a no-op.
        assert!(!registry.remove(42, 5).unwrap());
    }

    #[test]
    fn test_rebuild_replaces_live_index() {
        let (_dir, registry) = test_registry();
        registry.add(1, 5, None, unit(vec![1.0, 0.0])).unwrap();
        registry.remove(1, 5).unwrap();
        assert!(registry.stats(1).tombstone_ratio > 0.0);

        registry
            .rebuild(1, vec![(6, Some(3), unit(vec![0.0, 1.0]))])
            .unwrap();

        let stats = registry.stats(1);
        assert_eq!(stats.total_vectors, 1);
        assert_eq!(stats.live_entries, 1);
        assert_eq!(stats.tombstone_ratio, 0.0);

        let hits = registry.search(1, &unit(vec![0.0, 1.0]), 10, None, 0.0).unwrap();
        assert_eq!(hits[0].asset_id, 6);
    }

    #[test]
    fn test_rebuild_with_no_records_resets_empty() {
        let (_dir, registry) = test_registry();
        registry.add(1, 5, None, unit(vec![1.0, 0.0])).unwrap();
        registry.rebuild(1, Vec::new()).unwrap();
        assert_eq!(registry.stats(1).total_vectors, 0);
    }

    #[test]
    fn test_stats_for_unknown_project() {
        let (_dir, registry) = test_registry();
        let stats = registry.stats(123);
        assert_eq!(stats.total_vectors, 0);
        assert_eq!(stats.live_entries, 0);
        assert_eq!(stats.dimension, 2);
    }
}
