//! Per-tenant exact-search vector index.
//!
//! A [`TenantIndex`] holds one project's embedding vectors in an append-only
//! slot arena together with two mapping tables: forward (slot → asset,
//! folder) and reverse (asset → slot). Removal is logical: the entry leaves
//! both maps while its vector slot stays behind as a tombstone, excluded from
//! search results. Tombstones are reclaimed only by a full rebuild from the
//! durable record store; [`TenantIndex::tombstone_ratio`] tells callers when
//! one is worth triggering.
//!
//! Search is an exact inner-product scan over all live slots. Since every
//! stored vector and every query vector is unit-normalized, the inner product
//! is the cosine similarity.

pub mod registry;
pub mod snapshot;

pub use registry::IndexRegistry;

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PhotosearchError, Result};
use crate::vector::{AssetId, FolderId, Vector};

/// Internal slot identifier within one tenant's arena. Assigned
/// sequentially, never reused.
pub type Slot = u32;

/// Minimum number of live entries before scoring goes through rayon.
const PARALLEL_SCAN_THRESHOLD: usize = 1024;

/// What a live slot points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotEntry {
    /// Asset this vector was embedded from.
    pub asset_id: AssetId,
    /// Folder the asset lived in at embedding time, if any.
    pub folder_id: Option<FolderId>,
}

/// A single ranked search result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Asset identifier, to be resolved to metadata by the caller.
    pub asset_id: AssetId,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub similarity: f32,
}

/// Statistics about one tenant's index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TenantIndexStats {
    /// Physical vector slots, tombstones included.
    pub total_vectors: usize,
    /// Entries still reachable through the mapping tables.
    pub live_entries: usize,
    /// Embedding dimension.
    pub dimension: usize,
    /// `(total_vectors - live_entries) / total_vectors`, 0 for an empty
    /// arena.
    pub tombstone_ratio: f64,
}

/// In-memory exact-search index for one project.
#[derive(Debug, Clone)]
pub struct TenantIndex {
    dimension: usize,
    /// Append-only slot arena. May contain tombstoned vectors.
    vectors: Vec<Vector>,
    forward: HashMap<Slot, SlotEntry>,
    reverse: HashMap<AssetId, Slot>,
}

impl TenantIndex {
    /// Create an empty index for the given embedding dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            forward: HashMap::new(),
            reverse: HashMap::new(),
        }
    }

    /// Reconstruct an index from the authoritative record list, in order.
    ///
    /// Produces exactly the state reached by inserting each record
    /// individually into a fresh index, with zero tombstones.
    pub fn from_records(
        dimension: usize,
        records: impl IntoIterator<Item = (AssetId, Option<FolderId>, Vector)>,
    ) -> Result<Self> {
        let mut index = Self::new(dimension);
        for (asset_id, folder_id, vector) in records {
            index.insert(asset_id, folder_id, vector)?;
        }
        Ok(index)
    }

    /// Rebuild an index from snapshot parts, validating the mapping
    /// invariants. Used by snapshot loading; inconsistent parts are rejected
    /// so a corrupt snapshot degrades to an empty index instead of serving
    /// wrong results.
    pub(crate) fn from_parts(
        dimension: usize,
        vectors: Vec<Vector>,
        forward: HashMap<Slot, SlotEntry>,
        reverse: HashMap<AssetId, Slot>,
    ) -> Result<Self> {
        if forward.len() != reverse.len() {
            return Err(PhotosearchError::index(format!(
                "mapping tables disagree: {} forward entries, {} reverse entries",
                forward.len(),
                reverse.len()
            )));
        }
        for (slot, entry) in &forward {
            if *slot as usize >= vectors.len() {
                return Err(PhotosearchError::index(format!(
                    "forward map references slot {} beyond arena of {}",
                    slot,
                    vectors.len()
                )));
            }
            if reverse.get(&entry.asset_id) != Some(slot) {
                return Err(PhotosearchError::index(format!(
                    "asset {} not mapped back to slot {}",
                    entry.asset_id, slot
                )));
            }
        }
        for vector in &vectors {
            vector.validate_dimension(dimension)?;
        }
        Ok(Self {
            dimension,
            vectors,
            forward,
            reverse,
        })
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        usize,
        Vec<Vector>,
        HashMap<Slot, SlotEntry>,
        HashMap<AssetId, Slot>,
    ) {
        (self.dimension, self.vectors, self.forward, self.reverse)
    }

    pub(crate) fn parts(
        &self,
    ) -> (
        usize,
        &Vec<Vector>,
        &HashMap<Slot, SlotEntry>,
        &HashMap<AssetId, Slot>,
    ) {
        (self.dimension, &self.vectors, &self.forward, &self.reverse)
    }

    /// Embedding dimension of this index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of physical slots, tombstones included.
    pub fn total_vectors(&self) -> usize {
        self.vectors.len()
    }

    /// Number of live, searchable entries.
    pub fn live_entries(&self) -> usize {
        self.forward.len()
    }

    /// True if no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// True if the asset currently has a live vector in this index.
    pub fn contains_asset(&self, asset_id: AssetId) -> bool {
        self.reverse.contains_key(&asset_id)
    }

    /// Fraction of physical slots that are tombstones.
    pub fn tombstone_ratio(&self) -> f64 {
        if self.vectors.is_empty() {
            return 0.0;
        }
        (self.vectors.len() - self.forward.len()) as f64 / self.vectors.len() as f64
    }

    /// Index statistics, no side effects.
    pub fn stats(&self) -> TenantIndexStats {
        TenantIndexStats {
            total_vectors: self.vectors.len(),
            live_entries: self.forward.len(),
            dimension: self.dimension,
            tombstone_ratio: self.tombstone_ratio(),
        }
    }

    /// Append a vector for an asset, assigning it the next sequential slot.
    ///
    /// The vector is re-normalized defensively so the inner-product search
    /// contract holds regardless of the caller. If the asset already has a
    /// live entry it is tombstoned first (records are never mutated in
    /// place; updates are delete + reinsert).
    pub fn insert(
        &mut self,
        asset_id: AssetId,
        folder_id: Option<FolderId>,
        vector: Vector,
    ) -> Result<Slot> {
        vector.validate_dimension(self.dimension)?;
        if !vector.is_valid() {
            return Err(PhotosearchError::index(format!(
                "vector for asset {asset_id} contains non-finite values"
            )));
        }

        if self.reverse.contains_key(&asset_id) {
            self.remove(asset_id);
        }

        let slot: Slot = self
            .vectors
            .len()
            .try_into()
            .map_err(|_| PhotosearchError::index("slot arena exhausted"))?;

        self.vectors.push(vector.normalized());
        self.forward.insert(
            slot,
            SlotEntry {
                asset_id,
                folder_id,
            },
        );
        self.reverse.insert(asset_id, slot);
        Ok(slot)
    }

    /// Remove an asset from both mapping tables, leaving its vector slot as
    /// a tombstone.
    ///
    /// Returns `true` if an entry was removed. Removing an absent asset is a
    /// no-op, not an error.
    pub fn remove(&mut self, asset_id: AssetId) -> bool {
        match self.reverse.remove(&asset_id) {
            Some(slot) => {
                self.forward.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Exact top-k inner-product search over all live slots.
    ///
    /// Tombstoned slots are skipped, results below `similarity_floor` are
    /// dropped, and with `folder_id` set only entries from that folder
    /// qualify. Results are ordered best similarity first; exact score ties
    /// break toward the lower slot id (insertion order). An empty index
    /// yields an empty result, not an error.
    pub fn search(
        &self,
        query: &Vector,
        k: usize,
        folder_id: Option<FolderId>,
        similarity_floor: f32,
    ) -> Result<Vec<SearchHit>> {
        query.validate_dimension(self.dimension)?;
        if k == 0 || self.forward.is_empty() {
            return Ok(Vec::new());
        }

        let query = query.normalized();

        let candidates: Vec<(Slot, SlotEntry)> = self
            .forward
            .iter()
            .filter(|(_, entry)| folder_id.is_none() || entry.folder_id == folder_id)
            .map(|(slot, entry)| (*slot, *entry))
            .collect();

        let score = |&(slot, entry): &(Slot, SlotEntry)| {
            let similarity = self.vectors[slot as usize].dot(&query);
            (slot, entry, similarity)
        };

        let mut scored: Vec<(Slot, SlotEntry, f32)> =
            if candidates.len() >= PARALLEL_SCAN_THRESHOLD {
                candidates.par_iter().map(score).collect()
            } else {
                candidates.iter().map(score).collect()
            };

        scored.retain(|(_, _, similarity)| *similarity >= similarity_floor);
        scored.sort_unstable_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(_, entry, similarity)| SearchHit {
                asset_id: entry.asset_id,
                similarity,
            })
            .collect())
    }
}
