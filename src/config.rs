//! Configuration for the search engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Embedding dimension of CLIP ViT-B/32, the reference encoder.
pub const DEFAULT_DIMENSION: usize = 512;

/// Configuration shared by the index registry and the query service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Embedding dimension. Fixed per encoder model.
    pub dimension: usize,
    /// Root directory for per-project index snapshots.
    pub index_dir: PathBuf,
    /// Default number of results to return.
    pub default_top_k: usize,
    /// Default similarity floor for image queries.
    pub image_similarity_floor: f32,
    /// Default similarity floor for text queries. Text queries empirically
    /// need a lower floor than image queries.
    pub text_similarity_floor: f32,
    /// Default text weight when blending a combined text+image query.
    pub default_mix_ratio: f32,
    /// Additional attempts for a failed snapshot write before surfacing the
    /// error.
    pub snapshot_write_retries: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            index_dir: PathBuf::from("search_indices"),
            default_top_k: 10,
            image_similarity_floor: 0.7,
            text_similarity_floor: 0.2,
            default_mix_ratio: 0.5,
            snapshot_write_retries: 2,
        }
    }
}

impl SearchConfig {
    /// Create a config with the default knobs rooted at the given snapshot
    /// directory.
    pub fn with_index_dir<P: Into<PathBuf>>(index_dir: P) -> Self {
        Self {
            index_dir: index_dir.into(),
            ..Self::default()
        }
    }

    /// Default similarity floor for the given query modality.
    pub fn default_floor(&self, has_text: bool) -> f32 {
        if has_text {
            self.text_similarity_floor
        } else {
            self.image_similarity_floor
        }
    }
}
