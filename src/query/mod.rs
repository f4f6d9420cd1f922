//! Query service: user-facing search requests to ranked asset ids.
//!
//! [`QueryService`] validates a [`SearchRequest`], encodes the text and/or
//! image query through the multimodal embedder, blends the two modalities
//! when both are present, and scans one tenant index (or every project
//! owned by a user) returning hits ranked by cosine similarity. Resolving
//! the returned asset ids to displayable metadata is the calling layer's
//! job.

use std::sync::Arc;

use image::DynamicImage;

use crate::embedding::{MultimodalEmbedder, blend_query_vectors};
use crate::error::{PhotosearchError, Result};
use crate::index::{IndexRegistry, SearchHit};
use crate::vector::{AssetId, FolderId, ProjectId, UserId, Vector};

/// Contract for enumerating the projects a user owns. Consulted only for
/// searches without an explicit project scope.
pub trait ProjectDirectory: Send + Sync {
    fn projects_owned_by(&self, user_id: UserId) -> Result<Vec<ProjectId>>;
}

/// A user-facing search request.
///
/// At least one of `text` and `image` must be supplied; supplying both
/// blends them into a single query vector. Without `project_id`,
/// `owner_user_id` is required and every project that user owns is
/// searched.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Tenant to search. `None` searches all projects of `owner_user_id`.
    pub project_id: Option<ProjectId>,
    /// Free-text query, e.g. "a cat on a sofa".
    pub text: Option<String>,
    /// Decoded query image.
    pub image: Option<DynamicImage>,
    /// Number of results; defaults to the configured top-k.
    pub k: Option<usize>,
    /// Restrict results to one folder.
    pub folder_id: Option<FolderId>,
    /// Minimum cosine similarity; defaults per query modality.
    pub similarity_floor: Option<f32>,
    /// Text weight when blending text and image; defaults to the configured
    /// mix ratio.
    pub mix_ratio: Option<f32>,
    /// Requesting user, required when `project_id` is omitted.
    pub owner_user_id: Option<UserId>,
}

impl SearchRequest {
    /// Text search within one project.
    pub fn text_in_project(project_id: ProjectId, text: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Image search within one project.
    pub fn image_in_project(project_id: ProjectId, image: DynamicImage) -> Self {
        Self {
            project_id: Some(project_id),
            image: Some(image),
            ..Self::default()
        }
    }
}

/// Turns search requests into ranked asset ids.
pub struct QueryService {
    embedder: Arc<dyn MultimodalEmbedder>,
    registry: Arc<IndexRegistry>,
    directory: Arc<dyn ProjectDirectory>,
}

impl QueryService {
    pub fn new(
        embedder: Arc<dyn MultimodalEmbedder>,
        registry: Arc<IndexRegistry>,
        directory: Arc<dyn ProjectDirectory>,
    ) -> Self {
        Self {
            embedder,
            registry,
            directory,
        }
    }

    /// Run a search request, returning hits ordered best similarity first.
    ///
    /// A request with neither text nor image is a caller contract violation
    /// and is rejected before any encoding work. Unknown projects and empty
    /// indexes yield empty results, not errors.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let config = self.registry.config();
        let has_text = request.text.is_some();
        let has_image = request.image.is_some();
        if !has_text && !has_image {
            return Err(PhotosearchError::invalid_argument(
                "a text or image query is required",
            ));
        }

        let query = self.encode_query(request)?;
        let k = request.k.unwrap_or(config.default_top_k);
        // Text scores against images run structurally lower than
        // image-to-image scores; a blended query contains a text component,
        // so it takes the text floor too.
        let floor = request
            .similarity_floor
            .unwrap_or_else(|| config.default_floor(has_text));

        match request.project_id {
            Some(project_id) => {
                self.registry
                    .search(project_id, &query, k, request.folder_id, floor)
            }
            None => {
                let owner = request.owner_user_id.ok_or_else(|| {
                    PhotosearchError::invalid_argument(
                        "owner_user_id is required when project_id is omitted",
                    )
                })?;
                self.search_all_projects(owner, &query, k, request.folder_id, floor)
            }
        }
    }

    /// Convenience wrapper returning bare asset ids.
    pub fn search_ids(&self, request: &SearchRequest) -> Result<Vec<AssetId>> {
        Ok(self
            .search(request)?
            .into_iter()
            .map(|hit| hit.asset_id)
            .collect())
    }

    fn encode_query(&self, request: &SearchRequest) -> Result<Vector> {
        let config = self.registry.config();
        match (&request.text, &request.image) {
            (Some(text), None) => self.embedder.embed_text(text),
            (None, Some(image)) => self.embedder.embed_image(image),
            (Some(text), Some(image)) => {
                let text_vector = self.embedder.embed_text(text)?;
                let image_vector = self.embedder.embed_image(image)?;
                let mix_ratio = request.mix_ratio.unwrap_or(config.default_mix_ratio);
                blend_query_vectors(&text_vector, &image_vector, mix_ratio)
            }
            (None, None) => unreachable!("validated by search"),
        }
    }

    /// Search every project the user owns and merge by similarity.
    ///
    /// Each project contributes its exact top-k; the union is re-sorted by
    /// score across projects before truncating, so a strong match in one
    /// project outranks weak matches in another.
    fn search_all_projects(
        &self,
        owner: UserId,
        query: &Vector,
        k: usize,
        folder_id: Option<FolderId>,
        floor: f32,
    ) -> Result<Vec<SearchHit>> {
        let mut merged: Vec<SearchHit> = Vec::new();
        for project_id in self.directory.projects_owned_by(owner)? {
            merged.extend(
                self.registry
                    .search(project_id, query, k, folder_id, floor)?,
            );
        }

        merged.sort_unstable_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.asset_id.cmp(&b.asset_id))
        });
        merged.truncate(k);
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::embedding::TextEmbedder;
    use crate::embedding::hashed::HashedEmbedder;
    use crate::records::memory::MemoryProjectDirectory;

    fn test_service() -> (
        tempfile::TempDir,
        Arc<IndexRegistry>,
        Arc<MemoryProjectDirectory>,
        QueryService,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SearchConfig::with_index_dir(dir.path());
        config.dimension = 32;

        let registry = Arc::new(IndexRegistry::new(config));
        let directory = Arc::new(MemoryProjectDirectory::new());
        let service = QueryService::new(
            Arc::new(HashedEmbedder::new(32)),
            registry.clone(),
            directory.clone(),
        );
        (dir, registry, directory, service)
    }

    #[test]
    fn test_rejects_empty_request() {
        let (_dir, _registry, _directory, service) = test_service();
        let result = service.search(&SearchRequest::default());
        assert!(matches!(result, Err(PhotosearchError::Query(_))));
    }

    #[test]
    fn test_rejects_unscoped_request_without_owner() {
        let (_dir, _registry, _directory, service) = test_service();
        let request = SearchRequest {
            text: Some("a cat".into()),
            ..SearchRequest::default()
        };
        let result = service.search(&request);
        assert!(matches!(result, Err(PhotosearchError::Query(_))));
    }

    #[test]
    fn test_text_search_unknown_project_is_empty() {
        let (_dir, _registry, _directory, service) = test_service();
        let request = SearchRequest::text_in_project(999, "anything");
        assert!(service.search(&request).unwrap().is_empty());
    }

    #[test]
    fn test_text_search_finds_matching_embedding() {
        let (_dir, registry, _directory, service) = test_service();
        let embedder = HashedEmbedder::new(32);

        let vector = embedder.embed_text("a cat on a sofa").unwrap();
        registry.add(7, 1, None, vector).unwrap();

        let request = SearchRequest {
            similarity_floor: Some(0.9),
            ..SearchRequest::text_in_project(7, "a cat on a sofa")
        };
        let hits = service.search(&request).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].asset_id, 1);
        assert!(hits[0].similarity > 0.99);
    }

    #[test]
    fn test_unscoped_search_merges_across_projects() {
        let (_dir, registry, directory, service) = test_service();
        let embedder = HashedEmbedder::new(32);

        let target = embedder.embed_text("sunset beach").unwrap();
        registry.add(1, 10, None, target.clone()).unwrap();
        registry.add(2, 20, None, target.clone()).unwrap();
        directory.add_project(5, 1);
        directory.add_project(5, 2);

        let request = SearchRequest {
            text: Some("sunset beach".into()),
            owner_user_id: Some(5),
            similarity_floor: Some(0.0),
            ..SearchRequest::default()
        };
        let hits = service.search(&request).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.asset_id).collect();
        // Identical scores fall back to asset id order.
        assert_eq!(ids, vec![10, 20]);
    }

    #[test]
    fn test_unscoped_search_respects_k_after_merge() {
        let (_dir, registry, directory, service) = test_service();
        let embedder = HashedEmbedder::new(32);

        let target = embedder.embed_text("mountain lake").unwrap();
        for (project_id, asset_id) in [(1u64, 10u64), (2, 20), (3, 30)] {
            registry.add(project_id, asset_id, None, target.clone()).unwrap();
            directory.add_project(5, project_id);
        }

        let request = SearchRequest {
            text: Some("mountain lake".into()),
            owner_user_id: Some(5),
            k: Some(2),
            similarity_floor: Some(0.0),
            ..SearchRequest::default()
        };
        assert_eq!(service.search(&request).unwrap().len(), 2);
    }

    #[test]
    fn test_search_ids_strips_scores() {
        let (_dir, registry, _directory, service) = test_service();
        let embedder = HashedEmbedder::new(32);

        let vector = embedder.embed_text("tree").unwrap();
        registry.add(3, 42, None, vector).unwrap();

        let request = SearchRequest {
            similarity_floor: Some(0.5),
            ..SearchRequest::text_in_project(3, "tree")
        };
        assert_eq!(service.search_ids(&request).unwrap(), vec![42]);
    }
}
