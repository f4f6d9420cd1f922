//! Multimodal embedding: cross-modal trait plus query-vector blending.

use crate::embedding::image_embedder::ImageEmbedder;
use crate::embedding::text_embedder::TextEmbedder;
use crate::error::{PhotosearchError, Result};
use crate::vector::Vector;

/// Trait for embedders that map both text and images into the same vector
/// space.
///
/// This is automatically implemented for any type that implements both
/// [`TextEmbedder`] and [`ImageEmbedder`], which guarantees text queries can
/// be compared against image embeddings and vice versa.
pub trait MultimodalEmbedder: TextEmbedder + ImageEmbedder {
    /// Dimension of the shared embedding space.
    ///
    /// Disambiguates between the two supertraits; both must agree.
    fn embedding_dimension(&self) -> usize {
        TextEmbedder::dimension(self)
    }
}

// Blanket implementation: any type that implements both TextEmbedder and
// ImageEmbedder is automatically a MultimodalEmbedder.
impl<T> MultimodalEmbedder for T where T: TextEmbedder + ImageEmbedder {}

/// Combine a text query vector and an image query vector into a single query.
///
/// `mix_ratio` is the weight of the text component, in `[0, 1]`; the image
/// component gets `1 - mix_ratio`. The weighted average is re-normalized so
/// the blended query stays a unit vector. This supports "find images like
/// this one, but more about X" style queries: the blend sits between the two
/// pure vectors, strictly closer to each than they are to each other.
pub fn blend_query_vectors(text: &Vector, image: &Vector, mix_ratio: f32) -> Result<Vector> {
    if !(0.0..=1.0).contains(&mix_ratio) {
        return Err(PhotosearchError::invalid_argument(format!(
            "mix_ratio must be in [0, 1], got {mix_ratio}"
        )));
    }
    if text.dimension() != image.dimension() {
        return Err(PhotosearchError::invalid_argument(format!(
            "cannot blend vectors of dimensions {} and {}",
            text.dimension(),
            image.dimension()
        )));
    }

    let data: Vec<f32> = text
        .data
        .iter()
        .zip(image.data.iter())
        .map(|(t, i)| mix_ratio * t + (1.0 - mix_ratio) * i)
        .collect();

    let mut blended = Vector::new(data);
    blended.normalize();
    if blended.norm() == 0.0 {
        // Opposite unit vectors with an equal mix cancel out exactly.
        return Err(PhotosearchError::query(
            "blended query vector is zero; text and image components cancel",
        ));
    }
    Ok(blended)
}
