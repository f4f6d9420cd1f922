//! Image embedding trait for the semantic search pipeline.

use image::DynamicImage;

use crate::error::Result;
use crate::vector::Vector;

/// Trait for converting images to vector embeddings.
///
/// Implementations must return unit-normalized vectors of a fixed dimension.
/// The input is an already-decoded bitmap; see
/// [`crate::embedding::decode_image`] for turning raw upload bytes into one.
///
/// # Examples
///
/// ```
/// use image::DynamicImage;
/// use photosearch::embedding::image_embedder::ImageEmbedder;
/// use photosearch::error::Result;
/// use photosearch::vector::Vector;
///
/// struct MyCustomImageEmbedder {
///     dimension: usize,
/// }
///
/// impl ImageEmbedder for MyCustomImageEmbedder {
///     fn embed_image(&self, _image: &DynamicImage) -> Result<Vector> {
///         let mut embedding = vec![0.0; self.dimension];
///         embedding[0] = 1.0;
///         Ok(Vector::new(embedding))
///     }
///
///     fn dimension(&self) -> usize {
///         self.dimension
///     }
///
///     fn name(&self) -> &str {
///         "my-custom-image-embedder"
///     }
/// }
/// ```
pub trait ImageEmbedder: Send + Sync {
    /// Generate an embedding vector for the given decoded image.
    fn embed_image(&self, image: &DynamicImage) -> Result<Vector>;

    /// Get the dimension of generated embeddings.
    fn dimension(&self) -> usize;

    /// Get the name/identifier of this embedder (e.g., model name).
    fn name(&self) -> &str;
}
