//! Text embedding trait for the semantic search pipeline.

use crate::error::Result;
use crate::vector::Vector;

/// Trait for converting text to vector embeddings.
///
/// Implementations must return unit-normalized vectors of a fixed dimension,
/// so that inner product equals cosine similarity. Tokenization, including
/// truncation of overlength input at the model's token limit, is internal to
/// the implementation. An empty string is legal input and encodes to some
/// vector rather than raising.
///
/// # Examples
///
/// ```
/// use photosearch::embedding::text_embedder::TextEmbedder;
/// use photosearch::error::Result;
/// use photosearch::vector::Vector;
///
/// struct MyCustomEmbedder {
///     dimension: usize,
/// }
///
/// impl TextEmbedder for MyCustomEmbedder {
///     fn embed_text(&self, _text: &str) -> Result<Vector> {
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
///         "my-custom-embedder"
///     }
/// }
/// ```
pub trait TextEmbedder: Send + Sync {
    /// Generate an embedding vector for the given text.
    ///
    /// The input may contain multi-byte/non-ASCII content.
    fn embed_text(&self, text: &str) -> Result<Vector>;

    /// Get the dimension of generated embeddings.
    fn dimension(&self) -> usize;

    /// Get the name/identifier of this embedder (e.g., model name).
    fn name(&self) -> &str;
}
