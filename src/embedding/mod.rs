//! Encoder layer: raw content to comparable vectors.
//!
//! Embedders turn images and text strings into unit-normalized vectors in a
//! shared similarity space, so that inner product equals cosine similarity.
//!
//! Two implementations ship with the crate:
//! - [`hashed::HashedEmbedder`] — deterministic feature hashing, no model
//!   download. Used in tests and as an offline fallback.
//! - `clip::ClipEmbedder` (feature `embeddings-clip`) — CLIP ViT-B/32 via
//!   Candle, loaded lazily once per process.

pub mod hashed;
pub mod image_embedder;
pub mod multimodal;
pub mod text_embedder;

#[cfg(feature = "embeddings-clip")]
pub mod clip;

pub use image_embedder::ImageEmbedder;
pub use multimodal::{MultimodalEmbedder, blend_query_vectors};
pub use text_embedder::TextEmbedder;

use image::DynamicImage;

use crate::error::{PhotosearchError, Result};

/// Decode raw image bytes into a bitmap ready for embedding.
///
/// Corrupt or unreadable data is an [`PhotosearchError::Encoding`] error; the
/// upload path is expected to translate it into a user-visible 4xx.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| PhotosearchError::encoding(format!("Image decode failed: {e}")))
}
