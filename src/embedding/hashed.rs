//! Deterministic feature-hashing embedder.
//!
//! [`HashedEmbedder`] maps text tokens and image pixel blocks to seeded
//! pseudo-random directions in the embedding space and sums them. It needs no
//! model download, is fully deterministic across processes, and produces
//! unit-normalized vectors, which makes it the embedder of choice for tests
//! and for environments where the CLIP model is unavailable.
//!
//! Hashed embeddings are *not* semantic: two unrelated inputs are expected to
//! land near-orthogonal, and identical inputs land identically. That is
//! enough for exercising every index and query path.

use image::DynamicImage;
use image::imageops::FilterType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DEFAULT_DIMENSION;
use crate::embedding::image_embedder::ImageEmbedder;
use crate::embedding::text_embedder::TextEmbedder;
use crate::error::Result;
use crate::vector::Vector;

/// Edge length images are downsampled to before hashing.
const IMAGE_HASH_SIZE: u32 = 16;

/// Fixed ahash keys so embeddings are stable across processes and runs.
const HASH_KEYS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// Deterministic multimodal embedder based on feature hashing.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimension: usize,
    hasher: ahash::RandomState,
}

impl HashedEmbedder {
    /// Create a new hashed embedder with the given dimension.
    pub fn new(dimension: usize) -> Self {
        let (k0, k1, k2, k3) = HASH_KEYS;
        Self {
            dimension,
            hasher: ahash::RandomState::with_seeds(k0, k1, k2, k3),
        }
    }

    /// Pseudo-random unit-scale direction for one hashed feature.
    fn direction(&self, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..self.dimension)
            .map(|_| rng.random::<f32>() * 2.0 - 1.0)
            .collect()
    }

    /// Sum the directions of all feature seeds and normalize.
    fn accumulate<I: IntoIterator<Item = u64>>(&self, seeds: I) -> Vector {
        let mut data = vec![0.0f32; self.dimension];
        for seed in seeds {
            for (acc, value) in data.iter_mut().zip(self.direction(seed)) {
                *acc += value;
            }
        }
        let mut vector = Vector::new(data);
        vector.normalize();
        vector
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl TextEmbedder for HashedEmbedder {
    fn embed_text(&self, text: &str) -> Result<Vector> {
        // The whole string is always hashed as one feature, so empty text
        // still encodes to a unit vector instead of a zero vector.
        let mut seeds = vec![self.hasher.hash_one(("text", text))];
        for token in text.split_whitespace() {
            seeds.push(self.hasher.hash_one(("token", token.to_lowercase())));
        }
        Ok(self.accumulate(seeds))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashed"
    }
}

impl ImageEmbedder for HashedEmbedder {
    fn embed_image(&self, image: &DynamicImage) -> Result<Vector> {
        let thumb = image
            .resize_exact(IMAGE_HASH_SIZE, IMAGE_HASH_SIZE, FilterType::Triangle)
            .to_rgb8();

        let mut seeds = Vec::with_capacity(thumb.len() / 3 + 1);
        seeds.push(self.hasher.hash_one(("image", thumb.as_raw().as_slice())));
        for (i, pixel) in thumb.pixels().enumerate() {
            // Coarse quantization so re-encoded copies of the same image
            // still hash to the same feature set.
            let quantized = [pixel.0[0] >> 4, pixel.0[1] >> 4, pixel.0[2] >> 4];
            seeds.push(self.hasher.hash_one(("pixel", i, quantized)));
        }
        Ok(self.accumulate(seeds))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::multimodal::MultimodalEmbedder;

    fn sample_image(color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(32, 32, image::Rgb(color)))
    }

    #[test]
    fn test_text_embedding_is_unit_and_deterministic() {
        let embedder = HashedEmbedder::new(64);
        let a = embedder.embed_text("a cat on a sofa").unwrap();
        let b = embedder.embed_text("a cat on a sofa").unwrap();
        assert_eq!(a, b);
        assert!((a.norm() - 1.0).abs() < 1e-5);
        assert_eq!(a.dimension(), 64);
    }

    #[test]
    fn test_empty_text_encodes_to_unit_vector() {
        let embedder = HashedEmbedder::new(64);
        let vector = embedder.embed_text("").unwrap();
        assert!((vector.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_non_ascii_text_is_legal() {
        let embedder = HashedEmbedder::new(64);
        let vector = embedder.embed_text("猫がソファにいる 🐱").unwrap();
        assert!((vector.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_different_texts_are_not_identical() {
        let embedder = HashedEmbedder::new(64);
        let a = embedder.embed_text("a cat").unwrap();
        let b = embedder.embed_text("a dog").unwrap();
        assert!(a.dot(&b) < 0.999);
    }

    #[test]
    fn test_image_embedding_is_unit_and_deterministic() {
        let embedder = HashedEmbedder::new(64);
        let img = sample_image([200, 40, 40]);
        let a = embedder.embed_image(&img).unwrap();
        let b = embedder.embed_image(&img).unwrap();
        assert_eq!(a, b);
        assert!((a.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_distinct_images_differ() {
        let embedder = HashedEmbedder::new(64);
        let a = embedder.embed_image(&sample_image([200, 40, 40])).unwrap();
        let b = embedder.embed_image(&sample_image([40, 200, 40])).unwrap();
        assert!(a.dot(&b) < 0.999);
    }

    #[test]
    fn test_multimodal_dimensions_agree() {
        let embedder = HashedEmbedder::new(128);
        assert_eq!(embedder.embedding_dimension(), 128);
        assert_eq!(TextEmbedder::dimension(&embedder), 128);
        assert_eq!(ImageEmbedder::dimension(&embedder), 128);
    }
}
