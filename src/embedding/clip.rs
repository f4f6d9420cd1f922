//! Candle-based CLIP embedder.
//!
//! Runs a CLIP model (default: ViT-B/32) locally via the Candle framework,
//! embedding text and images into the same 512-dimensional space. Requires
//! the `embeddings-clip` feature.
//!
//! Loading the model weights is by far the most expensive step of process
//! startup, so [`ClipEmbedder::global`] exposes a process-wide lazy singleton
//! that loads exactly once and is shared by every caller.

use std::sync::{Arc, OnceLock};

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::clip;
use hf_hub::api::sync::ApiBuilder;
use image::DynamicImage;
use tokenizers::Tokenizer;

use crate::embedding::image_embedder::ImageEmbedder;
use crate::embedding::text_embedder::TextEmbedder;
use crate::error::{PhotosearchError, Result};
use crate::vector::Vector;

/// Default HuggingFace model identifier. D=512.
pub const DEFAULT_CLIP_MODEL: &str = "openai/clip-vit-base-patch32";

/// CLIP's text context length; longer inputs are truncated to this many
/// tokens.
const MAX_TEXT_TOKENS: usize = 77;

/// CLIP multimodal embedder backed by Candle.
///
/// # Examples
///
/// ```no_run
/// use photosearch::embedding::clip::ClipEmbedder;
/// use photosearch::embedding::{ImageEmbedder, TextEmbedder};
///
/// # fn example() -> photosearch::error::Result<()> {
/// let embedder = ClipEmbedder::global()?;
///
/// let text_vec = embedder.embed_text("a photo of a cat")?;
///
/// let img = image::open("cat.jpg")
///     .map_err(|e| photosearch::error::PhotosearchError::encoding(e.to_string()))?;
/// let img_vec = embedder.embed_image(&img)?;
/// // Text and images live in the same vector space.
/// # Ok(())
/// # }
/// ```
pub struct ClipEmbedder {
    /// CLIP text transformer model.
    text_model: clip::text_model::ClipTextTransformer,
    /// CLIP vision transformer model.
    vision_model: clip::vision_model::ClipVisionTransformer,
    /// Linear projection layer for text embeddings.
    text_projection: Linear,
    /// Linear projection layer for vision embeddings.
    vision_projection: Linear,
    /// Tokenizer for text input.
    tokenizer: Tokenizer,
    /// Device to run models on (CPU or GPU).
    device: Device,
    /// Dimension of the shared embedding space.
    dimension: usize,
    /// Name of the HuggingFace CLIP model.
    model_name: String,
    /// Expected image size (width/height in pixels).
    image_size: usize,
}

impl std::fmt::Debug for ClipEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipEmbedder")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .field("image_size", &self.image_size)
            .finish()
    }
}

impl ClipEmbedder {
    /// Get the process-wide shared embedder for [`DEFAULT_CLIP_MODEL`].
    ///
    /// The model is downloaded (if not cached) and loaded on first call;
    /// subsequent calls return the same instance. A failed load is cached
    /// too, so a broken environment fails fast instead of re-downloading on
    /// every request.
    pub fn global() -> Result<Arc<ClipEmbedder>> {
        static INSTANCE: OnceLock<std::result::Result<Arc<ClipEmbedder>, String>> =
            OnceLock::new();

        let entry = INSTANCE.get_or_init(|| {
            ClipEmbedder::new(DEFAULT_CLIP_MODEL)
                .map(Arc::new)
                .map_err(|e| e.to_string())
        });
        entry.clone().map_err(PhotosearchError::encoding)
    }

    /// Create a new CLIP embedder from a HuggingFace model identifier.
    ///
    /// The model will be automatically downloaded from HuggingFace Hub if
    /// not cached. Prefer [`ClipEmbedder::global`] in server processes.
    pub fn new(model_name: &str) -> Result<Self> {
        // Setup device (prefer GPU if available)
        let device = Device::cuda_if_available(0)
            .map_err(|e| PhotosearchError::encoding(format!("Device setup failed: {e}")))?;

        // Download model from HuggingFace Hub
        let cache_dir = std::env::var("HF_HOME")
            .or_else(|_| std::env::var("HOME").map(|home| format!("{home}/.cache/huggingface")))
            .unwrap_or_else(|_| "/tmp/huggingface".to_string());

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.into())
            .build()
            .map_err(|e| {
                PhotosearchError::encoding(format!("HF API initialization failed: {e}"))
            })?;
        let repo = api.model(model_name.to_string());

        // Note: Using default vit_base_patch32 config
        let config = clip::ClipConfig::vit_base_patch32();

        // Load weights - try safetensors first, fall back to pytorch
        let weights_filename = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(|e| PhotosearchError::encoding(format!("Weights download failed: {e}")))?;

        let vb = if weights_filename.to_string_lossy().ends_with(".safetensors") {
            unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights_filename], DType::F32, &device)
                    .map_err(|e| {
                        PhotosearchError::encoding(format!("VarBuilder creation failed: {e}"))
                    })?
            }
        } else {
            VarBuilder::from_pth(&weights_filename, DType::F32, &device).map_err(|e| {
                PhotosearchError::encoding(format!("VarBuilder creation failed: {e}"))
            })?
        };

        let text_model =
            clip::text_model::ClipTextTransformer::new(vb.pp("text_model"), &config.text_config)
                .map_err(|e| PhotosearchError::encoding(format!("Text model load failed: {e}")))?;

        let vision_model = clip::vision_model::ClipVisionTransformer::new(
            vb.pp("vision_model"),
            &config.vision_config,
        )
        .map_err(|e| PhotosearchError::encoding(format!("Vision model load failed: {e}")))?;

        let projection_dim = config.text_config.projection_dim;

        // CLIP models use linear layers without bias
        let text_projection = candle_nn::linear_no_bias(
            config.text_config.embed_dim,
            projection_dim,
            vb.pp("text_projection"),
        )
        .map_err(|e| PhotosearchError::encoding(format!("Text projection load failed: {e}")))?;

        let vision_projection = candle_nn::linear_no_bias(
            config.vision_config.embed_dim,
            projection_dim,
            vb.pp("visual_projection"),
        )
        .map_err(|e| PhotosearchError::encoding(format!("Vision projection load failed: {e}")))?;

        let tokenizer_filename = repo
            .get("tokenizer.json")
            .map_err(|e| PhotosearchError::encoding(format!("Tokenizer download failed: {e}")))?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| PhotosearchError::encoding(format!("Tokenizer load failed: {e}")))?;

        let dimension = projection_dim;
        let image_size = config.vision_config.image_size;

        Ok(Self {
            text_model,
            vision_model,
            text_projection,
            vision_projection,
            tokenizer,
            device,
            dimension,
            model_name: model_name.to_string(),
            image_size,
        })
    }

    /// Preprocess a decoded image to the tensor format CLIP expects:
    /// resize to the model's input size, RGB, ImageNet mean/std
    /// normalization, (1, C, H, W) layout.
    fn preprocess_image(&self, image: &DynamicImage) -> Result<Tensor> {
        let img = image.resize_exact(
            self.image_size as u32,
            self.image_size as u32,
            image::imageops::FilterType::Triangle,
        );

        let img = match img {
            DynamicImage::ImageRgb8(img) => img,
            img => img.to_rgb8(),
        };

        // Convert to tensor (H, W, C format)
        let img_data = img.into_raw();
        let img_tensor = Tensor::from_vec(
            img_data,
            (self.image_size, self.image_size, 3),
            &self.device,
        )
        .map_err(|e| PhotosearchError::encoding(format!("Tensor creation failed: {e}")))?;

        // Normalize: (pixel / 255.0 - mean) / std, with CLIP's ImageNet
        // statistics.
        let mean = Tensor::new(&[0.48145466f32, 0.4578275, 0.40821073], &self.device)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .reshape((1, 1, 3))
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?;
        let std = Tensor::new(&[0.2686295_f32, 0.2613026, 0.2757771], &self.device)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .reshape((1, 1, 3))
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?;

        let normalized = img_tensor
            .to_dtype(DType::F32)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .affine(1.0 / 255.0, 0.0)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .broadcast_sub(&mean)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .broadcast_div(&std)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?;

        // Permute to (C, H, W) and add the batch dimension
        let normalized = normalized
            .permute((2, 0, 1))
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .unsqueeze(0)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?;

        Ok(normalized)
    }

    /// L2-normalize embeddings of shape `[batch, dimension]`.
    fn normalize_tensor(&self, tensor: &Tensor) -> Result<Tensor> {
        let norm = tensor
            .sqr()
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .sum_keepdim(1)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .sqrt()
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?;

        tensor
            .broadcast_div(&norm)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))
    }

    /// Squeeze a `[1, dimension]` tensor into a [`Vector`].
    fn tensor_to_vector(&self, tensor: &Tensor) -> Result<Vector> {
        let data: Vec<f32> = tensor
            .squeeze(0)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?
            .to_vec1()
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?;
        Ok(Vector::new(data))
    }
}

impl TextEmbedder for ClipEmbedder {
    fn embed_text(&self, text: &str) -> Result<Vector> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| PhotosearchError::encoding(format!("Tokenization failed: {e}")))?;

        // CLIP has a fixed context window; overlength input is truncated.
        let mut token_ids = encoding.get_ids().to_vec();
        token_ids.truncate(MAX_TEXT_TOKENS);

        let token_ids_tensor = Tensor::new(token_ids.as_slice(), &self.device)
            .map_err(|e| PhotosearchError::encoding(format!("Tensor creation failed: {e}")))?
            .unsqueeze(0)
            .map_err(|e| PhotosearchError::encoding(e.to_string()))?;

        let text_features = self
            .text_model
            .forward(&token_ids_tensor)
            .map_err(|e| PhotosearchError::encoding(format!("Text model forward failed: {e}")))?;

        let projected = self
            .text_projection
            .forward(&text_features)
            .map_err(|e| PhotosearchError::encoding(format!("Text projection failed: {e}")))?;

        let normalized = self.normalize_tensor(&projected)?;
        self.tensor_to_vector(&normalized)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

impl ImageEmbedder for ClipEmbedder {
    fn embed_image(&self, image: &DynamicImage) -> Result<Vector> {
        let image_tensor = self.preprocess_image(image)?;

        let vision_features = self.vision_model.forward(&image_tensor).map_err(|e| {
            PhotosearchError::encoding(format!("Vision model forward failed: {e}"))
        })?;

        let projected = self
            .vision_projection
            .forward(&vision_features)
            .map_err(|e| PhotosearchError::encoding(format!("Vision projection failed: {e}")))?;

        let normalized = self.normalize_tensor(&projected)?;
        self.tensor_to_vector(&normalized)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
