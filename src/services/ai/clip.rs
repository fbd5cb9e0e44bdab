//! ClipService - CLIP image and text towers via fastembed

use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, TextEmbedding,
    TextInitOptions,
};
use tokio::sync::Mutex;

use super::{l2_normalize, VisionModel};
use crate::services::ModelConfig;

pub struct ClipService {
    clip_text: Mutex<TextEmbedding>,
    image: Mutex<ImageEmbedding>,
    config: ModelConfig,
}

impl ClipService {
    pub fn new(config: ModelConfig) -> Result<Self, String> {
        let clip_text_model: EmbeddingModel = config
            .clip_text_embedding_model
            .parse::<EmbeddingModel>()
            .map_err(|e| e.to_string())?;
        let image_model: ImageEmbeddingModel = config
            .image_embedding_model
            .parse::<ImageEmbeddingModel>()
            .map_err(|e| e.to_string())?;

        let clip_text = TextEmbedding::try_new(TextInitOptions::new(clip_text_model))
            .map_err(|e| e.to_string())?;
        let image = ImageEmbedding::try_new(ImageInitOptions::new(image_model))
            .map_err(|e| e.to_string())?;

        tracing::info!(
            image_model = %config.image_embedding_model,
            text_model = %config.clip_text_embedding_model,
            "CLIP models loaded"
        );

        Ok(Self {
            clip_text: Mutex::new(clip_text),
            image: Mutex::new(image),
            config,
        })
    }

    fn finish_vector(&self, vector: Vec<f32>) -> Result<Vec<f32>, String> {
        checked_unit_vector(vector, self.config.vector_size)
    }
}

/// Checks size and finiteness, then unit-normalises.
fn checked_unit_vector(mut vector: Vec<f32>, vector_size: usize) -> Result<Vec<f32>, String> {
    if vector.len() != vector_size {
        return Err(format!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            vector_size
        ));
    }
    if vector.iter().any(|value| !value.is_finite()) {
        return Err("embedding contains non-finite values".to_string());
    }
    l2_normalize(&mut vector);
    Ok(vector)
}

impl VisionModel for ClipService {
    async fn embed_image(&self, image_bytes: &[u8]) -> Result<Vec<f32>, String> {
        // Reject undecodable payloads before they reach the model
        image::load_from_memory(image_bytes).map_err(|e| format!("not a decodable image: {e}"))?;

        let vectors = {
            let mut model = self.image.lock().await;
            model.embed_bytes(&[image_bytes], None)
        }
        .map_err(|e| e.to_string())?;

        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| "image embedding returned no vectors".to_string())?;
        self.finish_vector(vector)
    }

    async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = {
            let mut model = self.clip_text.lock().await;
            model.embed(texts, None)
        }
        .map_err(|e| e.to_string())?;

        if vectors.len() != texts.len() {
            return Err("text embedding result count mismatch".to_string());
        }
        vectors
            .into_iter()
            .map(|vector| self.finish_vector(vector))
            .collect()
    }

    fn logit_scale(&self) -> f32 {
        self.config.logit_scale
    }
}
