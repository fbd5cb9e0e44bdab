//! Zero-shot tag ranking
//!
//! Label prompts are embedded once per run; each image embedding is then
//! scored against every label, turned into a distribution with
//! `softmax(logit_scale * cos)`, and the top K names are kept.

use super::similarity::{by_score_desc, dot};
use super::VisionModel;
use crate::services::LabelPrompt;

/// Ordered label vocabulary. Order only breaks ties.
#[derive(Debug, Clone)]
pub struct LabelVocabulary {
    labels: Vec<LabelPrompt>,
}

impl LabelVocabulary {
    pub fn new(labels: Vec<LabelPrompt>) -> Result<Self, String> {
        if labels.is_empty() {
            return Err("label vocabulary is empty".to_string());
        }
        Ok(Self { labels })
    }

    pub fn names(&self) -> Vec<&str> {
        self.labels.iter().map(|label| label.name.as_str()).collect()
    }

    pub fn prompts(&self) -> Vec<&str> {
        self.labels.iter().map(|label| label.prompt.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

pub struct ZeroShotTagger {
    names: Vec<String>,
    label_vectors: Vec<Vec<f32>>,
    logit_scale: f32,
    top_k: usize,
}

impl ZeroShotTagger {
    /// Embeds every label prompt with `model`.
    pub async fn prepare<M: VisionModel>(
        model: &M,
        vocabulary: &LabelVocabulary,
        top_k: usize,
    ) -> Result<Self, String> {
        let label_vectors = model.embed_texts(&vocabulary.prompts()).await?;
        if label_vectors.len() != vocabulary.len() {
            return Err("label embedding count mismatch".to_string());
        }

        Ok(Self {
            names: vocabulary.names().into_iter().map(str::to_string).collect(),
            label_vectors,
            logit_scale: model.logit_scale(),
            top_k,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Probability per label, in vocabulary order
    pub fn probabilities(&self, embedding: &[f32]) -> Vec<f32> {
        let logits: Vec<f32> = self
            .label_vectors
            .iter()
            .map(|label| self.logit_scale * dot(embedding, label))
            .collect();
        softmax(&logits)
    }

    /// Top-K label names for a stored or fresh embedding.
    pub fn tag_embedding(&self, embedding: &[f32]) -> Vec<String> {
        let probs = self.probabilities(embedding);
        let mut order: Vec<usize> = (0..probs.len()).collect();
        // stable: equal probabilities keep vocabulary order
        order.sort_by(|&a, &b| by_score_desc(probs[a], probs[b]));
        order
            .into_iter()
            .take(self.top_k)
            .map(|index| self.names[index].clone())
            .collect()
    }

    /// Embeds the image and tags it. Returns the embedding so the caller
    /// can cache it.
    pub async fn tag_image<M: VisionModel>(
        &self,
        model: &M,
        image_bytes: &[u8],
    ) -> Result<(Vec<f32>, Vec<String>), String> {
        let embedding = model.embed_image(image_bytes).await?;
        let tags = self.tag_embedding(&embedding);
        Ok((embedding, tags))
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|logit| (logit - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|value| value / sum).collect()
}
