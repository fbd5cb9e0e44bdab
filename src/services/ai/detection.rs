//! Subject detection: a binary zero-shot check (positive prompt against
//! negative prompt) combined with a keyword match over the item's
//! descriptive metadata.

use super::similarity::dot;
use super::tagger::softmax;
use super::VisionModel;
use crate::catalog::CatalogItem;
use crate::services::DetectionConfig;

pub const FOUND_BY_METADATA: &str = "metadata";
pub const FOUND_BY_CLIP: &str = "clip";

const METADATA_FIELDS: [&str; 4] = ["title", "description", "subjects", "notes"];

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Ordered subset of `["metadata", "clip"]`
    pub found_by: Vec<&'static str>,
    pub confidence: f32,
    pub metadata: bool,
    pub visual: bool,
}

impl Detection {
    pub fn is_single_path(&self) -> bool {
        self.metadata != self.visual
    }
}

pub struct VisualDetector {
    positive: Vec<f32>,
    negative: Vec<f32>,
    logit_scale: f32,
    threshold: f32,
    keywords: Vec<String>,
}

impl VisualDetector {
    pub async fn prepare<M: VisionModel>(
        model: &M,
        config: &DetectionConfig,
    ) -> Result<Self, String> {
        let mut vectors = model
            .embed_texts(&[config.positive_prompt.as_str(), config.negative_prompt.as_str()])
            .await?;
        if vectors.len() != 2 {
            return Err("detection prompt embedding count mismatch".to_string());
        }
        let negative = vectors.pop().unwrap_or_default();
        let positive = vectors.pop().unwrap_or_default();

        Ok(Self {
            positive,
            negative,
            logit_scale: model.logit_scale(),
            threshold: config.threshold,
            keywords: config
                .keywords
                .iter()
                .map(|keyword| keyword.to_lowercase())
                .collect(),
        })
    }

    /// Positive-class probability for one embedding
    pub fn visual_probability(&self, embedding: &[f32]) -> f32 {
        let logits = [
            self.logit_scale * dot(embedding, &self.positive),
            self.logit_scale * dot(embedding, &self.negative),
        ];
        softmax(&logits)[0]
    }

    pub fn matches_metadata(&self, item: &CatalogItem) -> bool {
        let text = METADATA_FIELDS
            .iter()
            .filter_map(|field| item.text_of(field))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        self.keywords.iter().any(|keyword| text.contains(keyword.as_str()))
    }

    pub fn detect(&self, item: &CatalogItem, embedding: &[f32]) -> Detection {
        let metadata = self.matches_metadata(item);
        let confidence = self.visual_probability(embedding);
        let visual = confidence >= self.threshold;

        let mut found_by = Vec::new();
        if metadata {
            found_by.push(FOUND_BY_METADATA);
        }
        if visual {
            found_by.push(FOUND_BY_CLIP);
        }
        Detection {
            found_by,
            confidence,
            metadata,
            visual,
        }
    }
}
