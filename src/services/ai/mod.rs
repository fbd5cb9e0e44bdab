//! Vision-language model access and the scoring built on top of it
//!
//! Split into submodules:
//! - `clip`: fastembed-backed CLIP image/text towers
//! - `tagger`: zero-shot tag ranking over a label vocabulary
//! - `similarity`: batch nearest-neighbour pass
//! - `detection`: binary visual detector plus metadata keyword matcher

mod clip;
mod detection;
mod similarity;
mod tagger;

pub use clip::ClipService;
pub use detection::{Detection, VisualDetector, FOUND_BY_CLIP, FOUND_BY_METADATA};
pub use similarity::{dot, similarity_matrix, EmbeddedItem, Neighbors, SimilarityRanker};
pub use tagger::{softmax, LabelVocabulary, ZeroShotTagger};

/// The model the pipeline scores with. Image and text vectors live in one
/// joint space and are returned unit-normalised.
#[allow(async_fn_in_trait)]
pub trait VisionModel {
    async fn embed_image(&self, image_bytes: &[u8]) -> Result<Vec<f32>, String>;

    async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String>;

    /// Scale applied to cosine scores before turning them into probabilities
    fn logit_scale(&self) -> f32;
}

/// L2-normalises `vector` in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
