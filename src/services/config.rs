//! Enrichment configuration
//! Loaded from an optional JSON file; every field has a default, and CLI
//! flags are layered on top through `ConfigOverrides`.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult, ResultExt};

pub const DEFAULT_TOP_TAGS: usize = 4;
pub const DEFAULT_TOP_SIMILAR: usize = 3;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 500;
pub const DEFAULT_CACHE_DIR: &str = ".manifest_cache";

/// One vocabulary entry: short tag name and the prompt scored against images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPrompt {
    pub name: String,
    pub prompt: String,
}

impl LabelPrompt {
    pub fn new(name: &str, prompt: &str) -> Self {
        Self {
            name: name.to_string(),
            prompt: prompt.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub image_embedding_model: String,
    pub clip_text_embedding_model: String,
    pub vector_size: usize,
    /// Temperature applied to cosine scores before the softmax (CLIP's
    /// learned `logit_scale.exp()`).
    pub logit_scale: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            image_embedding_model: "Qdrant/clip-ViT-B-32-vision".to_string(),
            clip_text_embedding_model: "Qdrant/clip-ViT-B-32-text".to_string(),
            vector_size: 512,
            logit_scale: 100.0,
        }
    }
}

/// Binary visual detector plus metadata keyword matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub threshold: f32,
    pub keywords: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            positive_prompt: "a train, locomotive, railroad tracks, railway, or trolley".to_string(),
            negative_prompt:
                "a photograph that does not contain trains, railroads, or railway tracks"
                    .to_string(),
            threshold: 0.55,
            keywords: [
                "railroad",
                "railway",
                "train",
                "locomotive",
                "rail yard",
                "rail line",
                "trolley",
                "elevated line",
                "freight",
                "rail road",
                "depot",
                "station",
            ]
            .iter()
            .map(|keyword| keyword.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichConfig {
    pub version: u32,
    pub top_tags: usize,
    pub top_similar: usize,
    pub force_retag: bool,
    pub dry_run: bool,
    pub cache_dir: PathBuf,
    pub request_delay_ms: u64,
    pub manifest_timeout_secs: u64,
    pub image_timeout_secs: u64,
    /// Rewrite resolved IIIF image URLs to this width before fetching
    pub scan_image_size: Option<u32>,
    pub user_agent: String,
    pub labels: Vec<LabelPrompt>,
    pub model: ModelConfig,
    pub detection: Option<DetectionConfig>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            version: 1,
            top_tags: DEFAULT_TOP_TAGS,
            top_similar: DEFAULT_TOP_SIMILAR,
            force_retag: false,
            dry_run: false,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            manifest_timeout_secs: 20,
            image_timeout_secs: 25,
            scan_image_size: None,
            user_agent: concat!("catalog-enrich/", env!("CARGO_PKG_VERSION")).to_string(),
            labels: default_labels(),
            model: ModelConfig::default(),
            detection: None,
        }
    }
}

/// CLI-level overrides; `None`/`false` leaves the file value in place
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub top_tags: Option<usize>,
    pub top_similar: Option<usize>,
    pub cache_dir: Option<PathBuf>,
    pub request_delay_ms: Option<u64>,
    pub scan_image_size: Option<u32>,
    pub force_retag: bool,
    pub dry_run: bool,
    pub detect: bool,
}

impl EnrichConfig {
    /// Loads the config file if given, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read(path).config_err(&format!("reading {}", path.display()))?;
        serde_json::from_slice(&raw).config_err(&format!("parsing {}", path.display()))
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(top_tags) = overrides.top_tags {
            self.top_tags = top_tags;
        }
        if let Some(top_similar) = overrides.top_similar {
            self.top_similar = top_similar;
        }
        if let Some(cache_dir) = &overrides.cache_dir {
            self.cache_dir = cache_dir.clone();
        }
        if let Some(delay) = overrides.request_delay_ms {
            self.request_delay_ms = delay;
        }
        if overrides.scan_image_size.is_some() {
            self.scan_image_size = overrides.scan_image_size;
        }
        self.force_retag |= overrides.force_retag;
        self.dry_run |= overrides.dry_run;
        if overrides.detect && self.detection.is_none() {
            self.detection = Some(DetectionConfig::default());
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.top_tags == 0 {
            return Err(AppError::Config("top_tags must be at least 1".to_string()));
        }
        if self.top_similar == 0 {
            return Err(AppError::Config("top_similar must be at least 1".to_string()));
        }
        if self.labels.is_empty() {
            return Err(AppError::Config("label vocabulary is empty".to_string()));
        }

        let mut names = HashSet::new();
        for label in &self.labels {
            if label.name.trim().is_empty() || label.prompt.trim().is_empty() {
                return Err(AppError::Config(
                    "labels need a non-empty name and prompt".to_string(),
                ));
            }
            if !names.insert(label.name.as_str()) {
                return Err(AppError::Config(format!("duplicate label `{}`", label.name)));
            }
        }

        if self.model.vector_size == 0 {
            return Err(AppError::Config("model.vector_size must be positive".to_string()));
        }
        if !(self.model.logit_scale.is_finite() && self.model.logit_scale > 0.0) {
            return Err(AppError::Config("model.logit_scale must be positive".to_string()));
        }
        if let Some(detection) = &self.detection {
            if !(0.0..=1.0).contains(&detection.threshold) {
                return Err(AppError::Config(
                    "detection.threshold must be within 0..=1".to_string(),
                ));
            }
        }
        if self.scan_image_size == Some(0) {
            return Err(AppError::Config("scan_image_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs.max(1))
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_secs.max(1))
    }
}

/// Railway vocabulary: locomotive type, train type, setting, era, photo
/// characteristics, content type.
pub fn default_labels() -> Vec<LabelPrompt> {
    vec![
        LabelPrompt::new("steam locomotive", "a steam locomotive with visible smoke, steam, or smokestack"),
        LabelPrompt::new("diesel locomotive", "a diesel locomotive or diesel-electric train engine"),
        LabelPrompt::new("electric locomotive", "an electric locomotive or electric train with overhead wires or third rail"),
        LabelPrompt::new("passenger train", "a passenger train with passenger cars or coaches"),
        LabelPrompt::new("freight train", "a freight train with boxcars, tankers, or flatcars"),
        LabelPrompt::new("yard / switching", "a rail yard with multiple tracks, switching operations, or parked rolling stock"),
        LabelPrompt::new("station / depot", "a railroad station, train depot, or platform where passengers board"),
        LabelPrompt::new("rail yard", "a railroad yard with many tracks, signals, and parked trains"),
        LabelPrompt::new("open track", "a train on open track through countryside, fields, or rural landscape"),
        LabelPrompt::new("urban / industrial", "a train in an urban or industrial setting with buildings and infrastructure"),
        LabelPrompt::new("bridge / trestle", "a railroad bridge, trestle, or viaduct"),
        LabelPrompt::new("vintage (pre-1920s)", "a very old photograph from the early 1900s or 19th century, sepia toned"),
        LabelPrompt::new("mid-century", "a mid-20th century photograph from the 1930s to 1950s"),
        LabelPrompt::new("black and white", "a black and white photograph with no color"),
        LabelPrompt::new("color photo", "a color photograph"),
        LabelPrompt::new("close-up detail", "a close-up or detail shot showing mechanical parts, wheels, or equipment"),
        LabelPrompt::new("photograph", "a photographic image, a real photograph of a scene"),
        LabelPrompt::new("poster / illustration", "an illustrated poster, drawing, or graphic design, not a photograph"),
    ]
}
