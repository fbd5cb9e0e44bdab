//! Incremental enrichment pipeline
//!
//! Drives every catalog item, one at a time, through
//! resolve -> fetch -> embed -> tag, then runs the similarity pass once
//! over the whole batch.
//!
//! Split into submodules:
//! - `processor`: per-item state machine
//! - `summary`: end-of-run counters

mod processor;
mod summary;

#[cfg(test)]
mod tests;

pub use summary::{DetectionCounts, RunSummary};

use crate::catalog::{assign_item_ids, Catalog, CatalogItem};
use crate::error::{AppResult, ItemError, ResultExt};
use crate::services::{
    EmbeddedItem, EmbeddingStore, EnrichConfig, LabelVocabulary, ManifestResolver,
    ManifestStore, Pacer, SimilarityRanker, Transport, VisionModel, VisualDetector,
    ZeroShotTagger,
};

/// Terminal state of one item in one run
#[derive(Debug)]
pub enum ItemOutcome {
    /// Tags written. `reused_embedding` is set when they were recomputed
    /// from the cache rather than a fresh image.
    TaggedAndCached { reused_embedding: bool },
    FetchFailed(ItemError),
    SkippedCached,
}

pub struct EnrichmentPipeline<M, T, P> {
    model: M,
    transport: T,
    pacer: P,
    embeddings: EmbeddingStore,
    manifests: ManifestStore,
    resolver: ManifestResolver,
    tagger: ZeroShotTagger,
    ranker: SimilarityRanker,
    detector: Option<VisualDetector>,
    force_retag: bool,
    scan_image_size: Option<u32>,
}

impl<M, T, P> EnrichmentPipeline<M, T, P>
where
    M: VisionModel,
    T: Transport,
    P: Pacer,
{
    /// Opens the caches and embeds the label (and detection) prompts.
    pub async fn new(model: M, transport: T, pacer: P, config: &EnrichConfig) -> AppResult<Self> {
        let embeddings = EmbeddingStore::open(&config.cache_dir, Some(config.model.vector_size))?;
        let manifests = ManifestStore::open(&config.cache_dir)?;

        let vocabulary =
            LabelVocabulary::new(config.labels.clone()).config_err("label vocabulary")?;
        let tagger = ZeroShotTagger::prepare(&model, &vocabulary, config.top_tags)
            .await
            .model_err("embedding label prompts")?;

        let detector = match &config.detection {
            Some(detection) => Some(
                VisualDetector::prepare(&model, detection)
                    .await
                    .model_err("embedding detection prompts")?,
            ),
            None => None,
        };

        tracing::info!(
            labels = vocabulary.len(),
            top_tags = config.top_tags,
            top_similar = config.top_similar,
            force_retag = config.force_retag,
            detection = detector.is_some(),
            cache_dir = %config.cache_dir.display(),
            "Pipeline ready"
        );

        Ok(Self {
            model,
            transport,
            pacer,
            embeddings,
            manifests,
            resolver: ManifestResolver::new(),
            tagger,
            ranker: SimilarityRanker::new(config.top_similar),
            detector,
            force_retag: config.force_retag,
            scan_image_size: config.scan_image_size,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Enriches `catalog` in place. Item-scoped failures are logged and
    /// counted; nothing here aborts the run.
    pub async fn run(&self, catalog: &mut Catalog) -> RunSummary {
        let ids = {
            let entries: Vec<(&str, Option<&str>)> = catalog
                .items
                .iter()
                .map(|item| (item.title().unwrap_or(""), item.manifest_uri()))
                .collect();
            assign_item_ids(&entries)
        };

        let mut summary = RunSummary::new(catalog.items.len());
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(catalog.items.len());

        for (index, (item, id)) in catalog.items.iter_mut().zip(&ids).enumerate() {
            item.set_id(id);
            let (outcome, vector) = self.process_item(item, id, &mut summary).await;
            match &outcome {
                ItemOutcome::FetchFailed(err) => tracing::warn!(
                    index,
                    item_id = %id,
                    kind = err.kind(),
                    error = %err,
                    "Item fetch failed"
                ),
                ItemOutcome::SkippedCached => {
                    tracing::debug!(index, item_id = %id, "Cached, skipping")
                }
                ItemOutcome::TaggedAndCached { reused_embedding } => tracing::info!(
                    index,
                    item_id = %id,
                    reused_embedding,
                    tags = ?item.visual_tags().unwrap_or_default(),
                    "Item tagged"
                ),
            }
            summary.record_outcome(&outcome);
            vectors.push(vector);
        }

        self.link_similar(&mut catalog.items, &ids, &vectors, &mut summary);

        if let Some(detector) = &self.detector {
            for (item, vector) in catalog.items.iter_mut().zip(&vectors) {
                if let Some(vector) = vector {
                    let detection = detector.detect(item, vector);
                    item.set_detection(&detection.found_by, detection.confidence);
                    summary.record_detection(&detection);
                }
            }
        }

        summary.tally_tags(&catalog.items);
        summary
    }

    fn link_similar(
        &self,
        items: &mut [CatalogItem],
        ids: &[String],
        vectors: &[Option<Vec<f32>>],
        summary: &mut RunSummary,
    ) {
        let mut embedded = Vec::new();
        for (position, (item, vector)) in items.iter_mut().zip(vectors).enumerate() {
            match vector {
                Some(vector) => embedded.push(EmbeddedItem {
                    position,
                    id: ids[position].as_str(),
                    vector,
                }),
                None => item.clear_similar_items(),
            }
        }

        let Some(neighbors) = self.ranker.rank(&embedded) else {
            tracing::info!(
                embedded = embedded.len(),
                "Fewer than two embeddings, skipping similarity pass"
            );
            return;
        };
        for entry in neighbors {
            if let Some(item) = items.get_mut(entry.position) {
                item.set_similar_items(&entry.ids);
                summary.with_similar += 1;
            }
        }
    }
}
