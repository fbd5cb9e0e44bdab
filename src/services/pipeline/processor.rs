//! Per-item processing
//!
//! cached + tagged + no force  -> SkippedCached
//! cached + (force or untagged) -> retag from the cached vector
//! not cached                  -> manifest -> image url -> image -> embed -> tag

use serde_json::Value;

use super::{EnrichmentPipeline, ItemOutcome, RunSummary};
use crate::catalog::CatalogItem;
use crate::error::ItemError;
use crate::services::{downsize_image_url, Pacer, Transport, VisionModel};

impl<M, T, P> EnrichmentPipeline<M, T, P>
where
    M: VisionModel,
    T: Transport,
    P: Pacer,
{
    /// Runs one item to a terminal state. The returned vector is the
    /// item's embedding for the similarity pass, `None` on failure.
    pub(crate) async fn process_item(
        &self,
        item: &mut CatalogItem,
        item_id: &str,
        summary: &mut RunSummary,
    ) -> (ItemOutcome, Option<Vec<f32>>) {
        if let Some(vector) = self.embeddings.get(item_id) {
            if !self.force_retag && item.has_visual_tags() {
                return (ItemOutcome::SkippedCached, Some(vector));
            }
            let tags = self.tagger.tag_embedding(&vector);
            item.set_visual_tags(&tags);
            return (
                ItemOutcome::TaggedAndCached {
                    reused_embedding: true,
                },
                Some(vector),
            );
        }

        match self.fetch_and_embed(item, item_id, summary).await {
            Ok(vector) => {
                let tags = self.tagger.tag_embedding(&vector);
                item.set_visual_tags(&tags);
                (
                    ItemOutcome::TaggedAndCached {
                        reused_embedding: false,
                    },
                    Some(vector),
                )
            }
            Err(err) => (ItemOutcome::FetchFailed(err), None),
        }
    }

    async fn fetch_and_embed(
        &self,
        item: &mut CatalogItem,
        item_id: &str,
        summary: &mut RunSummary,
    ) -> Result<Vec<f32>, ItemError> {
        let Some(manifest_uri) = item.manifest_uri().map(str::to_string) else {
            item.clear_image_url();
            return Err(ItemError::MissingField { field: "manifest" });
        };

        let manifest = match self.load_manifest(&manifest_uri, summary).await {
            Ok(manifest) => manifest,
            Err(err) => {
                item.clear_image_url();
                return Err(err);
            }
        };

        let Some(resolution) = self.resolver.resolve(&manifest) else {
            item.clear_image_url();
            return Err(ItemError::ManifestUnresolvable { manifest_uri });
        };
        summary.record_resolution(resolution.rule);

        let image_url = match self.scan_image_size {
            Some(width) => downsize_image_url(&resolution.url, width),
            None => resolution.url,
        };
        item.set_image_url(&image_url);

        summary.image_fetches += 1;
        let fetched = self.transport.get_bytes(&image_url).await;
        self.pacer.pause().await;
        let bytes = fetched.map_err(|source| ItemError::TransportFailure {
            uri: image_url.clone(),
            source,
        })?;

        let vector = self
            .model
            .embed_image(&bytes)
            .await
            .map_err(|reason| ItemError::DecodeFailure {
                uri: image_url.clone(),
                reason,
            })?;

        if let Err(err) = self.embeddings.put(item_id, &vector) {
            tracing::warn!(item_id, error = %err, "Failed to cache embedding");
        }
        Ok(vector)
    }

    async fn load_manifest(
        &self,
        manifest_uri: &str,
        summary: &mut RunSummary,
    ) -> Result<Value, ItemError> {
        if let Some(manifest) = self.manifests.get(manifest_uri) {
            tracing::debug!(manifest_uri, "Manifest cache hit");
            summary.manifest_cache_hits += 1;
            return Ok(manifest);
        }

        summary.manifest_fetches += 1;
        let fetched = self.transport.get_json(manifest_uri).await;
        self.pacer.pause().await;
        let manifest = fetched.map_err(|source| ItemError::TransportFailure {
            uri: manifest_uri.to_string(),
            source,
        })?;

        if let Err(err) = self.manifests.put(manifest_uri, &manifest) {
            tracing::warn!(manifest_uri, error = %err, "Failed to cache manifest");
        }
        Ok(manifest)
    }
}
