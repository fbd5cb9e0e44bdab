//! End-of-run counters

use std::collections::{BTreeMap, HashMap};

use super::ItemOutcome;
use crate::catalog::CatalogItem;
use crate::services::{Detection, ResolveRule};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionCounts {
    pub both: usize,
    pub metadata_only: usize,
    pub clip_only: usize,
    pub neither: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    /// Embedded from a fresh image this run
    pub tagged: usize,
    /// Tags recomputed from a cached embedding
    pub retagged: usize,
    pub skipped_cached: usize,
    pub fetch_failed: usize,
    pub failures_by_kind: BTreeMap<&'static str, usize>,
    pub manifest_fetches: usize,
    pub manifest_cache_hits: usize,
    pub image_fetches: usize,
    pub resolved_by: BTreeMap<ResolveRule, usize>,
    pub with_similar: usize,
    /// `(tag, count)`, most frequent first, ties by name
    pub tag_distribution: Vec<(String, usize)>,
    pub detection: Option<DetectionCounts>,
}

impl RunSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record_outcome(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::TaggedAndCached { reused_embedding: false } => self.tagged += 1,
            ItemOutcome::TaggedAndCached { reused_embedding: true } => self.retagged += 1,
            ItemOutcome::SkippedCached => self.skipped_cached += 1,
            ItemOutcome::FetchFailed(err) => {
                self.fetch_failed += 1;
                *self.failures_by_kind.entry(err.kind()).or_default() += 1;
            }
        }
    }

    pub fn record_resolution(&mut self, rule: ResolveRule) {
        *self.resolved_by.entry(rule).or_default() += 1;
    }

    pub fn record_detection(&mut self, detection: &Detection) {
        let counts = self.detection.get_or_insert_with(DetectionCounts::default);
        match (detection.metadata, detection.visual) {
            (true, true) => counts.both += 1,
            (true, false) => counts.metadata_only += 1,
            (false, true) => counts.clip_only += 1,
            (false, false) => counts.neither += 1,
        }
    }

    pub fn tally_tags(&mut self, items: &[CatalogItem]) {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for tags in items.iter().filter_map(CatalogItem::visual_tags) {
            for tag in tags {
                *counts.entry(tag).or_default() += 1;
            }
        }
        let mut distribution: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(tag, count)| (tag.to_string(), count))
            .collect();
        distribution.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        self.tag_distribution = distribution;
    }

    pub fn log(&self) {
        tracing::info!(
            total = self.total,
            tagged = self.tagged,
            retagged = self.retagged,
            skipped_cached = self.skipped_cached,
            fetch_failed = self.fetch_failed,
            manifest_fetches = self.manifest_fetches,
            manifest_cache_hits = self.manifest_cache_hits,
            image_fetches = self.image_fetches,
            with_similar = self.with_similar,
            "Enrichment run finished"
        );
        for (kind, count) in &self.failures_by_kind {
            tracing::info!(kind, count, "Fetch failures");
        }
        for (rule, count) in &self.resolved_by {
            tracing::info!(rule = rule.label(), count, "Image urls resolved");
        }
        for (tag, count) in &self.tag_distribution {
            tracing::info!(tag = %tag, count, "Tag frequency");
        }
        if let Some(detection) = &self.detection {
            tracing::info!(
                both = detection.both,
                metadata_only = detection.metadata_only,
                clip_only = detection.clip_only,
                neither = detection.neither,
                "Detection paths"
            );
        }
    }
}
