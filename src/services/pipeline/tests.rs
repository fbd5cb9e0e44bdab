use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use tempfile::tempdir;

use super::*;
use crate::catalog::Catalog;
use crate::services::test_support::{axis, CountingPacer, FakeModel, FakeTransport, Reply};
use crate::services::{l2_normalize, DetectionConfig, EnrichConfig, LabelPrompt, ModelConfig, ResolveRule};

const DIM: usize = 8;

const MANIFEST_A: &str = "https://a.example/iiif/a/manifest.json";
const MANIFEST_B: &str = "https://b.example/iiif/b/manifest.json";
const MANIFEST_C: &str = "https://c.example/iiif/c/manifest.json";
const IMAGE_A: &str = "https://a.example/iiif/a/full/full/0/default.jpg";
const IMAGE_B: &str = "https://b.example/thumb.jpg";

type TestPipeline = EnrichmentPipeline<FakeModel, FakeTransport, CountingPacer>;

fn unit(values: [f32; DIM]) -> Vec<f32> {
    let mut v = values.to_vec();
    l2_normalize(&mut v);
    v
}

fn labels(count: usize) -> Vec<LabelPrompt> {
    (0..count)
        .map(|i| LabelPrompt::new(&format!("label {i}"), &format!("a photo of label {i}")))
        .collect()
}

fn model() -> FakeModel {
    let mut model = FakeModel::new(DIM)
        .with_image(b"img-a", unit([1.0, 0.6, 0.3, 0.2, 0.1, 0.05, 0.4, 0.0]))
        .with_image(b"img-b", unit([0.9, 0.7, 0.2, 0.1, 0.3, 0.02, 0.0, 0.0]))
        .with_text("a train", axis(6, DIM))
        .with_text("no train", axis(7, DIM));
    for i in 0..6 {
        model = model.with_text(&format!("a photo of label {i}"), axis(i, DIM));
    }
    model
}

fn transport() -> FakeTransport {
    FakeTransport::new()
        .with(
            MANIFEST_A,
            Reply::Json(json!({
                "sequences": [{"canvases": [{"images": [{"resource": {"@id": IMAGE_A}}]}]}]
            })),
        )
        .with(
            MANIFEST_B,
            Reply::Json(json!({"label": "B", "thumbnail": [{"@id": IMAGE_B}]})),
        )
        .with(MANIFEST_C, Reply::Timeout)
        .with(IMAGE_A, Reply::Bytes(b"img-a".to_vec()))
        .with(IMAGE_B, Reply::Bytes(b"img-b".to_vec()))
}

fn config(cache_dir: &Path, label_count: usize, top_tags: usize) -> EnrichConfig {
    EnrichConfig {
        cache_dir: cache_dir.to_path_buf(),
        labels: labels(label_count),
        top_tags,
        request_delay_ms: 0,
        model: ModelConfig {
            vector_size: DIM,
            ..ModelConfig::default()
        },
        ..EnrichConfig::default()
    }
}

async fn pipeline(config: &EnrichConfig, transport: FakeTransport) -> TestPipeline {
    EnrichmentPipeline::new(model(), transport, CountingPacer::default(), config)
        .await
        .unwrap()
}

fn catalog(value: Value) -> Catalog {
    Catalog::from_value(value).unwrap()
}

fn abc_catalog() -> Catalog {
    catalog(json!({
        "collection": "trains",
        "items": [
            {"title": "Engine A", "manifest": MANIFEST_A, "notes": "keep me"},
            {"title": "Engine B", "manifest": MANIFEST_B},
            {"title": "Engine C", "manifest": MANIFEST_C, "similar_items": ["stale"]},
        ]
    }))
}

fn ab_catalog() -> Catalog {
    catalog(json!({
        "items": [
            {"title": "Engine A", "manifest": MANIFEST_A},
            {"title": "Engine B", "manifest": MANIFEST_B},
        ]
    }))
}

#[tokio::test]
async fn primary_thumbnail_and_timeout_items() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 4, 4);
    let pipeline = pipeline(&config, transport()).await;

    let mut catalog = abc_catalog();
    let summary = pipeline.run(&mut catalog).await;
    let [a, b, c] = &catalog.items[..] else {
        panic!("expected three items");
    };

    assert_eq!(a.id(), Some("engine-a"));
    assert_eq!(a.image_url(), Some(IMAGE_A));
    assert_eq!(a.similar_items(), Some(vec!["engine-b"]));
    assert_eq!(a.fields().get("notes"), Some(&json!("keep me")));

    assert_eq!(b.image_url(), Some(IMAGE_B));
    assert_eq!(b.similar_items(), Some(vec!["engine-a"]));

    assert_eq!(c.id(), Some("engine-c"));
    assert!(c.image_url().is_none());
    assert!(!c.has_visual_tags());
    assert!(!c.fields().contains_key("similar_items"));

    assert_eq!(catalog.field("collection"), Some(&json!("trains")));

    assert_eq!(summary.tagged, 2);
    assert_eq!(summary.fetch_failed, 1);
    assert_eq!(summary.failures_by_kind.get("transport_failure"), Some(&1));
    assert_eq!(summary.resolved_by.get(&ResolveRule::PrimaryResource), Some(&1));
    assert_eq!(summary.resolved_by.get(&ResolveRule::Thumbnail), Some(&1));
    assert_eq!(summary.image_fetches, 2);
    // three manifest fetches plus two image fetches
    assert_eq!(pipeline.pacer().pauses.get(), 5);
}

#[tokio::test]
async fn tags_are_bounded_and_ranked() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 6, 3);
    let pipeline = pipeline(&config, transport()).await;

    let mut catalog = ab_catalog();
    pipeline.run(&mut catalog).await;

    assert_eq!(
        catalog.items[0].visual_tags(),
        Some(vec!["label 0", "label 1", "label 2"])
    );
    for item in &catalog.items {
        assert!(item.visual_tags().unwrap().len() <= 3);
    }
}

#[tokio::test]
async fn second_run_is_all_skipped_and_identical() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 4, 4);

    let mut catalog = ab_catalog();
    let first = pipeline(&config, transport()).await;
    first.run(&mut catalog).await;
    let after_first = serde_json::to_value(&catalog).unwrap();

    let second = pipeline(&config, FakeTransport::new()).await;
    let summary = second.run(&mut catalog).await;

    assert_eq!(serde_json::to_value(&catalog).unwrap(), after_first);
    assert_eq!(summary.skipped_cached, 2);
    assert_eq!(summary.tagged + summary.retagged + summary.fetch_failed, 0);
    assert_eq!(second.transport().request_count(), 0);
    assert_eq!(second.model().image_calls.get(), 0);
    assert_eq!(second.pacer().pauses.get(), 0);
}

#[tokio::test]
async fn force_retag_uses_cached_embeddings_only() {
    let dir = tempdir().unwrap();

    let mut catalog = ab_catalog();
    let before = pipeline(&config(dir.path(), 4, 6), transport()).await;
    before.run(&mut catalog).await;
    for item in &catalog.items {
        assert_eq!(item.visual_tags().unwrap().len(), 4);
    }

    let mut grown = config(dir.path(), 6, 6);
    grown.force_retag = true;
    let after = pipeline(&grown, FakeTransport::new()).await;
    let summary = after.run(&mut catalog).await;

    for item in &catalog.items {
        assert_eq!(item.visual_tags().unwrap().len(), 6);
    }
    assert_eq!(summary.retagged, 2);
    assert_eq!(summary.image_fetches, 0);
    assert_eq!(after.transport().request_count(), 0);
    assert_eq!(after.model().image_calls.get(), 0);
}

#[tokio::test]
async fn cached_item_without_tags_is_retagged() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 4, 4);

    let mut catalog = ab_catalog();
    pipeline(&config, transport()).await.run(&mut catalog).await;

    let mut fresh = ab_catalog();
    let rerun = pipeline(&config, FakeTransport::new()).await;
    let summary = rerun.run(&mut fresh).await;

    assert_eq!(summary.retagged, 2);
    assert_eq!(fresh.items[0].visual_tags(), catalog.items[0].visual_tags());
    assert_eq!(fresh.items[0].similar_items(), Some(vec!["engine-b"]));
    assert_eq!(rerun.transport().request_count(), 0);
}

#[tokio::test]
async fn corrupt_embedding_is_refetched() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 4, 4);

    let mut catalog = ab_catalog();
    pipeline(&config, transport()).await.run(&mut catalog).await;

    fs::write(dir.path().join("embeddings").join("engine-a.emb"), b"junk").unwrap();

    let rerun = pipeline(&config, transport()).await;
    let summary = rerun.run(&mut catalog).await;

    assert_eq!(summary.tagged, 1);
    assert_eq!(summary.skipped_cached, 1);
    assert_eq!(summary.manifest_cache_hits, 1);
    assert_eq!(rerun.transport().requests_for(MANIFEST_A), 0);
    assert_eq!(rerun.transport().requests_for(IMAGE_A), 1);
    assert_eq!(rerun.model().image_calls.get(), 1);
}

#[tokio::test]
async fn undecodable_image_fails_the_item_only() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 4, 4);
    let transport = transport().with(IMAGE_B, Reply::Bytes(b"<html>".to_vec()));
    let pipeline = pipeline(&config, transport).await;

    let mut catalog = ab_catalog();
    let summary = pipeline.run(&mut catalog).await;
    let b = &catalog.items[1];

    assert_eq!(summary.failures_by_kind.get("decode_failure"), Some(&1));
    assert_eq!(b.image_url(), Some(IMAGE_B));
    assert!(!b.has_visual_tags());
    assert!(b.similar_items().is_none());
    // a single embedding leaves nothing to compare against
    assert!(catalog.items[0].similar_items().is_none());
    assert!(!dir.path().join("embeddings").join("engine-b.emb").exists());
}

#[tokio::test]
async fn unresolvable_and_missing_manifests_fail_cleanly() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 4, 4);
    let transport = transport().with(MANIFEST_B, Reply::Json(json!({"sequences": "nope"})));
    let pipeline = pipeline(&config, transport).await;

    let mut catalog = catalog(json!({
        "items": [
            {"title": "Engine B", "manifest": MANIFEST_B, "image_url": "https://old"},
            {"title": "No Manifest"},
        ]
    }));
    let summary = pipeline.run(&mut catalog).await;

    assert_eq!(summary.fetch_failed, 2);
    assert_eq!(summary.failures_by_kind.get("manifest_unresolvable"), Some(&1));
    assert_eq!(summary.failures_by_kind.get("missing_field"), Some(&1));
    assert!(catalog.items[0].image_url().is_none());
    assert_eq!(catalog.items[1].id(), Some("no-manifest"));
}

#[tokio::test]
async fn colliding_titles_get_distinct_ids() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 4, 4);
    let pipeline = pipeline(&config, transport()).await;

    let mut catalog = catalog(json!({
        "items": [
            {"title": "Engine", "manifest": MANIFEST_A},
            {"title": "Engine", "manifest": MANIFEST_B},
        ]
    }));
    pipeline.run(&mut catalog).await;

    let a = catalog.items[0].id().unwrap().to_string();
    let b = catalog.items[1].id().unwrap().to_string();
    assert_ne!(a, b);
    assert_eq!(catalog.items[0].similar_items(), Some(vec![b.as_str()]));
    assert_eq!(catalog.items[1].similar_items(), Some(vec![a.as_str()]));
}

#[tokio::test]
async fn scan_size_rewrites_fetched_url() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), 4, 4);
    config.scan_image_size = Some(400);
    let small = "https://a.example/iiif/a/full/400,/0/default.jpg";
    let transport = transport().with(small, Reply::Bytes(b"img-a".to_vec()));
    let pipeline = pipeline(&config, transport).await;

    let mut catalog = ab_catalog();
    pipeline.run(&mut catalog).await;

    assert_eq!(catalog.items[0].image_url(), Some(small));
    assert_eq!(pipeline.transport().requests_for(small), 1);
    assert_eq!(pipeline.transport().requests_for(IMAGE_A), 0);
}

#[tokio::test]
async fn detection_reports_single_path_items() {
    let dir = tempdir().unwrap();
    let mut config = config(dir.path(), 4, 4);
    config.detection = Some(DetectionConfig {
        positive_prompt: "a train".to_string(),
        negative_prompt: "no train".to_string(),
        threshold: 0.55,
        keywords: vec!["depot".to_string()],
    });
    let pipeline = pipeline(&config, transport()).await;

    let mut catalog = catalog(json!({
        "items": [
            {"title": "Engine A", "manifest": MANIFEST_A},
            {"title": "Engine B at the Depot", "manifest": MANIFEST_B},
            {"title": "Engine C", "manifest": MANIFEST_C},
        ]
    }));
    let summary = pipeline.run(&mut catalog).await;

    assert_eq!(catalog.items[0].fields().get("found_by"), Some(&json!(["clip"])));
    assert_eq!(catalog.items[1].fields().get("found_by"), Some(&json!(["metadata"])));
    assert!(!catalog.items[2].fields().contains_key("found_by"));
    assert_eq!(
        summary.detection,
        Some(DetectionCounts {
            both: 0,
            metadata_only: 1,
            clip_only: 1,
            neither: 0,
        })
    );
}

#[tokio::test]
async fn duplicate_records_never_list_their_own_id() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 4, 4);
    let pipeline = pipeline(&config, transport()).await;

    let mut catalog = catalog(json!({
        "items": [
            {"title": "Engine A", "manifest": MANIFEST_A},
            {"title": "Engine A", "manifest": MANIFEST_A},
            {"title": "Engine B", "manifest": MANIFEST_B},
        ]
    }));
    pipeline.run(&mut catalog).await;

    for item in &catalog.items {
        let own = item.id().unwrap();
        let similar = item.similar_items().unwrap();
        assert!(!similar.contains(&own), "{own} lists itself: {similar:?}");
    }
    assert_eq!(catalog.items[0].similar_items(), Some(vec!["engine-b"]));
    assert_eq!(catalog.items[1].similar_items(), Some(vec!["engine-b"]));
    assert_eq!(catalog.items[2].similar_items(), Some(vec!["engine-a"]));
    // the second copy reuses the first copy's embedding
    assert_eq!(pipeline.model().image_calls.get(), 2);
}
