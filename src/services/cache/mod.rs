//! Local read-through caches
//!
//! Split into submodules:
//! - `embeddings`: one binary feature vector per item id
//! - `manifests`: one parsed manifest document per manifest URI
//!
//! Both live under the configured cache directory, are written whole
//! (temp file + rename) and are never expired.

mod embeddings;
mod manifests;

pub use embeddings::EmbeddingStore;
pub use manifests::{manifest_cache_key, ManifestStore};

pub(crate) const EMBEDDINGS_DIR: &str = "embeddings";
pub(crate) const MANIFESTS_DIR: &str = "manifests";
