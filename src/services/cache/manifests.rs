//! Parsed manifest store

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::MANIFESTS_DIR;
use crate::catalog::slugify;
use crate::utils::{compute_sha256, ensure_dir, write_atomic};

const KEY_SUFFIX_CHARS: usize = 60;

pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn open(cache_dir: &Path) -> std::io::Result<Self> {
        let dir = ensure_dir(&cache_dir.join(MANIFESTS_DIR))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, manifest_uri: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", manifest_cache_key(manifest_uri)))
    }

    /// Cached document for `manifest_uri`. A file that does not parse is a miss.
    pub fn get(&self, manifest_uri: &str) -> Option<Value> {
        let path = self.path_for(manifest_uri);
        let raw = fs::read(&path).ok()?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(
                    manifest_uri,
                    error = %err,
                    "Ignoring unreadable cached manifest"
                );
                None
            }
        }
    }

    pub fn put(&self, manifest_uri: &str, manifest: &Value) -> std::io::Result<()> {
        let json = serde_json::to_vec(manifest)?;
        write_atomic(&self.path_for(manifest_uri), &json)
    }
}

/// Filesystem-safe key: slug of the URI's last 60 characters plus a short
/// digest of the whole URI.
pub fn manifest_cache_key(manifest_uri: &str) -> String {
    let tail: String = {
        let mut chars: Vec<char> = manifest_uri.chars().rev().take(KEY_SUFFIX_CHARS).collect();
        chars.reverse();
        chars.into_iter().collect()
    };
    let digest: String = compute_sha256(manifest_uri.as_bytes()).chars().take(8).collect();
    let slug = slugify(&tail);
    if slug.is_empty() {
        digest
    } else {
        format!("{}-{}", slug, digest)
    }
}
