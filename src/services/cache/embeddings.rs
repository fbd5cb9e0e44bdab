//! Embedding vector store
//!
//! File layout (little-endian):
//!   [u8 * 4]   magic `EMB1`
//!   [u32]      dimension
//!   [f32 * d]  vector values

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::EMBEDDINGS_DIR;
use crate::error::ItemError;
use crate::utils::{ensure_dir, write_atomic};

const MAGIC: &[u8; 4] = b"EMB1";
const HEADER_LEN: usize = 8;
const FILE_EXTENSION: &str = "emb";

pub struct EmbeddingStore {
    dir: PathBuf,
    dimension: Option<usize>,
}

impl EmbeddingStore {
    /// Opens (creating if needed) `<cache_dir>/embeddings`. When `dimension`
    /// is set, stored vectors of any other size read as corrupt.
    pub fn open(cache_dir: &Path, dimension: Option<usize>) -> std::io::Result<Self> {
        let dir = ensure_dir(&cache_dir.join(EMBEDDINGS_DIR))?;
        Ok(Self { dir, dimension })
    }

    pub fn path_for(&self, item_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", item_id, FILE_EXTENSION))
    }

    /// Cached vector, `Ok(None)` when absent, `Err(CacheCorrupt)` when the
    /// file exists but cannot be used.
    pub fn load(&self, item_id: &str) -> Result<Option<Vec<f32>>, ItemError> {
        let path = self.path_for(item_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(corrupt(item_id, err.to_string())),
        };
        decode_vector(&bytes, self.dimension)
            .map(Some)
            .map_err(|reason| corrupt(item_id, reason))
    }

    /// Read-through lookup; an unreadable entry is logged and reported as a miss.
    pub fn get(&self, item_id: &str) -> Option<Vec<f32>> {
        match self.load(item_id) {
            Ok(vector) => vector,
            Err(err) => {
                tracing::warn!(item_id, error = %err, "Ignoring unreadable cached embedding");
                None
            }
        }
    }

    /// Stores `vector` for `item_id`, replacing any previous entry.
    pub fn put(&self, item_id: &str, vector: &[f32]) -> std::io::Result<()> {
        write_atomic(&self.path_for(item_id), &encode_vector(vector))
    }
}

fn corrupt(item_id: &str, reason: String) -> ItemError {
    ItemError::CacheCorrupt {
        key: item_id.to_string(),
        reason,
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + vector.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8], expected_dim: Option<usize>) -> Result<Vec<f32>, String> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
        return Err("missing embedding header".to_string());
    }
    let mut dim_bytes = [0u8; 4];
    dim_bytes.copy_from_slice(&bytes[4..HEADER_LEN]);
    let dim = u32::from_le_bytes(dim_bytes) as usize;

    if dim == 0 {
        return Err("empty embedding".to_string());
    }
    if let Some(expected) = expected_dim {
        if dim != expected {
            return Err(format!("dimension {} does not match expected {}", dim, expected));
        }
    }
    let body = &bytes[HEADER_LEN..];
    if body.len() != dim * 4 {
        return Err(format!(
            "expected {} bytes of vector data, found {}",
            dim * 4,
            body.len()
        ));
    }

    let vector: Vec<f32> = body
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    if vector.iter().any(|value| !value.is_finite()) {
        return Err("embedding contains non-finite values".to_string());
    }
    Ok(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_returns_same_vector() {
        let dir = tempdir().unwrap();
        let store = EmbeddingStore::open(dir.path(), Some(3)).unwrap();

        assert_eq!(store.get("depot"), None);
        store.put("depot", &[0.6, 0.8, 0.0]).unwrap();
        assert!(store.path_for("depot").is_file());
        assert_eq!(store.get("depot"), Some(vec![0.6, 0.8, 0.0]));

        store.put("depot", &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(store.get("depot"), Some(vec![0.0, 0.0, 1.0]));
    }

    #[test]
    fn corrupt_entries_read_as_misses() {
        let dir = tempdir().unwrap();
        let store = EmbeddingStore::open(dir.path(), Some(3)).unwrap();

        fs::write(store.path_for("garbage"), b"not a vector").unwrap();
        assert!(matches!(
            store.load("garbage"),
            Err(ItemError::CacheCorrupt { .. })
        ));
        assert_eq!(store.get("garbage"), None);

        let mut truncated = encode_vector(&[1.0, 0.0, 0.0]);
        truncated.pop();
        fs::write(store.path_for("truncated"), truncated).unwrap();
        assert_eq!(store.get("truncated"), None);
    }

    #[test]
    fn dimension_mismatch_is_corrupt() {
        let dir = tempdir().unwrap();
        EmbeddingStore::open(dir.path(), None)
            .unwrap()
            .put("engine", &[1.0, 0.0])
            .unwrap();

        let strict = EmbeddingStore::open(dir.path(), Some(512)).unwrap();
        assert!(strict.load("engine").is_err());
        let loose = EmbeddingStore::open(dir.path(), None).unwrap();
        assert_eq!(loose.get("engine"), Some(vec![1.0, 0.0]));
    }
}
