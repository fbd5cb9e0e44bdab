//! In-memory collaborators for unit and scenario tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use serde_json::Value;

use super::{FetchError, Pacer, Transport, VisionModel};

/// Unit vector along `index`
pub fn axis(index: usize, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[index] = 1.0;
    v
}

/// Model backed by lookup tables. Unknown image bytes fail to decode.
pub struct FakeModel {
    dim: usize,
    texts: HashMap<String, Vec<f32>>,
    images: HashMap<Vec<u8>, Vec<f32>>,
    pub image_calls: Cell<usize>,
    pub text_calls: Cell<usize>,
}

impl FakeModel {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            texts: HashMap::new(),
            images: HashMap::new(),
            image_calls: Cell::new(0),
            text_calls: Cell::new(0),
        }
    }

    pub fn with_text(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.texts.insert(text.to_string(), vector);
        self
    }

    pub fn with_image(mut self, bytes: &[u8], vector: Vec<f32>) -> Self {
        self.images.insert(bytes.to_vec(), vector);
        self
    }
}

impl VisionModel for FakeModel {
    async fn embed_image(&self, image_bytes: &[u8]) -> Result<Vec<f32>, String> {
        self.image_calls.set(self.image_calls.get() + 1);
        let vector = self
            .images
            .get(image_bytes)
            .cloned()
            .ok_or_else(|| "not a decodable image".to_string())?;
        if vector.len() != self.dim {
            return Err(format!("expected {} dimensions", self.dim));
        }
        Ok(vector)
    }

    async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        self.text_calls.set(self.text_calls.get() + 1);
        texts
            .iter()
            .map(|text| {
                self.texts
                    .get(*text)
                    .cloned()
                    .ok_or_else(|| format!("no vector for prompt `{text}`"))
            })
            .collect()
    }

    fn logit_scale(&self) -> f32 {
        100.0
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Bytes(Vec<u8>),
    Timeout,
}

/// Transport serving canned replies; unknown URIs are 404s.
#[derive(Default)]
pub struct FakeTransport {
    replies: HashMap<String, Reply>,
    pub requests: RefCell<Vec<String>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, uri: &str, reply: Reply) -> Self {
        self.replies.insert(uri.to_string(), reply);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests_for(&self, uri: &str) -> usize {
        self.requests.borrow().iter().filter(|r| r.as_str() == uri).count()
    }

    fn reply(&self, uri: &str) -> Option<Reply> {
        self.requests.borrow_mut().push(uri.to_string());
        self.replies.get(uri).cloned()
    }
}

impl Transport for FakeTransport {
    async fn get_json(&self, uri: &str) -> Result<Value, FetchError> {
        match self.reply(uri) {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Bytes(_)) => Err(FetchError::Transport("invalid json body".to_string())),
            Some(Reply::Timeout) => Err(FetchError::Transport("timed out".to_string())),
            None => Err(FetchError::NotFound),
        }
    }

    async fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        match self.reply(uri) {
            Some(Reply::Bytes(bytes)) => Ok(bytes),
            Some(Reply::Json(value)) => Ok(value.to_string().into_bytes()),
            Some(Reply::Timeout) => Err(FetchError::Transport("timed out".to_string())),
            None => Err(FetchError::NotFound),
        }
    }
}

#[derive(Default)]
pub struct CountingPacer {
    pub pauses: Cell<usize>,
}

impl Pacer for CountingPacer {
    async fn pause(&self) {
        self.pauses.set(self.pauses.get() + 1);
    }
}
