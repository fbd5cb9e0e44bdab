//! Manifest and image transport

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::error::{AppResult, ResultExt};

/// Non-ok outcomes of a GET. Everything that is not a clean 404/410 is a
/// transport error.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Transport(String),
}

/// Blocking-per-call remote access used by the pipeline. One request at a
/// time; callers never issue these concurrently.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get_json(&self, uri: &str) -> Result<Value, FetchError>;

    async fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpTransport {
    client: Client,
    manifest_timeout: Duration,
    image_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        user_agent: &str,
        manifest_timeout: Duration,
        image_timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .config_err("building http client")?;

        Ok(Self {
            client,
            manifest_timeout,
            image_timeout,
        })
    }

    async fn get(&self, uri: &str, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(uri)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::Transport(describe_request_error(&e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Transport(format!("http status {}", status)));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    async fn get_json(&self, uri: &str) -> Result<Value, FetchError> {
        self.get(uri, self.manifest_timeout)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Transport(format!("invalid json body: {e}")))
    }

    async fn get_bytes(&self, uri: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self
            .get(uri, self.image_timeout)
            .await?
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(describe_request_error(&e)))?;
        Ok(bytes.to_vec())
    }
}

fn describe_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}
