use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;

/// Source of JSON documents addressed by path.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    async fn fetch(&self, path: &str) -> Result<Value, FetchError>;
}

/// Plain JSON GET client rooted at the API origin.
pub struct FeeApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl FeeApiClient {
    /// `base_url` is expected without trailing slash (see `config::normalize_api_base`).
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn join_url(&self, path: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            "/",
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Fetch for FeeApiClient {
    async fn fetch(&self, path: &str) -> Result<Value, FetchError> {
        let url = self.join_url(path);
        let resp = self
            .http
            .get(&url)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        debug!(url = %url, bytes = body.len(), "fetched");
        let json: Value = serde_json::from_str(&body)?;
        Ok(json)
    }
}
