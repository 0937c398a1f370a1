// src/extract.rs
//! Seam to the extraction service: given an item URL or id, return structured
//! fields. The DOM/markup work lives in the service; the engine only cares
//! about the result shape and the Blocked/NotFound distinction.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ExtractError;
use crate::feed::is_placeholder_title;
use crate::types::ItemFields;

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, target: &str) -> Result<ItemFields, ExtractError>;
}

/// HTTP client for the extraction service. One plain request per item, no
/// shared browser session, so backfill workers can call it concurrently.
pub struct HttpExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExtractor {
    pub fn new(base_url: &str) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExtractError::Other(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, target: &str) -> Result<ItemFields, ExtractError> {
        let endpoint = format!("{}/extract", self.base_url);
        let rsp = self
            .client
            .get(&endpoint)
            .query(&[("url", target)])
            .send()
            .await?;

        match rsp.status().as_u16() {
            403 | 429 => return Err(ExtractError::Blocked),
            404 | 410 => return Err(ExtractError::NotFound),
            s if s >= 400 => {
                let body = rsp.text().await.unwrap_or_default();
                return Err(ExtractError::Other(format!("status {s}: {body}")));
            }
            _ => {}
        }

        let fields: ItemFields = rsp
            .json()
            .await
            .map_err(|e| ExtractError::Other(format!("decoding extractor response: {e}")))?;

        // The site sometimes serves a challenge page with a 200; the
        // placeholder title is the only tell.
        if fields
            .title
            .as_deref()
            .map(is_placeholder_title)
            .unwrap_or(false)
            && fields.votes == 0
            && fields.tags.is_empty()
        {
            return Err(ExtractError::Blocked);
        }

        Ok(fields)
    }
}
