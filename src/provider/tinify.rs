use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};
use reqwest::Response;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{CompressionProvider, Dimensions, ProviderImage, ShrinkOutput, TransformRequest};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};

const IMAGE_WIDTH: &str = "Image-Width";
const IMAGE_HEIGHT: &str = "Image-Height";
const COMPRESSION_COUNT: &str = "Compression-Count";

/// TinyPNG (Tinify) API client
pub struct TinifyClient {
    shrink_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ShrinkResponse {
    output: ShrinkResponseOutput,
}

#[derive(Debug, Deserialize)]
struct ShrinkResponseOutput {
    #[serde(default)]
    size: u64,
    #[serde(rename = "type")]
    content_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TinifyErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl TinifyClient {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_seconds))
            .build()?;

        Ok(Self {
            shrink_url: config.shrink_url.clone(),
            client,
        })
    }

    async fn into_image(response: Response) -> Result<ProviderImage> {
        let response = ensure_success(response).await?;
        log_compression_count(response.headers());

        let content_type = header_str(response.headers(), CONTENT_TYPE.as_str());
        let dimensions = dimensions_from_headers(response.headers());
        let data = response.bytes().await?;

        Ok(ProviderImage {
            data,
            content_type,
            dimensions,
        })
    }
}

#[async_trait]
impl CompressionProvider for TinifyClient {
    async fn shrink(&self, api_key: &str, image: Bytes) -> Result<ShrinkOutput> {
        debug!("Uploading image to TinyPNG: {} bytes", image.len());

        let response = self
            .client
            .post(&self.shrink_url)
            .basic_auth("api", Some(api_key))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        log_compression_count(response.headers());

        let location = header_str(response.headers(), LOCATION.as_str());
        let body: ShrinkResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Internal(format!("unexpected shrink response: {}", e)))?;

        let url = body
            .output
            .url
            .or(location)
            .ok_or_else(|| RelayError::Internal("shrink response carried no output URL".into()))?;

        let dimensions = match (body.output.width, body.output.height) {
            (Some(width), Some(height)) => Some(Dimensions::new(width, height)),
            _ => None,
        };

        Ok(ShrinkOutput {
            url,
            size: body.output.size,
            content_type: body.output.content_type,
            dimensions,
        })
    }

    async fn download(&self, api_key: &str, url: &str) -> Result<ProviderImage> {
        let response = self
            .client
            .get(url)
            .basic_auth("api", Some(api_key))
            .send()
            .await?;

        Self::into_image(response).await
    }

    async fn probe(&self, api_key: &str, url: &str) -> Result<Option<Dimensions>> {
        let response = self
            .client
            .head(url)
            .basic_auth("api", Some(api_key))
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(dimensions_from_headers(response.headers()))
    }

    async fn transform(
        &self,
        api_key: &str,
        url: &str,
        request: &TransformRequest,
    ) -> Result<ProviderImage> {
        debug!("Requesting TinyPNG transform at {}", url);

        let response = self
            .client
            .post(url)
            .basic_auth("api", Some(api_key))
            .json(request)
            .send()
            .await?;

        Self::into_image(response).await
    }
}

/// Turn a non-2xx provider answer into `RelayError::Provider`
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(RelayError::Provider {
        status: status.as_u16(),
        message: provider_message(&text),
    })
}

/// Prefer the provider's JSON `message`, then `error`, then the raw body
fn provider_message(body: &str) -> String {
    const FALLBACK: &str = "TinyPNG API error";

    match serde_json::from_str::<TinifyErrorBody>(body) {
        Ok(parsed) => parsed
            .message
            .or(parsed.error)
            .unwrap_or_else(|| FALLBACK.to_string()),
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => FALLBACK.to_string(),
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Both headers must be present and numeric
pub(crate) fn dimensions_from_headers(headers: &HeaderMap) -> Option<Dimensions> {
    let width = header_u32(headers, IMAGE_WIDTH)?;
    let height = header_u32(headers, IMAGE_HEIGHT)?;
    Some(Dimensions::new(width, height))
}

fn log_compression_count(headers: &HeaderMap) {
    if let Some(count) = header_str(headers, COMPRESSION_COUNT) {
        debug!("TinyPNG compression count this month: {}", count);
    }
}
