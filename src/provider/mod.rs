pub mod tinify;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RelayConfig;
use crate::error::Result;

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height, `None` for degenerate sizes
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some(self.width as f64 / self.height as f64)
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Result of the initial upload to the shrink endpoint
#[derive(Debug, Clone)]
pub struct ShrinkOutput {
    /// Location of the compressed image; later operations target this URL
    pub url: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub dimensions: Option<Dimensions>,
}

/// Image bytes returned by a download or transform call
#[derive(Debug, Clone)]
pub struct ProviderImage {
    pub data: Bytes,
    pub content_type: Option<String>,
    /// Read from the `Image-Width` / `Image-Height` response headers
    pub dimensions: Option<Dimensions>,
}

/// Resize method understood by the provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    /// Scale down to fit inside the width/height box
    Fit,
    /// Scale proportionally from a single dimension
    Scale,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResizeSpec {
    pub method: ResizeMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConvertSpec {
    #[serde(rename = "type")]
    pub content_type: String,
}

/// JSON body posted to an output URL
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransformRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resize: Option<ResizeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert: Option<ConvertSpec>,
}

impl TransformRequest {
    pub fn convert(content_type: impl Into<String>) -> Self {
        Self {
            resize: None,
            convert: Some(ConvertSpec {
                content_type: content_type.into(),
            }),
        }
    }

    pub fn resize(spec: ResizeSpec) -> Self {
        Self {
            resize: Some(spec),
            convert: None,
        }
    }
}

/// Trait for external compression services
#[async_trait]
pub trait CompressionProvider: Send + Sync {
    /// Upload raw image bytes and return where the compressed result lives
    async fn shrink(&self, api_key: &str, image: Bytes) -> Result<ShrinkOutput>;

    /// Download the image stored at an output URL
    async fn download(&self, api_key: &str, url: &str) -> Result<ProviderImage>;

    /// Read the dimensions of the image stored at an output URL
    async fn probe(&self, api_key: &str, url: &str) -> Result<Option<Dimensions>>;

    /// Request a conversion or resize of the image stored at an output URL
    async fn transform(
        &self,
        api_key: &str,
        url: &str,
        request: &TransformRequest,
    ) -> Result<ProviderImage>;
}

/// Create the default provider from configuration
pub fn create_provider(config: &RelayConfig) -> Result<Box<dyn CompressionProvider>> {
    Ok(Box::new(tinify::TinifyClient::new(config)?))
}
