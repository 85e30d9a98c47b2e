//! API data models shared by the relay and the upload client

use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Processed image returned by a successful POST
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedImage {
    /// Base64 encoded result bytes
    pub compressed_image_data: String,
    pub compressed_size: u64,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_resolution: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}
