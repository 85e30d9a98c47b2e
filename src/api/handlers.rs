//! API request handlers

use axum::extract::multipart::Field;
use axum::extract::Multipart;
use bytes::BytesMut;
use serde_json::Value;
use tracing::{debug, info};

use super::models::ProcessedImage;
use crate::error::{RelayError, Result};
use crate::processing::{ImageProcessor, Mode, Operation, ProcessRequest, ResizeOptions, UploadedImage};

/// Handle health check requests
pub async fn health_check() -> Value {
    serde_json::json!({
        "status": "healthy",
        "service": "tiny-compressor",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

/// Raw multipart fields of an image processing request
#[derive(Debug, Default)]
pub struct ProcessForm {
    pub image: Option<UploadedImage>,
    /// Upload limit the image exceeded, if any
    pub image_over_limit: Option<usize>,
    pub api_key: Option<String>,
    pub mode: Option<String>,
    pub target_format: Option<String>,
    pub custom_width: Option<String>,
    pub custom_height: Option<String>,
    pub aspect_ratio_locked: Option<String>,
    pub resize_percentage: Option<String>,
}

/// Read every form field; an oversized image stops streaming at the limit
pub async fn read_process_form(mut multipart: Multipart, max_upload_bytes: usize) -> Result<ProcessForm> {
    let mut form = ProcessForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::Validation(format!("Failed to read form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "image" => {
                let (image, over_limit) = read_image_field(field, max_upload_bytes).await?;
                form.image = Some(image);
                form.image_over_limit = over_limit.then_some(max_upload_bytes);
            }
            "apiKey" => form.api_key = read_text_field(field).await?,
            "mode" => form.mode = read_text_field(field).await?,
            "targetFormat" => form.target_format = read_text_field(field).await?,
            "customWidth" => form.custom_width = read_text_field(field).await?,
            "customHeight" => form.custom_height = read_text_field(field).await?,
            "aspectRatioLocked" => form.aspect_ratio_locked = read_text_field(field).await?,
            "resizePercentage" => form.resize_percentage = read_text_field(field).await?,
            other => debug!("Ignoring unknown form field: {}", other),
        }
    }

    Ok(form)
}

async fn read_image_field(
    mut field: Field<'_>,
    max_upload_bytes: usize,
) -> Result<(UploadedImage, bool)> {
    let file_name = field.file_name().unwrap_or("image").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();

    let mut data = BytesMut::new();
    let mut over_limit = false;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| too_large_or_invalid(e, max_upload_bytes))?
    {
        data.extend_from_slice(&chunk);
        if data.len() > max_upload_bytes {
            over_limit = true;
            break;
        }
    }

    let image = UploadedImage {
        file_name,
        content_type,
        data: data.freeze(),
    };
    Ok((image, over_limit))
}

async fn read_text_field(field: Field<'_>) -> Result<Option<String>> {
    let text = field
        .text()
        .await
        .map_err(|e| RelayError::Validation(format!("Failed to read form field: {}", e)))?;
    let text = text.trim().to_string();
    Ok(if text.is_empty() { None } else { Some(text) })
}

fn file_too_large(max_upload_bytes: usize) -> RelayError {
    RelayError::Validation(format!(
        "File too large. Maximum size is {}MB.",
        max_upload_bytes / (1024 * 1024)
    ))
}

/// The body limit surfaces as a multipart error; report it as an oversized file
fn too_large_or_invalid(error: axum::extract::multipart::MultipartError, max_upload_bytes: usize) -> RelayError {
    if error.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        file_too_large(max_upload_bytes)
    } else {
        RelayError::Validation(format!("Failed to read image data: {}", error))
    }
}

fn parse_dimension(name: &str, value: Option<&str>) -> Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(raw) => match raw.parse::<u32>() {
            Ok(0) | Err(_) => Err(RelayError::Validation(format!(
                "{} must be a positive whole number",
                name
            ))),
            Ok(value) => Ok(Some(value)),
        },
    }
}

impl ProcessForm {
    /// Validate the form into a processing request
    pub fn into_request(self) -> Result<ProcessRequest> {
        let (image, api_key) = match (self.image, self.api_key) {
            (Some(image), Some(api_key)) => (image, api_key),
            (image, api_key) => {
                return Err(RelayError::Validation(format!(
                    "Missing image file or API key. ImageFile: {}, ApiKey: {}",
                    image.is_some(),
                    api_key.is_some()
                )))
            }
        };

        if !image.content_type.starts_with("image/") {
            return Err(RelayError::Validation(
                "Invalid file type. Only images are allowed.".to_string(),
            ));
        }
        if let Some(max_upload_bytes) = self.image_over_limit {
            return Err(file_too_large(max_upload_bytes));
        }

        let mode = match self.mode.as_deref() {
            Some(raw) => raw.parse::<Mode>()?,
            None => Mode::default(),
        };

        let operation = match mode {
            Mode::Compressor => Operation::Compress,
            Mode::Converter => {
                let target_format = self
                    .target_format
                    .filter(|format| format.starts_with("image/"))
                    .ok_or_else(|| {
                        RelayError::Validation(
                            "targetFormat must be an image MIME type such as image/webp".to_string(),
                        )
                    })?;
                Operation::Convert { target_format }
            }
            Mode::Resizer => {
                let options = ResizeOptions {
                    custom_width: parse_dimension("customWidth", self.custom_width.as_deref())?,
                    custom_height: parse_dimension("customHeight", self.custom_height.as_deref())?,
                    aspect_ratio_locked: self.aspect_ratio_locked.as_deref() == Some("true"),
                    percentage: parse_dimension("resizePercentage", self.resize_percentage.as_deref())?,
                };
                if matches!(options.percentage, Some(p) if p > 100) {
                    return Err(RelayError::Validation(
                        "resizePercentage must be between 1 and 100".to_string(),
                    ));
                }
                if options.custom_width.is_none()
                    && options.custom_height.is_none()
                    && options.percentage.is_none()
                {
                    return Err(RelayError::Validation(
                        "No resize options provided".to_string(),
                    ));
                }
                Operation::Resize(options)
            }
        };

        Ok(ProcessRequest {
            image,
            api_key,
            operation,
        })
    }
}

/// Handle an image processing POST
pub async fn process_image(
    processor: &ImageProcessor,
    multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<ProcessedImage> {
    let form = read_process_form(multipart, max_upload_bytes).await?;

    info!(
        "📥 Image file: {}",
        form.image
            .as_ref()
            .map(|image| format!("{} ({} bytes)", image.file_name, image.data.len()))
            .unwrap_or_else(|| "null".to_string())
    );
    info!(
        "🔑 API key: {}",
        if form.api_key.is_some() { "present" } else { "missing" }
    );

    let request = form.into_request()?;
    let outcome = processor.process(request).await?;
    Ok(outcome.into_processed_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn image() -> UploadedImage {
        UploadedImage {
            file_name: "cat.png".to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"png"),
        }
    }

    fn form(mode: &str) -> ProcessForm {
        ProcessForm {
            image: Some(image()),
            api_key: Some("key".to_string()),
            mode: Some(mode.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_key_is_reported() {
        let form = ProcessForm {
            image: Some(image()),
            ..Default::default()
        };
        let err = form.into_request().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing image file or API key. ImageFile: true, ApiKey: false"
        );
    }

    #[test]
    fn test_presence_is_checked_before_type_and_size() {
        let text_file = UploadedImage {
            content_type: "text/plain".to_string(),
            ..image()
        };
        let missing_key = ProcessForm {
            image: Some(text_file.clone()),
            ..Default::default()
        };
        assert_eq!(
            missing_key.into_request().unwrap_err().to_string(),
            "Missing image file or API key. ImageFile: true, ApiKey: false"
        );

        let wrong_type = ProcessForm {
            image: Some(text_file),
            image_over_limit: Some(1024 * 1024),
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert_eq!(
            wrong_type.into_request().unwrap_err().to_string(),
            "Invalid file type. Only images are allowed."
        );

        let oversized = ProcessForm {
            image_over_limit: Some(1024 * 1024),
            ..form("compressor")
        };
        assert_eq!(
            oversized.into_request().unwrap_err().to_string(),
            "File too large. Maximum size is 1MB."
        );
    }

    #[test]
    fn test_mode_defaults_to_compressor() {
        let mut form = form("compressor");
        form.mode = None;
        assert_eq!(form.into_request().unwrap().operation, Operation::Compress);
    }

    #[test]
    fn test_converter_requires_image_target() {
        let mut converter = form("converter");
        converter.target_format = Some("text/plain".to_string());
        assert!(matches!(converter.into_request(), Err(RelayError::Validation(_))));

        let mut converter = form("converter");
        converter.target_format = Some("image/avif".to_string());
        assert_eq!(
            converter.into_request().unwrap().operation,
            Operation::Convert {
                target_format: "image/avif".to_string()
            }
        );
    }

    #[test]
    fn test_resizer_fields_are_parsed() {
        let mut resizer = form("resizer");
        resizer.custom_width = Some("640".to_string());
        resizer.aspect_ratio_locked = Some("true".to_string());
        let request = resizer.into_request().unwrap();
        assert_eq!(
            request.operation,
            Operation::Resize(ResizeOptions {
                custom_width: Some(640),
                custom_height: None,
                aspect_ratio_locked: true,
                percentage: None,
            })
        );
    }

    #[test]
    fn test_resizer_rejects_bad_numbers_and_empty_options() {
        let mut resizer = form("resizer");
        resizer.custom_height = Some("tall".to_string());
        assert!(matches!(resizer.into_request(), Err(RelayError::Validation(_))));

        let mut resizer = form("resizer");
        resizer.resize_percentage = Some("150".to_string());
        assert!(matches!(resizer.into_request(), Err(RelayError::Validation(_))));

        let err = form("resizer").into_request().unwrap_err();
        assert_eq!(err.to_string(), "No resize options provided");
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(matches!(form("sharpener").into_request(), Err(RelayError::Validation(_))));
    }

    #[tokio::test]
    async fn test_health_check_shape() {
        let health = health_check().await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["service"], "tiny-compressor");
    }
}
