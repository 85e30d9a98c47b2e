use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::api::models::ProcessedImage;
use crate::error::{RelayError, Result};
use crate::provider::{
    CompressionProvider, Dimensions, ProviderImage, ResizeMethod, ResizeSpec, TransformRequest,
};

/// Transformation pipeline selected by a request
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Compressor,
    Converter,
    Resizer,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Compressor => "compressor",
            Mode::Converter => "converter",
            Mode::Resizer => "resizer",
        }
    }

    /// Suffix appended to the original basename
    pub fn filename_suffix(&self) -> &'static str {
        match self {
            Mode::Compressor => "compressed",
            Mode::Converter => "converted",
            Mode::Resizer => "resized",
        }
    }

    /// Next mode in the compressor -> converter -> resizer cycle
    pub fn next(&self) -> Mode {
        match self {
            Mode::Compressor => Mode::Converter,
            Mode::Converter => Mode::Resizer,
            Mode::Resizer => Mode::Compressor,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compressor" => Ok(Mode::Compressor),
            "converter" => Ok(Mode::Converter),
            "resizer" => Ok(Mode::Resizer),
            other => Err(RelayError::Validation(format!(
                "Unknown mode '{}'. Expected compressor, converter or resizer.",
                other
            ))),
        }
    }
}

/// Resize parameters as submitted by the client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeOptions {
    pub custom_width: Option<u32>,
    pub custom_height: Option<u32>,
    pub aspect_ratio_locked: bool,
    pub percentage: Option<u32>,
}

/// Mode together with its mode-specific parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Compress,
    Convert { target_format: String },
    Resize(ResizeOptions),
}

impl Operation {
    pub fn mode(&self) -> Mode {
        match self {
            Operation::Compress => Mode::Compressor,
            Operation::Convert { .. } => Mode::Converter,
            Operation::Resize(_) => Mode::Resizer,
        }
    }
}

/// Provider-reported resolution; `Unknown` when the provider omitted it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Known(Dimensions),
    Unknown,
}

impl From<Option<Dimensions>> for Resolution {
    fn from(dimensions: Option<Dimensions>) -> Self {
        dimensions.map_or(Resolution::Unknown, Resolution::Known)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Known(dimensions) => write!(f, "{}", dimensions),
            Resolution::Unknown => f.write_str("unknown"),
        }
    }
}

/// Work out the provider resize call.
///
/// A percentage wins and needs the original dimensions; otherwise both
/// custom dimensions give a `fit`, a single one gives a `scale`.
pub fn plan_resize(options: &ResizeOptions, original: Option<Dimensions>) -> Result<ResizeSpec> {
    if let Some(percentage) = options.percentage {
        let original = original.ok_or(RelayError::MissingDimensions)?;
        // Tiny originals must not round down to a zero-pixel edge
        let scaled = |value: u32| ((value as f64 * percentage as f64 / 100.0).round() as u32).max(1);
        return Ok(ResizeSpec {
            method: ResizeMethod::Fit,
            width: Some(scaled(original.width)),
            height: Some(scaled(original.height)),
        });
    }

    match (options.custom_width, options.custom_height) {
        (Some(width), Some(height)) => Ok(ResizeSpec {
            method: ResizeMethod::Fit,
            width: Some(width),
            height: Some(height),
        }),
        (None, None) => Err(RelayError::Validation(
            "No resize options provided".to_string(),
        )),
        (width, height) => Ok(ResizeSpec {
            method: ResizeMethod::Scale,
            width,
            height,
        }),
    }
}

/// `image/webp` -> `webp`; anything without a subtype yields `None`
pub fn extension_for_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    let subtype = essence.split('/').nth(1)?.trim();
    if subtype.is_empty() || subtype == "*" {
        return None;
    }
    let subtype = subtype.split('+').next().unwrap_or(subtype);
    Some(subtype.to_lowercase())
}

/// Strip the last extension and append `_<suffix>.<extension>`
pub fn output_filename(original: &str, mode: Mode, extension: &str) -> String {
    let stem = match original.rfind('.') {
        Some(index) if index > 0 => &original[..index],
        _ => original,
    };
    format!("{}_{}.{}", stem, mode.filename_suffix(), extension)
}

fn original_extension(filename: &str) -> Option<String> {
    let index = filename.rfind('.')?;
    let extension = &filename[index + 1..];
    if index == 0 || extension.is_empty() {
        None
    } else {
        Some(extension.to_lowercase())
    }
}

/// Image accepted by the relay
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Validated processing request
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub image: UploadedImage,
    pub api_key: String,
    pub operation: Operation,
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub mode: Mode,
    pub data: Bytes,
    pub filename: String,
    pub original_resolution: Option<Resolution>,
    pub new_resolution: Option<Resolution>,
}

impl ProcessOutcome {
    /// Encode the result for the JSON envelope
    pub fn into_processed_image(self) -> ProcessedImage {
        ProcessedImage {
            compressed_image_data: general_purpose::STANDARD.encode(&self.data),
            compressed_size: self.data.len() as u64,
            filename: self.filename,
            original_resolution: self.original_resolution.map(|r| r.to_string()),
            new_resolution: self.new_resolution.map(|r| r.to_string()),
        }
    }
}

/// Runs the provider call sequence for each mode
#[derive(Clone)]
pub struct ImageProcessor {
    provider: Arc<dyn CompressionProvider>,
}

impl ImageProcessor {
    pub fn new(provider: Arc<dyn CompressionProvider>) -> Self {
        Self { provider }
    }

    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessOutcome> {
        let mode = request.operation.mode();
        let start_time = Instant::now();

        info!(
            "🚀 Starting {} for {} ({} bytes)",
            mode,
            request.image.file_name,
            request.image.data.len()
        );

        let outcome = match &request.operation {
            Operation::Compress => self.compress(&request).await?,
            Operation::Convert { target_format } => self.convert(&request, target_format).await?,
            Operation::Resize(options) => self.resize(&request, options).await?,
        };

        info!(
            "✅ {} completed in {}ms",
            mode,
            start_time.elapsed().as_millis()
        );

        Ok(outcome)
    }

    async fn compress(&self, request: &ProcessRequest) -> Result<ProcessOutcome> {
        let api_key = &request.api_key;
        let upload = self.provider.shrink(api_key, request.image.data.clone()).await?;
        let image = self.provider.download(api_key, &upload.url).await?;

        let extension = self.result_extension(request, &image, upload.content_type.as_deref());
        Ok(ProcessOutcome {
            mode: Mode::Compressor,
            filename: output_filename(&request.image.file_name, Mode::Compressor, &extension),
            data: image.data,
            original_resolution: None,
            new_resolution: None,
        })
    }

    async fn convert(&self, request: &ProcessRequest, target_format: &str) -> Result<ProcessOutcome> {
        let api_key = &request.api_key;
        let upload = self.provider.shrink(api_key, request.image.data.clone()).await?;
        let image = self
            .provider
            .transform(api_key, &upload.url, &TransformRequest::convert(target_format))
            .await?;

        let extension =
            extension_for_content_type(target_format).unwrap_or_else(|| "png".to_string());
        Ok(ProcessOutcome {
            mode: Mode::Converter,
            filename: output_filename(&request.image.file_name, Mode::Converter, &extension),
            data: image.data,
            original_resolution: None,
            new_resolution: None,
        })
    }

    async fn resize(&self, request: &ProcessRequest, options: &ResizeOptions) -> Result<ProcessOutcome> {
        let api_key = &request.api_key;
        let upload = self.provider.shrink(api_key, request.image.data.clone()).await?;

        let original = match self.provider.probe(api_key, &upload.url).await? {
            Some(dimensions) => Some(dimensions),
            None => {
                debug!("Dimension headers missing on probe, using shrink response");
                upload.dimensions
            }
        };

        let spec = plan_resize(options, original)?;
        debug!(
            "Resize plan: {:?} (aspect ratio locked: {})",
            spec, options.aspect_ratio_locked
        );

        let image = self
            .provider
            .transform(api_key, &upload.url, &TransformRequest::resize(spec))
            .await?;

        let extension = self.result_extension(request, &image, upload.content_type.as_deref());
        Ok(ProcessOutcome {
            mode: Mode::Resizer,
            filename: output_filename(&request.image.file_name, Mode::Resizer, &extension),
            original_resolution: Some(Resolution::from(original)),
            new_resolution: Some(Resolution::from(image.dimensions)),
            data: image.data,
        })
    }

    fn result_extension(
        &self,
        request: &ProcessRequest,
        image: &ProviderImage,
        upload_type: Option<&str>,
    ) -> String {
        image
            .content_type
            .as_deref()
            .or(upload_type)
            .and_then(extension_for_content_type)
            .or_else(|| extension_for_content_type(&request.image.content_type))
            .or_else(|| original_extension(&request.image.file_name))
            .unwrap_or_else(|| "png".to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::ShrinkOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory provider recording every call
    #[derive(Default)]
    pub(crate) struct FakeProvider {
        pub calls: Mutex<Vec<String>>,
        pub transforms: Mutex<Vec<TransformRequest>>,
        pub probe_dimensions: Option<Dimensions>,
        pub shrink_dimensions: Option<Dimensions>,
        pub result_dimensions: Option<Dimensions>,
        pub result_type: Option<String>,
        pub fail_with: Option<u16>,
    }

    impl FakeProvider {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) -> Result<()> {
            self.calls.lock().unwrap().push(call.to_string());
            match self.fail_with {
                Some(status) => Err(RelayError::Provider {
                    status,
                    message: "Credentials are invalid.".to_string(),
                }),
                None => Ok(()),
            }
        }

        fn image(&self) -> ProviderImage {
            ProviderImage {
                data: Bytes::from_static(b"tiny"),
                content_type: self.result_type.clone(),
                dimensions: self.result_dimensions,
            }
        }
    }

    #[async_trait]
    impl CompressionProvider for FakeProvider {
        async fn shrink(&self, _api_key: &str, image: Bytes) -> Result<ShrinkOutput> {
            self.record("shrink")?;
            Ok(ShrinkOutput {
                url: "https://api.tinify.com/output/abc".to_string(),
                size: image.len() as u64,
                content_type: self.result_type.clone(),
                dimensions: self.shrink_dimensions,
            })
        }

        async fn download(&self, _api_key: &str, _url: &str) -> Result<ProviderImage> {
            self.record("download")?;
            Ok(self.image())
        }

        async fn probe(&self, _api_key: &str, _url: &str) -> Result<Option<Dimensions>> {
            self.record("probe")?;
            Ok(self.probe_dimensions)
        }

        async fn transform(
            &self,
            _api_key: &str,
            _url: &str,
            request: &TransformRequest,
        ) -> Result<ProviderImage> {
            self.record("transform")?;
            self.transforms.lock().unwrap().push(request.clone());
            Ok(self.image())
        }
    }

    fn request(file_name: &str, operation: Operation) -> ProcessRequest {
        ProcessRequest {
            image: UploadedImage {
                file_name: file_name.to_string(),
                content_type: "image/jpeg".to_string(),
                data: Bytes::from_static(b"original image bytes"),
            },
            api_key: "key".to_string(),
            operation,
        }
    }

    #[test]
    fn test_mode_parsing_and_cycle() {
        assert_eq!("resizer".parse::<Mode>().unwrap(), Mode::Resizer);
        assert!("shrinker".parse::<Mode>().is_err());
        assert_eq!(Mode::Compressor.next(), Mode::Converter);
        assert_eq!(Mode::Resizer.next(), Mode::Compressor);
    }

    #[test]
    fn test_both_dimensions_request_fit() {
        let options = ResizeOptions {
            custom_width: Some(640),
            custom_height: Some(480),
            aspect_ratio_locked: true,
            percentage: None,
        };
        let spec = plan_resize(&options, None).unwrap();
        assert_eq!(spec.method, ResizeMethod::Fit);
        assert_eq!((spec.width, spec.height), (Some(640), Some(480)));
    }

    #[test]
    fn test_single_dimension_requests_scale() {
        let width_only = ResizeOptions {
            custom_width: Some(300),
            ..Default::default()
        };
        let spec = plan_resize(&width_only, None).unwrap();
        assert_eq!(spec.method, ResizeMethod::Scale);
        assert_eq!((spec.width, spec.height), (Some(300), None));

        let height_only = ResizeOptions {
            custom_height: Some(200),
            ..Default::default()
        };
        let spec = plan_resize(&height_only, None).unwrap();
        assert_eq!(spec.method, ResizeMethod::Scale);
        assert_eq!((spec.width, spec.height), (None, Some(200)));
    }

    #[test]
    fn test_percentage_rounds_original_dimensions() {
        let options = ResizeOptions {
            percentage: Some(75),
            ..Default::default()
        };
        let spec = plan_resize(&options, Some(Dimensions::new(333, 201))).unwrap();
        assert_eq!(spec.method, ResizeMethod::Fit);
        // 249.75 -> 250, 150.75 -> 151
        assert_eq!((spec.width, spec.height), (Some(250), Some(151)));
    }

    #[test]
    fn test_percentage_never_yields_zero_pixels() {
        let options = ResizeOptions {
            percentage: Some(1),
            ..Default::default()
        };
        let spec = plan_resize(&options, Some(Dimensions::new(1, 40))).unwrap();
        assert_eq!((spec.width, spec.height), (Some(1), Some(1)));
    }

    #[test]
    fn test_percentage_without_original_dimensions_fails() {
        let options = ResizeOptions {
            percentage: Some(50),
            ..Default::default()
        };
        assert!(matches!(
            plan_resize(&options, None),
            Err(RelayError::MissingDimensions)
        ));
        assert!(matches!(
            plan_resize(&ResizeOptions::default(), None),
            Err(RelayError::Validation(_))
        ));
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(
            output_filename("holiday.photo.jpg", Mode::Compressor, "jpeg"),
            "holiday.photo_compressed.jpeg"
        );
        assert_eq!(output_filename("README", Mode::Converter, "webp"), "README_converted.webp");
        assert_eq!(output_filename(".hidden", Mode::Resizer, "png"), ".hidden_resized.png");
    }

    #[test]
    fn test_extension_for_content_type() {
        assert_eq!(extension_for_content_type("image/webp").as_deref(), Some("webp"));
        assert_eq!(extension_for_content_type("image/svg+xml").as_deref(), Some("svg"));
        assert_eq!(
            extension_for_content_type("image/JPEG; charset=binary").as_deref(),
            Some("jpeg")
        );
        assert_eq!(extension_for_content_type("image/*"), None);
        assert_eq!(extension_for_content_type("webp"), None);
    }

    #[tokio::test]
    async fn test_compressor_uploads_then_downloads() {
        let provider = Arc::new(FakeProvider {
            result_type: Some("image/jpeg".to_string()),
            ..Default::default()
        });
        let processor = ImageProcessor::new(provider.clone());

        let outcome = processor.process(request("cat.jpg", Operation::Compress)).await.unwrap();

        assert_eq!(provider.calls(), vec!["shrink", "download"]);
        assert_eq!(outcome.filename, "cat_compressed.jpeg");
        assert!(outcome.original_resolution.is_none());

        let processed = outcome.into_processed_image();
        let decoded = general_purpose::STANDARD
            .decode(&processed.compressed_image_data)
            .unwrap();
        assert_eq!(decoded.len() as u64, processed.compressed_size);
    }

    #[tokio::test]
    async fn test_converter_posts_convert_body() {
        let provider = Arc::new(FakeProvider::default());
        let processor = ImageProcessor::new(provider.clone());

        let outcome = processor
            .process(request(
                "logo.png",
                Operation::Convert {
                    target_format: "image/webp".to_string(),
                },
            ))
            .await
            .unwrap();

        assert_eq!(provider.calls(), vec!["shrink", "transform"]);
        assert_eq!(
            provider.transforms.lock().unwrap()[0],
            TransformRequest::convert("image/webp")
        );
        assert_eq!(outcome.filename, "logo_converted.webp");
    }

    #[tokio::test]
    async fn test_resizer_percentage_reports_resolutions() {
        let provider = Arc::new(FakeProvider {
            probe_dimensions: Some(Dimensions::new(800, 600)),
            result_dimensions: Some(Dimensions::new(400, 300)),
            result_type: Some("image/png".to_string()),
            ..Default::default()
        });
        let processor = ImageProcessor::new(provider.clone());

        let outcome = processor
            .process(request(
                "scan.png",
                Operation::Resize(ResizeOptions {
                    percentage: Some(50),
                    ..Default::default()
                }),
            ))
            .await
            .unwrap();

        assert_eq!(provider.calls(), vec!["shrink", "probe", "transform"]);
        assert_eq!(
            provider.transforms.lock().unwrap()[0],
            TransformRequest::resize(ResizeSpec {
                method: ResizeMethod::Fit,
                width: Some(400),
                height: Some(300),
            })
        );

        let processed = outcome.into_processed_image();
        assert_eq!(processed.filename, "scan_resized.png");
        assert_eq!(processed.original_resolution.as_deref(), Some("800x600"));
        assert_eq!(processed.new_resolution.as_deref(), Some("400x300"));
    }

    #[tokio::test]
    async fn test_resizer_falls_back_to_shrink_dimensions_and_marks_unknown() {
        let provider = Arc::new(FakeProvider {
            probe_dimensions: None,
            shrink_dimensions: Some(Dimensions::new(1000, 500)),
            result_dimensions: None,
            ..Default::default()
        });
        let processor = ImageProcessor::new(provider.clone());

        let outcome = processor
            .process(request(
                "wide.jpg",
                Operation::Resize(ResizeOptions {
                    percentage: Some(50),
                    ..Default::default()
                }),
            ))
            .await
            .unwrap();

        assert_eq!(
            outcome.original_resolution,
            Some(Resolution::Known(Dimensions::new(1000, 500)))
        );
        assert_eq!(outcome.new_resolution, Some(Resolution::Unknown));
        assert_eq!(outcome.into_processed_image().new_resolution.as_deref(), Some("unknown"));
    }

    #[tokio::test]
    async fn test_provider_failure_stops_pipeline() {
        let provider = Arc::new(FakeProvider {
            fail_with: Some(401),
            ..Default::default()
        });
        let processor = ImageProcessor::new(provider.clone());

        let err = processor
            .process(request("cat.jpg", Operation::Compress))
            .await
            .unwrap_err();

        assert_eq!(provider.calls(), vec!["shrink"]);
        assert_eq!(err.to_string(), "TinyPNG API error (401): Credentials are invalid.");
    }
}
