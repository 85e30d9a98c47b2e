use base64::{engine::general_purpose, Engine as _};
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::params::{ModeParams, ResizeControls};
use super::queue::{CompletedItem, ItemId, ItemStatus, UploadItem, UploadQueue};
use crate::api::models::{ApiResponse, ProcessedImage};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::processing::Mode;
use crate::provider::Dimensions;

/// Default converter target
pub const DEFAULT_TARGET_FORMAT: &str = "image/webp";

/// Application state the upload client works against
#[derive(Debug)]
pub struct ClientSession {
    mode: Mode,
    target_format: String,
    resize: ResizeControls,
    api_key: Option<String>,
    queue: UploadQueue,
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ClientSession {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            mode: Mode::Compressor,
            target_format: DEFAULT_TARGET_FORMAT.to_string(),
            resize: ResizeControls::new(),
            api_key: api_key.filter(|key| !key.is_empty()),
            queue: UploadQueue::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Advance compressor -> converter -> resizer -> compressor
    pub fn switch_mode(&mut self) -> Mode {
        self.mode = self.mode.next();
        if self.mode == Mode::Resizer {
            self.resize.set_preset(Default::default());
        }
        self.mode
    }

    pub fn target_format(&self) -> &str {
        &self.target_format
    }

    pub fn set_target_format(&mut self, target_format: impl Into<String>) {
        self.target_format = target_format.into();
    }

    pub fn resize(&self) -> &ResizeControls {
        &self.resize
    }

    pub fn resize_mut(&mut self) -> &mut ResizeControls {
        &mut self.resize
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        let api_key = api_key.into();
        self.api_key = if api_key.is_empty() { None } else { Some(api_key) };
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    /// Fields for the current mode, as they would be submitted now
    pub fn mode_params(&self) -> ModeParams {
        match self.mode {
            Mode::Compressor => ModeParams::Compressor,
            Mode::Converter => ModeParams::Converter {
                target_format: self.target_format.clone(),
            },
            Mode::Resizer => ModeParams::Resizer(self.resize.params()),
        }
    }
}

/// Outcome of one `process_files` call
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_time: Duration,
    pub items: Vec<UploadItem>,
}

/// Sends one relay request per image and records the results
#[derive(Debug, Clone)]
pub struct Orchestrator {
    client: reqwest::Client,
    relay_url: String,
    output_dir: PathBuf,
    request_timeout: Duration,
}

impl Orchestrator {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            relay_url: config.relay_url.clone(),
            output_dir: config.output_dir.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Expand directories and keep files whose extension maps to an image type
    pub async fn discover_images(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>, ClientError> {
        use std::future::Future;
        use std::pin::Pin;

        fn discover_recursive<'a>(
            dir: &'a Path,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<PathBuf>, ClientError>> + Send + 'a>> {
            Box::pin(async move {
                let mut images = Vec::new();

                let mut entries = tokio::fs::read_dir(dir).await?;
                while let Some(entry) = entries.next_entry().await? {
                    let path = entry.path();

                    if path.is_dir() {
                        let mut nested = discover_recursive(&path).await?;
                        images.append(&mut nested);
                    } else if is_image(&path) {
                        images.push(path);
                    }
                }

                Ok(images)
            })
        }

        let mut images = Vec::new();
        for path in paths {
            if path.is_dir() {
                let mut found = discover_recursive(path).await?;
                found.sort();
                images.append(&mut found);
            } else if is_image(path) {
                images.push(path.clone());
            } else {
                debug!("Skipping non-image file: {}", path.display());
            }
        }

        Ok(images)
    }

    /// Upload every image concurrently in the session's current mode
    pub async fn process_files(
        &self,
        session: &mut ClientSession,
        paths: &[PathBuf],
    ) -> Result<BatchReport, ClientError> {
        let start_time = Instant::now();

        let api_key = session
            .api_key
            .clone()
            .ok_or(ClientError::MissingApiKey)?;

        let images = self.discover_images(paths).await?;
        if images.is_empty() {
            return Err(ClientError::NoImageFiles);
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mode = session.mode;
        info!("🚀 Uploading {} images in {} mode", images.len(), mode);

        let mut ids = Vec::with_capacity(images.len());
        let mut pending = Vec::with_capacity(images.len());
        for path in images {
            let size = tokio::fs::metadata(&path).await?.len();

            let dimensions = if mode == Mode::Resizer {
                let dimensions = read_dimensions(&path).await;
                if let Some(dimensions) = dimensions {
                    session.resize.remember_aspect_ratio(dimensions);
                }
                dimensions
            } else {
                None
            };

            let item = UploadItem::new(path, size, dimensions);
            debug!("📎 Queued {} ({} bytes) as {}", item.file_name, item.size, item.id);
            pending.push((item.id, item.path.clone(), item.file_name.clone()));
            ids.push(session.queue.insert(item));
        }

        // Parameters are read once, after the first image has seeded the aspect ratio
        let params = session.mode_params();

        let claimed = Arc::new(Mutex::new(HashSet::<PathBuf>::new()));
        let (tx, mut rx) = mpsc::channel(pending.len());
        for (id, path, file_name) in pending {
            let orchestrator = self.clone();
            let api_key = api_key.clone();
            let params = params.clone();
            let claimed = claimed.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = orchestrator
                    .upload(&path, &file_name, &api_key, &params, &claimed)
                    .await;

                if let Err(e) = tx.send((id, result)).await {
                    error!("Failed to send upload result: {}", e);
                }
            });
        }

        // Drop the original sender so the loop ends once every task reports
        drop(tx);

        while let Some((id, result)) = rx.recv().await {
            let outcome = match result {
                Ok(completed) => {
                    info!("✅ Completed: {} -> {}", completed.filename, completed.saved_to.display());
                    session.queue.complete(id, completed)
                }
                Err(e) => {
                    warn!("❌ Failed: {} - {}", id, e);
                    session.queue.fail(id, e.to_string())
                }
            };

            if let Err(e) = outcome {
                error!("Queue rejected result for {}: {}", id, e);
            }
        }

        Ok(self.report(session.queue(), &ids, start_time.elapsed()))
    }

    fn report(&self, queue: &UploadQueue, ids: &[ItemId], total_time: Duration) -> BatchReport {
        let items: Vec<UploadItem> = ids.iter().filter_map(|id| queue.get(*id).cloned()).collect();
        let successful = items
            .iter()
            .filter(|item| matches!(item.status, ItemStatus::Completed(_)))
            .count();

        BatchReport {
            total: items.len(),
            successful,
            failed: items.len() - successful,
            total_time,
            items,
        }
    }

    /// One request/response round trip; the result is written to the output directory
    async fn upload(
        &self,
        path: &Path,
        file_name: &str,
        api_key: &str,
        params: &ModeParams,
        claimed: &Mutex<HashSet<PathBuf>>,
    ) -> Result<CompletedItem, ClientError> {
        let data = tokio::fs::read(path).await?;
        let content_type = mime_guess::from_path(path).first_or_octet_stream();

        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(content_type.as_ref())?;
        let form = params.apply(
            Form::new()
                .part("image", part)
                .text("apiKey", api_key.to_string()),
        );

        let response = self
            .client
            .post(&self.relay_url)
            .multipart(form)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let processed = read_envelope(response).await?;
        let bytes = general_purpose::STANDARD
            .decode(&processed.compressed_image_data)
            .map_err(|e| ClientError::Malformed(format!("invalid base64 image data: {}", e)))?;

        if bytes.len() as u64 != processed.compressed_size {
            return Err(ClientError::SizeMismatch {
                expected: processed.compressed_size,
                actual: bytes.len() as u64,
            });
        }

        let saved_to = {
            let mut claimed = claimed.lock().await;
            claim_output_path(&mut claimed, &self.output_dir, &safe_file_name(&processed.filename))
        };
        tokio::fs::write(&saved_to, &bytes).await?;

        Ok(CompletedItem {
            filename: processed.filename,
            size: processed.compressed_size,
            saved_to,
            original_resolution: processed.original_resolution,
            new_resolution: processed.new_resolution,
        })
    }
}

/// Map a relay response onto the processed image or a `ClientError`
async fn read_envelope(response: reqwest::Response) -> Result<ProcessedImage, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.error);
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let envelope: ApiResponse<ProcessedImage> = serde_json::from_str(&body)
        .map_err(|e| ClientError::Malformed(e.to_string()))?;

    if !envelope.success {
        return Err(ClientError::Rejected(
            envelope
                .error
                .unwrap_or_else(|| "Processing failed".to_string()),
        ));
    }

    envelope
        .data
        .ok_or_else(|| ClientError::Malformed("response carried no data".to_string()))
}

fn is_image(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first_raw()
        .map_or(false, |mime| mime.starts_with("image/"))
}

/// Keep only the final path component of a relay-chosen name
fn safe_file_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

/// First free path in this batch: `name.ext`, then `name_1.ext`, `name_2.ext`, ...
fn claim_output_path(claimed: &mut HashSet<PathBuf>, output_dir: &Path, file_name: &str) -> PathBuf {
    let (stem, extension) = match file_name.rfind('.') {
        Some(index) if index > 0 => (&file_name[..index], &file_name[index..]),
        _ => (file_name, ""),
    };

    let mut candidate = output_dir.join(file_name);
    let mut counter = 1;
    while claimed.contains(&candidate) {
        candidate = output_dir.join(format!("{}_{}{}", stem, counter, extension));
        counter += 1;
    }

    claimed.insert(candidate.clone());
    candidate
}

/// Local pixel dimensions, `None` when the file cannot be decoded
async fn read_dimensions(path: &Path) -> Option<Dimensions> {
    let path = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || image::image_dimensions(&path)).await;

    match result {
        Ok(Ok((width, height))) => Some(Dimensions::new(width, height)),
        Ok(Err(e)) => {
            debug!("Could not read image dimensions: {}", e);
            None
        }
        Err(e) => {
            warn!("Dimension reader task failed: {}", e);
            None
        }
    }
}
