//! Static asset set served on GET

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::config::ServerConfig;

/// Directory-backed asset store with an index fallback for the root path
#[derive(Debug, Clone)]
pub struct StaticAssets {
    root: PathBuf,
    index_document: String,
    max_age: u32,
}

impl StaticAssets {
    pub fn new(root: PathBuf, index_document: impl Into<String>, max_age: u32) -> Self {
        Self {
            root,
            index_document: index_document.into(),
            max_age,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.static_dir.clone(),
            config.index_document.clone(),
            config.static_cache_max_age,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path to an asset key
    pub fn key_for_path(&self, path: &str) -> String {
        let key = path.strip_prefix('/').unwrap_or(path);
        if key.is_empty() || key == "/" {
            self.index_document.clone()
        } else {
            key.to_string()
        }
    }

    /// Read an asset; `Ok(None)` when it does not exist
    pub async fn get(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        let relative = Path::new(key);
        let escapes_root = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes_root {
            debug!("Rejected asset key outside the static root: {}", key);
            return Ok(None);
        }

        match tokio::fs::read(self.root.join(relative)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            // Directories read as "is a directory" on unix
            Err(e) if self.root.join(relative).is_dir() => {
                debug!("Asset key {} is a directory: {}", key, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Serve the asset for a request path
    pub async fn serve(&self, path: &str) -> Response {
        let key = self.key_for_path(path);

        match self.get(&key).await {
            Ok(Some(content)) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type_for(&key).to_string()),
                    (header::CACHE_CONTROL, format!("public, max-age={}", self.max_age)),
                ],
                content,
            )
                .into_response(),
            Ok(None) => not_found_response().into_response(),
            Err(e) => {
                warn!("Failed to read static asset {}: {}", key, e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    [(header::CONTENT_TYPE, "text/plain")],
                    "Internal Server Error",
                )
                    .into_response()
            }
        }
    }
}

/// Content type derived from the file extension
pub fn content_type_for(key: &str) -> &'static str {
    let extension = key.rsplit('.').next().unwrap_or_default().to_lowercase();

    match extension.as_str() {
        "html" => "text/html",
        "js" => "application/javascript",
        "css" => "text/css",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// 404 response for files
fn not_found_response() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain")],
        "Not Found",
    )
}
