//! Persisted local key/value state

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ClientError;

/// Key under which the TinyPNG API key is stored
pub const API_KEY_STORAGE_KEY: &str = "tinypng-api-key";

/// Small JSON object on disk
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl LocalStorage {
    /// A missing file is an empty store
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ClientError::Storage(format!("{} is not valid JSON: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No local storage at {}, starting empty", path.display());
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub async fn set(&mut self, key: &str, value: &str) -> Result<(), ClientError> {
        self.entries
            .insert(key.to_string(), Value::String(value.to_string()));
        self.flush().await
    }

    pub async fn remove(&mut self, key: &str) -> Result<bool, ClientError> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.get(API_KEY_STORAGE_KEY).filter(|key| !key.is_empty())
    }

    pub async fn save_api_key(&mut self, api_key: &str) -> Result<(), ClientError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ClientError::InvalidApiKey);
        }

        self.set(API_KEY_STORAGE_KEY, api_key).await?;
        info!("🔑 API key saved successfully!");
        Ok(())
    }

    pub async fn clear_api_key(&mut self) -> Result<bool, ClientError> {
        self.remove(API_KEY_STORAGE_KEY).await
    }

    async fn flush(&self) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}
