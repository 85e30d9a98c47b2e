//! Per-item upload state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::QueueError;
use crate::provider::Dimensions;

/// Time-ordered random identifier for one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Successful relay result as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedItem {
    pub filename: String,
    pub size: u64,
    pub saved_to: PathBuf,
    pub original_resolution: Option<String>,
    pub new_resolution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ItemStatus {
    Processing,
    Completed(CompletedItem),
    Failed { error: String },
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemStatus::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    pub id: ItemId,
    pub file_name: String,
    pub path: PathBuf,
    /// Original size in bytes
    pub size: u64,
    /// Local dimensions, read in resizer mode only
    pub dimensions: Option<Dimensions>,
    pub status: ItemStatus,
}

impl UploadItem {
    pub fn new(path: PathBuf, size: u64, dimensions: Option<Dimensions>) -> Self {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            id: ItemId::new(),
            file_name,
            path,
            size,
            dimensions,
            status: ItemStatus::Processing,
        }
    }
}

/// Tally of item states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Items keyed by id; a status only ever leaves `Processing` once
#[derive(Debug, Default)]
pub struct UploadQueue {
    items: BTreeMap<ItemId, UploadItem>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: UploadItem) -> ItemId {
        let id = item.id;
        self.items.insert(id, item);
        id
    }

    pub fn complete(&mut self, id: ItemId, result: CompletedItem) -> Result<(), QueueError> {
        self.transition(id, ItemStatus::Completed(result))
    }

    pub fn fail(&mut self, id: ItemId, error: impl Into<String>) -> Result<(), QueueError> {
        self.transition(id, ItemStatus::Failed { error: error.into() })
    }

    fn transition(&mut self, id: ItemId, status: ItemStatus) -> Result<(), QueueError> {
        let item = self.items.get_mut(&id).ok_or(QueueError::UnknownItem(id))?;
        if item.status.is_terminal() {
            return Err(QueueError::InvalidTransition(id));
        }
        item.status = status;
        Ok(())
    }

    pub fn get(&self, id: ItemId) -> Option<&UploadItem> {
        self.items.get(&id)
    }

    /// Items in creation order
    pub fn iter(&self) -> impl Iterator<Item = &UploadItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn counts(&self) -> QueueCounts {
        self.items
            .values()
            .fold(QueueCounts::default(), |mut counts, item| {
                match item.status {
                    ItemStatus::Processing => counts.processing += 1,
                    ItemStatus::Completed(_) => counts.completed += 1,
                    ItemStatus::Failed { .. } => counts.failed += 1,
                }
                counts
            })
    }
}
