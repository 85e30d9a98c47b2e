/// Tiny Compressor - Rust Implementation
///
/// HTTP relay in front of the TinyPNG API (compress, convert, resize) plus a
/// batch upload client that drives it.

pub mod api;
pub mod assets;
pub mod client;
pub mod config;
pub mod error;
pub mod processing;
pub mod provider;
pub mod utils;

// Re-export main types for easy access
pub use crate::api::models::{ApiResponse, ProcessedImage};
pub use crate::api::ApiServer;
pub use crate::client::{BatchReport, ClientSession, LocalStorage, Orchestrator};
pub use crate::config::Config;
pub use crate::error::{ClientError, QueueError, RelayError};
pub use crate::processing::{ImageProcessor, Mode};
pub use crate::provider::{CompressionProvider, Dimensions};
