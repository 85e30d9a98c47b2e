//! API module for the TinyPNG relay
//!
//! Serves the static UI on GET and relays multipart image uploads to TinyPNG on POST.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;

pub mod handlers;
pub mod models;
pub mod server;

/// Relay server wrapping the HTTP router
#[derive(Debug)]
pub struct ApiServer {
    config: Arc<Config>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Start the API server in the background
    pub fn start_background(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.start().await })
    }

    /// Start the API server
    pub async fn start(self) -> Result<()> {
        info!("🚀 Starting relay on port {}", self.config.server.port);

        server::start_http_server(self.config).await
    }
}
