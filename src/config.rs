use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the Tiny Compressor relay and client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Provider relay settings
    pub relay: RelayConfig,

    /// Upload client settings
    pub client: ClientConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Directory holding the static asset set
    pub static_dir: PathBuf,

    /// Document served for the root path
    pub index_document: String,

    /// Cache-Control max-age for static assets (seconds)
    pub static_cache_max_age: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Provider shrink endpoint that receives the raw upload
    pub shrink_url: String,

    /// Largest accepted image in bytes
    pub max_upload_bytes: usize,

    /// Timeout for each provider call (seconds)
    pub provider_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay origin the client posts to
    pub relay_url: String,

    /// Upper bound for a single upload round trip (seconds)
    pub request_timeout_seconds: u64,

    /// Directory where processed images are written
    pub output_dir: PathBuf,

    /// Local key/value file holding the saved API key
    pub storage_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is not set
    pub level: String,
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        // Try to load from various locations
        let config_paths = [
            "tiny-compressor.toml",
            "config/tiny-compressor.toml",
            "/etc/tiny-compressor/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from an explicit file, then apply env overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Cannot read config file {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&config_str)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config.with_env_overrides())
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("TINY_COMPRESSOR_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("TINY_COMPRESSOR_PORT") {
            self.server.port = port.parse().unwrap_or(self.server.port);
        }

        if let Ok(dir) = std::env::var("TINY_COMPRESSOR_STATIC_DIR") {
            self.server.static_dir = PathBuf::from(dir);
        }

        if let Ok(url) = std::env::var("TINY_COMPRESSOR_SHRINK_URL") {
            self.relay.shrink_url = url;
        }

        if let Ok(limit) = std::env::var("TINY_COMPRESSOR_MAX_UPLOAD_BYTES") {
            self.relay.max_upload_bytes = limit.parse().unwrap_or(self.relay.max_upload_bytes);
        }

        if let Ok(url) = std::env::var("TINY_COMPRESSOR_RELAY_URL") {
            self.client.relay_url = url;
        }

        if let Ok(dir) = std::env::var("TINY_COMPRESSOR_OUTPUT_DIR") {
            self.client.output_dir = PathBuf::from(dir);
        }

        if let Ok(level) = std::env::var("TINY_COMPRESSOR_LOG_LEVEL") {
            self.logging.level = level;
        }

        self
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("server.port must be greater than 0"));
        }

        if self.server.index_document.is_empty() {
            return Err(anyhow!("server.index_document must not be empty"));
        }

        if self.relay.max_upload_bytes == 0 {
            return Err(anyhow!("relay.max_upload_bytes must be greater than 0"));
        }

        if self.relay.provider_timeout_seconds == 0 || self.client.request_timeout_seconds == 0 {
            return Err(anyhow!("timeouts must be greater than 0"));
        }

        url::Url::parse(&self.relay.shrink_url)
            .map_err(|e| anyhow!("relay.shrink_url is not a valid URL: {}", e))?;
        url::Url::parse(&self.client.relay_url)
            .map_err(|e| anyhow!("client.relay_url is not a valid URL: {}", e))?;

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }

    /// Address the relay binds to
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Tiny Compressor Configuration:\n\
            - Listen Address: {}\n\
            - Static Directory: {}\n\
            - Shrink Endpoint: {}\n\
            - Max Upload: {} MB\n\
            - Relay URL (client): {}\n\
            - Output Directory (client): {}",
            self.server_address(),
            self.server.static_dir.display(),
            self.relay.shrink_url,
            self.relay.max_upload_bytes / (1024 * 1024),
            self.client.relay_url,
            self.client.output_dir.display(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8787,
                static_dir: PathBuf::from("public"),
                index_document: "index.html".to_string(),
                static_cache_max_age: 3600, // 1 hour
            },
            relay: RelayConfig {
                shrink_url: "https://api.tinify.com/shrink".to_string(),
                max_upload_bytes: 100 * 1024 * 1024, // 100MB
                provider_timeout_seconds: 120,
            },
            client: ClientConfig {
                relay_url: "http://127.0.0.1:8787".to_string(),
                request_timeout_seconds: 300, // 5 minutes
                output_dir: PathBuf::from("./compressed"),
                storage_path: PathBuf::from(".tiny-compressor/storage.json"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_static_dir(mut self, dir: PathBuf) -> Self {
        self.config.server.static_dir = dir;
        self
    }

    pub fn with_shrink_url(mut self, url: impl Into<String>) -> Self {
        self.config.relay.shrink_url = url.into();
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.relay.max_upload_bytes = bytes;
        self
    }

    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.config.client.relay_url = url.into();
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.client.output_dir = dir;
        self
    }

    pub fn with_storage_path(mut self, path: PathBuf) -> Self {
        self.config.client.storage_path = path;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
