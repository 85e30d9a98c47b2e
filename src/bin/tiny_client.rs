use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use tiny_compressor::client::{ItemStatus, Percentage};
use tiny_compressor::utils::{estimate_processing_time, format_file_size, savings_percent};
use tiny_compressor::{BatchReport, ClientSession, Config, LocalStorage, Mode, Orchestrator};

#[derive(Parser)]
#[command(name = "tiny-client")]
#[command(about = "Upload images to a Tiny Compressor relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Relay URL, overrides the configured one
    #[arg(long)]
    relay_url: Option<String>,

    /// Where processed images are written
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Use this API key instead of the saved one
    #[arg(long, env = "TINYPNG_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the saved TinyPNG API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Compress images
    Compress {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Convert images to another format
    Convert {
        /// Target MIME type (e.g. image/webp, image/png, image/jpeg, image/avif)
        #[arg(long, default_value = "image/webp")]
        to: String,
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Resize images by preset percentage or custom dimensions
    Resize {
        /// Target width in pixels
        #[arg(long)]
        width: Option<u32>,
        /// Target height in pixels
        #[arg(long)]
        height: Option<u32>,
        /// Send a single dimension as is instead of completing it from the first image's aspect ratio
        #[arg(long)]
        unlocked: bool,
        /// Preset percentage (50 or 75), used when no dimension is given
        #[arg(long, default_value_t = 50)]
        percent: u32,
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Save an API key
    Set { api_key: String },
    /// Show whether a key is saved
    Show,
    /// Remove the saved key
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiny_compressor=info,tiny_client=info,warn".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(relay_url) = cli.relay_url {
        config.client.relay_url = relay_url;
    }
    if let Some(output_dir) = cli.output_dir {
        config.client.output_dir = output_dir;
    }
    config.validate()?;

    let mut storage = LocalStorage::load(&config.client.storage_path).await?;

    let api_key = cli
        .api_key
        .or_else(|| storage.api_key().map(str::to_string));
    let mut session = ClientSession::new(api_key);

    let paths = match cli.command {
        Commands::Key { action } => return run_key_command(&mut storage, action).await,
        Commands::Compress { paths } => {
            session.set_mode(Mode::Compressor);
            paths
        }
        Commands::Convert { to, paths } => {
            session.set_mode(Mode::Converter);
            session.set_target_format(to);
            paths
        }
        Commands::Resize {
            width,
            height,
            unlocked,
            percent,
            paths,
        } => {
            let preset = Percentage::from_value(percent)
                .ok_or_else(|| anyhow!("--percent must be 50 or 75"))?;
            session.set_mode(Mode::Resizer);

            let controls = session.resize_mut();
            controls.set_preset(preset);
            controls.set_locked(!unlocked);
            if width.is_some() {
                controls.set_custom_width(width);
            }
            if height.is_some() {
                controls.set_custom_height(height);
            }
            paths
        }
    };

    let orchestrator = Orchestrator::new(&config.client)?;
    info!("🌐 Relay: {}", config.client.relay_url);
    info!("📂 Output directory: {}", orchestrator.output_dir().display());

    let report = orchestrator.process_files(&mut session, &paths).await?;
    print_report(&report, session.mode());

    if report.failed > 0 {
        return Err(anyhow!("{} of {} images failed", report.failed, report.total));
    }

    Ok(())
}

async fn run_key_command(storage: &mut LocalStorage, action: KeyAction) -> Result<()> {
    match action {
        KeyAction::Set { api_key } => {
            storage.save_api_key(&api_key).await?;
            info!("💾 Saved to {}", storage.path().display());
        }
        KeyAction::Show => match storage.api_key() {
            Some(key) => info!("🔑 API key saved ({})", mask(key)),
            None => warn!("⚠️ No API key saved"),
        },
        KeyAction::Clear => {
            if storage.clear_api_key().await? {
                info!("🗑️ API key removed");
            } else {
                warn!("⚠️ No API key saved");
            }
        }
    }
    Ok(())
}

fn print_report(report: &BatchReport, mode: Mode) {
    for item in &report.items {
        match &item.status {
            ItemStatus::Completed(result) => {
                let detail = match mode {
                    Mode::Compressor => format!(
                        "{} -> {} ({}% smaller)",
                        format_file_size(item.size),
                        format_file_size(result.size),
                        savings_percent(item.size, result.size)
                    ),
                    Mode::Converter => format_file_size(result.size),
                    Mode::Resizer => format!(
                        "{} -> {} • {}",
                        result.original_resolution.as_deref().unwrap_or("unknown"),
                        result.new_resolution.as_deref().unwrap_or("unknown"),
                        format_file_size(result.size)
                    ),
                };
                info!("✅ {} → {} ({})", item.file_name, result.saved_to.display(), detail);
            }
            ItemStatus::Failed { error } => {
                warn!("❌ {} failed: {}", item.file_name, error);
            }
            ItemStatus::Processing => {
                info!(
                    "⏳ {} still processing (expected {})",
                    item.file_name,
                    estimate_processing_time(item.size)
                );
            }
        }
    }

    info!("🎉 Batch completed in {:.2}s", report.total_time.as_secs_f64());
    info!("✅ Successful: {}", report.successful);
    info!("❌ Failed: {}", report.failed);
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("…{}", visible)
}
