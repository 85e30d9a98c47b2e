use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tiny_compressor::{ApiServer, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Tiny Compressor Relay")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Relays image uploads to TinyPNG and serves the upload page")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)")
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Interface to bind")
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to listen on")
                .value_parser(clap::value_parser!(u16))
        )
        .arg(
            Arg::new("static-dir")
                .short('s')
                .long("static-dir")
                .value_name("DIR")
                .help("Directory holding the static upload page")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");

    // Load configuration
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(&PathBuf::from(path))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    init_tracing(&config, verbose);

    if let Some(host) = matches.get_one::<String>("host") {
        config.server.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }
    if let Some(dir) = matches.get_one::<String>("static-dir") {
        config.server.static_dir = PathBuf::from(dir);
    }

    config.validate()?;

    if !config.server.static_dir.exists() {
        warn!(
            "Static directory does not exist: {} (GET requests will return 404)",
            config.server.static_dir.display()
        );
    }

    info!("🚀 Tiny Compressor relay starting...");
    info!("{}", config.summary());

    ApiServer::new(Arc::new(config)).start().await
}

/// RUST_LOG wins; otherwise the configured level, raised to debug by --verbose
fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tiny_compressor={},warn", level)));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    if verbose {
        info!("Verbose logging enabled");
    }
}
