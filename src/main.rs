//! Quarry: a self-hosted web workbench server.
//!
//! This is the application entry point. It loads and validates configuration,
//! initializes tracing, installs the shutdown coordinator, waits for the
//! datastore to become ready, and then binds the server. Every fatal startup
//! error ends the process with a non-zero status; a clean shutdown exits 0.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quarry::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use quarry::db;
use quarry::http::{self, ServerHandle};
use quarry::routes::create_router;
use quarry::state::AppState;

/// Quarry: a self-hosted web workbench server
#[derive(Parser, Debug)]
#[command(name = "quarry", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "quarry=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Load configuration before tracing is up; a broken config file can only
    // be reported on stderr.
    let config = match AppConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    init_tracing(&log_filter, &config.logging.format);

    let validations = config.validations();
    for warning in &validations.warnings {
        tracing::warn!("{}", warning);
    }
    if !validations.errors.is_empty() {
        for error in &validations.errors {
            tracing::error!("{}", error);
        }
        std::process::exit(1);
    }
    tracing::info!("Loaded configuration");

    // The coordinator must be watching before anything slow happens, so a
    // signal during startup still exits cleanly.
    let handle = ServerHandle::new();
    http::shutdown::install(handle.clone());

    // Storage readiness gates the whole startup sequence; nothing binds
    // until the datastore is usable.
    let meta = match db::ready(&config.db).await {
        Ok(meta) => meta,
        Err(e) => {
            tracing::error!(error = %e, "Error starting Quarry");
            std::process::exit(1);
        }
    };
    tracing::info!(schema_version = meta.schema_version, "Datastore ready");

    let state = AppState::new(config.clone());
    let app = create_router(state);

    if let Err(e) = http::start_server(app, &config, handle).await {
        tracing::error!(error = %e, "Error starting Quarry");
        std::process::exit(1);
    }
}

fn init_tracing(log_filter: &str, format: &str) {
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(log_filter));
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
