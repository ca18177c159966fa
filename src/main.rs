//! DICOM WSI Streamer - A uniform tile server for DICOM whole slide images.
//!
//! This binary opens one slide and either serves it over HTTP or prints its metadata.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dicom_wsi_streamer::{
    config::{Cli, Command, InfoConfig, ServeConfig, SourceArgs},
    server::{create_router, RouterConfig},
    tile::{DicomTileSource, SourceDescriptor},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Info(config) => run_info(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.log_filter());

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match open_source(&config.source).await {
        Some(source) => source,
        None => return ExitCode::FAILURE,
    };

    let metadata = source.get_metadata();
    info!("Slide:");
    info!("  Size: {} x {} px", metadata.size_x, metadata.size_y);
    info!(
        "  Tiles: {} x {} px, {} level(s)",
        metadata.tile_width, metadata.tile_height, metadata.levels
    );
    match metadata.magnification {
        Some(magnification) => info!("  Magnification: {:.1}x", magnification),
        None => warn!("  Magnification: unknown (no pixel spacing)"),
    }

    let router = create_router(source, build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/metadata", addr);
    info!("    curl http://{}/tiles/0/0/0.jpg", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.log_filter());

    if let Err(e) = config.source.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match open_source(&config.source).await {
        Some(source) => source,
        None => return ExitCode::FAILURE,
    };

    let mut report = serde_json::json!({
        "metadata": source.get_metadata(),
        "associated": source.get_associated_images_list(),
    });
    if config.internal {
        report["internal"] = source.get_internal_metadata();
    }
    source.close();

    match serde_json::to_string_pretty(&report) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Shared
// =============================================================================

async fn open_source(args: &SourceArgs) -> Option<DicomTileSource> {
    let descriptor = match args.descriptor() {
        Ok(descriptor) => descriptor,
        Err(e) => {
            error!("Configuration error: {}", e);
            return None;
        }
    };

    match &descriptor {
        SourceDescriptor::Local { path } => info!("Opening slide {}", path.display()),
        SourceDescriptor::DicomWeb(web) => info!(
            "Opening series {} of study {} at {}",
            web.series_uid, web.study_uid, web.url
        ),
    }

    match DicomTileSource::open(&descriptor, &args.open_options()).await {
        Ok(source) => Some(source),
        Err(e) => {
            error!("Failed to open slide: {}", e);
            eprintln!("Error: {}", e);
            None
        }
    }
}

/// Initialize the tracing/logging subsystem.
///
/// `default_filter` applies when `RUST_LOG` is unset.
fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
