//! Router configuration for the tile server.
//!
//! # Route Structure
//!
//! ```text
//! /health                        - Health check
//! /metadata                      - Uniform pyramid geometry
//! /metadata/internal             - Flattened DICOM attributes
//! /tiles/{z}/{x}/{y}.jpg         - Tile endpoint
//! /associated                    - Associated image names
//! /associated/{name}             - Associated image
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dicom_wsi_streamer::server::{create_router, RouterConfig};
//! use dicom_wsi_streamer::tile::{DicomTileSource, OpenOptions, SourceDescriptor};
//!
//! let descriptor = SourceDescriptor::from(PathBuf::from("/data/slide/level0.dcm"));
//! let source = DicomTileSource::open(&descriptor, &OpenOptions::default()).await?;
//!
//! let config = RouterConfig::new().with_cors_origins(vec!["https://example.com".to_string()]);
//! let router = create_router(source, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    associated_image_handler, associated_list_handler, health_handler, internal_metadata_handler,
    metadata_handler, tile_handler, AppState,
};
use crate::slide::NativeSlide;
use crate::tile::DicomTileSource;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router around one tile source.
pub fn create_router<S>(source: DicomTileSource<S>, config: RouterConfig) -> Router
where
    S: NativeSlide + 'static,
{
    let app_state = AppState::with_cache_max_age(source, config.cache_max_age);
    let cors = build_cors_layer(&config);

    // {filename} captures both "{y}" and "{y}.jpg"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/metadata", get(metadata_handler::<S>))
        .route("/metadata/internal", get(internal_metadata_handler::<S>))
        .route("/tiles/{z}/{x}/{filename}", get(tile_handler::<S>))
        .route("/associated", get(associated_list_handler::<S>))
        .route("/associated/{name}", get(associated_image_handler::<S>))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
