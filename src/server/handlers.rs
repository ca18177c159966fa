//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /metadata` - Uniform pyramid geometry
//! - `GET /metadata/internal` - Flattened DICOM attributes
//! - `GET /tiles/{z}/{x}/{y}[.jpg|.png]` - Serve a tile
//! - `GET /associated` - List associated images
//! - `GET /associated/{name}[.jpg|.png]` - Serve an associated image

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::TileSourceError;
use crate::slide::NativeSlide;
use crate::tile::{
    is_valid_quality, DicomTileSource, EncodedTile, OutputOptions, TileEncoding, TileMetadata,
    DEFAULT_JPEG_QUALITY,
};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile source.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: NativeSlide> {
    /// The tile source serving every request
    pub source: Arc<DicomTileSource<S>>,

    /// Cache-Control max-age in seconds for image responses
    pub cache_max_age: u32,
}

impl<S: NativeSlide> AppState<S> {
    pub fn new(source: DicomTileSource<S>) -> Self {
        Self::with_cache_max_age(source, 3600)
    }

    pub fn with_cache_max_age(source: DicomTileSource<S>, cache_max_age: u32) -> Self {
        Self {
            source: Arc::new(source),
            cache_max_age,
        }
    }
}

impl<S: NativeSlide> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{z}/{x}/{filename}`
/// where filename is `{y}`, `{y}.jpg`, `{y}.jpeg` or `{y}.png`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Zoom level of the uniform pyramid (0 = coarsest)
    pub z: i64,

    /// Tile X coordinate
    pub x: i64,

    /// Tile Y coordinate with optional extension
    pub filename: String,
}

/// Split `"name.ext"` into the name and the encoding the extension implies.
fn split_extension(filename: &str) -> (&str, Option<TileEncoding>) {
    match filename.rsplit_once('.') {
        Some((stem, ext)) => match TileEncoding::from_name(ext) {
            Some(encoding) if encoding != TileEncoding::Raw => (stem, Some(encoding)),
            _ => (filename, None),
        },
        None => (filename, None),
    }
}

impl TilePathParams {
    /// The Y coordinate and the encoding implied by the extension.
    pub fn y(&self) -> Result<(i64, Option<TileEncoding>), std::num::ParseIntError> {
        let (stem, encoding) = split_extension(&self.filename);
        Ok((stem.parse()?, encoding))
    }
}

/// Query parameters for image requests.
#[derive(Debug, Default, Deserialize)]
pub struct ImageQueryParams {
    /// `jpeg`, `png` or `raw`; overrides the path extension
    #[serde(default)]
    pub encoding: Option<String>,

    /// JPEG quality (1-100, defaults to 95)
    #[serde(default)]
    pub quality: Option<u8>,
}

impl ImageQueryParams {
    /// Resolve output options, falling back to `implied` then JPEG.
    pub fn output_options(
        &self,
        implied: Option<TileEncoding>,
    ) -> Result<OutputOptions, HandlerError> {
        let encoding = match &self.encoding {
            Some(name) => TileEncoding::from_name(name).ok_or_else(|| {
                HandlerError::InvalidRequest(format!(
                    "Invalid encoding: {} (expected jpeg, png or raw)",
                    name
                ))
            })?,
            None => implied.unwrap_or_default(),
        };
        let quality = self.quality.unwrap_or(DEFAULT_JPEG_QUALITY);
        if !is_valid_quality(quality) {
            return Err(HandlerError::InvalidRequest(format!(
                "Invalid quality: {} (must be 1-100)",
                quality
            )));
        }
        Ok(OutputOptions { encoding, quality })
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "tile_out_of_range")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the associated images list endpoint.
#[derive(Debug, Serialize)]
pub struct AssociatedImagesResponse {
    pub images: Vec<String>,
}

// =============================================================================
// Error Mapping
// =============================================================================

fn error_parts(err: &TileSourceError) -> (StatusCode, &'static str) {
    match err {
        TileSourceError::OutOfRange { .. } => (StatusCode::BAD_REQUEST, "tile_out_of_range"),
        TileSourceError::UnknownAssociatedImage { .. } => (StatusCode::NOT_FOUND, "not_found"),
        TileSourceError::Open { .. } => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_slide"),
        TileSourceError::Negotiation { .. } => (StatusCode::BAD_GATEWAY, "negotiation_failed"),
        TileSourceError::Decode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "decode_error"),
        TileSourceError::Encode { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        TileSourceError::InternalInconsistency { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
        }
    }
}

fn error_response(status: StatusCode, error_type: &str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

/// Convert TileSourceError to HTTP response.
///
/// - 4xx errors are logged at WARN level (404 at DEBUG)
/// - 5xx errors are logged at ERROR level
impl IntoResponse for TileSourceError {
    fn into_response(self) -> Response {
        let (status, error_type) = error_parts(&self);
        error_response(status, error_type, self.to_string())
    }
}

/// Errors a handler can answer with.
#[derive(Debug)]
pub enum HandlerError {
    Source(TileSourceError),
    /// Malformed path or query parameter
    InvalidRequest(String),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Source(err) => err.into_response(),
            HandlerError::InvalidRequest(message) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request", message)
            }
        }
    }
}

impl From<TileSourceError> for HandlerError {
    fn from(err: TileSourceError) -> Self {
        HandlerError::Source(err)
    }
}

fn image_response(image: EncodedTile, cache_max_age: u32) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, image.mime_type.to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", cache_max_age),
            ),
        ],
        image.data,
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// `200 OK` with `{"status": "healthy", "version": "0.1.0"}`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /metadata`
pub async fn metadata_handler<S: NativeSlide>(
    State(state): State<AppState<S>>,
) -> Json<TileMetadata> {
    Json(state.source.get_metadata())
}

/// `GET /metadata/internal`
pub async fn internal_metadata_handler<S: NativeSlide>(
    State(state): State<AppState<S>>,
) -> Json<Value> {
    Json(state.source.get_internal_metadata())
}

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{z}/{x}/{y}.jpg`
///
/// # Query Parameters
///
/// - `encoding`: `jpeg`, `png` or `raw` (default: from the extension, else JPEG)
/// - `quality`: JPEG quality 1-100 (default: 95)
///
/// # Response
///
/// - `200 OK`: encoded tile with `Content-Type` and `Cache-Control`
/// - `400 Bad Request`: malformed parameters or tile outside the grid
/// - `500 Internal Server Error`: native read or encode failure
pub async fn tile_handler<S: NativeSlide>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<ImageQueryParams>,
) -> Result<Response, HandlerError> {
    let (y, implied) = params.y().map_err(|_| {
        HandlerError::InvalidRequest(format!("Invalid tile coordinate: {}", params.filename))
    })?;
    let options = query.output_options(implied)?;

    let tile = state
        .source
        .get_tile(params.x, y, params.z, &options)
        .await?;
    Ok(image_response(tile, state.cache_max_age))
}

/// `GET /associated`
pub async fn associated_list_handler<S: NativeSlide>(
    State(state): State<AppState<S>>,
) -> Json<AssociatedImagesResponse> {
    Json(AssociatedImagesResponse {
        images: state.source.get_associated_images_list(),
    })
}

/// `GET /associated/{name}`, e.g. `/associated/label.png`
pub async fn associated_image_handler<S: NativeSlide>(
    State(state): State<AppState<S>>,
    Path(filename): Path<String>,
    Query(query): Query<ImageQueryParams>,
) -> Result<Response, HandlerError> {
    let (name, implied) = split_extension(&filename);
    let options = query.output_options(implied)?;

    let image = state
        .source
        .get_associated_image_encoded(name, &options)
        .await?;
    Ok(image_response(image, state.cache_max_age))
}

// =============================================================================
// Tests
// =============================================================================
