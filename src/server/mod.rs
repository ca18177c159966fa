//! HTTP server layer.
//!
//! This module exposes one [`DicomTileSource`](crate::tile::DicomTileSource)
//! over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │                 GET /tiles/{z}/{x}/{y}.jpg                      │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (requests, error bodies) │  │ (router config, CORS, trace)│  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    associated_image_handler, associated_list_handler, health_handler, internal_metadata_handler,
    metadata_handler, tile_handler, AppState, AssociatedImagesResponse, ErrorResponse,
    HandlerError, HealthResponse, ImageQueryParams, TilePathParams,
};
pub use routes::{create_router, RouterConfig};
