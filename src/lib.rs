//! # DICOM WSI Streamer
//!
//! A uniform tile engine for DICOM whole slide images (WSI).
//!
//! Slides are read from local Part 10 files or from a DICOMweb archive and
//! exposed as a power-of-two tile pyramid with a fixed tile size, no matter
//! how the native pyramid was scanned.
//!
//! ## Features
//!
//! - **Uniform tiles**: Every tile at every zoom level has the same size
//! - **Native DICOM parsing**: Part 10 headers, encapsulated frames and sparse tiling
//! - **DICOMweb**: QIDO-RS search, WADO-RS metadata, frame retrieval and
//!   transfer syntax negotiation
//! - **Associated images**: Label and overview (macro) image access
//! - **HTTP server**: Axum routes for tiles and metadata
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`io`] - Range reads over local files
//! - [`dicom`] - Part 10 parser, transfer syntaxes and frame decoding
//! - [`web`] - DICOMweb client and transfer syntax negotiation
//! - [`slide`] - Native slide model, local and remote openers
//! - [`tile`] - Uniform grid, level selection, synthesis and encoding
//! - [`metadata`] - Flattened DICOM attributes
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use dicom_wsi_streamer::{DicomTileSource, OpenOptions, OutputOptions, SourceDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let descriptor = SourceDescriptor::from(PathBuf::from("/data/slide/level0.dcm"));
//!     let source = DicomTileSource::open(&descriptor, &OpenOptions::default()).await?;
//!
//!     let tile = source.get_tile(0, 0, 0, &OutputOptions::default()).await?;
//!     println!("{} bytes of {}", tile.data.len(), tile.mime_type);
//!
//!     source.close();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dicom;
pub mod error;
pub mod io;
pub mod metadata;
pub mod server;
pub mod slide;
pub mod tile;
pub mod web;

// Re-export commonly used types
pub use config::{Cli, Command, InfoConfig, ServeConfig, SourceArgs};
pub use dicom::{initialize_codecs, TransferSyntax};
pub use error::{DicomError, IoError, TileSourceError};
pub use io::{FileRangeReader, RangeReader};
pub use metadata::{flatten, merge_records};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use slide::{open_local, open_remote, DicomSlide, NativeSlide, SlideHandle};
pub use tile::{
    select_region, synthesize, DicomTileSource, EncodedTile, LevelTable, OpenOptions,
    OutputOptions, SourceDescriptor, SourceRegion, TieBreak, TileEncoding, TileMetadata,
    UniformGrid,
};
pub use web::{negotiate, DicomWebClient, DicomWebDescriptor, WebAuth};
