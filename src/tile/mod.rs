//! Uniform tile layer.
//!
//! This module maps a client-facing power-of-two tile pyramid onto the
//! irregular native pyramid of a slide.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            DicomTileSource              │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ select_region│  │   TileEncoder   │  │
//! │  │ (level table,│  │ (JPEG/PNG/raw)  │  │
//! │  │  grid)       │  │                 │  │
//! │  └──────┬───────┘  └────────▲────────┘  │
//! │         ▼                   │           │
//! │  ┌─────────────────────────────────┐    │
//! │  │ synthesize (pad + resample)     │    │
//! │  └─────────────────────────────────┘    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             NativeSlide                 │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`UniformGrid`]: tile size, base size and zoom level count
//! - [`LevelTable`]: native levels with their pixel spacing
//! - [`select_region`]: pure mapping from a tile address to a native rectangle
//! - [`synthesize`]: native read fitted to exactly one output tile
//! - [`DicomTileSource`]: the tile source API over an opened slide

mod encoder;
mod grid;
mod region;
mod source;
mod synth;

pub use encoder::{
    clamp_quality, is_valid_quality, EncodedTile, OutputOptions, TileEncoder, TileEncoding,
    DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use grid::{LevelTable, PyramidLevel, TileRequest, UniformGrid, MAX_TILE_SIZE, MIN_TILE_SIZE};
pub use region::{select_level, select_region, select_region_with, SourceRegion, TieBreak};
pub use source::{
    DicomTileSource, OpenOptions, SourceDescriptor, TileMetadata, DEFAULT_OPEN_TIMEOUT,
};
pub use synth::{block_size, fit_block, synthesize, RESAMPLE_FILTER};
