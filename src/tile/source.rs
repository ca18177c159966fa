//! Tile source: the uniform tile pyramid over one opened DICOM slide.
//!
//! # Request Flow
//!
//! ```text
//! get_tile(x, y, z)
//!   │
//!   ├─► select_region   (pure: level choice + native rectangle)
//!   ├─► synthesize      (native read, zero padding, resample)
//!   └─► TileEncoder     (JPEG / PNG / raw)
//! ```
//!
//! The level table and grid are fixed at open time; every request is
//! independent, so several tiles may be produced concurrently from the same
//! source or from views made with [`DicomTileSource::derive`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::dicom::initialize_codecs;
use crate::error::TileSourceError;
use crate::metadata::merge_records;
use crate::slide::{
    open_local, open_remote, AssociatedKind, DicomSlide, NativeSlide, ReadConcurrency,
    SlideHandle,
};
use crate::web::DicomWebDescriptor;

use super::encoder::{EncodedTile, OutputOptions, TileEncoder};
use super::grid::{LevelTable, TileRequest, UniformGrid};
use super::region::{select_region_with, SourceRegion, TieBreak};
use super::synth::synthesize;

/// Default bound on each network round trip while opening and reading.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Open Options
// =============================================================================

/// Where to open a slide from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceDescriptor {
    /// Any instance file of the series; siblings are discovered
    Local { path: PathBuf },
    DicomWeb(DicomWebDescriptor),
}

impl From<PathBuf> for SourceDescriptor {
    fn from(path: PathBuf) -> Self {
        SourceDescriptor::Local { path }
    }
}

impl From<DicomWebDescriptor> for SourceDescriptor {
    fn from(descriptor: DicomWebDescriptor) -> Self {
        SourceDescriptor::DicomWeb(descriptor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Per-request timeout for DICOMweb round trips
    pub timeout: Duration,
    pub tie_break: TieBreak,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_OPEN_TIMEOUT,
            tie_break: TieBreak::default(),
        }
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Geometry of the uniform pyramid, as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileMetadata {
    pub tile_width: u32,
    pub tile_height: u32,
    pub size_x: u32,
    pub size_y: u32,
    /// Number of zoom levels
    pub levels: u32,
    /// Objective magnification estimated from the base pixel spacing
    pub magnification: Option<f64>,
    /// Base pixel width in mm
    #[serde(rename = "mm_x")]
    pub mm_x: Option<f64>,
    /// Base pixel height in mm
    #[serde(rename = "mm_y")]
    pub mm_y: Option<f64>,
}

// =============================================================================
// DicomTileSource
// =============================================================================

/// A uniform tile pyramid over a native DICOM slide.
pub struct DicomTileSource<S: NativeSlide = DicomSlide> {
    handle: SlideHandle<S>,
    table: LevelTable,
    grid: UniformGrid,
    tie_break: TieBreak,
    encoder: TileEncoder,
    /// Present when the slide requires serialized reads; shared by views
    read_lock: Option<Arc<Mutex<()>>>,
}

impl DicomTileSource<DicomSlide> {
    /// Open a slide from a filesystem path or a DICOMweb series.
    ///
    /// # Errors
    /// - `Open` if the codecs are unavailable or the slide cannot be read
    /// - `Negotiation` if a DICOMweb server offers no usable transfer syntax
    pub async fn open(
        descriptor: &SourceDescriptor,
        options: &OpenOptions,
    ) -> Result<Self, TileSourceError> {
        initialize_codecs()?;

        let slide = match descriptor {
            SourceDescriptor::Local { path } => open_local(path).await?,
            SourceDescriptor::DicomWeb(web) => open_remote(web, options.timeout).await?,
        };

        let source = Self::from_slide(slide)?.with_tie_break(options.tie_break);
        info!(
            slide = %source.handle.slide().identifier(),
            levels = source.grid.level_count,
            tile_width = source.grid.tile_width,
            tile_height = source.grid.tile_height,
            "Opened tile source"
        );
        Ok(source)
    }
}

impl<S: NativeSlide> DicomTileSource<S> {
    /// Build a tile source that owns an already opened slide.
    ///
    /// # Errors
    /// Returns `Open` if the slide reports no usable levels.
    pub fn from_slide(slide: S) -> Result<Self, TileSourceError> {
        let handle = SlideHandle::new(slide);
        let table = LevelTable::new(handle.slide().levels())?;
        let grid = UniformGrid::from_table(&table, handle.slide().tile_size());
        let read_lock = match handle.slide().read_concurrency() {
            ReadConcurrency::Serialized => Some(Arc::new(Mutex::new(()))),
            ReadConcurrency::Parallel => None,
        };

        debug!(
            native_levels = table.len(),
            size_x = grid.size_x,
            size_y = grid.size_y,
            level_count = grid.level_count,
            "Built uniform grid"
        );

        Ok(Self {
            handle,
            table,
            grid,
            tie_break: TieBreak::default(),
            encoder: TileEncoder::new(),
            read_lock,
        })
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// A view sharing this source's slide. The view never closes the slide.
    pub fn derive(&self) -> Self {
        Self {
            handle: self.handle.derive(),
            table: self.table.clone(),
            grid: self.grid,
            tie_break: self.tie_break,
            encoder: self.encoder.clone(),
            read_lock: self.read_lock.clone(),
        }
    }

    pub fn is_owner(&self) -> bool {
        self.handle.is_owner()
    }

    pub fn grid(&self) -> &UniformGrid {
        &self.grid
    }

    pub fn level_table(&self) -> &LevelTable {
        &self.table
    }

    pub fn slide(&self) -> &S {
        self.handle.slide()
    }

    /// Native region that tile `(x, y, z)` is drawn from.
    pub fn select_region(&self, x: i64, y: i64, z: i64) -> Result<SourceRegion, TileSourceError> {
        select_region_with(
            &TileRequest::new(x, y, z),
            &self.grid,
            self.table.levels(),
            self.tie_break,
        )
    }

    /// Tile `(x, y, z)` as an RGB buffer of exactly one tile.
    pub async fn get_tile_image(&self, x: i64, y: i64, z: i64) -> Result<RgbImage, TileSourceError> {
        let region = self.select_region(x, y, z)?;
        let _guard = match &self.read_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        synthesize(self.handle.slide(), &region, &self.grid).await
    }

    /// Tile `(x, y, z)` encoded as requested.
    ///
    /// # Errors
    /// - `OutOfRange` for addresses outside the grid
    /// - `Decode` if the native read fails
    /// - `Encode` if the output encoder fails
    pub async fn get_tile(
        &self,
        x: i64,
        y: i64,
        z: i64,
        options: &OutputOptions,
    ) -> Result<EncodedTile, TileSourceError> {
        let image = self.get_tile_image(x, y, z).await?;
        self.encoder.encode(&image, options)
    }

    pub fn get_metadata(&self) -> TileMetadata {
        let base = self.table.base();
        let mm_x = base.pixel_spacing_x.filter(|s| s.is_finite() && *s > 0.0);
        let mm_y = base.pixel_spacing_y.filter(|s| s.is_finite() && *s > 0.0);
        TileMetadata {
            tile_width: self.grid.tile_width,
            tile_height: self.grid.tile_height,
            size_x: self.grid.size_x,
            size_y: self.grid.size_y,
            levels: self.grid.level_count,
            magnification: mm_x.map(|mm| 0.01 / mm),
            mm_x,
            mm_y,
        }
    }

    /// Attributes of every native instance, flattened and merged under
    /// `"dicom"`.
    pub fn get_internal_metadata(&self) -> Value {
        let records = self.handle.slide().records();
        let merged = merge_records(records.iter().flatten());
        json!({ "dicom": merged })
    }

    /// Names of the associated images present, from `["label", "macro"]`.
    pub fn get_associated_images_list(&self) -> Vec<String> {
        AssociatedKind::ALL
            .into_iter()
            .filter(|kind| self.handle.slide().has_associated(*kind))
            .map(|kind| kind.name().to_string())
            .collect()
    }

    /// Read an associated image by name.
    ///
    /// # Errors
    /// Returns `UnknownAssociatedImage` for unknown names and for images this
    /// slide does not have.
    pub async fn get_associated_image(&self, name: &str) -> Result<RgbImage, TileSourceError> {
        let unknown = || TileSourceError::UnknownAssociatedImage {
            name: name.to_string(),
        };
        let kind = AssociatedKind::from_name(name).ok_or_else(unknown)?;
        let _guard = match &self.read_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        self.handle
            .slide()
            .read_associated(kind)
            .await?
            .ok_or_else(unknown)
    }

    pub async fn get_associated_image_encoded(
        &self,
        name: &str,
        options: &OutputOptions,
    ) -> Result<EncodedTile, TileSourceError> {
        let image = self.get_associated_image(name).await?;
        self.encoder.encode(&image, options)
    }

    /// Release the slide if this source owns it.
    pub fn close(self) {
        self.handle.close();
    }
}

// =============================================================================
// Tests
// =============================================================================
