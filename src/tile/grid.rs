//! Native pyramid description and the uniform tile grid laid over it.
//!
//! A native pyramid is whatever the file holds: any number of levels, any
//! downsample factors, level 0 always the finest. The uniform grid is what
//! clients see: fixed-size tiles, and each zoom level exactly half the
//! resolution of the next.
//!
//! # Grid Geometry
//!
//! ```text
//! level_count = max(1, ceil(log2(max(size_x / tile_w, size_y / tile_h))) + 1)
//! step(z)     = 2^(level_count - 1 - z)        (base pixels per output pixel)
//! tiles_x(z)  = ceil(size_x / (tile_w * step(z)))
//! ```
//!
//! Zoom level 0 covers the whole slide in one tile; the last zoom level is
//! full resolution (`step = 1`).

use tracing::warn;

use crate::error::TileSourceError;

/// Smallest tile edge the grid will use
pub const MIN_TILE_SIZE: u32 = 64;

/// Largest tile edge the grid will use
pub const MAX_TILE_SIZE: u32 = 4096;

// =============================================================================
// Native Pyramid
// =============================================================================

/// One level of the native pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidLevel {
    /// Position in the native pyramid (0 = finest)
    pub index: usize,

    /// Width of this level in pixels
    pub pixel_width: u32,

    /// Height of this level in pixels
    pub pixel_height: u32,

    /// Physical width of one pixel in mm, if known
    pub pixel_spacing_x: Option<f64>,

    /// Physical height of one pixel in mm, if known
    pub pixel_spacing_y: Option<f64>,
}

/// Ordered native pyramid levels, finest first.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelTable {
    levels: Vec<PyramidLevel>,
}

impl LevelTable {
    /// Build a level table from levels ordered finest first.
    ///
    /// Indices are rewritten to match positions.
    ///
    /// # Errors
    /// Returns `Open` if there are no levels or level 0 has a zero dimension.
    pub fn new(mut levels: Vec<PyramidLevel>) -> Result<Self, TileSourceError> {
        let base = levels
            .first()
            .ok_or_else(|| TileSourceError::open("slide has no pyramid levels"))?;
        if base.pixel_width == 0 || base.pixel_height == 0 {
            return Err(TileSourceError::open(format!(
                "level 0 has zero size ({}x{})",
                base.pixel_width, base.pixel_height
            )));
        }

        if base.pixel_spacing_x.map_or(true, |s| !(s.is_finite() && s > 0.0)) {
            warn!("Level 0 has no usable pixel spacing; every tile will be read from level 0");
        }

        for (index, level) in levels.iter_mut().enumerate() {
            level.index = index;
        }

        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The finest level.
    pub fn base(&self) -> &PyramidLevel {
        // `new` rejects empty tables
        &self.levels[0]
    }

    pub fn get(&self, index: usize) -> Option<&PyramidLevel> {
        self.levels.get(index)
    }
}

// =============================================================================
// Uniform Grid
// =============================================================================

/// The client-facing power-of-two tile pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformGrid {
    /// Output tile width in pixels
    pub tile_width: u32,

    /// Output tile height in pixels
    pub tile_height: u32,

    /// Width of the full-resolution slide
    pub size_x: u32,

    /// Height of the full-resolution slide
    pub size_y: u32,

    /// Number of zoom levels
    pub level_count: u32,
}

impl UniformGrid {
    /// Lay a grid over a slide of `size_x` by `size_y` pixels, using the
    /// native tile size clamped to `[MIN_TILE_SIZE, MAX_TILE_SIZE]`.
    pub fn new(size_x: u32, size_y: u32, native_tile: (u32, u32)) -> Self {
        let tile_width = native_tile.0.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);
        let tile_height = native_tile.1.clamp(MIN_TILE_SIZE, MAX_TILE_SIZE);

        let ratio = (size_x as f64 / tile_width as f64).max(size_y as f64 / tile_height as f64);
        let level_count = if ratio <= 1.0 {
            1
        } else {
            ratio.log2().ceil() as u32 + 1
        };

        Self {
            tile_width,
            tile_height,
            size_x,
            size_y,
            level_count,
        }
    }

    /// Grid over the base level of a level table.
    pub fn from_table(table: &LevelTable, native_tile: (u32, u32)) -> Self {
        let base = table.base();
        Self::new(base.pixel_width, base.pixel_height, native_tile)
    }

    /// Whether `z` is a zoom level of this grid.
    pub fn contains_level(&self, z: i64) -> bool {
        z >= 0 && z < self.level_count as i64
    }

    /// Base pixels per output pixel at zoom level `z` (must be in range).
    pub fn step(&self, z: u32) -> u64 {
        1u64 << (self.level_count - 1 - z)
    }

    /// Number of tiles `(x, y)` at zoom level `z` (must be in range).
    pub fn tiles_at(&self, z: u32) -> (u64, u64) {
        let step = self.step(z);
        let span_x = self.tile_width as u64 * step;
        let span_y = self.tile_height as u64 * step;
        (
            (self.size_x as u64).div_ceil(span_x),
            (self.size_y as u64).div_ceil(span_y),
        )
    }
}

// =============================================================================
// Tile Request
// =============================================================================

/// Address of one output tile.
///
/// Coordinates are signed so that out-of-range requests (negative or too
/// large) can be represented and rejected rather than wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRequest {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl TileRequest {
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }
}

// =============================================================================
// Tests
// =============================================================================
