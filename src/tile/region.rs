//! Level selection and region mapping.
//!
//! Given a uniform-grid tile address, pick the native level to read from and
//! compute the rectangle to read there. Everything in this module is pure:
//! the same inputs always produce the same [`SourceRegion`].

use crate::error::TileSourceError;

use super::grid::{PyramidLevel, TileRequest, UniformGrid};

/// Which level wins when several native levels share the same factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// Prefer the last (coarsest) level seen; reads the fewest native pixels
    #[default]
    Coarsest,
    /// Prefer the first (finest) level seen
    Finest,
}

/// A rectangle of one native level, plus the factors that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRegion {
    /// Native level index
    pub level: usize,

    /// Left edge in native-level pixels
    pub origin_x: u32,

    /// Top edge in native-level pixels
    pub origin_y: u32,

    /// Width in native-level pixels (may be zero)
    pub width: u32,

    /// Height in native-level pixels (may be zero)
    pub height: u32,

    /// Downsample of the native level relative to level 0
    pub level_factor: u64,

    /// Downsample of the requested zoom level relative to level 0
    pub step: u64,
}

/// Pick the coarsest native level whose downsample does not exceed `step`.
///
/// Walks levels from 1 upward computing `round(spacing_i / spacing_0)` and
/// stops at the first level above `step`. Returns `(level, factor)`; falls
/// back to `(0, 1)` when level 0 has no usable spacing.
pub fn select_level(levels: &[PyramidLevel], step: u64, tie_break: TieBreak) -> (usize, u64) {
    let base = match levels.first().and_then(|l| l.pixel_spacing_x) {
        Some(s) if s.is_finite() && s > 0.0 => s,
        _ => return (0, 1),
    };

    let mut selected = (0, 1);
    for (index, level) in levels.iter().enumerate().skip(1) {
        let Some(spacing) = level.pixel_spacing_x.filter(|s| s.is_finite()) else {
            break;
        };
        let factor = (spacing / base).round();
        if factor < 1.0 || factor > step as f64 {
            break;
        }
        let factor = factor as u64;
        let accept = match tie_break {
            TieBreak::Coarsest => true,
            TieBreak::Finest => factor > selected.1,
        };
        if accept {
            selected = (index, factor);
        }
    }
    selected
}

/// Map a tile request onto a native region, preferring the coarsest level on
/// ties.
///
/// # Errors
/// Returns `OutOfRange` if `z` is not a grid level or `(x, y)` lies outside
/// the tile grid at `z`.
pub fn select_region(
    request: &TileRequest,
    grid: &UniformGrid,
    levels: &[PyramidLevel],
) -> Result<SourceRegion, TileSourceError> {
    select_region_with(request, grid, levels, TieBreak::default())
}

/// Map a tile request onto a native region with an explicit tie-break.
pub fn select_region_with(
    request: &TileRequest,
    grid: &UniformGrid,
    levels: &[PyramidLevel],
    tie_break: TieBreak,
) -> Result<SourceRegion, TileSourceError> {
    let &TileRequest { x, y, z } = request;
    let out_of_range = |message: String| TileSourceError::OutOfRange { x, y, z, message };

    if !grid.contains_level(z) {
        return Err(out_of_range(format!(
            "level must be in [0, {})",
            grid.level_count
        )));
    }
    let z = z as u32;
    let (tiles_x, tiles_y) = grid.tiles_at(z);
    if x < 0 || x as u64 >= tiles_x || y < 0 || y as u64 >= tiles_y {
        return Err(out_of_range(format!(
            "level {} has {}x{} tiles",
            z, tiles_x, tiles_y
        )));
    }

    let step = grid.step(z);
    let span_x = grid.tile_width as u64 * step;
    let span_y = grid.tile_height as u64 * step;
    let x0 = x as u64 * span_x;
    let y0 = y as u64 * span_y;
    let x1 = (x0 + span_x).min(grid.size_x as u64);
    let y1 = (y0 + span_y).min(grid.size_y as u64);

    let (level, level_factor) = select_level(levels, step, tie_break);
    let native = levels.get(level).ok_or_else(|| TileSourceError::InternalInconsistency {
        message: "no native levels to read from".to_string(),
    })?;

    let origin_x = x0 / level_factor;
    let origin_y = y0 / level_factor;
    let end_x = x1.div_ceil(level_factor).min(native.pixel_width as u64);
    let end_y = y1.div_ceil(level_factor).min(native.pixel_height as u64);

    Ok(SourceRegion {
        level,
        origin_x: origin_x.min(native.pixel_width as u64) as u32,
        origin_y: origin_y.min(native.pixel_height as u64) as u32,
        width: end_x.saturating_sub(origin_x) as u32,
        height: end_y.saturating_sub(origin_y) as u32,
        level_factor,
        step,
    })
}

// =============================================================================
// Tests
// =============================================================================
