//! Tile synthesis: read a native region and fit it to the output tile size.
//!
//! ```text
//! native block ──► pad right/bottom to (bw, bh) ──► resample to (tw, th)
//! bw = floor(tile_width * step / level_factor)
//! ```
//!
//! The output is always exactly one tile. Padding is zero-valued and only
//! covers pixels past the right or bottom edge of the slide.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::TileSourceError;
use crate::slide::NativeSlide;

use super::grid::UniformGrid;
use super::region::SourceRegion;

/// Resampling filter used when the native level does not match the step.
pub const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Expected block size in native-level pixels for a full tile.
pub fn block_size(region: &SourceRegion, grid: &UniformGrid) -> (u32, u32) {
    let bw = grid.tile_width as u64 * region.step / region.level_factor;
    let bh = grid.tile_height as u64 * region.step / region.level_factor;
    (bw as u32, bh as u32)
}

/// Pad and resample a native block into one output tile.
///
/// # Errors
/// Returns `Decode` if the block is smaller than the region it was read for;
/// short reads are never padded over.
pub fn fit_block(
    block: RgbImage,
    region: &SourceRegion,
    grid: &UniformGrid,
) -> Result<RgbImage, TileSourceError> {
    if block.width() < region.width || block.height() < region.height {
        return Err(TileSourceError::decode(format!(
            "native read returned {}x{} for a {}x{} region",
            block.width(),
            block.height(),
            region.width,
            region.height
        )));
    }

    let (bw, bh) = block_size(region, grid);
    let padded = if block.dimensions() == (bw, bh) {
        block
    } else {
        let mut canvas = RgbImage::new(bw, bh);
        imageops::replace(&mut canvas, &block, 0, 0);
        canvas
    };

    if (bw, bh) == (grid.tile_width, grid.tile_height) {
        Ok(padded)
    } else {
        Ok(imageops::resize(
            &padded,
            grid.tile_width,
            grid.tile_height,
            RESAMPLE_FILTER,
        ))
    }
}

/// Read `region` from the slide and produce one output tile.
///
/// Empty regions skip the native read and produce an all-zero tile.
pub async fn synthesize<S>(
    slide: &S,
    region: &SourceRegion,
    grid: &UniformGrid,
) -> Result<RgbImage, TileSourceError>
where
    S: NativeSlide + ?Sized,
{
    let block = if region.width == 0 || region.height == 0 {
        RgbImage::new(0, 0)
    } else {
        slide
            .read_region(
                region.level,
                (region.origin_x, region.origin_y),
                (region.width, region.height),
            )
            .await?
    };

    fit_block(block, region, grid)
}
