//! DICOM WSI series as a native slide.
//!
//! A series holds one instance per pyramid level, plus optional label and
//! overview instances. [`DicomSlide`] orders the volume instances into a
//! pyramid and stitches regions out of their frames. Where the frames come
//! from (a local file, a DICOMweb archive) is behind [`FrameSource`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::imageops;
use image::RgbImage;
use serde_json::Value;
use tracing::{debug, info};

use super::handle::{AssociatedKind, NativeSlide, ReadConcurrency};
use super::instance::{ImageFlavor, WsiInstance};
use crate::dicom::{decode_frame, TransferSyntax};
use crate::error::TileSourceError;
use crate::tile::PyramidLevel;

// =============================================================================
// FrameSource
// =============================================================================

/// Supplier of encoded frames for one instance.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Encoded frames for the given 0-based indices, in request order.
    async fn read_frames(&self, indices: &[usize]) -> Result<Vec<Bytes>, TileSourceError>;

    /// Transfer syntax the frames are encoded in.
    fn transfer_syntax(&self) -> TransferSyntax;
}

/// An instance together with the source of its frames.
pub struct SourcedInstance {
    pub instance: WsiInstance,
    pub frames: Arc<dyn FrameSource>,
}

struct SlideLevel {
    instance: WsiInstance,
    frames: Arc<dyn FrameSource>,
    /// Records of every instance folded into this level, primary first
    records: Vec<Value>,
}

impl SlideLevel {
    fn new(source: SourcedInstance) -> Self {
        let records = vec![source.instance.record.clone()];
        Self {
            instance: source.instance,
            frames: source.frames,
            records,
        }
    }
}

// =============================================================================
// DicomSlide
// =============================================================================

/// A DICOM WSI series opened for region reads.
///
/// Reads are [`ReadConcurrency::Parallel`]: frame sources are shareable and
/// decoding runs on the blocking thread pool.
pub struct DicomSlide {
    identifier: String,
    levels: Vec<SlideLevel>,
    label: Option<SlideLevel>,
    overview: Option<SlideLevel>,
    closed: AtomicBool,
}

impl DicomSlide {
    /// Arrange instances of one series into a slide.
    ///
    /// Volume instances are ordered by decreasing width; instances with the
    /// same total size as an earlier one (extra focal planes or optical
    /// paths) are folded into that level. The first label and overview
    /// instances become the associated images.
    ///
    /// # Errors
    /// Returns `Open` if there is no volume instance.
    pub fn from_instances(
        identifier: impl Into<String>,
        instances: Vec<SourcedInstance>,
    ) -> Result<Self, TileSourceError> {
        let identifier = identifier.into();
        let mut volumes = Vec::new();
        let mut label = None;
        let mut overview = None;

        for source in instances {
            match source.instance.flavor {
                ImageFlavor::Volume => volumes.push(source),
                ImageFlavor::Label if label.is_none() => label = Some(SlideLevel::new(source)),
                ImageFlavor::Overview if overview.is_none() => {
                    overview = Some(SlideLevel::new(source))
                }
                flavor => debug!(
                    slide = %identifier,
                    instance = %source.instance.sop_instance_uid,
                    ?flavor,
                    "Skipping instance"
                ),
            }
        }

        volumes.sort_by(|a, b| {
            b.instance
                .total_columns
                .cmp(&a.instance.total_columns)
                .then(b.instance.total_rows.cmp(&a.instance.total_rows))
        });

        let mut levels: Vec<SlideLevel> = Vec::new();
        for source in volumes {
            let size = (source.instance.total_columns, source.instance.total_rows);
            match levels.last_mut() {
                Some(level)
                    if (level.instance.total_columns, level.instance.total_rows) == size =>
                {
                    level.records.push(source.instance.record);
                }
                _ => levels.push(SlideLevel::new(source)),
            }
        }

        if levels.is_empty() {
            return Err(TileSourceError::open(format!(
                "{}: no VOLUME instances found",
                identifier
            )));
        }

        info!(
            slide = %identifier,
            levels = levels.len(),
            width = levels[0].instance.total_columns,
            height = levels[0].instance.total_rows,
            label = label.is_some(),
            overview = overview.is_some(),
            "Opened DICOM slide"
        );

        Ok(Self {
            identifier,
            levels,
            label,
            overview,
            closed: AtomicBool::new(false),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    fn associated(&self, kind: AssociatedKind) -> Option<&SlideLevel> {
        match kind {
            AssociatedKind::Label => self.label.as_ref(),
            AssociatedKind::Overview => self.overview.as_ref(),
        }
    }

    fn ensure_open(&self) -> Result<(), TileSourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TileSourceError::decode(format!(
                "{}: slide is closed",
                self.identifier
            )));
        }
        Ok(())
    }
}

/// Stitch a region of one level out of its frames.
async fn read_level_region(
    level: &SlideLevel,
    origin: (u32, u32),
    size: (u32, u32),
) -> Result<RgbImage, TileSourceError> {
    let instance = &level.instance;
    let (x, y) = origin;
    let (w, h) = size;
    if w == 0 || h == 0 {
        return Ok(RgbImage::new(w, h));
    }
    if x as u64 + w as u64 > instance.total_columns as u64
        || y as u64 + h as u64 > instance.total_rows as u64
    {
        return Err(TileSourceError::decode(format!(
            "region {}x{}+{}+{} lies outside the {}x{} level",
            w, h, x, y, instance.total_columns, instance.total_rows
        )));
    }

    let (tw, th) = (instance.columns, instance.rows);
    let mut positions = Vec::new();
    let mut indices = Vec::new();
    for row in y / th..=(y + h - 1) / th {
        for column in x / tw..=(x + w - 1) / tw {
            // Tiles absent from a sparse instance stay black
            if let Some(index) = instance.frame_index(column, row) {
                positions.push((column, row));
                indices.push(index);
            }
        }
    }

    let frames = level.frames.read_frames(&indices).await?;
    if frames.len() != indices.len() {
        return Err(TileSourceError::decode(format!(
            "requested {} frames, received {}",
            indices.len(),
            frames.len()
        )));
    }

    let syntax = level.frames.transfer_syntax();
    let geometry = instance.geometry();
    tokio::task::spawn_blocking(move || {
        let mut canvas = RgbImage::new(w, h);
        for ((column, row), data) in positions.into_iter().zip(frames) {
            let tile = decode_frame(&data, syntax, &geometry)?;
            let dx = column as i64 * tw as i64 - x as i64;
            let dy = row as i64 * th as i64 - y as i64;
            imageops::replace(&mut canvas, &tile, dx, dy);
        }
        Ok(canvas)
    })
    .await
    .map_err(|e| TileSourceError::decode(format!("decode task failed: {}", e)))?
}

#[async_trait]
impl NativeSlide for DicomSlide {
    fn levels(&self) -> Vec<PyramidLevel> {
        self.levels
            .iter()
            .enumerate()
            .map(|(index, level)| PyramidLevel {
                index,
                pixel_width: level.instance.total_columns,
                pixel_height: level.instance.total_rows,
                pixel_spacing_x: level.instance.pixel_spacing.map(|s| s.0),
                pixel_spacing_y: level.instance.pixel_spacing.map(|s| s.1),
            })
            .collect()
    }

    fn tile_size(&self) -> (u32, u32) {
        let base = &self.levels[0].instance;
        (base.columns, base.rows)
    }

    fn read_concurrency(&self) -> ReadConcurrency {
        ReadConcurrency::Parallel
    }

    async fn read_region(
        &self,
        level: usize,
        origin: (u32, u32),
        size: (u32, u32),
    ) -> Result<RgbImage, TileSourceError> {
        self.ensure_open()?;
        let slide_level =
            self.levels
                .get(level)
                .ok_or_else(|| TileSourceError::InternalInconsistency {
                    message: format!("level {} of {} requested", level, self.levels.len()),
                })?;
        read_level_region(slide_level, origin, size).await
    }

    fn has_associated(&self, kind: AssociatedKind) -> bool {
        self.associated(kind).is_some()
    }

    async fn read_associated(
        &self,
        kind: AssociatedKind,
    ) -> Result<Option<RgbImage>, TileSourceError> {
        self.ensure_open()?;
        let Some(level) = self.associated(kind) else {
            return Ok(None);
        };
        let size = (level.instance.total_columns, level.instance.total_rows);
        read_level_region(level, (0, 0), size).await.map(Some)
    }

    fn records(&self) -> Vec<Vec<Value>> {
        self.levels.iter().map(|level| level.records.clone()).collect()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(slide = %self.identifier, "Closed DICOM slide");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
