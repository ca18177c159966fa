//! WSI instance model built from DICOM JSON.
//!
//! Each instance of a VL Whole Slide Microscopy series stores one pyramid
//! level (or a label / overview image) as a grid of frames. This module
//! extracts what the tile engine needs from an instance's attributes: the
//! total pixel matrix, the frame size, the pixel spacing, and where each
//! frame sits in the matrix.

use std::collections::HashMap;

use serde_json::Value;

use crate::dicom::json;
use crate::dicom::tags;
use crate::dicom::FrameGeometry;
use crate::error::DicomError;

/// Role of an instance within the series, from the third ImageType value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFlavor {
    Volume,
    Label,
    Overview,
    Thumbnail,
}

impl ImageFlavor {
    fn from_image_type(values: &[&str]) -> Self {
        match values.get(2).map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("LABEL") => ImageFlavor::Label,
            Some("OVERVIEW") => ImageFlavor::Overview,
            Some("THUMBNAIL") => ImageFlavor::Thumbnail,
            _ => ImageFlavor::Volume,
        }
    }
}

/// Mapping from tile position to frame index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameMap {
    /// Frames in row-major tile order (TILED_FULL)
    Full,
    /// Explicit positions (TILED_SPARSE); missing tiles have no frame
    Sparse(HashMap<(u32, u32), usize>),
}

/// One WSI instance.
#[derive(Debug, Clone)]
pub struct WsiInstance {
    pub sop_instance_uid: String,
    pub series_instance_uid: Option<String>,
    pub flavor: ImageFlavor,

    /// Total pixel matrix size
    pub total_columns: u32,
    pub total_rows: u32,

    /// Frame (tile) size
    pub columns: u32,
    pub rows: u32,

    pub number_of_frames: usize,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,

    /// Pixel spacing `(x, y)` in mm
    pub pixel_spacing: Option<(f64, f64)>,

    pub frame_map: FrameMap,

    /// The attribute record this instance was built from
    pub record: Value,
}

impl WsiInstance {
    /// Build an instance from a DICOM JSON record.
    ///
    /// # Errors
    /// Returns `MissingAttribute` if the frame size or SOP instance UID is
    /// absent, and `InvalidAttribute` for zero sizes.
    pub fn from_json(record: Value) -> Result<Self, DicomError> {
        let sop_instance_uid = json::first_str(&record, tags::SOP_INSTANCE_UID)
            .ok_or(DicomError::MissingAttribute("SOPInstanceUID"))?
            .to_string();
        let series_instance_uid =
            json::first_str(&record, tags::SERIES_INSTANCE_UID).map(str::to_string);
        let flavor = ImageFlavor::from_image_type(&json::strings(&record, tags::IMAGE_TYPE));

        let columns = dimension(&record, tags::COLUMNS, "Columns")?;
        let rows = dimension(&record, tags::ROWS, "Rows")?;
        // Single-frame label and overview images may omit the total matrix
        let total_columns = json::first_u64(&record, tags::TOTAL_PIXEL_MATRIX_COLUMNS)
            .map(|v| v as u32)
            .unwrap_or(columns);
        let total_rows = json::first_u64(&record, tags::TOTAL_PIXEL_MATRIX_ROWS)
            .map(|v| v as u32)
            .unwrap_or(rows);
        if total_columns == 0 || total_rows == 0 {
            return Err(DicomError::InvalidAttribute {
                attribute: "TotalPixelMatrixColumns",
                message: "total pixel matrix has zero size".to_string(),
            });
        }

        let number_of_frames =
            json::first_u64(&record, tags::NUMBER_OF_FRAMES).unwrap_or(1) as usize;
        let samples_per_pixel =
            json::first_u64(&record, tags::SAMPLES_PER_PIXEL).unwrap_or(3) as u16;
        let bits_allocated = json::first_u64(&record, tags::BITS_ALLOCATED).unwrap_or(8) as u16;

        let pixel_spacing = pixel_spacing(&record, total_columns, total_rows);
        let frame_map = frame_map(&record, columns, rows);

        Ok(Self {
            sop_instance_uid,
            series_instance_uid,
            flavor,
            total_columns,
            total_rows,
            columns,
            rows,
            number_of_frames,
            samples_per_pixel,
            bits_allocated,
            pixel_spacing,
            frame_map,
            record,
        })
    }

    /// Tiles across and down the total pixel matrix.
    pub fn tile_grid(&self) -> (u32, u32) {
        (
            self.total_columns.div_ceil(self.columns),
            self.total_rows.div_ceil(self.rows),
        )
    }

    /// 0-based frame index of the tile at `(column, row)`, if stored.
    pub fn frame_index(&self, column: u32, row: u32) -> Option<usize> {
        let (tiles_x, tiles_y) = self.tile_grid();
        if column >= tiles_x || row >= tiles_y {
            return None;
        }
        let index = match &self.frame_map {
            FrameMap::Full => row as usize * tiles_x as usize + column as usize,
            FrameMap::Sparse(map) => *map.get(&(column, row))?,
        };
        (index < self.number_of_frames).then_some(index)
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            columns: self.columns,
            rows: self.rows,
            samples_per_pixel: self.samples_per_pixel,
            bits_allocated: self.bits_allocated,
        }
    }
}

fn dimension(record: &Value, tag: tags::Tag, name: &'static str) -> Result<u32, DicomError> {
    let value = json::first_u64(record, tag).ok_or(DicomError::MissingAttribute(name))?;
    if value == 0 || value > u32::MAX as u64 {
        return Err(DicomError::InvalidAttribute {
            attribute: name,
            message: format!("{} is not a valid size", value),
        });
    }
    Ok(value as u32)
}

/// Pixel spacing `(x, y)` in mm.
///
/// Read from the shared functional groups (`PixelSpacing` is stored as
/// `[row spacing, column spacing]`), falling back to the imaged volume size
/// divided by the total pixel matrix.
fn pixel_spacing(record: &Value, total_columns: u32, total_rows: u32) -> Option<(f64, f64)> {
    let from_measures = json::items(record, tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE)
        .first()
        .and_then(|shared| json::items(shared, tags::PIXEL_MEASURES_SEQUENCE).first())
        .map(|measures| json::f64s(measures, tags::PIXEL_SPACING))
        .filter(|spacing| spacing.len() == 2 && spacing.iter().all(|s| *s > 0.0))
        .map(|spacing| (spacing[1], spacing[0]));
    if from_measures.is_some() {
        return from_measures;
    }

    let width = json::first_f64(record, tags::IMAGED_VOLUME_WIDTH)?;
    let height = json::first_f64(record, tags::IMAGED_VOLUME_HEIGHT)?;
    (width > 0.0 && height > 0.0)
        .then(|| (width / total_columns as f64, height / total_rows as f64))
}

fn frame_map(record: &Value, columns: u32, rows: u32) -> FrameMap {
    let organization = json::first_str(record, tags::DIMENSION_ORGANIZATION_TYPE);
    let per_frame = json::items(record, tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE);
    if organization == Some("TILED_FULL") || per_frame.is_empty() {
        return FrameMap::Full;
    }

    let mut map = HashMap::new();
    for (index, item) in per_frame.iter().enumerate() {
        let Some(position) = json::items(item, tags::PLANE_POSITION_SLIDE_SEQUENCE).first() else {
            continue;
        };
        let column = json::first_i64(position, tags::COLUMN_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX);
        let row = json::first_i64(position, tags::ROW_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX);
        if let (Some(column), Some(row)) = (column, row) {
            // Positions are 1-based pixel coordinates of the frame's corner
            let tile = (
                ((column - 1).max(0) / columns as i64) as u32,
                ((row - 1).max(0) / rows as i64) as u32,
            );
            // First focal plane / optical path wins
            map.entry(tile).or_insert(index);
        }
    }
    FrameMap::Sparse(map)
}
