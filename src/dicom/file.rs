//! Random access to the frames of a Part 10 file.
//!
//! [`DicomFile`] parses the header once from a prefix of the file, then builds
//! a frame table so that any frame can be fetched with range reads and no
//! further parsing.
//!
//! # Encapsulated Pixel Data
//!
//! ```text
//! (7FE0,0010) OB, undefined length
//!   Item: Basic Offset Table (may be empty)
//!   Item: fragment 1
//!   Item: fragment 2
//!   ...
//!   Sequence delimiter
//! ```
//!
//! Fragments are assigned to frames one-to-one when the counts match, by the
//! basic offset table when it has one entry per frame, and all together when
//! the object holds a single frame.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use super::dataset::Dataset;
use super::parser::{FileHeader, PixelDataHeader};
use super::syntax::TransferSyntax;
use super::tags;
use crate::error::DicomError;
use crate::io::{read_u16_le, read_u32_le, RangeReader};

/// First header read size; doubled while the header does not fit
pub const INITIAL_HEADER_READ: usize = 256 * 1024;

/// Largest header prefix we are willing to read
pub const MAX_HEADER_READ: usize = 64 * 1024 * 1024;

/// Size of an item header (tag + length)
const ITEM_HEADER_SIZE: u64 = 8;

/// A contiguous byte range holding (part of) a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub offset: u64,
    pub length: u32,
}

/// A parsed Part 10 file with an index of its frames.
pub struct DicomFile<R: RangeReader> {
    reader: R,
    header: FileHeader,
    frames: Vec<Vec<Fragment>>,
}

impl<R: RangeReader> DicomFile<R> {
    /// Parse the header of a Part 10 file and index its frames.
    ///
    /// # Errors
    /// Propagates parse errors, and returns `InvalidPixelData` if the file
    /// has no pixel data or its fragments cannot be mapped to frames.
    pub async fn open(reader: R) -> Result<Self, DicomError> {
        let size = reader.size();
        let mut len = (INITIAL_HEADER_READ as u64).min(size) as usize;

        let header = loop {
            let prefix = reader.read_exact_at(0, len).await?;
            match FileHeader::parse(&prefix, size) {
                Ok(header) => break header,
                Err(DicomError::Truncated { .. })
                    if (len as u64) < size && len < MAX_HEADER_READ =>
                {
                    len = ((len * 2) as u64).min(size).min(MAX_HEADER_READ as u64) as usize;
                }
                Err(e) => return Err(e),
            }
        };

        let pixel_data = header
            .pixel_data
            .ok_or_else(|| DicomError::InvalidPixelData("no pixel data element".to_string()))?;
        let frame_count = header.dataset.uint(tags::NUMBER_OF_FRAMES).unwrap_or(1) as usize;

        let frames = if header.transfer_syntax.is_encapsulated() {
            if pixel_data.length.is_some() {
                return Err(DicomError::InvalidPixelData(
                    "compressed pixel data must have undefined length".to_string(),
                ));
            }
            index_encapsulated(&reader, pixel_data.value_offset, frame_count).await?
        } else {
            index_native(&header.dataset, &pixel_data, frame_count)?
        };

        debug!(
            file = reader.identifier(),
            transfer_syntax = %header.transfer_syntax,
            frames = frames.len(),
            header_bytes = len,
            "Indexed DICOM file"
        );

        Ok(Self {
            reader,
            header,
            frames,
        })
    }

    /// Main dataset, without pixel data.
    pub fn dataset(&self) -> &Dataset {
        &self.header.dataset
    }

    pub fn transfer_syntax(&self) -> TransferSyntax {
        self.header.transfer_syntax
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn identifier(&self) -> &str {
        self.reader.identifier()
    }

    /// Read the encoded bytes of a frame (0-based).
    pub async fn read_frame(&self, index: usize) -> Result<Bytes, DicomError> {
        let fragments = self.frames.get(index).ok_or_else(|| {
            DicomError::InvalidPixelData(format!(
                "frame {} out of range ({} frames)",
                index,
                self.frames.len()
            ))
        })?;

        if let [fragment] = fragments.as_slice() {
            return Ok(self
                .reader
                .read_exact_at(fragment.offset, fragment.length as usize)
                .await?);
        }

        let total: usize = fragments.iter().map(|f| f.length as usize).sum();
        let mut data = BytesMut::with_capacity(total);
        for fragment in fragments {
            let bytes = self
                .reader
                .read_exact_at(fragment.offset, fragment.length as usize)
                .await?;
            data.extend_from_slice(&bytes);
        }
        Ok(data.freeze())
    }
}

// =============================================================================
// Frame Indexing
// =============================================================================

fn index_native(
    dataset: &Dataset,
    pixel_data: &PixelDataHeader,
    frame_count: usize,
) -> Result<Vec<Vec<Fragment>>, DicomError> {
    let rows = dataset.uint(tags::ROWS).ok_or(DicomError::MissingAttribute("Rows"))?;
    let columns = dataset
        .uint(tags::COLUMNS)
        .ok_or(DicomError::MissingAttribute("Columns"))?;
    let samples = dataset.uint(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
    let bits = dataset.uint(tags::BITS_ALLOCATED).unwrap_or(8);

    let frame_size = rows * columns * samples * bits.div_ceil(8);
    let available = pixel_data.length.unwrap_or(0) as u64;
    if frame_size == 0 || frame_size * frame_count as u64 > available {
        return Err(DicomError::InvalidPixelData(format!(
            "{} frames of {} bytes do not fit in {} bytes of pixel data",
            frame_count, frame_size, available
        )));
    }
    let length = u32::try_from(frame_size)
        .map_err(|_| DicomError::InvalidPixelData(format!("frame size {} too large", frame_size)))?;

    Ok((0..frame_count as u64)
        .map(|i| {
            vec![Fragment {
                offset: pixel_data.value_offset + i * frame_size,
                length,
            }]
        })
        .collect())
}

async fn read_item_header<R: RangeReader>(
    reader: &R,
    offset: u64,
) -> Result<(tags::Tag, u32), DicomError> {
    let bytes = reader.read_exact_at(offset, ITEM_HEADER_SIZE as usize).await?;
    let tag = tags::Tag::new(read_u16_le(&bytes), read_u16_le(&bytes[2..]));
    Ok((tag, read_u32_le(&bytes[4..])))
}

async fn index_encapsulated<R: RangeReader>(
    reader: &R,
    start: u64,
    frame_count: usize,
) -> Result<Vec<Vec<Fragment>>, DicomError> {
    let size = reader.size();
    let mut pos = start;

    let (tag, bot_length) = read_item_header(reader, pos).await?;
    if tag != tags::ITEM {
        return Err(DicomError::InvalidPixelData(format!(
            "expected basic offset table item, found {}",
            tag
        )));
    }
    let offsets: Vec<u32> = if bot_length > 0 {
        let bytes = reader
            .read_exact_at(pos + ITEM_HEADER_SIZE, bot_length as usize)
            .await?;
        bytes.chunks_exact(4).map(read_u32_le).collect()
    } else {
        Vec::new()
    };
    pos += ITEM_HEADER_SIZE + bot_length as u64;
    let first_item = pos;

    let mut fragments = Vec::new();
    // Some writers omit the trailing delimiter; the end of file ends the sequence
    while pos + ITEM_HEADER_SIZE <= size {
        let (tag, length) = read_item_header(reader, pos).await?;
        match tag {
            tags::SEQUENCE_DELIMITATION => break,
            tags::ITEM => {
                fragments.push(Fragment {
                    offset: pos + ITEM_HEADER_SIZE,
                    length,
                });
                pos += ITEM_HEADER_SIZE + length as u64;
            }
            other => {
                return Err(DicomError::InvalidPixelData(format!(
                    "unexpected {} in encapsulated pixel data at offset {}",
                    other, pos
                )))
            }
        }
    }

    group_fragments(fragments, &offsets, first_item, frame_count)
}

/// Assign fragments to frames.
fn group_fragments(
    fragments: Vec<Fragment>,
    offsets: &[u32],
    first_item: u64,
    frame_count: usize,
) -> Result<Vec<Vec<Fragment>>, DicomError> {
    if frame_count == 0 || fragments.is_empty() {
        return Err(DicomError::InvalidPixelData(format!(
            "{} fragments for {} frames",
            fragments.len(),
            frame_count
        )));
    }

    if fragments.len() == frame_count {
        return Ok(fragments.into_iter().map(|f| vec![f]).collect());
    }

    if offsets.len() == frame_count {
        let mut frames = vec![Vec::new(); frame_count];
        for fragment in fragments {
            let relative = fragment.offset - ITEM_HEADER_SIZE - first_item;
            let frame = offsets.partition_point(|&o| o as u64 <= relative);
            if frame == 0 {
                return Err(DicomError::InvalidPixelData(
                    "fragment precedes the first offset table entry".to_string(),
                ));
            }
            frames[frame - 1].push(fragment);
        }
        if frames.iter().any(Vec::is_empty) {
            return Err(DicomError::InvalidPixelData(
                "basic offset table points outside the fragments".to_string(),
            ));
        }
        return Ok(frames);
    }

    if frame_count == 1 {
        return Ok(vec![fragments]);
    }

    Err(DicomError::InvalidPixelData(format!(
        "{} fragments cannot be mapped to {} frames",
        fragments.len(),
        frame_count
    )))
}
