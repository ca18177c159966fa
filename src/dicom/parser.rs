//! DICOM Part 10 header parsing.
//!
//! Parses everything in a Part 10 file that precedes the pixel data: the file
//! meta information group and the main dataset. Pixel data itself is never
//! read here; its position and length are returned so that frames can be
//! fetched on demand with range reads.
//!
//! # Part 10 Layout
//!
//! ```text
//! Bytes 0-127:   Preamble (ignored)
//! Bytes 128-131: "DICM"
//! Group 0002:    File meta information, always Explicit VR Little Endian
//! Dataset:       Encoded in the transfer syntax named by (0002,0010)
//! (7FE0,0010):   Pixel data, native or encapsulated
//! ```
//!
//! # Element Encoding
//!
//! ```text
//! Explicit VR, short length: tag(4) VR(2) length(2)
//! Explicit VR, long length:  tag(4) VR(2) reserved(2) length(4)
//! Implicit VR:               tag(4) length(4)
//! Item / delimiters:         tag(4) length(4), never carries a VR
//! ```
//!
//! A length of `0xFFFFFFFF` is undefined; the value then runs until a
//! matching delimitation item.

use super::dataset::{Dataset, Element, Value};
use super::syntax::TransferSyntax;
use super::tags::{self, vr_for_tag, Tag, Vr};
use crate::error::DicomError;
use crate::io::{read_u16_le, read_u32_le, read_u64_le};

// =============================================================================
// Constants
// =============================================================================

/// Length of the preamble preceding the magic bytes
pub const PREAMBLE_LENGTH: usize = 128;

/// Magic bytes following the preamble
pub const MAGIC: &[u8; 4] = b"DICM";

/// Offset of the first file meta element
pub const META_START: usize = PREAMBLE_LENGTH + MAGIC.len();

/// Length value marking an undefined length
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// Transfer syntaxes we know exist but cannot parse
const BIG_ENDIAN_UID: &str = "1.2.840.10008.1.2.2";
const DEFLATED_UID: &str = "1.2.840.10008.1.2.1.99";

// =============================================================================
// FileHeader
// =============================================================================

/// Location of the pixel data element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelDataHeader {
    /// Absolute offset of the first value byte
    pub value_offset: u64,

    /// VR of the pixel data element (OB or OW)
    pub vr: Vr,

    /// Value length, `None` when encapsulated (undefined length)
    pub length: Option<u32>,
}

/// Parsed header of a Part 10 file.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// File meta information group (0002,xxxx)
    pub meta: Dataset,

    /// Main dataset, without the pixel data
    pub dataset: Dataset,

    /// Transfer syntax of the main dataset
    pub transfer_syntax: TransferSyntax,

    /// Pixel data location, if the file carries pixel data
    pub pixel_data: Option<PixelDataHeader>,
}

impl FileHeader {
    /// Parse a Part 10 header from a prefix of the file.
    ///
    /// # Arguments
    /// * `bytes` - The first bytes of the file
    /// * `file_size` - Total file size, used to tell a truncated prefix from
    ///   the true end of the file
    ///
    /// # Errors
    /// - `MissingMagic` if the DICM marker is absent
    /// - `Truncated` if `bytes` ends before the pixel data element header;
    ///   the caller should retry with a longer prefix
    /// - `UnsupportedTransferSyntax` for syntaxes we cannot parse
    /// - `MalformedElement` for invalid element encodings
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, DicomError> {
        if bytes.len() < META_START {
            return Err(DicomError::Truncated {
                offset: bytes.len() as u64,
                needed: (META_START - bytes.len()) as u64,
            });
        }
        if &bytes[PREAMBLE_LENGTH..META_START] != MAGIC {
            return Err(DicomError::MissingMagic);
        }

        let complete = bytes.len() as u64 >= file_size;
        let mut cursor = Cursor {
            bytes,
            pos: META_START,
            explicit: true,
            complete,
        };

        let meta = cursor.read_meta()?;
        let uid = meta
            .string(tags::TRANSFER_SYNTAX_UID)
            .ok_or(DicomError::MissingAttribute("TransferSyntaxUID"))?;
        let transfer_syntax = TransferSyntax::from_uid(uid).ok_or_else(|| {
            let reason = match uid {
                BIG_ENDIAN_UID => format!("{} (big endian)", uid),
                DEFLATED_UID => format!("{} (deflated)", uid),
                _ => uid.to_string(),
            };
            DicomError::UnsupportedTransferSyntax(reason)
        })?;

        cursor.explicit = transfer_syntax.is_explicit_vr();
        let (dataset, pixel_data) = cursor.read_elements(None, Nesting::TopLevel)?;

        Ok(Self {
            meta,
            dataset,
            transfer_syntax,
            pixel_data,
        })
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Where a run of elements lives, which decides how it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nesting {
    /// Main dataset: ends at pixel data or at the end of the file
    TopLevel,
    /// Undefined-length item: ends at an item delimiter
    UndefinedItem,
    /// Defined-length item: ends at its length
    DefinedItem,
}

#[derive(Debug, Clone, Copy)]
struct ElementHeader {
    tag: Tag,
    vr: Vr,
    length: Option<u32>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    explicit: bool,
    /// Whether `bytes` holds the whole file
    complete: bool,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn need(&self, n: usize) -> Result<(), DicomError> {
        let remaining = self.remaining();
        if remaining < n {
            return Err(DicomError::Truncated {
                offset: self.pos as u64,
                needed: (n - remaining) as u64,
            });
        }
        Ok(())
    }

    fn malformed(&self, offset: usize, message: impl Into<String>) -> DicomError {
        DicomError::MalformedElement {
            offset: offset as u64,
            message: message.into(),
        }
    }

    fn peek_tag(&self) -> Result<Tag, DicomError> {
        self.need(4)?;
        let b = &self.bytes[self.pos..];
        Ok(Tag::new(read_u16_le(b), read_u16_le(&b[2..])))
    }

    fn read_meta(&mut self) -> Result<Dataset, DicomError> {
        let mut meta = Dataset::new();
        loop {
            if self.remaining() == 0 && self.complete {
                break;
            }
            if self.peek_tag()?.group != 0x0002 {
                break;
            }
            let header = self.read_header()?;
            let value = self.read_value(&header)?;
            meta.insert(Element {
                tag: header.tag,
                vr: header.vr,
                value,
            });
        }
        Ok(meta)
    }

    fn read_header(&mut self) -> Result<ElementHeader, DicomError> {
        let start = self.pos;
        let tag = self.peek_tag()?;
        self.need(8)?;
        let b = &self.bytes[start..];

        if tag.is_delimiter() {
            self.pos += 8;
            return Ok(ElementHeader {
                tag,
                vr: Vr::UN,
                length: defined(read_u32_le(&b[4..])),
            });
        }

        if !self.explicit {
            let length = read_u32_le(&b[4..]);
            self.pos += 8;
            let vr = vr_for_tag(tag).unwrap_or(if length == UNDEFINED_LENGTH {
                Vr::SQ
            } else {
                Vr::UN
            });
            return Ok(ElementHeader {
                tag,
                vr,
                length: defined(length),
            });
        }

        let vr = Vr([b[4], b[5]]);
        if !vr.0.iter().all(u8::is_ascii_uppercase) {
            return Err(self.malformed(start, format!("invalid VR bytes for {}", tag)));
        }

        if vr.has_long_length() {
            self.need(12)?;
            let length = read_u32_le(&b[8..]);
            self.pos += 12;
            Ok(ElementHeader {
                tag,
                vr,
                length: defined(length),
            })
        } else {
            let length = read_u16_le(&b[6..]) as u32;
            self.pos += 8;
            Ok(ElementHeader {
                tag,
                vr,
                length: Some(length),
            })
        }
    }

    fn read_value(&mut self, header: &ElementHeader) -> Result<Value, DicomError> {
        if header.vr == Vr::SQ || header.length.is_none() {
            // Undefined-length UN holds an implicit VR sequence
            let explicit = self.explicit;
            if header.vr == Vr::UN {
                self.explicit = false;
            }
            let items = self.read_sequence(header.length);
            self.explicit = explicit;
            return Ok(Value::Sequence(items?));
        }

        let length = header.length.unwrap_or(0) as usize;
        self.need(length)?;
        let data = &self.bytes[self.pos..self.pos + length];
        self.pos += length;
        Ok(decode_value(header.vr, data))
    }

    fn read_sequence(&mut self, length: Option<u32>) -> Result<Vec<Dataset>, DicomError> {
        let mut items = Vec::new();

        match length {
            Some(length) => {
                self.need(length as usize)?;
                let end = self.pos + length as usize;
                while self.pos < end {
                    let start = self.pos;
                    let header = self.read_header()?;
                    if header.tag != tags::ITEM {
                        return Err(self.malformed(start, format!("expected item, found {}", header.tag)));
                    }
                    items.push(self.read_item(header.length)?);
                }
            }
            None => loop {
                let start = self.pos;
                let header = self.read_header()?;
                match header.tag {
                    tags::SEQUENCE_DELIMITATION => break,
                    tags::ITEM => items.push(self.read_item(header.length)?),
                    other => {
                        return Err(self.malformed(start, format!("expected item, found {}", other)))
                    }
                }
            },
        }

        Ok(items)
    }

    fn read_item(&mut self, length: Option<u32>) -> Result<Dataset, DicomError> {
        match length {
            Some(length) => {
                self.need(length as usize)?;
                let end = self.pos + length as usize;
                Ok(self.read_elements(Some(end), Nesting::DefinedItem)?.0)
            }
            None => Ok(self.read_elements(None, Nesting::UndefinedItem)?.0),
        }
    }

    fn read_elements(
        &mut self,
        end: Option<usize>,
        nesting: Nesting,
    ) -> Result<(Dataset, Option<PixelDataHeader>), DicomError> {
        let mut dataset = Dataset::new();

        loop {
            if let Some(end) = end {
                if self.pos >= end {
                    break;
                }
            }
            if nesting == Nesting::TopLevel && self.remaining() == 0 {
                if self.complete {
                    break;
                }
                return Err(DicomError::Truncated {
                    offset: self.pos as u64,
                    needed: 1,
                });
            }

            let start = self.pos;
            let header = self.read_header()?;

            match header.tag {
                tags::ITEM_DELIMITATION if nesting == Nesting::UndefinedItem => break,
                tags::ITEM_DELIMITATION | tags::ITEM | tags::SEQUENCE_DELIMITATION => {
                    return Err(self.malformed(start, format!("unexpected {}", header.tag)));
                }
                tags::PIXEL_DATA if nesting == Nesting::TopLevel => {
                    let pixel_data = PixelDataHeader {
                        value_offset: self.pos as u64,
                        vr: header.vr,
                        length: header.length,
                    };
                    return Ok((dataset, Some(pixel_data)));
                }
                _ => {}
            }

            let value = self.read_value(&header)?;
            dataset.insert(Element {
                tag: header.tag,
                vr: header.vr,
                value,
            });
        }

        Ok((dataset, None))
    }
}

fn defined(length: u32) -> Option<u32> {
    (length != UNDEFINED_LENGTH).then_some(length)
}

// =============================================================================
// Value Decoding
// =============================================================================

/// Decode a defined-length value.
fn decode_value(vr: Vr, data: &[u8]) -> Value {
    if data.is_empty() {
        return Value::Empty;
    }

    if vr.is_string() {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_end_matches(['\0', ' ']);
        if vr.is_text() {
            return Value::Strings(vec![text.to_string()]);
        }
        return Value::Strings(
            text.split('\\')
                .map(|s| s.trim_matches(['\0', ' ']).to_string())
                .collect(),
        );
    }

    match vr {
        Vr::US => Value::Ints(data.chunks_exact(2).map(|c| read_u16_le(c) as i64).collect()),
        Vr::SS => Value::Ints(
            data.chunks_exact(2)
                .map(|c| read_u16_le(c) as i16 as i64)
                .collect(),
        ),
        Vr::UL => Value::Ints(data.chunks_exact(4).map(|c| read_u32_le(c) as i64).collect()),
        Vr::SL => Value::Ints(
            data.chunks_exact(4)
                .map(|c| read_u32_le(c) as i32 as i64)
                .collect(),
        ),
        Vr::UV | Vr::SV => Value::Ints(data.chunks_exact(8).map(|c| read_u64_le(c) as i64).collect()),
        Vr::FL => Value::Floats(
            data.chunks_exact(4)
                .map(|c| f32::from_bits(read_u32_le(c)) as f64)
                .collect(),
        ),
        Vr::FD => Value::Floats(
            data.chunks_exact(8)
                .map(|c| f64::from_bits(read_u64_le(c)))
                .collect(),
        ),
        Vr::AT => Value::Strings(
            data.chunks_exact(4)
                .map(|c| Tag::new(read_u16_le(c), read_u16_le(&c[2..])).json_key())
                .collect(),
        ),
        _ => Value::Binary {
            length: data.len() as u64,
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
