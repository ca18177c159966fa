//! DICOM decoding for whole slide images.
//!
//! This module reads the subset of DICOM needed to serve WSI pyramids:
//!
//! - **Part 10 files**: preamble, file meta group, and dataset in Explicit or
//!   Implicit VR Little Endian, parsed up to the pixel data.
//!
//! - **Frames**: encapsulated fragments (JPEG, JPEG 2000) or native pixels,
//!   indexed once and fetched with range reads.
//!
//! - **DICOM JSON**: locally parsed datasets convert to the same JSON model
//!   DICOMweb serves, so the WSI model is built from either source alike.

mod dataset;
mod file;
pub mod json;
mod parser;
mod pixels;
mod syntax;
pub mod tags;

#[cfg(test)]
pub(crate) mod testing;

pub use dataset::{Dataset, Element, Value};
pub use file::{DicomFile, Fragment, INITIAL_HEADER_READ, MAX_HEADER_READ};
pub use parser::{FileHeader, PixelDataHeader, MAGIC, PREAMBLE_LENGTH};
pub use pixels::{decode_frame, initialize_codecs, FrameGeometry};
pub use syntax::{TransferSyntax, FALLBACK_TRANSFER_SYNTAX, PREFERRED_TRANSFER_SYNTAXES};
pub use tags::{Tag, Vr};
