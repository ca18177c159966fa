//! Native slide layer.
//!
//! This module turns a DICOM WSI series into a [`NativeSlide`]: an irregular
//! pyramid that can read RGB regions of any of its levels.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            DicomTileSource              │
//! └────────────────────┬────────────────────┘
//!                      │  SlideHandle (owner flag)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          NativeSlide Trait              │
//! │   (levels, regions, associated images)  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              DicomSlide                 │
//! │  (instances → levels, frame stitching)  │
//! └────────────────────┬────────────────────┘
//!                      │  FrameSource
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │   open_local    │    │    open_remote      │
//! │  (Part 10 files)│    │  (DICOMweb WADO-RS) │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod handle;
mod instance;
mod local;
mod remote;
mod wsi;

pub use handle::{AssociatedKind, NativeSlide, ReadConcurrency, SlideHandle};
pub use instance::{FrameMap, ImageFlavor, WsiInstance};
pub use local::{
    discover_slide_files, open_local, open_local_files, path_might_be_dicom, DICOM_EXTENSIONS,
};
pub use remote::open_remote;
pub use wsi::{DicomSlide, FrameSource, SourcedInstance};

#[cfg(test)]
pub(crate) use wsi::tests as testing;
