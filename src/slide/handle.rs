//! Native slide interface and the handle that owns it.
//!
//! [`NativeSlide`] is the boundary between the tile engine and whatever
//! decodes pixels: it reports the native pyramid and reads RGB regions from
//! it. [`SlideHandle`] wraps a slide with an explicit ownership flag so that
//! views derived from a source share the slide without ever closing it.
//!
//! # Ownership
//!
//! ```text
//! SlideHandle { owner: true  } ──┐
//!                                ├──► Arc<S>   close() runs once, from the owner
//! SlideHandle { owner: false } ──┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;
use serde_json::Value;

use crate::error::TileSourceError;
use crate::tile::PyramidLevel;

// =============================================================================
// Associated Images
// =============================================================================

/// Non-pyramid images stored alongside a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociatedKind {
    /// Photograph of the slide label
    Label,
    /// Low-magnification overview of the whole slide
    Overview,
}

impl AssociatedKind {
    pub const ALL: [AssociatedKind; 2] = [AssociatedKind::Label, AssociatedKind::Overview];

    /// Name used by the tile source API (`"label"` or `"macro"`).
    pub const fn name(self) -> &'static str {
        match self {
            AssociatedKind::Label => "label",
            AssociatedKind::Overview => "macro",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "label" => Some(AssociatedKind::Label),
            "macro" | "overview" => Some(AssociatedKind::Overview),
            _ => None,
        }
    }
}

/// Whether reads through one slide may run concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConcurrency {
    /// One read at a time; callers must serialize
    Serialized,
    /// Reads may proceed in parallel
    Parallel,
}

// =============================================================================
// NativeSlide Trait
// =============================================================================

/// A decoded, irregular native pyramid.
///
/// Level 0 is the finest level. Implementations document their concurrency
/// through [`NativeSlide::read_concurrency`].
#[async_trait]
pub trait NativeSlide: Send + Sync {
    /// Native levels, finest first.
    fn levels(&self) -> Vec<PyramidLevel>;

    /// Native tile size `(width, height)` of level 0.
    fn tile_size(&self) -> (u32, u32);

    /// Concurrency contract of [`NativeSlide::read_region`].
    fn read_concurrency(&self) -> ReadConcurrency;

    /// Read an RGB region of a native level.
    ///
    /// # Arguments
    /// * `level` - Native level index
    /// * `origin` - Top-left corner in level pixels
    /// * `size` - Region size in level pixels; must lie inside the level
    ///
    /// # Errors
    /// Returns `Decode` if any pixel of the region cannot be produced.
    async fn read_region(
        &self,
        level: usize,
        origin: (u32, u32),
        size: (u32, u32),
    ) -> Result<RgbImage, TileSourceError>;

    /// Whether an associated image of this kind exists.
    fn has_associated(&self, kind: AssociatedKind) -> bool;

    /// Read a whole associated image, `None` if absent.
    async fn read_associated(
        &self,
        kind: AssociatedKind,
    ) -> Result<Option<RgbImage>, TileSourceError>;

    /// Raw attribute records, one list per native level.
    fn records(&self) -> Vec<Vec<Value>>;

    /// Release native resources. Called at most once, by the owning handle.
    fn close(&self);
}

// =============================================================================
// SlideHandle
// =============================================================================

/// A shared slide plus an ownership flag.
///
/// The owning handle closes the slide exactly once, either through
/// [`SlideHandle::close`] or on drop. Derived handles never close it.
pub struct SlideHandle<S: NativeSlide> {
    slide: Arc<S>,
    owner: bool,
    released: bool,
}

impl<S: NativeSlide> SlideHandle<S> {
    /// Take ownership of a freshly opened slide.
    pub fn new(slide: S) -> Self {
        Self {
            slide: Arc::new(slide),
            owner: true,
            released: false,
        }
    }

    /// A non-owning view of the same slide.
    pub fn derive(&self) -> Self {
        Self {
            slide: Arc::clone(&self.slide),
            owner: false,
            released: false,
        }
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn slide(&self) -> &S {
        &self.slide
    }

    /// Close the slide if this handle owns it.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.owner && !self.released {
            self.released = true;
            self.slide.close();
        }
    }
}

impl<S: NativeSlide> Drop for SlideHandle<S> {
    fn drop(&mut self) {
        self.release();
    }
}

// =============================================================================
// Tests
// =============================================================================
