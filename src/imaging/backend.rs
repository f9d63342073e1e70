//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the five operations every backend must
//! support: identify, read_metadata, open, resize, and crop_resize.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, everything
//! statically linked into the binary.
//!
//! Orientation is a backend concern. `identify` reports post-rotation
//! dimensions and `open` returns already-rotated pixels, so nothing above
//! this layer ever sees a sideways image.

use super::params::{CropParams, ResizeParams};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("{program} exited with {status}")]
    ExternalProcess { program: String, status: String },
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Embedded image metadata.
///
/// `exif` and `iptc` map tag names (`ImageDescription`, `Caption-Abstract`,
/// ...) to their display values. Both are empty when the file carries no
/// such block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// EXIF orientation code, 1–8.
    pub orientation: Option<u16>,
    pub exif: BTreeMap<String, String>,
    pub iptc: BTreeMap<String, String>,
}

/// A decoded, orientation-corrected source image.
#[derive(Debug)]
pub struct SourceImage {
    pub path: PathBuf,
    pub image: DynamicImage,
}

impl SourceImage {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.image.width(),
            height: self.image.height(),
        }
    }
}

/// Trait for image processing backends.
///
/// Every backend must implement all five operations so the rest of the
/// codebase is backend-agnostic.
pub trait ImageBackend: Sync {
    /// Get image dimensions after orientation correction.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Read the orientation tag and the EXIF/IPTC tag maps.
    fn read_metadata(&self, path: &Path) -> Result<ImageMetadata, BackendError>;

    /// Decode a source image and apply its orientation.
    fn open(&self, path: &Path) -> Result<SourceImage, BackendError>;

    /// Resize to exact dimensions and write the result.
    fn resize(&self, source: &SourceImage, params: &ResizeParams) -> Result<(), BackendError>;

    /// Crop to a box, resize to exact dimensions and write the result.
    fn crop_resize(&self, source: &SourceImage, params: &CropParams) -> Result<(), BackendError>;
}
