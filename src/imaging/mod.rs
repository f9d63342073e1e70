//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` + EXIF orientation |
//! | **EXIF metadata** | `kamadak-exif` |
//! | **IPTC metadata** | custom parser (JPEG APP13 + TIFF IFD) |
//! | **Resize** | Lanczos3 `resize_exact` |
//! | **JPEG encode** | `jpeg-encoder` (quality, optimized tables, progressive) |
//! | **Smart crop** | in-process saliency search or external program |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Smart crop**: [`SmartCrop`] trait + [`BuiltinCropper`] / [`ExternalCropper`]

pub mod backend;
mod calculations;
pub(crate) mod iptc_parser;
mod params;
pub mod rust_backend;
pub mod smartcrop;

pub use backend::{BackendError, Dimensions, ImageBackend, ImageMetadata, SourceImage};
pub use calculations::{
    Resolved, SizeMode, SizeSpec, SizeSpecError, calculate_crop_dimensions, resolve_dimensions,
};
pub use params::{CropBox, CropParams, EncodeOptions, OutputFormat, Quality, ResizeParams};
pub use rust_backend::{RustBackend, is_supported_image};
pub use smartcrop::{BuiltinCropper, CropJob, ExternalCropper, SmartCrop};
