//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Orientation, EXIF tags | `kamadak-exif` |
//! | IPTC tags | custom `iptc_parser` (JPEG APP13 + TIFF IFD) |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Crop | `DynamicImage::crop_imm` |
//! | Encode → JPEG | `jpeg-encoder` (quality, progressive, optimized Huffman tables) |
//! | Encode → PNG, WebP | `image` crate encoders |

use super::backend::{BackendError, Dimensions, ImageBackend, ImageMetadata, SourceImage};
use super::params::{CropParams, EncodeOptions, ResizeParams};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Whether a path has a decodable image extension (case-insensitive).
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            let e = e.to_lowercase();
            supported_input_extensions().contains(&e.as_str())
        })
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// EXIF
// ---------------------------------------------------------------------------

/// Parse the EXIF block of a file. `Ok(None)` when the file has none.
fn read_exif(path: &Path) -> Result<Option<exif::Exif>, BackendError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Ok(Some(exif)),
        Err(exif::Error::NotFound(_)) => Ok(None),
        Err(exif::Error::Io(e)) => Err(BackendError::Io(e)),
        Err(e) => Err(BackendError::ProcessingFailed(format!(
            "Failed to read EXIF from {}: {}",
            path.display(),
            e
        ))),
    }
}

fn orientation_of(exif: &exif::Exif) -> Option<u16> {
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    match field.value.get_uint(0)? {
        o @ 1..=8 => Some(o as u16),
        _ => None,
    }
}

/// Orientation tag of a file, ignoring unreadable metadata.
fn read_orientation(path: &Path) -> Option<u16> {
    match read_exif(path) {
        Ok(exif) => exif.as_ref().and_then(orientation_of),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring unreadable orientation");
            None
        }
    }
}

/// Primary-IFD EXIF fields as tag name → display value.
fn exif_tags(exif: &exif::Exif) -> BTreeMap<String, String> {
    exif.fields()
        .filter(|f| f.ifd_num == exif::In::PRIMARY)
        .map(|f| {
            let value = f.display_value().to_string();
            (f.tag.to_string(), value.trim_matches('"').trim().to_string())
        })
        .filter(|(_, v)| !v.is_empty())
        .collect()
}

/// Orientations 5–8 swap the width and height axes.
fn swaps_axes(orientation: Option<u16>) -> bool {
    matches!(orientation, Some(5..=8))
}

/// Rotate/flip decoded pixels so the image displays upright.
///
/// | Code | Transform |
/// |---|---|
/// | 2 | mirror horizontally |
/// | 3 | rotate 180° |
/// | 4 | mirror vertically |
/// | 5 | rotate 90° CW, mirror horizontally |
/// | 6 | rotate 90° CW |
/// | 7 | rotate 270° CW, mirror horizontally |
/// | 8 | rotate 270° CW |
fn apply_orientation(img: DynamicImage, orientation: Option<u16>) -> DynamicImage {
    match orientation {
        Some(2) => img.fliph(),
        Some(3) => img.rotate180(),
        Some(4) => img.flipv(),
        Some(5) => img.rotate90().fliph(),
        Some(6) => img.rotate90(),
        Some(7) => img.rotate270().fliph(),
        Some(8) => img.rotate270(),
        _ => img,
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Save a DynamicImage in the configured output format.
fn save_image(img: &DynamicImage, path: &Path, encode: &EncodeOptions) -> Result<(), BackendError> {
    if encode.format.is_jpeg() {
        return save_jpeg(img, path, encode);
    }
    let format = ImageFormat::from_extension(encode.format.extension()).ok_or_else(|| {
        BackendError::ProcessingFailed(format!("Unsupported output format: {}", encode.format))
    })?;
    // The PNG and WebP encoders both accept RGBA8
    DynamicImage::ImageRgba8(img.to_rgba8())
        .save_with_format(path, format)
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to write {}: {}", path.display(), e))
        })
}

fn save_jpeg(img: &DynamicImage, path: &Path, encode: &EncodeOptions) -> Result<(), BackendError> {
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let too_large = || {
        BackendError::ProcessingFailed(format!(
            "{}x{} exceeds the JPEG size limit",
            width, height
        ))
    };
    let width = u16::try_from(width).map_err(|_| too_large())?;
    let height = u16::try_from(height).map_err(|_| too_large())?;

    let encode_err = |e: jpeg_encoder::EncodingError| {
        BackendError::ProcessingFailed(format!("JPEG encode failed for {}: {}", path.display(), e))
    };
    let mut encoder =
        jpeg_encoder::Encoder::new_file(path, encode.quality.value() as u8).map_err(encode_err)?;
    encoder.set_progressive(encode.progressive);
    encoder.set_optimized_huffman_tables(encode.optimize);
    encoder
        .encode(rgb.as_raw(), width, height, jpeg_encoder::ColorType::Rgb)
        .map_err(encode_err)
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Failed to read dimensions of {}: {}",
                path.display(),
                e
            ))
        })?;
        if swaps_axes(read_orientation(path)) {
            Ok(Dimensions {
                width: height,
                height: width,
            })
        } else {
            Ok(Dimensions { width, height })
        }
    }

    fn read_metadata(&self, path: &Path) -> Result<ImageMetadata, BackendError> {
        let exif = read_exif(path)?;
        Ok(ImageMetadata {
            orientation: exif.as_ref().and_then(orientation_of),
            exif: exif.as_ref().map(exif_tags).unwrap_or_default(),
            iptc: super::iptc_parser::read_iptc(path),
        })
    }

    fn open(&self, path: &Path) -> Result<SourceImage, BackendError> {
        let img = ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!(
                    "Failed to decode {}: {}",
                    path.display(),
                    e
                ))
            })?;
        Ok(SourceImage {
            path: path.to_path_buf(),
            image: apply_orientation(img, read_orientation(path)),
        })
    }

    fn resize(&self, source: &SourceImage, params: &ResizeParams) -> Result<(), BackendError> {
        let resized = source
            .image
            .resize_exact(params.width, params.height, FilterType::Lanczos3);
        save_image(&resized, &params.output, &params.encode)
    }

    fn crop_resize(&self, source: &SourceImage, params: &CropParams) -> Result<(), BackendError> {
        let dims = source.dimensions();
        let c = params.crop;
        if !c.fits_within(dims.width, dims.height) {
            return Err(BackendError::ProcessingFailed(format!(
                "crop box {}x{}+{}+{} outside {}x{} image {}",
                c.width,
                c.height,
                c.x,
                c.y,
                dims.width,
                dims.height,
                source.path.display()
            )));
        }
        let cropped = source.image.crop_imm(c.x, c.y, c.width, c.height);
        let resized = cropped.resize_exact(params.width, params.height, FilterType::Lanczos3);
        save_image(&resized, &params.output, &params.encode)
    }
}
