//! Content-aware crop selection for thumbnails and cover images.
//!
//! Two interchangeable implementations sit behind [`SmartCrop`]:
//!
//! - [`BuiltinCropper`] scores candidate crop windows in-process and hands
//!   the winning rectangle to the [`ImageBackend`].
//! - [`ExternalCropper`] runs an external program that crops, resizes and
//!   writes the output in one step:
//!   `<program> --width W --height H <input> <output>`.
//!
//! ## Scoring
//!
//! The builtin cropper works on a downscaled copy of the source (the
//! "analysis" image) whose crop window is roughly the target size, or at
//! most [`FAST_ANALYSIS_WIDTH`] pixels wide in fast mode. Every pixel gets a
//! saliency value from three features:
//!
//! | Feature | Signal |
//! |---|---|
//! | detail | Laplacian of luminance |
//! | skin | closeness of the normalised RGB vector to a skin tone |
//! | saturation | HSL saturation of mid-luminance pixels |
//!
//! A window's score is the sum of saliency weighted by an importance map
//! that favours the window centre and penalises its border band. The
//! window is always the largest one of the target aspect ratio, so it
//! spans the full source extent on one axis and slides along the other.

use super::backend::{BackendError, ImageBackend, SourceImage};
use super::calculations::calculate_crop_dimensions;
use super::params::{CropBox, CropParams, EncodeOptions};
use image::RgbImage;
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Analysis width cap used in fast mode.
pub const FAST_ANALYSIS_WIDTH: u32 = 100;

const DETAIL_WEIGHT: f32 = 1.0;
const SKIN_WEIGHT: f32 = 1.8;
const SKIN_COLOR: [f32; 3] = [0.78, 0.57, 0.44];
const SKIN_THRESHOLD: f32 = 0.8;
const SATURATION_WEIGHT: f32 = 0.3;
const SATURATION_THRESHOLD: f32 = 0.4;
/// Fraction of the half-window treated as border band.
const EDGE_RADIUS: f32 = 0.4;
const EDGE_WEIGHT: f32 = 0.5;
/// Candidate offsets are sampled every this many analysis pixels.
const SEARCH_STEP: u32 = 4;

/// One thumbnail or cover derivative to produce.
pub struct CropJob<'a> {
    pub source: &'a SourceImage,
    pub width: u32,
    pub height: u32,
    pub output: PathBuf,
    pub encode: EncodeOptions,
}

/// Crop a source to a target size, preserving its salient content, and
/// write the result to `job.output`.
pub trait SmartCrop: Sync {
    fn render(&self, backend: &dyn ImageBackend, job: &CropJob<'_>) -> Result<(), BackendError>;
}

// ---------------------------------------------------------------------------
// Builtin
// ---------------------------------------------------------------------------

/// In-process saliency cropper.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCropper {
    /// Coarser analysis grid; never changes the output dimensions.
    pub fast: bool,
}

impl BuiltinCropper {
    pub fn new(fast: bool) -> Self {
        Self { fast }
    }

    /// Choose the crop rectangle, in source pixel coordinates, for a
    /// `width`x`height` target.
    pub fn find_crop(&self, source: &RgbImage, width: u32, height: u32) -> CropBox {
        let (src_w, src_h) = source.dimensions();
        let (crop_w, crop_h) = calculate_crop_dimensions((src_w, src_h), (width, height));
        if crop_w == src_w && crop_h == src_h {
            return CropBox {
                x: 0,
                y: 0,
                width: src_w,
                height: src_h,
            };
        }

        let analysis_w = if self.fast {
            width.min(FAST_ANALYSIS_WIDTH)
        } else {
            width
        };
        // Never analyse above source resolution
        let scale = (analysis_w as f32 / crop_w as f32).min(1.0);
        let scaled = |v: u32| ((v as f32 * scale).round() as u32).max(1);

        let analysis = if scale < 1.0 {
            image::imageops::resize(source, scaled(src_w), scaled(src_h), FilterType::Triangle)
        } else {
            source.clone()
        };
        let (aw, ah) = analysis.dimensions();
        let window = (scaled(crop_w).min(aw), scaled(crop_h).min(ah));

        let saliency = saliency_map(&analysis);
        let (best_x, best_y) = best_window(&saliency, (aw, ah), window);

        let back = |v: u32| (v as f32 / scale).round() as u32;
        let crop = CropBox {
            x: back(best_x).min(src_w - crop_w),
            y: back(best_y).min(src_h - crop_h),
            width: crop_w,
            height: crop_h,
        };
        debug!(
            ?crop,
            analysis_width = aw,
            analysis_height = ah,
            fast = self.fast,
            "smart crop selected"
        );
        crop
    }
}

impl SmartCrop for BuiltinCropper {
    fn render(&self, backend: &dyn ImageBackend, job: &CropJob<'_>) -> Result<(), BackendError> {
        let rgb = job.source.image.to_rgb8();
        let crop = self.find_crop(&rgb, job.width, job.height);
        backend.crop_resize(
            job.source,
            &CropParams {
                output: job.output.clone(),
                crop,
                width: job.width,
                height: job.height,
                encode: job.encode,
            },
        )
    }
}

/// Per-pixel saliency, row-major.
fn saliency_map(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let luma: Vec<f32> = img
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0.map(|c| c as f32 / 255.0);
            0.2126 * r + 0.7152 * g + 0.0722 * b
        })
        .collect();
    let at = |x: u32, y: u32| luma[(y * w + x) as usize];

    img.enumerate_pixels()
        .map(|(x, y, p)| {
            let l = at(x, y);
            let neighbours = at(x.saturating_sub(1), y)
                + at((x + 1).min(w - 1), y)
                + at(x, y.saturating_sub(1))
                + at(x, (y + 1).min(h - 1));
            let detail = (4.0 * l - neighbours).abs().min(1.0);

            let rgb = p.0.map(|c| c as f32 / 255.0);
            detail * DETAIL_WEIGHT
                + skin_score(rgb, l) * SKIN_WEIGHT
                + saturation_score(rgb, l) * SATURATION_WEIGHT
        })
        .collect()
}

fn skin_score([r, g, b]: [f32; 3], luma: f32) -> f32 {
    let mag = (r * r + g * g + b * b).sqrt();
    if mag == 0.0 || !(0.2..=1.0).contains(&luma) {
        return 0.0;
    }
    let d = [r / mag - SKIN_COLOR[0], g / mag - SKIN_COLOR[1], b / mag - SKIN_COLOR[2]];
    let skin = 1.0 - (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
    if skin > SKIN_THRESHOLD {
        (skin - SKIN_THRESHOLD) / (1.0 - SKIN_THRESHOLD)
    } else {
        0.0
    }
}

fn saturation_score([r, g, b]: [f32; 3], luma: f32) -> f32 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min || !(0.05..=0.9).contains(&luma) {
        return 0.0;
    }
    let lightness = (max + min) / 2.0;
    let s = (max - min) / (1.0 - (2.0 * lightness - 1.0).abs()).max(f32::EPSILON);
    if s > SATURATION_THRESHOLD {
        ((s - SATURATION_THRESHOLD) / (1.0 - SATURATION_THRESHOLD)).min(1.0)
    } else {
        0.0
    }
}

/// Weight of a pixel at relative position (`rx`, `ry`) inside a window.
fn importance(rx: f32, ry: f32) -> f32 {
    let dx = (rx - 0.5).abs() * 2.0;
    let dy = (ry - 0.5).abs() * 2.0;
    let edge = (dx.max(dy) - (1.0 - EDGE_RADIUS)).max(0.0) / EDGE_RADIUS;
    if edge > 0.0 {
        -EDGE_WEIGHT * edge
    } else {
        1.0 - 0.15 * (dx * dx + dy * dy)
    }
}

/// Candidate offsets along one axis: every `SEARCH_STEP`, plus the centre
/// and the far end.
fn offsets(span: u32, window: u32) -> Vec<u32> {
    let last = span - window;
    let mut out: Vec<u32> = (0..=last).step_by(SEARCH_STEP as usize).collect();
    out.push(last / 2);
    out.push(last);
    out.sort_unstable();
    out.dedup();
    out
}

/// Highest-scoring window origin. Ties go to the candidate nearest the
/// centre, so featureless images crop centrally.
fn best_window(saliency: &[f32], (aw, ah): (u32, u32), (ww, wh): (u32, u32)) -> (u32, u32) {
    let centre = ((aw - ww) as f32 / 2.0, (ah - wh) as f32 / 2.0);
    let mut best = (0, 0);
    let mut best_key = (f32::NEG_INFINITY, f32::NEG_INFINITY);

    for y in offsets(ah, wh) {
        for x in offsets(aw, ww) {
            let mut score = 0.0;
            for wy in 0..wh {
                let row = ((y + wy) * aw) as usize;
                let ry = (wy as f32 + 0.5) / wh as f32;
                for wx in 0..ww {
                    let s = saliency[row + (x + wx) as usize];
                    if s != 0.0 {
                        score += s * importance((wx as f32 + 0.5) / ww as f32, ry);
                    }
                }
            }
            let distance = (x as f32 - centre.0).abs() + (y as f32 - centre.1).abs();
            let key = (score, -distance);
            if key.0 > best_key.0 || (key.0 == best_key.0 && key.1 > best_key.1) {
                best_key = key;
                best = (x, y);
            }
        }
    }
    best
}

// ---------------------------------------------------------------------------
// External
// ---------------------------------------------------------------------------

/// Delegates crop, resize and write to an external program.
#[derive(Debug, Clone)]
pub struct ExternalCropper {
    pub executable: PathBuf,
}

impl ExternalCropper {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    fn command(&self, input: &Path, output: &Path, width: u32, height: u32) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--width")
            .arg(width.to_string())
            .arg("--height")
            .arg(height.to_string())
            .arg(input)
            .arg(output);
        cmd
    }
}

impl SmartCrop for ExternalCropper {
    fn render(&self, _backend: &dyn ImageBackend, job: &CropJob<'_>) -> Result<(), BackendError> {
        let program = self.executable.display().to_string();
        debug!(%program, output = %job.output.display(), "running external smart crop");
        let status = self
            .command(&job.source.path, &job.output, job.width, job.height)
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(BackendError::ExternalProcess {
                program,
                status: status.to_string(),
            })
        }
    }
}
