//! One source photo and its derivatives.
//!
//! A [`Photo`] knows where its source lives, what it should be called, and
//! where each derivative goes. It never decides *whether* to regenerate;
//! that is the album's job.
//!
//! ## Derivatives
//!
//! | Mode | Path | How |
//! |---|---|---|
//! | large | `<output>/<album>/<dirname_large>/<clean>_<W>x<H>.<ext>` | resize |
//! | small | `<output>/<album>/<dirname_small>/<clean>_<W>x<H>.<ext>` | resize |
//! | thumb | `<output>/<album>/<dirname_thumb>/<clean>_<W>x<H>.<ext>` | smart crop |
//! | cover | `<output>/<album>/<cover_filename>`, extension per `output_format` | smart crop, cover photo only |
//!
//! ## Memory
//!
//! The source dimensions and the decoded image are memoized on first use.
//! [`Photo::release`] drops the decoded pixels; the album calls it right
//! after regenerating each photo so a large album never holds more than one
//! decoded image per worker.

use crate::config::Settings;
use crate::imaging::{
    BackendError, CropJob, Dimensions, ImageBackend, ResizeParams, SizeMode, SmartCrop,
    SourceImage, resolve_dimensions,
};
use crate::markdown::Embed;
use crate::naming;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{file}: {source}")]
    Backend { file: String, source: BackendError },
    #[error("{0} has no display name")]
    Unnamed(String),
}

/// Everything a photo needs from the outside world to produce derivatives.
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    pub settings: &'a Settings,
    pub backend: &'a dyn ImageBackend,
    pub cropper: &'a dyn SmartCrop,
}

/// A derivative's mode, location and pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivative {
    pub mode: SizeMode,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl Derivative {
    pub fn dim(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[derive(Debug)]
pub struct Photo {
    /// Basename in the album's photo directory.
    pub file: String,
    pub source: PathBuf,
    /// Derivative root for the owning album, `<output_dir>/<album>`.
    pub output_root: PathBuf,
    pub name: Option<String>,
    pub alt: Option<String>,
    pub caption: Option<String>,
    /// Photo-level copyright; the album's applies when this is `None`.
    pub copyright: Option<String>,
    pub is_cover: bool,
    dimensions: Option<Dimensions>,
    image: Option<SourceImage>,
    /// Modes already reported as upscaled.
    upscale_warned: Vec<SizeMode>,
}

impl Photo {
    pub fn new(file: impl Into<String>, source: PathBuf, output_root: PathBuf) -> Self {
        Self {
            file: file.into(),
            source,
            output_root,
            name: None,
            alt: None,
            caption: None,
            copyright: None,
            is_cover: false,
            dimensions: None,
            image: None,
            upscale_warned: Vec::new(),
        }
    }

    fn backend_error(&self, source: BackendError) -> PhotoError {
        PhotoError::Backend {
            file: self.file.clone(),
            source,
        }
    }

    /// Post-orientation source size, read once.
    pub fn dimensions(&mut self, pipeline: &Pipeline<'_>) -> Result<Dimensions, PhotoError> {
        if let Some(dims) = self.dimensions {
            return Ok(dims);
        }
        let dims = pipeline
            .backend
            .identify(&self.source)
            .map_err(|e| self.backend_error(e))?;
        self.dimensions = Some(dims);
        Ok(dims)
    }

    /// Modes this photo needs: large, small, thumb, plus cover when designated.
    pub fn required_modes(&self) -> Vec<SizeMode> {
        SizeMode::ALL
            .into_iter()
            .filter(|mode| *mode != SizeMode::Cover || self.is_cover)
            .collect()
    }

    /// Target dimensions for one derivative. Upscaling is logged once per
    /// mode.
    pub fn target(&mut self, mode: SizeMode, pipeline: &Pipeline<'_>) -> Result<(u32, u32), PhotoError> {
        let dims = self.dimensions(pipeline)?;
        let resolved = resolve_dimensions(pipeline.settings.size_spec(mode), dims.as_tuple());
        if resolved.upscaled && !self.upscale_warned.contains(&mode) {
            self.upscale_warned.push(mode);
            warn!(
                photo = %self.file,
                %mode,
                source = %format!("{}x{}", dims.width, dims.height),
                target = %format!("{}x{}", resolved.width, resolved.height),
                "upscaling beyond original resolution"
            );
        }
        Ok((resolved.width, resolved.height))
    }

    /// Location and size of one derivative. `None` for the cover of a
    /// photo that isn't the cover.
    pub fn derivative(
        &mut self,
        mode: SizeMode,
        pipeline: &Pipeline<'_>,
    ) -> Result<Option<Derivative>, PhotoError> {
        if mode == SizeMode::Cover && !self.is_cover {
            return Ok(None);
        }
        let clean = self
            .name
            .as_deref()
            .map(naming::clean_name)
            .ok_or_else(|| PhotoError::Unnamed(self.file.clone()))?;
        let (width, height) = self.target(mode, pipeline)?;
        let settings = pipeline.settings;
        let path = match settings.dirname(mode) {
            Some(dirname) => self.output_root.join(dirname).join(naming::derivative_filename(
                &clean,
                width,
                height,
                settings.output_format.extension(),
            )),
            None => self.output_root.join(settings.cover_file_name()),
        };
        Ok(Some(Derivative {
            mode,
            path,
            width,
            height,
        }))
    }

    /// Every required derivative, in mode order.
    pub fn derivatives(&mut self, pipeline: &Pipeline<'_>) -> Result<Vec<Derivative>, PhotoError> {
        let mut out = Vec::new();
        for mode in self.required_modes() {
            if let Some(d) = self.derivative(mode, pipeline)? {
                out.push(d);
            }
        }
        Ok(out)
    }

    /// True iff every required derivative exists. A photo without a display
    /// name never has derivatives.
    pub fn has_all_derivatives(&mut self, pipeline: &Pipeline<'_>) -> Result<bool, PhotoError> {
        if self.name.is_none() {
            return Ok(false);
        }
        Ok(self
            .derivatives(pipeline)?
            .iter()
            .all(|d| d.path.is_file()))
    }

    fn source_image(&mut self, backend: &dyn ImageBackend) -> Result<&SourceImage, PhotoError> {
        let image = match self.image.take() {
            Some(image) => image,
            None => backend
                .open(&self.source)
                .map_err(|e| self.backend_error(e))?,
        };
        Ok(self.image.insert(image))
    }

    /// (Re)create every required derivative. Never deletes anything.
    pub fn regenerate(&mut self, pipeline: &Pipeline<'_>) -> Result<Vec<Derivative>, PhotoError> {
        let derivatives = self.derivatives(pipeline)?;
        for d in &derivatives {
            if let Some(parent) = d.path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let encode = pipeline.settings.encode_options();
        let file = self.file.clone();
        let source = self.source_image(pipeline.backend)?;
        for d in &derivatives {
            debug!(photo = %file, mode = %d.mode, output = %d.path.display(), "writing derivative");
            let result = if d.mode.is_cropped() {
                pipeline.cropper.render(
                    pipeline.backend,
                    &CropJob {
                        source,
                        width: d.width,
                        height: d.height,
                        output: d.path.clone(),
                        encode,
                    },
                )
            } else {
                pipeline.backend.resize(
                    source,
                    &ResizeParams {
                        output: d.path.clone(),
                        width: d.width,
                        height: d.height,
                        encode,
                    },
                )
            };
            result.map_err(|source| PhotoError::Backend {
                file: file.clone(),
                source,
            })?;
        }
        Ok(derivatives)
    }

    /// Drop the decoded source image. Dimensions stay cached.
    pub fn release(&mut self) {
        self.image = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.image.is_some()
    }

    /// The `{{< photo >}}` directive for this photo.
    pub fn embed(
        &mut self,
        pipeline: &Pipeline<'_>,
        album_copyright: Option<&str>,
    ) -> Result<Embed, PhotoError> {
        let settings = pipeline.settings;
        let url = |d: &Derivative| derivative_url(settings, &d.path);
        let large = self.required(SizeMode::Large, pipeline)?;
        let small = self.required(SizeMode::Small, pipeline)?;
        let thumb = self.required(SizeMode::Thumb, pipeline)?;
        Ok(Embed {
            large_url: url(&large),
            large_dim: large.dim(),
            small_url: url(&small),
            small_dim: small.dim(),
            thumb_url: url(&thumb),
            thumb_dim: thumb.dim(),
            alt: self.alt.clone().unwrap_or_default(),
            caption: self.caption.clone().unwrap_or_default(),
            copyright: self
                .copyright
                .as_deref()
                .or(album_copyright)
                .unwrap_or_default()
                .to_string(),
        })
    }

    fn required(&mut self, mode: SizeMode, pipeline: &Pipeline<'_>) -> Result<Derivative, PhotoError> {
        self.derivative(mode, pipeline)?
            .ok_or_else(|| PhotoError::Unnamed(self.file.clone()))
    }
}

/// URL of a file in the output tree.
pub fn derivative_url(settings: &Settings, path: &Path) -> String {
    settings
        .output_dir
        .as_deref()
        .and_then(|out| naming::output_url(&settings.url_prefix, out, path))
        .unwrap_or_else(|| path.to_string_lossy().replace('\\', "/"))
}
