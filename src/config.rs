//! Workspace settings.
//!
//! Handles loading, migrating, validating, and merging the `albumsync.toml`
//! file in the workspace root. Stock defaults are the base layer; the user
//! file only needs the keys it wants to override.
//!
//! ## Configuration Options
//!
//! ```toml
//! markdown_dir = "content/albums"  # required
//! output_dir = "static/photos"     # required
//! url_prefix = "/photos"
//! output_format = "jpg"            # jpg, jpeg, png or webp
//!
//! dirname_large = "large"
//! dirname_small = "small"
//! dirname_thumb = "thumb"
//!
//! dim_max_large = "1600"           # WxH, Wx, xH or N (longer edge)
//! dim_max_small = "800"
//! dim_max_thumb = "256x256"
//! dim_max_cover = "600x600"
//!
//! cover_filename = "coverimage.jpg"   # extension follows output_format
//! photo_dir = "photos"
//! album_file = "album.yml"
//!
//! smartcrop_backend = "builtin"    # or "external"
//! # smartcrop_path = "/usr/local/bin/smartcrop"
//!
//! jpeg_quality = 75
//! jpeg_optimize = false
//! jpeg_progressive = false
//!
//! # max_processes = 4             # omit for auto = CPU cores
//!
//! [exif]
//! include = []                     # empty = every tag
//! exclude = []
//!
//! [iptc]
//! include = []
//! exclude = []
//!
//! [tag_map]
//! caption = ["exif:ImageDescription", "iptc:Caption-Abstract"]
//! alt = ["iptc:ObjectName"]
//! copyright = []
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! ## Migrations
//!
//! Files written before `settings_version = 2` may use legacy keys. They are
//! rewritten once at load time, before the schema is applied, and each
//! rewrite is logged as a warning:
//!
//! | Legacy key | Current key |
//! |---|---|
//! | `dim_thumbnail = 256` | `dim_max_thumb = "256x256"` |
//! | `dim_coverimage = 600` | `dim_max_cover = "600x600"` |
//! | `use_smartcrop_js = true` | `smartcrop_backend = "external"` |
//! | `smartcrop_js_path` | `smartcrop_path` |

use crate::imaging::{EncodeOptions, OutputFormat, Quality, SizeMode, SizeSpec};
use crate::metadata::TagSource;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Settings file name in the workspace root.
pub const SETTINGS_FILENAME: &str = "albumsync.toml";

/// Current settings schema version.
pub const SETTINGS_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("no settings file at {0} (run `albumsync init` first)")]
    Missing(PathBuf),
    #[error("settings file already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("Error in settings file: {0}")]
    Validation(String),
}

/// Which smart-crop implementation produces thumbnails and covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmartCropBackend {
    #[default]
    Builtin,
    External,
}

/// Include/exclude filter over metadata tag names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagFilter {
    /// Tags to keep. Empty keeps every tag.
    pub include: Vec<String>,
    /// Tags to drop, applied after `include`.
    pub exclude: Vec<String>,
}

/// Ordered metadata sources for photo fields, e.g. `"exif:ImageDescription"`.
/// The first non-empty source wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagMap {
    pub caption: Vec<String>,
    pub alt: Vec<String>,
    pub copyright: Vec<String>,
}

impl Default for TagMap {
    fn default() -> Self {
        Self {
            caption: vec![
                "exif:ImageDescription".to_string(),
                "iptc:Caption-Abstract".to_string(),
            ],
            alt: vec!["iptc:ObjectName".to_string()],
            copyright: Vec::new(),
        }
    }
}

/// Workspace settings loaded from `albumsync.toml`.
///
/// All fields have defaults; `markdown_dir` and `output_dir` must be set
/// for [`validate`](Settings::validate) to pass. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub settings_version: u32,
    /// Directory receiving one `<album>.md` per album.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_dir: Option<PathBuf>,
    /// Root of the derivative tree, one subdirectory per album.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Prepended to output-relative paths to form URLs.
    pub url_prefix: String,
    pub output_format: OutputFormat,
    pub dirname_large: String,
    pub dirname_small: String,
    pub dirname_thumb: String,
    pub dim_max_large: SizeSpec,
    pub dim_max_small: SizeSpec,
    pub dim_max_thumb: SizeSpec,
    pub dim_max_cover: SizeSpec,
    /// Cover derivative file name inside `<output_dir>/<album>/`.
    pub cover_filename: String,
    /// Source photo subdirectory of each album.
    pub photo_dir: String,
    /// Manifest file name inside each album directory.
    pub album_file: String,
    pub smartcrop_backend: SmartCropBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smartcrop_path: Option<PathBuf>,
    pub jpeg_quality: u32,
    pub jpeg_optimize: bool,
    pub jpeg_progressive: bool,
    /// Maximum parallel regeneration workers. `None` = all cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
    pub exif: TagFilter,
    pub iptc: TagFilter,
    pub tag_map: TagMap,
    /// Coarser smart-crop search (`--fast`). Runtime only.
    #[serde(skip)]
    pub fast: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settings_version: SETTINGS_VERSION,
            markdown_dir: None,
            output_dir: None,
            url_prefix: String::new(),
            output_format: OutputFormat::Jpg,
            dirname_large: "large".to_string(),
            dirname_small: "small".to_string(),
            dirname_thumb: "thumb".to_string(),
            dim_max_large: SizeSpec::Max(1600),
            dim_max_small: SizeSpec::Max(800),
            dim_max_thumb: SizeSpec::Exact {
                width: 256,
                height: 256,
            },
            dim_max_cover: SizeSpec::Exact {
                width: 600,
                height: 600,
            },
            cover_filename: "coverimage.jpg".to_string(),
            photo_dir: "photos".to_string(),
            album_file: "album.yml".to_string(),
            smartcrop_backend: SmartCropBackend::Builtin,
            smartcrop_path: None,
            jpeg_quality: 75,
            jpeg_optimize: false,
            jpeg_progressive: false,
            max_processes: None,
            exif: TagFilter::default(),
            iptc: TagFilter::default(),
            tag_map: TagMap::default(),
            fast: false,
        }
    }
}

impl Settings {
    /// Validate settings for consistency. Every problem found is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.markdown_dir.is_none() {
            problems.push("markdown_dir can't be empty".to_string());
        }
        if self.output_dir.is_none() {
            problems.push("output_dir can't be empty".to_string());
        }
        if self.smartcrop_backend == SmartCropBackend::External && self.smartcrop_path.is_none()
        {
            problems.push("external smart crop requested but smartcrop_path not set".to_string());
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            problems.push("jpeg_quality must be 1-100".to_string());
        }
        for (key, value) in [
            ("dirname_large", &self.dirname_large),
            ("dirname_small", &self.dirname_small),
            ("dirname_thumb", &self.dirname_thumb),
            ("cover_filename", &self.cover_filename),
            ("photo_dir", &self.photo_dir),
            ("album_file", &self.album_file),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{key} can't be empty"));
            }
        }
        for (field, sources) in [
            ("caption", &self.tag_map.caption),
            ("alt", &self.tag_map.alt),
            ("copyright", &self.tag_map.copyright),
        ] {
            for source in sources {
                if let Err(e) = source.parse::<TagSource>() {
                    problems.push(format!("tag_map.{field}: {e}"));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(problems.join("; ")))
        }
    }

    /// Resolve relative `markdown_dir` and `output_dir` against `root`.
    pub fn anchored(mut self, root: &Path) -> Self {
        for dir in [&mut self.markdown_dir, &mut self.output_dir] {
            if let Some(path) = dir.as_mut() {
                if path.is_relative() {
                    *path = root.join(&*path);
                }
            }
        }
        self
    }

    pub fn markdown_dir(&self) -> Result<&Path, ConfigError> {
        self.markdown_dir
            .as_deref()
            .ok_or_else(|| ConfigError::Validation("markdown_dir can't be empty".into()))
    }

    pub fn output_dir(&self) -> Result<&Path, ConfigError> {
        self.output_dir
            .as_deref()
            .ok_or_else(|| ConfigError::Validation("output_dir can't be empty".into()))
    }

    /// Configured dimensions for a derivative.
    pub fn size_spec(&self, mode: SizeMode) -> SizeSpec {
        match mode {
            SizeMode::Large => self.dim_max_large,
            SizeMode::Small => self.dim_max_small,
            SizeMode::Thumb => self.dim_max_thumb,
            SizeMode::Cover => self.dim_max_cover,
        }
    }

    /// Cover derivative file name. The extension follows `output_format`;
    /// a configured name whose extension already names that format is kept.
    pub fn cover_file_name(&self) -> String {
        let path = Path::new(&self.cover_filename);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        let same_format = match ext.as_deref() {
            Some("jpg" | "jpeg") => self.output_format.is_jpeg(),
            Some(ext) => ext == self.output_format.extension(),
            None => false,
        };
        if same_format {
            self.cover_filename.clone()
        } else {
            path.with_extension(self.output_format.extension())
                .to_string_lossy()
                .into_owned()
        }
    }

    /// Derivative subdirectory for a mode. The cover has none; it sits at
    /// the album output root.
    pub fn dirname(&self, mode: SizeMode) -> Option<&str> {
        match mode {
            SizeMode::Large => Some(&self.dirname_large),
            SizeMode::Small => Some(&self.dirname_small),
            SizeMode::Thumb => Some(&self.dirname_thumb),
            SizeMode::Cover => None,
        }
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            format: self.output_format,
            quality: Quality::new(self.jpeg_quality),
            optimize: self.jpeg_optimize,
            progressive: self.jpeg_progressive,
        }
    }
}

/// Resolve the effective thread count from settings.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(settings: &Settings) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    settings
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Migration
// =============================================================================

struct Migration {
    /// Version the file is at after this step.
    to: u32,
    apply: fn(&mut toml::Table, &mut Vec<String>),
}

const MIGRATIONS: &[Migration] = &[Migration {
    to: 2,
    apply: migrate_legacy_keys,
}];

/// Bring a raw settings table up to [`SETTINGS_VERSION`].
///
/// Returns one note per rewrite. A file without `settings_version` is
/// treated as version 1.
pub fn migrate(raw: &mut toml::Table) -> Result<Vec<String>, ConfigError> {
    let version = match raw.get("settings_version") {
        None => 1,
        Some(toml::Value::Integer(v)) if (1..=SETTINGS_VERSION as i64).contains(v) => *v as u32,
        Some(other) => {
            return Err(ConfigError::Validation(format!(
                "unsupported settings_version {other} (this build reads up to {SETTINGS_VERSION})"
            )));
        }
    };

    let mut notes = Vec::new();
    for step in MIGRATIONS.iter().filter(|m| m.to > version) {
        (step.apply)(raw, &mut notes);
    }
    raw.insert(
        "settings_version".to_string(),
        toml::Value::Integer(SETTINGS_VERSION as i64),
    );
    Ok(notes)
}

/// Remove `legacy` from the table, or `None` if its successor is already
/// set (the successor wins).
fn take_legacy(
    raw: &mut toml::Table,
    legacy: &str,
    successor: &str,
    notes: &mut Vec<String>,
) -> Option<toml::Value> {
    let value = raw.remove(legacy)?;
    if raw.contains_key(successor) {
        notes.push(format!("{legacy} ignored because {successor} is set"));
        return None;
    }
    Some(value)
}

fn migrate_square_dim(raw: &mut toml::Table, legacy: &str, successor: &str, notes: &mut Vec<String>) {
    let Some(value) = take_legacy(raw, legacy, successor, notes) else {
        return;
    };
    let n = match &value {
        toml::Value::Integer(n) => n.to_string(),
        toml::Value::String(s) => s.trim().to_string(),
        other => {
            notes.push(format!("{legacy} = {other} is not a size, ignored"));
            return;
        }
    };
    let spec = format!("{n}x{n}");
    notes.push(format!("{legacy} = {value} migrated to {successor} = \"{spec}\""));
    raw.insert(successor.to_string(), toml::Value::String(spec));
}

fn migrate_legacy_keys(raw: &mut toml::Table, notes: &mut Vec<String>) {
    migrate_square_dim(raw, "dim_thumbnail", "dim_max_thumb", notes);
    migrate_square_dim(raw, "dim_coverimage", "dim_max_cover", notes);

    if let Some(value) = take_legacy(raw, "use_smartcrop_js", "smartcrop_backend", notes) {
        let backend = if value.as_bool().unwrap_or(false) {
            "external"
        } else {
            "builtin"
        };
        notes.push(format!(
            "use_smartcrop_js = {value} migrated to smartcrop_backend = \"{backend}\""
        ));
        raw.insert(
            "smartcrop_backend".to_string(),
            toml::Value::String(backend.to_string()),
        );
    }

    if let Some(value) = take_legacy(raw, "smartcrop_js_path", "smartcrop_path", notes) {
        notes.push("smartcrop_js_path renamed to smartcrop_path".to_string());
        raw.insert("smartcrop_path".to_string(), value);
    }
}

// =============================================================================
// Loading and merging
// =============================================================================

/// Returns the stock default settings as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Settings::default()).expect("default settings must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse, migrate and merge settings text over stock defaults.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let mut raw: toml::Table = toml::from_str(content)?;
    for note in migrate(&mut raw)? {
        warn!("settings: {note}");
    }
    let merged = merge_toml(stock_defaults_value(), toml::Value::Table(raw));
    Ok(merged.try_into()?)
}

/// Load `albumsync.toml` from the workspace root.
///
/// Relative directories are anchored at `root`. A missing file is an error;
/// validation is left to the caller.
pub fn load_settings(root: &Path) -> Result<Settings, ConfigError> {
    let path = root.join(SETTINGS_FILENAME);
    if !path.exists() {
        return Err(ConfigError::Missing(path));
    }
    let content = fs::read_to_string(&path)?;
    Ok(parse_settings(&content)?.anchored(root))
}

/// Write the stock settings file into `root`. Never overwrites.
pub fn write_stock_settings(root: &Path) -> Result<PathBuf, ConfigError> {
    let path = root.join(SETTINGS_FILENAME);
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path));
    }
    fs::write(&path, stock_settings_toml())?;
    Ok(path)
}

/// Returns a fully-commented stock `albumsync.toml` with all keys and explanations.
///
/// Used by the `init` CLI command.
pub fn stock_settings_toml() -> &'static str {
    r##"# albumsync settings
# ==================
# Values shown below are the defaults. Unknown keys cause an error.

settings_version = 2

# ---------------------------------------------------------------------------
# Locations (required)
# ---------------------------------------------------------------------------
# Directory receiving one <album>.md per album.
# markdown_dir = "content/photos"

# Root of the generated images, one subdirectory per album.
# output_dir = "static/photos"

# Prefix for image URLs in the markdown. URLs are this prefix followed by
# the image path relative to output_dir.
url_prefix = ""

# ---------------------------------------------------------------------------
# Derivatives
# ---------------------------------------------------------------------------
# jpg, jpeg, png or webp
output_format = "jpg"

dirname_large = "large"
dirname_small = "small"
dirname_thumb = "thumb"

# Sizes: "WxH" exact, "Wx" fixed width, "xH" fixed height, "N" longer edge.
dim_max_large = "1600"
dim_max_small = "800"
dim_max_thumb = "256x256"
dim_max_cover = "600x600"

# ---------------------------------------------------------------------------
# Album layout
# ---------------------------------------------------------------------------
# The cover's extension is replaced to match output_format.
cover_filename = "coverimage.jpg"
photo_dir = "photos"
album_file = "album.yml"

# ---------------------------------------------------------------------------
# Smart crop for thumbnails and covers
# ---------------------------------------------------------------------------
# "builtin" or "external". The external program is called as
#   <smartcrop_path> --width W --height H <input> <output>
smartcrop_backend = "builtin"
# smartcrop_path = "/usr/local/bin/smartcrop"

# ---------------------------------------------------------------------------
# JPEG encoding
# ---------------------------------------------------------------------------
jpeg_quality = 75
jpeg_optimize = false
jpeg_progressive = false

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Metadata
# ---------------------------------------------------------------------------
# Tag filters. An empty include list keeps every tag.
[exif]
include = []
exclude = []

[iptc]
include = []
exclude = []

# Sources for photo fields, tried in order. The first non-empty one wins.
# caption and alt are only seeded for newly found photos; copyright falls
# back to the album copyright.
[tag_map]
caption = ["exif:ImageDescription", "iptc:Caption-Abstract"]
alt = ["iptc:ObjectName"]
copyright = []
"##
}
