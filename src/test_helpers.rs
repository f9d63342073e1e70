//! Shared test utilities for the albumsync test suite.
//!
//! Provides synthetic image writers and workspace fixture builders so tests
//! never depend on files outside their own `TempDir`.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let ws = TestWorkspace::new();
//! ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], Some("dog-1.jpg"));
//! let settings = ws.settings();
//! ```

use image::{ImageEncoder, RgbImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Settings;
use crate::manifest::{ManifestDoc, PhotoEntry};

// =========================================================================
// Synthetic images
// =========================================================================

/// Encode a gradient JPEG of the given size into memory.
///
/// `seed` shifts the blue channel so different seeds give different bytes.
pub fn jpeg_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, seed])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Create a small valid JPEG file with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, jpeg_bytes(width, height, 128)).unwrap();
}

/// Write a JPEG carrying an EXIF APP1 segment.
///
/// `ascii` entries are `(tag, value)` pairs stored as ASCII fields in the
/// primary IFD, e.g. `(0x010E, "caption")` for ImageDescription.
pub fn write_jpeg_with_exif(
    path: &Path,
    width: u32,
    height: u32,
    orientation: Option<u16>,
    ascii: &[(u16, &str)],
) {
    let jpeg = jpeg_bytes(width, height, 128);
    let app1 = exif_app1(orientation, ascii);

    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&jpeg[..2]); // SOI
    out.extend_from_slice(&app1);
    out.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, out).unwrap();
}

/// Build a little-endian EXIF APP1 segment with a single IFD.
fn exif_app1(orientation: Option<u16>, ascii: &[(u16, &str)]) -> Vec<u8> {
    enum Value {
        Short(u16),
        Ascii(Vec<u8>),
    }

    let mut entries: Vec<(u16, Value)> = ascii
        .iter()
        .map(|(tag, s)| {
            let mut bytes = s.as_bytes().to_vec();
            bytes.push(0);
            (*tag, Value::Ascii(bytes))
        })
        .collect();
    if let Some(o) = orientation {
        entries.push((0x0112, Value::Short(o)));
    }
    entries.sort_by_key(|(tag, _)| *tag);

    let ifd_start = 8u32;
    let data_start = ifd_start + 2 + 12 * entries.len() as u32 + 4;
    let mut ifd = Vec::new();
    let mut data = Vec::new();

    ifd.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, value) in &entries {
        ifd.extend_from_slice(&tag.to_le_bytes());
        match value {
            Value::Short(v) => {
                ifd.extend_from_slice(&3u16.to_le_bytes());
                ifd.extend_from_slice(&1u32.to_le_bytes());
                ifd.extend_from_slice(&v.to_le_bytes());
                ifd.extend_from_slice(&[0, 0]);
            }
            Value::Ascii(bytes) => {
                ifd.extend_from_slice(&2u16.to_le_bytes());
                ifd.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                if bytes.len() <= 4 {
                    let mut inline = bytes.clone();
                    inline.resize(4, 0);
                    ifd.extend_from_slice(&inline);
                } else {
                    let offset = data_start + data.len() as u32;
                    ifd.extend_from_slice(&offset.to_le_bytes());
                    data.extend_from_slice(bytes);
                    if data.len() % 2 == 1 {
                        data.push(0);
                    }
                }
            }
        }
    }
    ifd.extend_from_slice(&0u32.to_le_bytes());

    let mut tiff = b"II".to_vec();
    tiff.extend_from_slice(&42u16.to_le_bytes());
    tiff.extend_from_slice(&ifd_start.to_le_bytes());
    tiff.extend_from_slice(&ifd);
    tiff.extend_from_slice(&data);

    let mut app1 = vec![0xFF, 0xE1];
    app1.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    app1.extend_from_slice(b"Exif\0\0");
    app1.extend_from_slice(&tiff);
    app1
}

// =========================================================================
// Workspace fixtures
// =========================================================================

/// A temporary workspace with `markdown/` and `output/` directories.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("markdown")).unwrap();
        std::fs::create_dir_all(dir.path().join("output")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Stock settings pointed at this workspace's markdown and output dirs.
    pub fn settings(&self) -> Settings {
        Settings {
            markdown_dir: Some(self.root().join("markdown")),
            output_dir: Some(self.root().join("output")),
            url_prefix: "/site".to_string(),
            ..Settings::default()
        }
    }

    pub fn album_dir(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    pub fn photo_path(&self, album: &str, file: &str) -> PathBuf {
        self.album_dir(album).join("photos").join(file)
    }

    /// Create an album directory with synthetic photos and a manifest
    /// listing nothing, so the first update discovers every photo.
    pub fn add_album(&self, name: &str, files: &[&str], cover: Option<&str>) -> PathBuf {
        let dir = self.album_dir(name);
        std::fs::create_dir_all(dir.join("photos")).unwrap();
        for (i, file) in files.iter().enumerate() {
            std::fs::write(
                dir.join("photos").join(file),
                jpeg_bytes(120, 80, (i as u8).wrapping_mul(40)),
            )
            .unwrap();
        }
        let doc = ManifestDoc {
            title: name.to_string(),
            coverimage: cover.map(str::to_string),
            creation_time: Some("2024-01-01T00:00:00+00:00".to_string()),
            ..ManifestDoc::default()
        };
        doc.write(&dir.join("album.yml")).unwrap();
        dir
    }

    /// Overwrite a manifest's photo list.
    pub fn set_photos(&self, album: &str, photos: &[(&str, Option<&str>)]) {
        let path = self.album_dir(album).join("album.yml");
        let mut doc = ManifestDoc::load(&path).unwrap();
        doc.photos = photos
            .iter()
            .map(|(file, name)| PhotoEntry {
                file: file.to_string(),
                name: name.map(str::to_string),
                ..PhotoEntry::default()
            })
            .collect();
        doc.write(&path).unwrap();
    }

    /// Every regular file under a directory, as sorted relative paths.
    pub fn list_files(&self, relative: &str) -> Vec<String> {
        list_files_under(&self.root().join(relative))
    }
}

/// Sorted `/`-separated relative paths of every file below `dir`.
pub fn list_files_under(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    out.sort();
    out
}

/// Snapshot of every file's bytes below `dir`, keyed by relative path.
pub fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    list_files_under(dir)
        .into_iter()
        .map(|rel| {
            let bytes = std::fs::read(dir.join(&rel)).unwrap();
            (rel, bytes)
        })
        .collect()
}
