//! Naming conventions shared by albums, derivatives and URLs.
//!
//! ## Derivative names
//!
//! A photo's display name is turned into a *clean name* (image extension
//! dropped, lower-cased, spaces replaced with underscores) and combined with
//! the output dimensions:
//!
//! ```text
//! "Dog on Beach" @ 1600x1040 → dog_on_beach_1600x1040.jpg
//! "dog-3.jpg"    @ 1600x1040 → dog-3_1600x1040.jpg
//! ```
//!
//! The cover keeps a fixed name, so a hidden stamp beside it records what it
//! was rendered from: `coverimage.jpg` → `.coverimage.jpg.source`.
//!
//! ## Album directories
//!
//! `albumsync new "Summer 2024"` creates `Summer_2024/`. Surrounding
//! whitespace is dropped and inner spaces become underscores; case is kept.
//!
//! ## URLs
//!
//! Derivative URLs are the configured prefix followed by the path relative
//! to the output root, always with forward slashes:
//!
//! ```text
//! prefix "/photos", output/dogs/large/dog_1600x1040.jpg → /photos/dogs/large/dog_1600x1040.jpg
//! ```

use crate::imaging::rust_backend::supported_input_extensions;
use std::path::{Component, Path, PathBuf};

/// Lower-cased display name with spaces replaced by underscores. A trailing
/// image extension (names default to the filename) is dropped first.
pub fn clean_name(name: &str) -> String {
    let stem = match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && supported_input_extensions().contains(&ext.to_lowercase().as_str()) =>
        {
            stem
        }
        _ => name,
    };
    stem.to_lowercase().replace(' ', "_")
}

/// Directory name for a new album, or `None` if the input can't name one.
///
/// - `"  Summer 2024 "` → `Some("Summer_2024")`
/// - `""`, `"."`, `".."`, `"a/b"` → `None`
pub fn album_dir_name(raw: &str) -> Option<String> {
    let name = raw.trim().replace(' ', "_");
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name)
}

/// `<clean_name>_<W>x<H>.<ext>`
pub fn derivative_filename(clean_name: &str, width: u32, height: u32, extension: &str) -> String {
    format!("{clean_name}_{width}x{height}.{extension}")
}

/// Hidden stamp file next to the cover derivative.
pub fn cover_stamp_path(cover: &Path) -> PathBuf {
    let name = cover
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    cover.with_file_name(format!(".{name}.source"))
}

/// Dotfiles and editor droppings are never photos or albums.
pub fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.')
}

/// URL for a file below `output_dir`, or `None` if it is outside it.
pub fn output_url(url_prefix: &str, output_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(output_dir).ok()?;
    let mut url = url_prefix.trim_end_matches('/').to_string();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            url.push('/');
            url.push_str(&part.to_string_lossy());
        }
    }
    Some(url)
}
