//! The per-album YAML manifest.
//!
//! ```yaml
//! title: Dogs
//! album_date: '2024-06-01'
//! properties:
//!   location: Beach
//! copyright: Jane Doe
//! coverimage: dog-1.jpg
//! creation_time: '2024-06-01T10:00:00+02:00'
//! modification_time: '2024-06-02T09:30:00+02:00'
//! photos:
//! - file: dog-1.jpg
//!   name: dog-1.jpg
//!   alt: A dog
//!   caption: On the beach
//! hashes:
//! - file: dog-1.jpg
//!   hash: sha256:9f86d0...
//! ```
//!
//! Every field is optional on load; a missing or `null` list reads as empty.
//! Keys are written in the order shown. [`ManifestDoc::write`] copies the
//! previous file to `<name>.bak` before overwriting it, so an interrupted
//! write leaves the last good manifest next to the damaged one.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error in {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Top-level manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestDoc {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    pub album_date: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub properties: BTreeMap<String, serde_yaml::Value>,
    pub copyright: Option<String>,
    pub coverimage: Option<String>,
    pub creation_time: Option<String>,
    pub modification_time: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub photos: Vec<PhotoEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub hashes: Vec<HashEntry>,
}

/// One declared photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoEntry {
    pub file: String,
    pub name: Option<String>,
    pub alt: Option<String>,
    pub caption: Option<String>,
}

/// One hash ledger entry, `hash` in `<algorithm>:<hex>` form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashEntry {
    pub file: String,
    pub hash: String,
}

/// `key:` and `key: null` read as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ManifestDoc {
    /// Parse manifest text. An empty document is an empty manifest.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ManifestError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn to_yaml(&self, path: &Path) -> Result<String, ManifestError> {
        serde_yaml::to_string(self).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Back up the existing file, then overwrite it.
    ///
    /// The document is serialized before anything on disk is touched, and
    /// the backup copy completes before the original is truncated.
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let yaml = self.to_yaml(path)?;
        backup(path)?;
        fs::write(path, yaml)?;
        Ok(())
    }
}

/// Path of the backup copy: `album.yml` → `album.yml.bak`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `path` to its backup location if it exists.
fn backup(path: &Path) -> Result<(), ManifestError> {
    if path.exists() {
        fs::copy(path, backup_path(path))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> ManifestDoc {
        ManifestDoc {
            title: "Dogs".into(),
            album_date: Some("2024-06-01".into()),
            properties: BTreeMap::from([
                ("location".to_string(), serde_yaml::Value::from("Beach")),
                ("rating".to_string(), serde_yaml::Value::from(5)),
            ]),
            copyright: Some("Jane Doe".into()),
            coverimage: Some("dog-1.jpg".into()),
            creation_time: Some("2024-06-01T10:00:00+02:00".into()),
            modification_time: None,
            photos: vec![PhotoEntry {
                file: "dog-1.jpg".into(),
                name: Some("dog-1.jpg".into()),
                alt: Some("A dog".into()),
                caption: None,
            }],
            hashes: vec![HashEntry {
                file: "dog-1.jpg".into(),
                hash: format!("sha256:{}", "a".repeat(64)),
            }],
        }
    }

    // =========================================================================
    // parsing
    // =========================================================================

    #[test]
    fn missing_photos_field_is_empty_list() {
        let doc = ManifestDoc::parse("title: Dogs\n", Path::new("album.yml")).unwrap();
        assert_eq!(doc.title, "Dogs");
        assert!(doc.photos.is_empty());
        assert!(doc.hashes.is_empty());
    }

    #[test]
    fn null_fields_read_as_empty() {
        let doc = ManifestDoc::parse(
            "title:\nproperties:\nphotos:\nhashes: null\n",
            Path::new("album.yml"),
        )
        .unwrap();
        assert_eq!(doc, ManifestDoc::default());
    }

    #[test]
    fn empty_document_is_default() {
        let doc = ManifestDoc::parse("  \n", Path::new("album.yml")).unwrap();
        assert_eq!(doc, ManifestDoc::default());
    }

    #[test]
    fn photo_without_name() {
        let doc = ManifestDoc::parse(
            "photos:\n- file: dog.jpg\n  caption: Good boy\n",
            Path::new("album.yml"),
        )
        .unwrap();
        assert_eq!(doc.photos[0].file, "dog.jpg");
        assert_eq!(doc.photos[0].name, None);
        assert_eq!(doc.photos[0].caption.as_deref(), Some("Good boy"));
    }

    #[test]
    fn malformed_yaml_names_the_file() {
        let err = ManifestDoc::parse("photos: [unclosed", Path::new("dogs/album.yml")).unwrap_err();
        assert!(err.to_string().contains("dogs/album.yml"));
    }

    // =========================================================================
    // writing
    // =========================================================================

    #[test]
    fn keys_written_in_fixed_order() {
        let yaml = sample().to_yaml(Path::new("album.yml")).unwrap();
        let keys: Vec<&str> = yaml
            .lines()
            .filter(|l| !l.starts_with(' ') && !l.starts_with('-'))
            .filter_map(|l| l.split(':').next())
            .collect();
        assert_eq!(
            keys,
            vec![
                "title",
                "album_date",
                "properties",
                "copyright",
                "coverimage",
                "creation_time",
                "modification_time",
                "photos",
                "hashes",
            ]
        );
    }

    #[test]
    fn write_then_load_preserves_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("album.yml");
        sample().write(&path).unwrap();
        assert_eq!(ManifestDoc::load(&path).unwrap(), sample());
    }

    #[test]
    fn write_backs_up_previous_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("album.yml");
        fs::write(&path, "title: Old\n").unwrap();

        sample().write(&path).unwrap();

        let bak = backup_path(&path);
        assert_eq!(bak, tmp.path().join("album.yml.bak"));
        assert_eq!(fs::read_to_string(&bak).unwrap(), "title: Old\n");
        assert_eq!(ManifestDoc::load(&path).unwrap().title, "Dogs");
    }

    #[test]
    fn first_write_creates_no_backup() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("album.yml");
        sample().write(&path).unwrap();
        assert!(!backup_path(&path).exists());
    }
}
