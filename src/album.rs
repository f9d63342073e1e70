//! Album synchronization.
//!
//! An [`Album`] is a directory holding a manifest (`album.yml`) and a photo
//! subdirectory. [`Album::update`] brings the derivative tree, the markdown
//! fragment and the manifest in line with what is on disk:
//!
//! ```text
//! 1. Validate     photo display names must be unique
//! 2. Reconcile    append new files (sorted), drop entries whose file is gone
//! 3. Cover        mark the photo named by `coverimage`
//! 4. Staleness    stale = missing derivative OR sha256 differs from ledger
//!                 OR the cover stamp names another source or size
//! 5. Regenerate   stale photos only, in parallel, results in filename order
//! 6. Markdown     rewritten in full
//! 7. Manifest     backup, then rewrite with a fresh hash ledger
//! ```
//!
//! Stages 1–5 never touch the manifest or markdown, so any failure leaves
//! both exactly as they were. Derivatives written before a failure are kept;
//! the next run recomputes staleness from scratch and picks up where this
//! one stopped.
//!
//! ## Idempotence
//!
//! `modification_time` only moves when the rewritten manifest differs from
//! the loaded one. A second update with no source changes writes
//! byte-identical manifest and markdown files and regenerates nothing.

use crate::config::{ConfigError, Settings};
use crate::fingerprint::{Fingerprint, HashLedger, hash_file};
use crate::imaging::{SizeMode, is_supported_image};
use crate::manifest::{HashEntry, ManifestDoc, ManifestError, PhotoEntry};
use crate::markdown::{self, FrontMatter};
use crate::metadata::{MetadataFields, extract_fields};
use crate::naming;
use crate::photo::{Photo, PhotoError, Pipeline, derivative_url};
use chrono::{Local, SecondsFormat};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum AlbumError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Settings error: {0}")]
    Config(#[from] ConfigError),
    #[error("album {album}: {source}")]
    Photo { album: String, source: PhotoError },
    #[error("album {album}: photo names aren't unique ({}), not processing", names.join(", "))]
    DuplicateNames { album: String, names: Vec<String> },
    #[error("album {album}: fingerprint of {file} failed: {source}")]
    Fingerprint {
        album: String,
        file: String,
        source: std::io::Error,
    },
}

/// Progress events sent while an album updates.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    AlbumStarted {
        album: String,
        photos: usize,
        stale: usize,
    },
    PhotoRegenerated {
        album: String,
        file: String,
        derivatives: Vec<PathBuf>,
    },
    MarkdownWritten {
        album: String,
        path: PathBuf,
    },
    ManifestWritten {
        album: String,
        path: PathBuf,
    },
}

/// What one update pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    pub album: String,
    /// Files appended during reconcile.
    pub added: Vec<String>,
    /// Entries dropped because their file is gone.
    pub removed: Vec<String>,
    /// Photos whose derivatives were rewritten, in filename order.
    pub regenerated: Vec<String>,
}

/// Source file, fingerprint and size the cover derivative was rendered
/// from, kept in a hidden file beside the cover. The cover's own name
/// never changes, so this is what notices a new `coverimage` or
/// `dim_max_cover`.
struct CoverStamp {
    path: PathBuf,
    contents: String,
}

impl CoverStamp {
    fn for_photo(
        photo: &mut Photo,
        fingerprint: &Fingerprint,
        pipeline: &Pipeline<'_>,
    ) -> Result<Option<Self>, PhotoError> {
        let Some(cover) = photo.derivative(SizeMode::Cover, pipeline)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            path: naming::cover_stamp_path(&cover.path),
            contents: format!(
                "{} {} {}x{}\n",
                photo.file,
                fingerprint.tagged(),
                cover.width,
                cover.height
            ),
        }))
    }

    fn is_current(&self) -> bool {
        fs::read_to_string(&self.path).is_ok_and(|s| s == self.contents)
    }
}

/// Current local time, RFC 3339 with second precision.
pub fn now_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

#[derive(Debug)]
pub struct Album {
    /// Directory name; unique within a workspace.
    pub name: String,
    pub dir: PathBuf,
    pub manifest_path: PathBuf,
    pub title: String,
    pub album_date: Option<String>,
    pub properties: BTreeMap<String, serde_yaml::Value>,
    pub copyright: Option<String>,
    /// Filename of the cover photo.
    pub coverimage: Option<String>,
    pub creation_time: Option<String>,
    pub modification_time: Option<String>,
    pub photos: Vec<Photo>,
    pub ledger: HashLedger,
    /// Document as read from disk, for modification-time stability.
    loaded: ManifestDoc,
}

impl Album {
    /// Load the album in `dir`. `Ok(None)` when the directory has no
    /// manifest, i.e. isn't an album.
    pub fn load(dir: &Path, settings: &Settings) -> Result<Option<Self>, AlbumError> {
        let manifest_path = dir.join(&settings.album_file);
        if !manifest_path.is_file() {
            warn!(dir = %dir.display(), "skipping non-album directory");
            return Ok(None);
        }
        let doc = ManifestDoc::load(&manifest_path)?;
        Ok(Some(Self::from_doc(dir, manifest_path, doc, settings)?))
    }

    /// A fresh album with nothing but a creation time, not yet written.
    pub fn create(dir: &Path, settings: &Settings, creation_time: String) -> Result<Self, AlbumError> {
        let manifest_path = dir.join(&settings.album_file);
        let doc = ManifestDoc {
            creation_time: Some(creation_time),
            ..ManifestDoc::default()
        };
        let mut album = Self::from_doc(dir, manifest_path, doc, settings)?;
        // Written from scratch; nothing on disk to compare against
        album.loaded = ManifestDoc::default();
        Ok(album)
    }

    fn from_doc(
        dir: &Path,
        manifest_path: PathBuf,
        doc: ManifestDoc,
        settings: &Settings,
    ) -> Result<Self, AlbumError> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let output_root = settings.output_dir()?.join(&name);
        let photo_dir = dir.join(&settings.photo_dir);

        let photos = doc
            .photos
            .iter()
            .map(|entry| {
                let mut photo = Photo::new(
                    entry.file.clone(),
                    photo_dir.join(&entry.file),
                    output_root.clone(),
                );
                photo.name = match &entry.name {
                    Some(n) => Some(n.clone()),
                    None => {
                        warn!(album = %name, photo = %entry.file, "no name for photo, using filename");
                        Some(entry.file.clone())
                    }
                };
                photo.alt = entry.alt.as_deref().map(|s| s.trim().to_string());
                photo.caption = entry.caption.as_deref().map(|s| s.trim().to_string());
                photo
            })
            .collect();

        let ledger = HashLedger::from_persisted(
            doc.hashes
                .iter()
                .map(|h| (h.file.as_str(), h.hash.as_str())),
        );

        Ok(Self {
            name,
            dir: dir.to_path_buf(),
            manifest_path,
            title: doc.title.clone(),
            album_date: doc.album_date.clone(),
            properties: doc.properties.clone(),
            copyright: doc.copyright.clone(),
            coverimage: doc.coverimage.clone(),
            creation_time: doc.creation_time.clone(),
            modification_time: doc.modification_time.clone(),
            photos,
            ledger,
            loaded: doc,
        })
    }

    pub fn photo_dir(&self, settings: &Settings) -> PathBuf {
        self.dir.join(&settings.photo_dir)
    }

    /// Derivative root, `<output_dir>/<album>`.
    pub fn output_root(&self, settings: &Settings) -> Result<PathBuf, ConfigError> {
        Ok(settings.output_dir()?.join(&self.name))
    }

    /// `<markdown_dir>/<album>.md`
    pub fn markdown_path(&self, settings: &Settings) -> Result<PathBuf, ConfigError> {
        Ok(settings.markdown_dir()?.join(format!("{}.md", self.name)))
    }

    /// Display names used by more than one photo, sorted.
    ///
    /// Names are compared in cleaned form, the form derivative files
    /// carry, so `dog.jpg` and `Dog.png` collide.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        let mut dupes = BTreeSet::new();
        for photo in &self.photos {
            let name = photo.name.as_deref().unwrap_or(&photo.file);
            if let Some(first) = seen.insert(naming::clean_name(name), name) {
                dupes.insert(first.to_string());
                dupes.insert(name.to_string());
            }
        }
        dupes.into_iter().collect()
    }

    fn check_unique_names(&self) -> Result<(), AlbumError> {
        let names = self.duplicate_names();
        if names.is_empty() {
            Ok(())
        } else {
            Err(AlbumError::DuplicateNames {
                album: self.name.clone(),
                names,
            })
        }
    }

    fn photo_error(&self, source: PhotoError) -> AlbumError {
        AlbumError::Photo {
            album: self.name.clone(),
            source,
        }
    }

    /// Run a full update pass. See the module docs for the stages.
    pub fn update(
        &mut self,
        pipeline: &Pipeline<'_>,
        events: Option<&Sender<SyncEvent>>,
    ) -> Result<UpdateReport, AlbumError> {
        let settings = pipeline.settings;
        let send = |event: SyncEvent| {
            if let Some(tx) = events {
                tx.send(event).ok();
            }
        };

        // 1. Validate
        self.check_unique_names()?;

        // 2. Reconcile
        let mut report = UpdateReport {
            album: self.name.clone(),
            ..UpdateReport::default()
        };
        report.removed = self.drop_missing();
        report.added = self.append_new(pipeline)?;
        // A new file can collide with an existing custom name
        self.check_unique_names()?;
        self.resolve_copyrights(pipeline);
        info!(album = %self.name, photos = self.photos.len(), "found photos in manifest and photo dir");

        // 3. Cover
        for photo in &mut self.photos {
            photo.is_cover = self.coverimage.as_deref() == Some(photo.file.as_str());
        }

        // 4. Staleness
        let mut fingerprints = Vec::with_capacity(self.photos.len());
        let mut stale = Vec::new();
        let mut cover_stamp = None;
        for (idx, photo) in self.photos.iter_mut().enumerate() {
            let fp = hash_file(&photo.source).map_err(|source| AlbumError::Fingerprint {
                album: self.name.clone(),
                file: photo.file.clone(),
                source,
            })?;
            let photo_error = |source| AlbumError::Photo {
                album: self.name.clone(),
                source,
            };
            let complete = photo.has_all_derivatives(pipeline).map_err(photo_error)?;
            let mut cover_current = true;
            if photo.is_cover && complete {
                let stamp = CoverStamp::for_photo(photo, &fp, pipeline).map_err(photo_error)?;
                cover_current = stamp.as_ref().is_none_or(CoverStamp::is_current);
                cover_stamp = stamp;
            }
            if !complete || !cover_current || self.ledger.differs(&photo.file, &fp) {
                debug!(album = %self.name, photo = %photo.file, complete, cover_current, "stale");
                stale.push(idx);
            }
            fingerprints.push(fp);
        }
        send(SyncEvent::AlbumStarted {
            album: self.name.clone(),
            photos: self.photos.len(),
            stale: stale.len(),
        });

        // 5. Regenerate
        report.regenerated = self.regenerate(&stale, pipeline, events)?;
        self.stamp_cover(cover_stamp, &fingerprints, pipeline)?;

        // 6. Markdown
        let md_path = self.markdown_path(settings)?;
        let md = self.render_markdown(pipeline)?;
        if let Some(parent) = md_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&md_path, md)?;
        info!(album = %self.name, path = %md_path.display(), "written markdown file");
        send(SyncEvent::MarkdownWritten {
            album: self.name.clone(),
            path: md_path,
        });

        // 7. Manifest
        let mut ledger = HashLedger::new();
        for (photo, fp) in self.photos.iter().zip(&fingerprints) {
            ledger.insert(photo.file.clone(), fp.clone());
        }
        self.ledger = ledger;
        self.save_with_hashes(&fingerprints)?;
        send(SyncEvent::ManifestWritten {
            album: self.name.clone(),
            path: self.manifest_path.clone(),
        });

        Ok(report)
    }

    /// Remove entries whose source file no longer exists.
    fn drop_missing(&mut self) -> Vec<String> {
        let (kept, gone): (Vec<Photo>, Vec<Photo>) = std::mem::take(&mut self.photos)
            .into_iter()
            .partition(|p| p.source.is_file());
        self.photos = kept;
        gone.into_iter()
            .map(|p| {
                info!(album = %self.name, photo = %p.file, "source removed, dropping photo");
                p.file
            })
            .collect()
    }

    /// Append photos found on disk but not in the manifest, sorted by filename.
    fn append_new(&mut self, pipeline: &Pipeline<'_>) -> Result<Vec<String>, AlbumError> {
        let settings = pipeline.settings;
        let known: BTreeSet<&str> = self.photos.iter().map(|p| p.file.as_str()).collect();
        let mut missing: Vec<String> = list_photo_files(&self.photo_dir(settings))?
            .into_iter()
            .filter(|f| !known.contains(f.as_str()))
            .collect();
        missing.sort();

        let photo_dir = self.photo_dir(settings);
        let output_root = self.output_root(settings)?;
        for file in &missing {
            let mut photo = Photo::new(file.clone(), photo_dir.join(file), output_root.clone());
            photo.name = Some(file.clone());
            let tag_map = &settings.tag_map;
            if !tag_map.caption.is_empty() || !tag_map.alt.is_empty() {
                if let Some(fields) = self.metadata_fields(&photo, pipeline) {
                    photo.caption = fields.caption;
                    photo.alt = fields.alt;
                }
            }
            debug!(album = %self.name, photo = %file, "new photo");
            self.photos.push(photo);
        }
        Ok(missing)
    }

    /// Photo copyright from the tag map. `None` falls back to the album's.
    fn resolve_copyrights(&mut self, pipeline: &Pipeline<'_>) {
        if pipeline.settings.tag_map.copyright.is_empty() {
            return;
        }
        let resolved: Vec<Option<String>> = self
            .photos
            .iter()
            .map(|p| self.metadata_fields(p, pipeline).and_then(|f| f.copyright))
            .collect();
        for (photo, copyright) in self.photos.iter_mut().zip(resolved) {
            photo.copyright = copyright;
        }
    }

    fn metadata_fields(&self, photo: &Photo, pipeline: &Pipeline<'_>) -> Option<MetadataFields> {
        match pipeline.backend.read_metadata(&photo.source) {
            Ok(meta) => Some(extract_fields(&meta, pipeline.settings)),
            Err(e) => {
                warn!(album = %self.name, photo = %photo.file, error = %e, "unreadable metadata");
                None
            }
        }
    }

    /// Regenerate the photos at `indices` in parallel. Results are reported
    /// in filename order and the first failure in that order wins.
    fn regenerate(
        &mut self,
        indices: &[usize],
        pipeline: &Pipeline<'_>,
        events: Option<&Sender<SyncEvent>>,
    ) -> Result<Vec<String>, AlbumError> {
        let wanted: BTreeSet<usize> = indices.iter().copied().collect();
        let mut targets: Vec<&mut Photo> = self
            .photos
            .iter_mut()
            .enumerate()
            .filter(|(idx, _)| wanted.contains(idx))
            .map(|(_, photo)| photo)
            .collect();
        targets.sort_by(|a, b| a.file.cmp(&b.file));

        let album = self.name.as_str();
        let results: Vec<Result<String, PhotoError>> = targets
            .into_par_iter()
            .map(|photo| {
                let result = photo.regenerate(pipeline);
                photo.release();
                let derivatives = result?;
                if let Some(tx) = events {
                    tx.send(SyncEvent::PhotoRegenerated {
                        album: album.to_string(),
                        file: photo.file.clone(),
                        derivatives: derivatives.into_iter().map(|d| d.path).collect(),
                    })
                    .ok();
                }
                Ok(photo.file.clone())
            })
            .collect();

        let mut regenerated = Vec::with_capacity(results.len());
        for result in results {
            regenerated.push(result.map_err(|e| self.photo_error(e))?);
        }
        Ok(regenerated)
    }

    /// Record what the cover was rendered from, once it is on disk.
    fn stamp_cover(
        &mut self,
        stamp: Option<CoverStamp>,
        fingerprints: &[Fingerprint],
        pipeline: &Pipeline<'_>,
    ) -> Result<(), AlbumError> {
        let stamp = match stamp {
            Some(stamp) => Some(stamp),
            None => match self.photos.iter().position(|p| p.is_cover) {
                Some(idx) => CoverStamp::for_photo(&mut self.photos[idx], &fingerprints[idx], pipeline)
                    .map_err(|e| self.photo_error(e))?,
                None => None,
            },
        };
        if let Some(stamp) = stamp.filter(|s| !s.is_current()) {
            fs::write(&stamp.path, &stamp.contents)?;
            debug!(album = %self.name, path = %stamp.path.display(), "cover stamp written");
        }
        Ok(())
    }

    /// Full markdown text for the current photo list.
    pub fn render_markdown(&mut self, pipeline: &Pipeline<'_>) -> Result<String, AlbumError> {
        let copyright = self.copyright.clone();
        let mut embeds = Vec::with_capacity(self.photos.len());
        let mut cover_url = None;
        for idx in 0..self.photos.len() {
            let photo = &mut self.photos[idx];
            let embed = photo.embed(pipeline, copyright.as_deref());
            let cover = if photo.is_cover {
                photo.derivative(SizeMode::Cover, pipeline)
            } else {
                Ok(None)
            };
            let embed = embed.map_err(|e| self.photo_error(e))?;
            if let Some(d) = cover.map_err(|e| self.photo_error(e))? {
                cover_url = Some(derivative_url(pipeline.settings, &d.path));
            }
            embeds.push(embed);
        }
        let front = FrontMatter {
            title: &self.title,
            date: self.album_date.as_deref(),
            properties: &self.properties,
            cover_url: cover_url.as_deref(),
        };
        Ok(markdown::render(&front, &embeds))
    }

    fn to_doc(&self, hashes: Vec<HashEntry>) -> ManifestDoc {
        ManifestDoc {
            title: self.title.clone(),
            album_date: self.album_date.clone(),
            properties: self.properties.clone(),
            copyright: self.copyright.clone(),
            coverimage: self.coverimage.clone(),
            creation_time: self.creation_time.clone(),
            modification_time: self.modification_time.clone(),
            photos: self
                .photos
                .iter()
                .map(|p| PhotoEntry {
                    file: p.file.clone(),
                    name: p.name.clone(),
                    alt: p.alt.clone(),
                    caption: p.caption.clone(),
                })
                .collect(),
            hashes,
        }
    }

    fn save_with_hashes(&mut self, fingerprints: &[Fingerprint]) -> Result<(), AlbumError> {
        let hashes = self
            .photos
            .iter()
            .zip(fingerprints)
            .map(|(p, fp)| HashEntry {
                file: p.file.clone(),
                hash: fp.tagged(),
            })
            .collect();
        self.write_doc(hashes)
    }

    /// Write the manifest without touching derivatives, keeping the current
    /// hash ledger for photos that are still listed.
    pub fn save(&mut self) -> Result<(), AlbumError> {
        let hashes = self
            .photos
            .iter()
            .filter_map(|p| {
                self.ledger.get(&p.file).map(|fp| HashEntry {
                    file: p.file.clone(),
                    hash: fp.tagged(),
                })
            })
            .collect();
        self.write_doc(hashes)
    }

    /// Backup and write. `modification_time` moves only if the content changed.
    fn write_doc(&mut self, hashes: Vec<HashEntry>) -> Result<(), AlbumError> {
        let mut doc = self.to_doc(hashes);
        if doc != self.loaded {
            doc.modification_time = Some(now_timestamp());
            self.modification_time = doc.modification_time.clone();
        }
        doc.write(&self.manifest_path)?;
        self.loaded = doc;
        Ok(())
    }
}

/// Regular, visible, supported image files directly inside `dir`.
/// A missing directory holds no photos.
fn list_photo_files(dir: &Path) -> Result<Vec<String>, AlbumError> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "photo directory missing");
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || !is_supported_image(&path) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "skipping non-UTF-8 filename");
            continue;
        };
        if !naming::is_hidden(name) {
            files.push(name.to_string());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::{BuiltinCropper, ImageMetadata, SizeSpec};
    use crate::test_helpers::*;
    use std::sync::{Mutex, mpsc};

    struct Env {
        ws: TestWorkspace,
        settings: Settings,
        backend: MockBackend,
        cropper: BuiltinCropper,
    }

    impl Env {
        fn new() -> Self {
            let ws = TestWorkspace::new();
            let settings = ws.settings();
            Self {
                ws,
                settings,
                backend: MockBackend::uniform(1800, 1170),
                cropper: BuiltinCropper::new(true),
            }
        }

        fn pipeline(&self) -> Pipeline<'_> {
            Pipeline {
                settings: &self.settings,
                backend: &self.backend,
                cropper: &self.cropper,
            }
        }

        fn load(&self, name: &str) -> Album {
            Album::load(&self.ws.album_dir(name), &self.settings)
                .unwrap()
                .unwrap()
        }

        fn update(&self, name: &str) -> UpdateReport {
            self.load(name).update(&self.pipeline(), None).unwrap()
        }
    }

    // =========================================================================
    // loading
    // =========================================================================

    #[test]
    fn directory_without_manifest_is_not_an_album() {
        let env = Env::new();
        fs::create_dir_all(env.ws.album_dir("misc")).unwrap();
        assert!(
            Album::load(&env.ws.album_dir("misc"), &env.settings)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn missing_name_falls_back_to_filename() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg"], None);
        env.ws.set_photos("dogs", &[("dog-1.jpg", None)]);
        let album = env.load("dogs");
        assert_eq!(album.photos[0].name.as_deref(), Some("dog-1.jpg"));
    }

    #[test]
    fn caption_and_alt_trimmed_on_load() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg"], None);
        let path = env.ws.album_dir("dogs").join("album.yml");
        let mut doc = ManifestDoc::load(&path).unwrap();
        doc.photos = vec![PhotoEntry {
            file: "dog-1.jpg".into(),
            name: Some("dog".into()),
            alt: Some("  alt  ".into()),
            caption: Some("\ncaption \n".into()),
        }];
        doc.write(&path).unwrap();

        let album = env.load("dogs");
        assert_eq!(album.photos[0].alt.as_deref(), Some("alt"));
        assert_eq!(album.photos[0].caption.as_deref(), Some("caption"));
    }

    // =========================================================================
    // update
    // =========================================================================

    #[test]
    fn first_update_discovers_and_regenerates_everything() {
        let env = Env::new();
        env.ws
            .add_album("dogs", &["dog-2.jpg", "dog-1.jpg", "dog-3.jpg"], Some("dog-1.jpg"));

        let report = env.update("dogs");
        assert_eq!(report.added, vec!["dog-1.jpg", "dog-2.jpg", "dog-3.jpg"]);
        assert_eq!(report.regenerated, report.added);
        assert!(report.removed.is_empty());

        let album = env.load("dogs");
        let files: Vec<_> = album.photos.iter().map(|p| p.file.as_str()).collect();
        assert_eq!(files, vec!["dog-1.jpg", "dog-2.jpg", "dog-3.jpg"]);
        assert_eq!(album.ledger.len(), 3);
        assert!(album.modification_time.is_some());

        let outputs = env.ws.list_files("output/dogs");
        assert_eq!(outputs.len(), 11);
        assert!(outputs.contains(&"coverimage.jpg".to_string()));
        assert!(outputs.contains(&".coverimage.jpg.source".to_string()));
        assert!(env.ws.root().join("markdown/dogs.md").is_file());
    }

    #[test]
    fn second_update_is_a_no_op() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], Some("dog-1.jpg"));
        env.update("dogs");
        let manifest = fs::read(env.ws.album_dir("dogs").join("album.yml")).unwrap();
        let md = fs::read(env.ws.root().join("markdown/dogs.md")).unwrap();
        let ops_before = env.backend.written_outputs().len();

        let report = env.update("dogs");
        assert!(report.regenerated.is_empty());
        assert_eq!(env.backend.written_outputs().len(), ops_before);
        assert_eq!(
            fs::read(env.ws.album_dir("dogs").join("album.yml")).unwrap(),
            manifest
        );
        assert_eq!(fs::read(env.ws.root().join("markdown/dogs.md")).unwrap(), md);
    }

    #[test]
    fn changed_source_is_regenerated_alone() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], None);
        env.update("dogs");
        let before = env.load("dogs").ledger;

        fs::write(env.ws.photo_path("dogs", "dog-2.jpg"), jpeg_bytes(120, 80, 7)).unwrap();
        let report = env.update("dogs");
        assert_eq!(report.regenerated, vec!["dog-2.jpg"]);

        let after = env.load("dogs").ledger;
        assert_eq!(after.get("dog-1.jpg"), before.get("dog-1.jpg"));
        assert_ne!(after.get("dog-2.jpg"), before.get("dog-2.jpg"));
    }

    #[test]
    fn missing_derivative_makes_photo_stale() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], None);
        env.update("dogs");
        let thumb = env
            .ws
            .list_files("output/dogs/thumb")
            .into_iter()
            .find(|f| f.starts_with("dog-1"))
            .unwrap();
        fs::remove_file(env.ws.root().join("output/dogs/thumb").join(thumb)).unwrap();

        let report = env.update("dogs");
        assert_eq!(report.regenerated, vec!["dog-1.jpg"]);
    }

    fn set_cover(env: &Env, album: &str, cover: &str) {
        let path = env.ws.album_dir(album).join("album.yml");
        let mut doc = ManifestDoc::load(&path).unwrap();
        doc.coverimage = Some(cover.into());
        doc.write(&path).unwrap();
    }

    fn cover_stamp(env: &Env) -> String {
        fs::read_to_string(env.ws.root().join("output/dogs/.coverimage.jpg.source")).unwrap()
    }

    #[test]
    fn moved_cover_is_regenerated() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], Some("dog-1.jpg"));
        env.update("dogs");
        assert!(cover_stamp(&env).starts_with("dog-1.jpg sha256:"));

        set_cover(&env, "dogs", "dog-2.jpg");
        let report = env.update("dogs");
        assert_eq!(report.regenerated, vec!["dog-2.jpg"]);
        assert!(cover_stamp(&env).starts_with("dog-2.jpg sha256:"));
        assert!(cover_stamp(&env).ends_with(" 600x600\n"));

        let report = env.update("dogs");
        assert!(report.regenerated.is_empty());
    }

    #[test]
    fn resized_cover_is_regenerated() {
        let mut env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], Some("dog-1.jpg"));
        env.update("dogs");

        env.settings.dim_max_cover = SizeSpec::Exact {
            width: 300,
            height: 200,
        };
        let report = env.update("dogs");
        assert_eq!(report.regenerated, vec!["dog-1.jpg"]);
        assert!(cover_stamp(&env).ends_with(" 300x200\n"));
    }

    #[test]
    fn cover_without_stamp_is_regenerated_once() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg"], Some("dog-1.jpg"));
        env.update("dogs");
        fs::remove_file(env.ws.root().join("output/dogs/.coverimage.jpg.source")).unwrap();

        assert_eq!(env.update("dogs").regenerated, vec!["dog-1.jpg"]);
        assert!(env.update("dogs").regenerated.is_empty());
    }

    #[test]
    fn deleted_source_drops_from_manifest_and_ledger() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], None);
        env.update("dogs");
        fs::remove_file(env.ws.photo_path("dogs", "dog-2.jpg")).unwrap();

        let report = env.update("dogs");
        assert_eq!(report.removed, vec!["dog-2.jpg"]);
        let album = env.load("dogs");
        assert_eq!(album.photos.len(), 1);
        assert!(album.ledger.get("dog-2.jpg").is_none());
        let md = fs::read_to_string(env.ws.root().join("markdown/dogs.md")).unwrap();
        assert!(!md.contains("dog-2"));
    }

    #[test]
    fn duplicate_names_abort_without_writes() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], None);
        env.ws
            .set_photos("dogs", &[("dog-1.jpg", Some("Rex")), ("dog-2.jpg", Some("Rex"))]);
        let before = snapshot(env.ws.root());

        let err = env.load("dogs").update(&env.pipeline(), None).unwrap_err();
        assert!(matches!(err, AlbumError::DuplicateNames { ref names, .. } if names == &["Rex"]));
        assert_eq!(snapshot(env.ws.root()), before);
        assert!(env.backend.get_operations().is_empty());
    }

    #[test]
    fn names_differing_only_by_extension_collide() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog.jpg", "Dog.png"], None);
        let err = env.load("dogs").update(&env.pipeline(), None).unwrap_err();
        assert!(matches!(
            err,
            AlbumError::DuplicateNames { ref names, .. } if names == &["Dog.png", "dog.jpg"]
        ));
    }

    #[test]
    fn new_file_colliding_with_custom_name_aborts() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], None);
        env.ws.set_photos("dogs", &[("dog-1.jpg", Some("dog-2.jpg"))]);
        let before = snapshot(env.ws.root());

        let err = env.load("dogs").update(&env.pipeline(), None).unwrap_err();
        assert!(matches!(err, AlbumError::DuplicateNames { .. }));
        assert_eq!(snapshot(env.ws.root()), before);
    }

    #[test]
    fn hidden_and_unsupported_files_are_ignored() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg"], None);
        let photos = env.ws.album_dir("dogs").join("photos");
        fs::write(photos.join(".hidden.jpg"), jpeg_bytes(8, 8, 0)).unwrap();
        fs::write(photos.join("notes.txt"), "hi").unwrap();
        fs::create_dir(photos.join("sub.jpg")).unwrap();

        let report = env.update("dogs");
        assert_eq!(report.added, vec!["dog-1.jpg"]);
    }

    #[test]
    fn manifest_order_is_preserved_and_new_files_appended() {
        let env = Env::new();
        env.ws.add_album("dogs", &["a.jpg", "b.jpg", "c.jpg"], None);
        env.ws.set_photos("dogs", &[("c.jpg", Some("c")), ("a.jpg", Some("a"))]);

        let report = env.update("dogs");
        assert_eq!(report.added, vec!["b.jpg"]);
        assert_eq!(report.regenerated, vec!["a.jpg", "b.jpg", "c.jpg"]);
        let album = env.load("dogs");
        let files: Vec<_> = album.photos.iter().map(|p| p.file.as_str()).collect();
        assert_eq!(files, vec!["c.jpg", "a.jpg", "b.jpg"]);
    }

    #[test]
    fn backup_written_before_manifest() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg"], None);
        let original = fs::read(env.ws.album_dir("dogs").join("album.yml")).unwrap();
        env.update("dogs");
        assert_eq!(
            fs::read(env.ws.album_dir("dogs").join("album.yml.bak")).unwrap(),
            original
        );
    }

    #[test]
    fn new_photos_seeded_from_metadata() {
        let mut env = Env::new();
        env.backend = MockBackend {
            fallback_dimensions: Some(crate::imaging::Dimensions {
                width: 400,
                height: 300,
            }),
            metadata_results: Mutex::new(vec![ImageMetadata {
                orientation: None,
                exif: BTreeMap::from([("ImageDescription".into(), "From EXIF".into())]),
                iptc: BTreeMap::from([("ObjectName".into(), "Title".into())]),
            }]),
            ..MockBackend::default()
        };
        env.ws.add_album("dogs", &["dog-1.jpg"], None);

        env.update("dogs");
        let album = env.load("dogs");
        assert_eq!(album.photos[0].caption.as_deref(), Some("From EXIF"));
        assert_eq!(album.photos[0].alt.as_deref(), Some("Title"));
    }

    #[test]
    fn existing_entries_are_not_reseeded() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg"], None);
        env.ws.set_photos("dogs", &[("dog-1.jpg", Some("dog"))]);
        env.update("dogs");
        assert!(
            !env.backend
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::ReadMetadata(_)))
        );
    }

    #[test]
    fn events_cover_every_stage() {
        let env = Env::new();
        env.ws.add_album("dogs", &["dog-1.jpg", "dog-2.jpg"], None);
        let (tx, rx) = mpsc::channel();
        env.load("dogs").update(&env.pipeline(), Some(&tx)).unwrap();
        drop(tx);
        let events: Vec<SyncEvent> = rx.into_iter().collect();

        assert!(matches!(
            events.first(),
            Some(SyncEvent::AlbumStarted { photos: 2, stale: 2, .. })
        ));
        let regenerated = events
            .iter()
            .filter(|e| matches!(e, SyncEvent::PhotoRegenerated { .. }))
            .count();
        assert_eq!(regenerated, 2);
        assert!(matches!(events[events.len() - 2], SyncEvent::MarkdownWritten { .. }));
        assert!(matches!(events.last(), Some(SyncEvent::ManifestWritten { .. })));
    }

    #[test]
    fn create_writes_timestamped_empty_manifest() {
        let env = Env::new();
        let dir = env.ws.album_dir("fresh");
        fs::create_dir_all(&dir).unwrap();
        let mut album = Album::create(&dir, &env.settings, "2024-05-05T12:00:00+00:00".into()).unwrap();
        album.save().unwrap();

        let doc = ManifestDoc::load(&dir.join("album.yml")).unwrap();
        assert_eq!(doc.creation_time.as_deref(), Some("2024-05-05T12:00:00+00:00"));
        assert!(doc.photos.is_empty());
        assert!(doc.modification_time.is_some());
    }
}
