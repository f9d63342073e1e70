//! The collection of albums in a working directory.
//!
//! Every direct subdirectory of the workspace root that holds an album
//! manifest is an album, addressed by its directory name. Directories
//! without a manifest are skipped with a warning.
//!
//! ```text
//! site-photos/
//! ├── albumsync.toml
//! ├── dogs/
//! │   ├── album.yml
//! │   └── photos/
//! │       ├── dog-1.jpg
//! │       └── dog-2.jpg
//! └── cats/
//!     ├── album.yml
//!     └── photos/
//! ```
//!
//! Operations take a [`Target`]: one album by exact name, or all of them.
//! Albums own disjoint directories and are updated one after another;
//! parallelism happens inside an album.

use crate::album::{Album, AlbumError, SyncEvent, UpdateReport, now_timestamp};
use crate::config::{ConfigError, Settings, SmartCropBackend, load_settings};
use crate::imaging::{BuiltinCropper, ExternalCropper, ImageBackend, RustBackend, SmartCrop};
use crate::naming;
use crate::photo::Pipeline;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Album(#[from] AlbumError),
    #[error("no album named '{0}'")]
    UnknownAlbum(String),
    #[error("can't create album {}, it exists already", .0.display())]
    AlbumExists(PathBuf),
    #[error("'{0}' can't be used as an album name")]
    InvalidName(String),
}

impl WorkspaceError {
    /// Errors caused by what the user asked for rather than by the system.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownAlbum(_)
                | Self::AlbumExists(_)
                | Self::InvalidName(_)
                | Self::Config(ConfigError::Missing(_) | ConfigError::AlreadyExists(_))
        )
    }
}

/// Which albums an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Named(String),
}

impl Target {
    pub fn from_arg(name: Option<String>) -> Self {
        match name {
            Some(name) => Self::Named(name),
            None => Self::All,
        }
    }
}

/// Result of a bulk update: reports for albums that succeeded and errors
/// for those that didn't.
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub reports: Vec<UpdateReport>,
    pub failures: Vec<(String, AlbumError)>,
}

/// Albums picked by a [`Target`].
#[derive(Debug, Default)]
pub struct Selection {
    pub albums: Vec<Album>,
    /// Albums whose manifest failed to load, by directory name.
    pub unreadable: Vec<(String, AlbumError)>,
}

/// What `clean` did for one album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanOutcome {
    /// Nothing generated exists.
    NothingToRemove { album: String },
    Removed { album: String, paths: Vec<PathBuf> },
    Declined { album: String },
    /// The manifest couldn't be loaded; nothing was touched.
    Unreadable { album: String },
}

/// The smart-crop implementation selected in settings.
pub fn cropper_for(settings: &Settings) -> Result<Box<dyn SmartCrop>, ConfigError> {
    match settings.smartcrop_backend {
        SmartCropBackend::Builtin => Ok(Box::new(BuiltinCropper::new(settings.fast))),
        SmartCropBackend::External => settings
            .smartcrop_path
            .as_ref()
            .map(|path| Box::new(ExternalCropper::new(path)) as Box<dyn SmartCrop>)
            .ok_or_else(|| {
                ConfigError::Validation(
                    "external smart crop requested but smartcrop_path not set".into(),
                )
            }),
    }
}

#[derive(Debug)]
pub struct Workspace {
    pub root: PathBuf,
    pub settings: Settings,
}

impl Workspace {
    /// A workspace with validated settings.
    pub fn new(root: impl Into<PathBuf>, settings: Settings) -> Result<Self, WorkspaceError> {
        settings.validate()?;
        Ok(Self {
            root: root.into(),
            settings,
        })
    }

    /// Load `albumsync.toml` from `root`.
    pub fn open(root: &Path) -> Result<Self, WorkspaceError> {
        let settings = load_settings(root)?;
        Self::new(root, settings)
    }

    /// Candidate album directories, sorted. Hidden directories and the
    /// configured markdown and output directories are never albums.
    fn album_dirs(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let excluded: Vec<&Path> = [
            self.settings.markdown_dir.as_deref(),
            self.settings.output_dir.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() || excluded.iter().any(|ex| same_dir(ex, &path)) {
                continue;
            }
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_none_or(naming::is_hidden);
            if !hidden {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Load one candidate directory. `None` when it isn't an album.
    fn load_dir(&self, dir: &Path) -> Option<(String, Result<Album, AlbumError>)> {
        let name = dir.file_name()?.to_string_lossy().to_string();
        match Album::load(dir, &self.settings) {
            Ok(Some(album)) => Some((name, Ok(album))),
            Ok(None) => None,
            Err(e) => Some((name, Err(e))),
        }
    }

    /// Every readable album in the workspace, sorted by name. Albums whose
    /// manifest can't be loaded are logged and left out.
    pub fn albums(&self) -> Result<Vec<Album>, WorkspaceError> {
        Ok(self.select(&Target::All)?.albums)
    }

    /// Albums addressed by `target`.
    ///
    /// For [`Target::All`] an unreadable album is reported in
    /// [`Selection::unreadable`] and the rest still load. A named album is
    /// the only one loaded; an unknown name or a load failure is an error.
    pub fn select(&self, target: &Target) -> Result<Selection, WorkspaceError> {
        let dirs = self.album_dirs()?;
        let mut selection = Selection::default();
        match target {
            Target::All => {
                for (name, loaded) in dirs.iter().filter_map(|d| self.load_dir(d)) {
                    match loaded {
                        Ok(album) => selection.albums.push(album),
                        Err(e) => {
                            error!(album = %name, "can't load album: {e}");
                            selection.unreadable.push((name, e));
                        }
                    }
                }
            }
            Target::Named(name) => {
                let loaded = dirs
                    .iter()
                    .find(|d| d.file_name().and_then(|n| n.to_str()) == Some(name.as_str()))
                    .and_then(|d| self.load_dir(d));
                match loaded {
                    Some((_, Ok(album))) => selection.albums.push(album),
                    Some((_, Err(e))) => return Err(e.into()),
                    None => return Err(WorkspaceError::UnknownAlbum(name.clone())),
                }
            }
        }
        Ok(selection)
    }

    /// Create `<root>/<name>/` with its photo directory and a manifest that
    /// holds only a title and creation time.
    pub fn new_album(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        let dir_name =
            naming::album_dir_name(name).ok_or_else(|| WorkspaceError::InvalidName(name.into()))?;
        let dir = self.root.join(&dir_name);
        if dir.exists() {
            return Err(WorkspaceError::AlbumExists(dir));
        }
        fs::create_dir_all(dir.join(&self.settings.photo_dir))?;

        let mut album = Album::create(&dir, &self.settings, now_timestamp())?;
        album.title = name.trim().to_string();
        album.save()?;
        info!(album = %dir_name, "new album created");
        Ok(dir)
    }

    /// Update the targeted albums with the production image backend.
    pub fn update(
        &self,
        target: &Target,
        events: Option<&Sender<SyncEvent>>,
    ) -> Result<UpdateOutcome, WorkspaceError> {
        self.update_with_backend(target, &RustBackend::new(), events)
    }

    /// Update the targeted albums with a specific backend (allows testing
    /// with a mock).
    pub fn update_with_backend(
        &self,
        target: &Target,
        backend: &dyn ImageBackend,
        events: Option<&Sender<SyncEvent>>,
    ) -> Result<UpdateOutcome, WorkspaceError> {
        let cropper = cropper_for(&self.settings)?;
        let pipeline = Pipeline {
            settings: &self.settings,
            backend,
            cropper: cropper.as_ref(),
        };

        let selection = self.select(target)?;
        let mut outcome = UpdateOutcome {
            failures: selection.unreadable,
            ..UpdateOutcome::default()
        };
        for mut album in selection.albums {
            info!(album = %album.name, "updating album");
            match album.update(&pipeline, events) {
                Ok(report) => outcome.reports.push(report),
                Err(e) => {
                    error!(album = %album.name, "{e}");
                    outcome.failures.push((album.name.clone(), e));
                }
            }
        }
        Ok(outcome)
    }

    /// Remove each targeted album's markdown file and derivative directory.
    ///
    /// `confirm` is asked once per album that has something to remove,
    /// unless `force` is set. Source photos and manifests are never touched.
    pub fn clean(
        &self,
        target: &Target,
        force: bool,
        mut confirm: impl FnMut(&str) -> bool,
    ) -> Result<Vec<CleanOutcome>, WorkspaceError> {
        let selection = self.select(target)?;
        let mut outcomes: Vec<CleanOutcome> = selection
            .unreadable
            .into_iter()
            .map(|(album, _)| CleanOutcome::Unreadable { album })
            .collect();
        for album in selection.albums {
            let markdown = album.markdown_path(&self.settings)?;
            let output = album.output_root(&self.settings)?;
            let existing: Vec<PathBuf> = [markdown, output]
                .into_iter()
                .filter(|p| p.exists())
                .collect();

            if existing.is_empty() {
                outcomes.push(CleanOutcome::NothingToRemove { album: album.name });
                continue;
            }

            let listed = existing
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" and ");
            if !force && !confirm(&format!("Going to remove: {listed}. Is this okay?")) {
                outcomes.push(CleanOutcome::Declined { album: album.name });
                continue;
            }

            for path in &existing {
                if path.is_dir() {
                    fs::remove_dir_all(path)?;
                } else {
                    fs::remove_file(path)?;
                }
            }
            info!(album = %album.name, "cleaned");
            outcomes.push(CleanOutcome::Removed {
                album: album.name,
                paths: existing,
            });
        }
        Ok(outcomes)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
