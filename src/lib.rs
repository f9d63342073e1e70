//! # albumsync
//!
//! Incremental photo album builder for Hugo sites using PhotoSwipe.
//! A directory of source photos plus a small YAML manifest becomes a set of
//! resized JPEG derivatives and one markdown fragment full of
//! `{{< photo >}}` shortcodes.
//!
//! # Architecture: Workspace → Album → Photo
//!
//! ```text
//! Workspace   albumsync.toml + every subdirectory holding an album.yml
//!   Album     manifest, photo list, hash ledger, markdown fragment
//!     Photo   source file, display name, derivatives (large/small/thumb/cover)
//! ```
//!
//! An update pass per album:
//!
//! ```text
//! album.yml + photos/  →  reconcile  →  stale set  →  derivatives
//!                                                  →  <album>.md
//!                                                  →  album.yml (+ .bak)
//! ```
//!
//! Staleness is decided by content, not timestamps: a photo is regenerated
//! when a derivative is missing or its SHA-256 differs from the ledger in
//! the manifest. Running `update` twice in a row does nothing the second
//! time.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`workspace`] | Album discovery, `new`, `update` and `clean` across albums |
//! | [`album`] | One album's reconcile, staleness and regeneration pass |
//! | [`photo`] | Per-photo derivative targets, regeneration and shortcode data |
//! | [`manifest`] | `album.yml` schema, load, backup-then-write |
//! | [`markdown`] | The generated markdown fragment |
//! | [`fingerprint`] | SHA-256 content fingerprints and the hash ledger |
//! | [`config`] | `albumsync.toml` loading, migration, validation |
//! | [`metadata`] | EXIF/IPTC filtering and tag-to-field mapping |
//! | [`naming`] | Derivative filenames, album directory names, URLs |
//! | [`imaging`] | Pure-Rust decode, resize, smart crop and JPEG encode |
//! | [`output`] | CLI output formatting and the confirmation prompt |
//!
//! # Design Decisions
//!
//! ## Manifest As Ledger
//!
//! The hash ledger lives inside `album.yml` rather than in a separate cache
//! file. The manifest is already the album's single source of truth and is
//! already rewritten on every update, so keeping the two together means
//! there is nothing else to get out of sync. A backup copy is taken before
//! each rewrite.
//!
//! ## Pluggable Backends
//!
//! Image work goes through the [`imaging::ImageBackend`] trait and cropping
//! through [`imaging::SmartCrop`]. Tests swap in a recording mock so album
//! logic runs without decoding a single pixel; a real end-to-end run uses
//! [`imaging::RustBackend`], which has no system dependencies.

pub mod album;
pub mod config;
pub mod fingerprint;
pub mod imaging;
pub mod manifest;
pub mod markdown;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod photo;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;
