//! Content fingerprints and the per-album hash ledger.
//!
//! A [`Fingerprint`] is the lowercase hex SHA-256 of a file's raw bytes.
//! It is the only representation used in memory; on disk it is written
//! with an algorithm tag, `sha256:<hex>`.
//!
//! The [`HashLedger`] records, per photo filename, the fingerprint the
//! source had when its derivatives were last written. It is purely a
//! staleness oracle: a photo whose current fingerprint differs from its
//! ledger entry (or has none) gets regenerated.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::warn;

/// Algorithm tag written in front of persisted digests.
pub const ALGORITHM: &str = "sha256";

/// Read block size for hashing.
const BLOCK_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Persisted form, `sha256:<hex>`.
    pub fn tagged(&self) -> String {
        format!("{ALGORITHM}:{}", self.0)
    }

    /// Parse a persisted digest.
    ///
    /// Accepts `sha256:<hex>` and bare `<hex>`. Any other algorithm tag, or
    /// a value that is not 64 hex digits, yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let hex = match raw.split_once(':') {
            Some((tag, hex)) if tag.eq_ignore_ascii_case(ALGORITHM) => hex,
            Some(_) => return None,
            None => raw,
        };
        if hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(hex.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash everything a reader yields, `block_size` bytes at a time.
pub fn hash_reader<R: Read>(mut reader: R, block_size: usize) -> io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; block_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// SHA-256 of a file's contents, streamed in 64 KiB blocks.
pub fn hash_file(path: &Path) -> io::Result<Fingerprint> {
    hash_reader(File::open(path)?, BLOCK_SIZE)
}

/// Filename → fingerprint recorded at the last successful update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashLedger {
    entries: BTreeMap<String, Fingerprint>,
}

impl HashLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted `(file, hash)` pairs. Unparseable hashes are
    /// dropped with a warning, which makes that photo stale.
    pub fn from_persisted<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .filter_map(|(file, raw)| match Fingerprint::parse(raw) {
                Some(fp) => Some((file.to_string(), fp)),
                None => {
                    warn!(file, hash = raw, "ignoring unrecognised ledger hash");
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, file: &str) -> Option<&Fingerprint> {
        self.entries.get(file)
    }

    pub fn insert(&mut self, file: impl Into<String>, fingerprint: Fingerprint) {
        self.entries.insert(file.into(), fingerprint);
    }

    /// True when `current` differs from the recorded fingerprint or no
    /// fingerprint was recorded.
    pub fn differs(&self, file: &str, current: &Fingerprint) -> bool {
        self.entries.get(file) != Some(current)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
