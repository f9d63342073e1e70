//! Embedded metadata as a fallback source for photo fields.
//!
//! A photo's caption, alt text and copyright can be typed into the album
//! manifest by hand. When they aren't, the values are looked up in the
//! source image's embedded EXIF and IPTC tags.
//!
//! ## Tag sources
//!
//! A source names one tag in one namespace:
//!
//! - `exif:ImageDescription`, `exif:Copyright`, `exif:Artist`, ...
//! - `iptc:Caption-Abstract`, `iptc:ObjectName`, `iptc:CopyrightNotice`, ...
//!
//! The `[tag_map]` settings table lists sources per field. The first source
//! with a non-empty value wins.
//!
//! ## Filtering
//!
//! `[exif]` and `[iptc]` include/exclude lists are applied before lookup. An
//! empty include list keeps every tag; exclude always wins. A tag removed by
//! a filter is invisible to the tag map.
//!
//! ## Resolution priority
//!
//! - **Caption / alt**: manifest value → tag map → none. Only seeded for photos
//!   newly discovered during reconcile; existing entries are never rewritten.
//! - **Copyright**: tag map → album copyright. Resolved on every load.

use crate::config::{Settings, TagFilter};
use crate::imaging::ImageMetadata;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One metadata tag in one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSource {
    Exif(String),
    Iptc(String),
}

impl FromStr for TagSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, tag) = s
            .split_once(':')
            .ok_or_else(|| format!("'{s}' is not of the form exif:Tag or iptc:Tag"))?;
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(format!("'{s}' names no tag"));
        }
        match namespace.trim().to_ascii_lowercase().as_str() {
            "exif" => Ok(Self::Exif(tag.to_string())),
            "iptc" => Ok(Self::Iptc(tag.to_string())),
            other => Err(format!("unknown metadata namespace '{other}' in '{s}'")),
        }
    }
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exif(tag) => write!(f, "exif:{tag}"),
            Self::Iptc(tag) => write!(f, "iptc:{tag}"),
        }
    }
}

impl TagSource {
    fn lookup<'a>(&self, tags: &'a FilteredTags) -> Option<&'a str> {
        match self {
            Self::Exif(tag) => tags.exif.get(tag).map(String::as_str),
            Self::Iptc(tag) => tags.iptc.get(tag).map(String::as_str),
        }
    }
}

/// Resolve a metadata field from multiple sources.
///
/// Takes a list of optional values in priority order and returns the first
/// non-None, non-empty value, trimmed.
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}

/// Apply an include/exclude filter to a tag map.
pub fn filter_tags(tags: &BTreeMap<String, String>, filter: &TagFilter) -> BTreeMap<String, String> {
    tags.iter()
        .filter(|(name, _)| filter.include.is_empty() || filter.include.contains(*name))
        .filter(|(name, _)| !filter.exclude.contains(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// EXIF and IPTC tags after settings filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredTags {
    pub exif: BTreeMap<String, String>,
    pub iptc: BTreeMap<String, String>,
}

impl FilteredTags {
    pub fn new(metadata: &ImageMetadata, settings: &Settings) -> Self {
        Self {
            exif: filter_tags(&metadata.exif, &settings.exif),
            iptc: filter_tags(&metadata.iptc, &settings.iptc),
        }
    }

    /// First non-empty value among `sources`. Unparseable sources are skipped;
    /// settings validation reports them.
    pub fn first_of(&self, sources: &[String]) -> Option<String> {
        let values: Vec<Option<&str>> = sources
            .iter()
            .filter_map(|raw| raw.parse::<TagSource>().ok())
            .map(|source| source.lookup(self))
            .collect();
        resolve(&values)
    }
}

/// Photo fields derived from embedded metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFields {
    pub caption: Option<String>,
    pub alt: Option<String>,
    pub copyright: Option<String>,
}

/// Look up caption, alt and copyright through the settings tag map.
pub fn extract_fields(metadata: &ImageMetadata, settings: &Settings) -> MetadataFields {
    let tags = FilteredTags::new(metadata, settings);
    MetadataFields {
        caption: tags.first_of(&settings.tag_map.caption),
        alt: tags.first_of(&settings.tag_map.alt),
        copyright: tags.first_of(&settings.tag_map.copyright),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ImageMetadata {
        ImageMetadata {
            orientation: None,
            exif: BTreeMap::from([
                ("ImageDescription".to_string(), "  Dog on the beach ".to_string()),
                ("Copyright".to_string(), "Jane Doe".to_string()),
                ("Artist".to_string(), "".to_string()),
            ]),
            iptc: BTreeMap::from([
                ("Caption-Abstract".to_string(), "IPTC caption".to_string()),
                ("ObjectName".to_string(), "Beach Dog".to_string()),
            ]),
        }
    }

    // =========================================================================
    // resolve() tests
    // =========================================================================

    #[test]
    fn resolve_picks_first_non_empty() {
        assert_eq!(
            resolve(&[None, Some("  "), Some("Fallback")]),
            Some("Fallback".to_string())
        );
        assert_eq!(resolve(&[Some(" First "), Some("Second")]), Some("First".into()));
        assert_eq!(resolve(&[]), None);
    }

    // =========================================================================
    // TagSource
    // =========================================================================

    #[test]
    fn tag_source_parses_namespaces() {
        assert_eq!(
            "exif:ImageDescription".parse::<TagSource>(),
            Ok(TagSource::Exif("ImageDescription".into()))
        );
        assert_eq!(
            "IPTC:ObjectName".parse::<TagSource>(),
            Ok(TagSource::Iptc("ObjectName".into()))
        );
    }

    #[test]
    fn tag_source_rejects_malformed() {
        assert!("ImageDescription".parse::<TagSource>().is_err());
        assert!("xmp:Title".parse::<TagSource>().is_err());
        assert!("exif:".parse::<TagSource>().is_err());
    }

    #[test]
    fn tag_source_display() {
        assert_eq!(TagSource::Iptc("ObjectName".into()).to_string(), "iptc:ObjectName");
    }

    // =========================================================================
    // filtering
    // =========================================================================

    #[test]
    fn empty_include_keeps_everything() {
        let meta = metadata();
        assert_eq!(filter_tags(&meta.exif, &TagFilter::default()), meta.exif);
    }

    #[test]
    fn include_then_exclude() {
        let filter = TagFilter {
            include: vec!["ImageDescription".into(), "Copyright".into()],
            exclude: vec!["Copyright".into()],
        };
        let kept = filter_tags(&metadata().exif, &filter);
        assert_eq!(kept.keys().collect::<Vec<_>>(), vec!["ImageDescription"]);
    }

    // =========================================================================
    // extract_fields
    // =========================================================================

    #[test]
    fn default_tag_map() {
        let fields = extract_fields(&metadata(), &Settings::default());
        assert_eq!(fields.caption.as_deref(), Some("Dog on the beach"));
        assert_eq!(fields.alt.as_deref(), Some("Beach Dog"));
        assert_eq!(fields.copyright, None);
    }

    #[test]
    fn excluded_tag_falls_through_to_next_source() {
        let mut settings = Settings::default();
        settings.exif.exclude = vec!["ImageDescription".into()];
        let fields = extract_fields(&metadata(), &settings);
        assert_eq!(fields.caption.as_deref(), Some("IPTC caption"));
    }

    #[test]
    fn empty_value_is_skipped() {
        let mut settings = Settings::default();
        settings.tag_map.copyright = vec!["exif:Artist".into(), "exif:Copyright".into()];
        let fields = extract_fields(&metadata(), &settings);
        assert_eq!(fields.copyright.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn no_metadata_gives_no_fields() {
        let fields = extract_fields(&ImageMetadata::default(), &Settings::default());
        assert_eq!(fields, MetadataFields::default());
    }
}
