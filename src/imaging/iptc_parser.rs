//! Minimal IPTC-IIM reader for JPEG and TIFF files.
//!
//! Produces a map from dataset name to value for the Application Record
//! (record 2). Repeatable datasets such as `Keywords` are joined with `", "`.
//!
//! For JPEG the IIM block lives in an APP13 segment inside a Photoshop 8BIM
//! resource (id 0x0404). For TIFF it is either IFD tag 33723 (raw IIM) or
//! IFD tag 34377 (an 8BIM resource block, same as JPEG).

use std::collections::BTreeMap;
use std::path::Path;

pub type IptcTags = BTreeMap<String, String>;

/// Names for record 2 datasets. Unknown datasets are reported as `2:<n>`.
const DATASET_NAMES: &[(u8, &str)] = &[
    (5, "ObjectName"),
    (7, "EditStatus"),
    (15, "Category"),
    (20, "SupplementalCategories"),
    (25, "Keywords"),
    (40, "SpecialInstructions"),
    (55, "DateCreated"),
    (60, "TimeCreated"),
    (80, "By-line"),
    (85, "By-lineTitle"),
    (90, "City"),
    (92, "Sub-location"),
    (95, "Province-State"),
    (101, "Country-PrimaryLocationName"),
    (105, "Headline"),
    (110, "Credit"),
    (115, "Source"),
    (116, "CopyrightNotice"),
    (118, "Contact"),
    (120, "Caption-Abstract"),
    (122, "Writer-Editor"),
];

fn dataset_name(dataset: u8) -> String {
    DATASET_NAMES
        .iter()
        .find(|(n, _)| *n == dataset)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("2:{dataset}"))
}

/// Read IPTC tags from a file, dispatching by extension.
/// Returns an empty map on any read or parse failure.
pub fn read_iptc(path: &Path) -> IptcTags {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let Ok(bytes) = std::fs::read(path) else {
        return IptcTags::new();
    };

    let iim = match ext.as_str() {
        "jpg" | "jpeg" => find_jpeg_iim(&bytes),
        "tif" | "tiff" => find_tiff_iim(&bytes),
        _ => None,
    };
    iim.map(parse_iim).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// IIM datasets
// ---------------------------------------------------------------------------

/// Parse raw IIM bytes.
///
/// Each dataset is `0x1C, record, dataset, len_hi, len_lo, data...`.
/// Extended-length datasets (high bit of the length set) are skipped.
fn parse_iim(data: &[u8]) -> IptcTags {
    let mut tags = IptcTags::new();
    let mut pos = 0;

    while pos + 5 <= data.len() {
        if data[pos] != 0x1C {
            pos += 1;
            continue;
        }

        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        pos += 5;

        if length & 0x8000 != 0 || pos + length > data.len() {
            break;
        }

        if record == 2 && dataset != 0 {
            let value = String::from_utf8_lossy(&data[pos..pos + length])
                .trim()
                .to_string();
            if !value.is_empty() {
                tags.entry(dataset_name(dataset))
                    .and_modify(|existing: &mut String| {
                        existing.push_str(", ");
                        existing.push_str(&value);
                    })
                    .or_insert(value);
            }
        }

        pos += length;
    }

    tags
}

// ---------------------------------------------------------------------------
// Photoshop 8BIM resources
// ---------------------------------------------------------------------------

const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const BIM_MARKER: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Find the IIM payload in a block of 8BIM resources.
///
/// Resource layout: `8BIM`, id (u16), Pascal name padded to even length,
/// size (u32), data padded to even length.
fn find_8bim_iim(block: &[u8]) -> Option<&[u8]> {
    let data = block.strip_prefix(PHOTOSHOP_HEADER).unwrap_or(block);
    let mut pos = 0;

    while pos + 12 <= data.len() {
        if &data[pos..pos + 4] != BIM_MARKER {
            pos += 1;
            continue;
        }
        let id = u16::from_be_bytes([data[pos + 4], data[pos + 5]]);
        let name_len = data[pos + 6] as usize;
        pos += 6 + (1 + name_len).next_multiple_of(2);

        let size_bytes = data.get(pos..pos + 4)?;
        let size = u32::from_be_bytes(size_bytes.try_into().ok()?) as usize;
        pos += 4;

        let payload = data.get(pos..pos + size)?;
        if id == IPTC_RESOURCE_ID {
            return Some(payload);
        }
        pos += size.next_multiple_of(2);
    }

    None
}

// ---------------------------------------------------------------------------
// JPEG
// ---------------------------------------------------------------------------

/// Walk JPEG marker segments up to start-of-scan looking for APP13.
fn find_jpeg_iim(data: &[u8]) -> Option<&[u8]> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;

    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        match marker {
            // Fill bytes
            0xFF => {
                pos += 1;
                continue;
            }
            // Start of scan or end of image: no metadata past here
            0xDA | 0xD9 => return None,
            // Standalone markers
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }

        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let segment = data.get(pos + 4..pos + 2 + len)?;
        if marker == 0xED {
            if let Some(iim) = find_8bim_iim(segment) {
                return Some(iim);
            }
        }
        pos += 2 + len;
    }

    None
}

// ---------------------------------------------------------------------------
// TIFF
// ---------------------------------------------------------------------------

const TAG_IPTC_NAA: u16 = 33723;
const TAG_PHOTOSHOP: u16 = 34377;

struct TiffReader<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl TiffReader<'_> {
    fn u16_at(&self, offset: usize) -> Option<u16> {
        let b: [u8; 2] = self.data.get(offset..offset + 2)?.try_into().ok()?;
        Some(if self.big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn u32_at(&self, offset: usize) -> Option<u32> {
        let b: [u8; 4] = self.data.get(offset..offset + 4)?.try_into().ok()?;
        Some(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }
}

/// Byte size of one value of a TIFF field type.
fn tiff_type_size(typ: u16) -> usize {
    match typ {
        3 | 8 => 2,
        4 | 9 | 11 | 13 => 4,
        5 | 10 | 12 => 8,
        _ => 1,
    }
}

/// Walk the IFD chain for an IPTC-NAA or Photoshop resource tag.
fn find_tiff_iim(data: &[u8]) -> Option<&[u8]> {
    let big_endian = match data.get(0..2)? {
        b"MM" => true,
        b"II" => false,
        _ => return None,
    };
    let tiff = TiffReader { data, big_endian };
    if tiff.u16_at(2)? != 42 {
        return None;
    }

    let mut ifd = tiff.u32_at(4)? as usize;
    // Guards against IFD cycles in malformed files
    let mut remaining_ifds = 16;

    while ifd != 0 && remaining_ifds > 0 {
        remaining_ifds -= 1;
        let count = tiff.u16_at(ifd)? as usize;

        for i in 0..count {
            let entry = ifd + 2 + i * 12;
            let tag = tiff.u16_at(entry)?;
            if tag != TAG_IPTC_NAA && tag != TAG_PHOTOSHOP {
                continue;
            }
            let len = tiff.u32_at(entry + 4)? as usize * tiff_type_size(tiff.u16_at(entry + 2)?);
            let start = if len <= 4 {
                entry + 8
            } else {
                tiff.u32_at(entry + 8)? as usize
            };
            let Some(value) = data.get(start..start + len) else {
                continue;
            };
            let iim = if tag == TAG_IPTC_NAA {
                Some(value)
            } else {
                find_8bim_iim(value)
            };
            if let Some(iim) = iim.filter(|b| !parse_iim(b).is_empty()) {
                return Some(iim);
            }
        }

        ifd = tiff.u32_at(ifd + 2 + count * 12)? as usize;
    }

    None
}
