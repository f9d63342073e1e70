//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! ## Size specifications
//!
//! Every derivative size is configured with a [`SizeSpec`] string:
//!
//! | Form | Example | Meaning |
//! |---|---|---|
//! | `WxH` | `800x600` | exact output size, source dimensions ignored |
//! | `Wx` | `1500x` | fixed width, height follows the source aspect ratio |
//! | `xH` | `x1000` | fixed height, width follows the source aspect ratio |
//! | `N` | `1600` | longer source edge scaled to `N` |
//!
//! Upscaling is allowed. [`resolve_dimensions`] reports it through
//! [`Resolved::upscaled`] so callers can warn about it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeSpecError {
    #[error("invalid size specification {0:?} (expected WxH, Wx, xH or N)")]
    Invalid(String),
    #[error("size specification {0:?} has a zero dimension")]
    Zero(String),
    #[error("unknown sizing mode {0:?} (expected large, small, thumb or cover)")]
    UnknownMode(String),
}

/// The derivative a size is being computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SizeMode {
    Large,
    Small,
    Thumb,
    Cover,
}

impl SizeMode {
    pub const ALL: [SizeMode; 4] = [
        SizeMode::Large,
        SizeMode::Small,
        SizeMode::Thumb,
        SizeMode::Cover,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SizeMode::Large => "large",
            SizeMode::Small => "small",
            SizeMode::Thumb => "thumb",
            SizeMode::Cover => "cover",
        }
    }

    /// Thumb and cover derivatives are smart-cropped; large and small are
    /// plain resizes.
    pub fn is_cropped(self) -> bool {
        matches!(self, SizeMode::Thumb | SizeMode::Cover)
    }
}

impl fmt::Display for SizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeMode {
    type Err = SizeSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "large" => Ok(SizeMode::Large),
            "small" => Ok(SizeMode::Small),
            "thumb" => Ok(SizeMode::Thumb),
            "cover" => Ok(SizeMode::Cover),
            other => Err(SizeSpecError::UnknownMode(other.to_string())),
        }
    }
}

/// A parsed dimension specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    /// `WxH`
    Exact { width: u32, height: u32 },
    /// `Wx`
    Width(u32),
    /// `xH`
    Height(u32),
    /// `N`, applied to the longer edge.
    Max(u32),
}

impl FromStr for SizeSpec {
    type Err = SizeSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || SizeSpecError::Invalid(s.to_string());
        let number = |part: &str| -> Result<u32, SizeSpecError> {
            let n: u32 = part.trim().parse().map_err(|_| invalid())?;
            if n == 0 {
                return Err(SizeSpecError::Zero(s.to_string()));
            }
            Ok(n)
        };

        let spec = match raw.split_once(['x', 'X']) {
            None => SizeSpec::Max(number(raw)?),
            Some((w, h)) => match (w.trim().is_empty(), h.trim().is_empty()) {
                (false, false) => SizeSpec::Exact {
                    width: number(w)?,
                    height: number(h)?,
                },
                (false, true) => SizeSpec::Width(number(w)?),
                (true, false) => SizeSpec::Height(number(h)?),
                (true, true) => return Err(invalid()),
            },
        };
        Ok(spec)
    }
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeSpec::Exact { width, height } => write!(f, "{width}x{height}"),
            SizeSpec::Width(w) => write!(f, "{w}x"),
            SizeSpec::Height(h) => write!(f, "x{h}"),
            SizeSpec::Max(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for SizeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SizeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Settings files written by hand often carry `dim_max_large = 1600`.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => n.to_string().parse(),
            Raw::Text(s) => s.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// Output of [`resolve_dimensions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub width: u32,
    pub height: u32,
    /// True when the scale ratio exceeds 1.0.
    pub upscaled: bool,
}

/// Compute concrete target dimensions for a source of `intrinsic` size.
///
/// # Examples
/// ```
/// # use albumsync::imaging::{SizeSpec, resolve_dimensions};
/// // 1800x1170 source, longer edge to 1600 → 1600x1040
/// let r = resolve_dimensions(SizeSpec::Max(1600), (1800, 1170));
/// assert_eq!((r.width, r.height), (1600, 1040));
/// ```
pub fn resolve_dimensions(spec: SizeSpec, intrinsic: (u32, u32)) -> Resolved {
    let (src_w, src_h) = intrinsic;
    let scaled = |ratio: f64, len: u32| ((ratio * len as f64).round() as u32).max(1);

    match spec {
        SizeSpec::Exact { width, height } => Resolved {
            width,
            height,
            upscaled: false,
        },
        SizeSpec::Width(w) => {
            let ratio = w as f64 / src_w.max(1) as f64;
            Resolved {
                width: w,
                height: scaled(ratio, src_h),
                upscaled: ratio > 1.0,
            }
        }
        SizeSpec::Height(h) => {
            let ratio = h as f64 / src_h.max(1) as f64;
            Resolved {
                width: scaled(ratio, src_w),
                height: h,
                upscaled: ratio > 1.0,
            }
        }
        SizeSpec::Max(n) => {
            let ratio = n as f64 / src_w.max(src_h).max(1) as f64;
            Resolved {
                width: scaled(ratio, src_w),
                height: scaled(ratio, src_h),
                upscaled: ratio > 1.0,
            }
        }
    }
}

/// Largest crop of the target aspect ratio that fits inside the source.
///
/// The crop always spans the full source extent on one axis.
pub fn calculate_crop_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: full height, trimmed width
        let w = ((src_h as f64 * tgt_aspect).round() as u32).clamp(1, src_w);
        (w, src_h)
    } else {
        // Source is taller: full width, trimmed height
        let h = ((src_w as f64 / tgt_aspect).round() as u32).clamp(1, src_h);
        (src_w, h)
    }
}
