//! Subsampling factor selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a decoded image is fitted to the requested box.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SizeMode {
    /// Keep the decoded size (only the configured extra downsample applies).
    #[default]
    None,
    /// Scale down if necessary to fit within the box; never enlarge.
    Max,
    /// Scale to fit within the box; enlarge only when scale-up is allowed.
    Fit,
    /// Scale to cover the box, then centre-crop to it.
    Fill,
}

impl SizeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeMode::None => "none",
            SizeMode::Max => "max",
            SizeMode::Fit => "fit",
            SizeMode::Fill => "fill",
        }
    }

    /// The mode that actually applies to a request box.
    ///
    /// A zero dimension is unconstrained. With no constraint at all every
    /// mode degrades to `None`; `Fill` needs both dimensions and degrades to
    /// `Fit` when only one is given.
    pub fn effective(self, req_width: u32, req_height: u32) -> SizeMode {
        match (req_width, req_height) {
            (0, 0) => SizeMode::None,
            (0, _) | (_, 0) if self == SizeMode::Fill => SizeMode::Fit,
            _ => self,
        }
    }
}

impl fmt::Display for SizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SizeMode::None),
            "max" => Ok(SizeMode::Max),
            "fit" => Ok(SizeMode::Fit),
            "fill" => Ok(SizeMode::Fill),
            other => Err(format!("unknown size mode '{}'", other)),
        }
    }
}

/// Compute the subsampling factor used for the coarse decode.
///
/// - `None`: 1.
/// - `Max`/`Fit`: when the image exceeds the box on either axis, the ratio
///   along the axis with the larger pixel excess, rounded.
/// - `Fill`: when the image exceeds the box on both axes, the ratio along
///   the axis with the smaller pixel excess, rounded.
///
/// `downsample` is added to the result.
pub fn calculate_in_sample_size(
    width: u32,
    height: u32,
    req_width: u32,
    req_height: u32,
    mode: SizeMode,
    downsample: u32,
) -> u32 {
    let mut sample = 1;

    let ratio = |natural: u32, requested: u32| -> u32 {
        ((natural as f32 / requested as f32).round() as u32).max(1)
    };

    match mode.effective(req_width, req_height) {
        SizeMode::None => {}
        SizeMode::Fill => {
            if height > req_height && width > req_width {
                if height - req_height < width - req_width {
                    sample = ratio(height, req_height);
                } else {
                    sample = ratio(width, req_width);
                }
            }
        }
        SizeMode::Max | SizeMode::Fit => {
            let over_width = req_width > 0 && width > req_width;
            let over_height = req_height > 0 && height > req_height;
            if over_width || over_height {
                // Unconstrained axes never win the comparison.
                let excess = |natural: u32, requested: u32| -> i64 {
                    if requested == 0 {
                        i64::MIN
                    } else {
                        natural as i64 - requested as i64
                    }
                };
                if excess(height, req_height) > excess(width, req_width) {
                    sample = ratio(height, req_height);
                } else {
                    sample = ratio(width, req_width);
                }
            }
        }
    }

    sample.saturating_add(downsample)
}
