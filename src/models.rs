use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{SliceMapError, RANGE_MESSAGE};
use crate::fingerprint::Fingerprint;

/// Normalized start coordinates along x/y/z
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Origin {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Normalized width/height of the crop window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
        }
    }
}

impl From<[f64; 3]> for Origin {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Origin> for [f64; 3] {
    fn from(o: Origin) -> Self {
        [o.x, o.y, o.z]
    }
}

impl From<[f64; 2]> for Dimensions {
    fn from([width, height]: [f64; 2]) -> Self {
        Self { width, height }
    }
}

impl From<Dimensions> for [f64; 2] {
    fn from(d: Dimensions) -> Self {
        [d.width, d.height]
    }
}

impl Dimensions {
    /// The crop covers the whole normalized extent
    pub fn is_full_extent(&self) -> bool {
        self.width == 1.0 && self.height == 1.0
    }
}

fn in_unit_range(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

/// Reject coordinates outside [0.0, 1.0]. NaN is rejected as well.
pub fn validate_geometry(origin: &Origin, dimensions: &Dimensions) -> Result<(), SliceMapError> {
    let values = [
        origin.x,
        origin.y,
        origin.z,
        dimensions.width,
        dimensions.height,
    ];

    if values.iter().all(|v| in_unit_range(*v)) {
        Ok(())
    } else {
        Err(SliceMapError::Validation(RANGE_MESSAGE.to_string()))
    }
}

pub fn validate_counts(subset_count: u32, output_size: u32) -> Result<(), SliceMapError> {
    if subset_count == 0 {
        return Err(SliceMapError::Validation(
            "subsets must be a positive integer".to_string(),
        ));
    }
    if output_size == 0 {
        return Err(SliceMapError::Validation(
            "size must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// A validated request with its dataset path resolved
#[derive(Debug, Clone)]
pub struct SliceRequest {
    pub data_path: PathBuf,
    pub origin: Origin,
    pub dimensions: Dimensions,
    pub subset_count: u32,
    pub output_size: u32,
}

/// Returned from `request_map`; `started` is false when an existing job or a
/// complete cache entry was reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapHandle {
    pub fingerprint: Fingerprint,
    pub started: bool,
}
