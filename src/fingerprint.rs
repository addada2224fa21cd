//! Cache keys derived from normalized request parameters.
//!
//! The canonical encoding is frozen: any change to field order or float
//! formatting produces new keys and orphans every existing cache entry.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::models::{Dimensions, Origin};

/// Length of a hex-encoded SHA-256 digest
pub const FINGERPRINT_LEN: usize = 64;

/// Hex SHA-256 digest identifying one crop of one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Accept an externally supplied key only if it looks like one we produced.
    pub fn parse(value: &str) -> Option<Self> {
        let valid = value.len() == FINGERPRINT_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into the two 2-character prefixes and the remainder.
    pub fn split(&self) -> (&str, &str, &str) {
        (&self.0[..2], &self.0[2..4], &self.0[4..])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Fingerprint::parse(&value).ok_or_else(|| format!("invalid fingerprint: {}", value))
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// `-0.0` and `0.0` describe the same coordinate but print differently
fn normalize(value: f64) -> f64 {
    value + 0.0
}

fn canonical_string(data_path: &str, origin: &Origin, dimensions: &Dimensions) -> String {
    format!(
        "p={},o=[{:?}, {:?}, {:?}],d=[{:?}, {:?}]",
        data_path,
        normalize(origin.x),
        normalize(origin.y),
        normalize(origin.z),
        normalize(dimensions.width),
        normalize(dimensions.height)
    )
}

pub fn compute_fingerprint(data_path: &str, origin: &Origin, dimensions: &Dimensions) -> Fingerprint {
    let digest = Sha256::digest(canonical_string(data_path, origin, dimensions).as_bytes());
    Fingerprint(format!("{:x}", digest))
}
