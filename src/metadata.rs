//! Dataset path lookups against the upstream metadata service.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SliceMapError;

/// Default HTTP request timeout (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Header carrying the caller's token to the metadata service
pub const AUTH_TOKEN_HEADER: &str = "Auth-Token";

/// Slice directories inside a dataset, in order of preference
pub const SLICE_DIRECTORY_CANDIDATES: [&str; 4] = [
    "slices-corrected-axis_8bit",
    "slices-8bit",
    "slices_8bit",
    "slices",
];

#[derive(Debug, Deserialize)]
struct DatasetResponse {
    path: String,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    message: String,
}

#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Resolve the dataset's root directory for `user`/`dataset`.
    async fn dataset_path(
        &self,
        token: &str,
        user: &str,
        dataset: &str,
    ) -> Result<PathBuf, SliceMapError>;
}

/// Pick the slice directory under a dataset root. The first candidate that
/// exists wins; if none exist the plain `slices` directory is assumed.
pub fn resolve_slice_directory(dataset_root: &Path) -> PathBuf {
    SLICE_DIRECTORY_CANDIDATES
        .iter()
        .map(|name| dataset_root.join(name))
        .find(|candidate| candidate.is_dir())
        .unwrap_or_else(|| dataset_root.join(SLICE_DIRECTORY_CANDIDATES[3]))
}

/// HTTP implementation of [`MetadataClient`].
#[derive(Clone)]
pub struct HttpMetadataClient {
    client: reqwest::Client,
    base_url: Url,
}

impl std::fmt::Debug for HttpMetadataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetadataClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpMetadataClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SliceMapError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SliceMapError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("slice-map/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url).map_err(|e| {
            SliceMapError::Validation(format!("invalid metadata URL {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SliceMapError::Validation(format!(
                "metadata URL cannot be used as a base: {}",
                base_url
            )));
        }

        Ok(Self { client, base_url })
    }

    /// `{base}/datasets/{user}/{dataset}` with both names percent-encoded as
    /// single path segments.
    pub fn dataset_url(&self, user: &str, dataset: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["datasets", user, dataset]);
        }
        url
    }
}

/// Turn a non-success upstream response into an error carrying its status
/// and, when the body is `{"message": ...}`, its message.
fn upstream_error(status: u16, body: &str) -> SliceMapError {
    let message = serde_json::from_str::<UpstreamError>(body)
        .ok()
        .map(|e| e.message);
    SliceMapError::UpstreamAuth { status, message }
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn dataset_path(
        &self,
        token: &str,
        user: &str,
        dataset: &str,
    ) -> Result<PathBuf, SliceMapError> {
        let url = self.dataset_url(user, dataset);
        tracing::debug!("🔎 Looking up dataset at {}", url);

        let response = self
            .client
            .get(url.clone())
            .header(AUTH_TOKEN_HEADER, token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("⚠️ Metadata service returned {} for {}", status, url);
            return Err(upstream_error(status.as_u16(), &body));
        }

        let dataset: DatasetResponse = response.json().await?;
        Ok(PathBuf::from(dataset.path))
    }
}
