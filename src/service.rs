use std::sync::Arc;

use crate::cache::CacheStore;
use crate::error::SliceMapError;
use crate::fingerprint::{compute_fingerprint, Fingerprint};
use crate::jobs::{JobRegistry, JobStatus};
use crate::metadata::{resolve_slice_directory, MetadataClient};
use crate::models::{validate_counts, validate_geometry, Dimensions, MapHandle, Origin, SliceRequest};
use crate::runner::SliceJobRunner;

/// Parameters of a map-creation request as received from a client
#[derive(Debug, Clone)]
pub struct MapParameters {
    pub token: String,
    pub user: String,
    pub dataset: String,
    pub origin: Origin,
    pub dimensions: Dimensions,
    pub subset_count: u32,
    pub output_size: u32,
}

/// Boundary of the core: accepts requests, starts or reuses jobs, and serves
/// status and tiles.
pub struct RequestService {
    metadata: Arc<dyn MetadataClient>,
    registry: Arc<JobRegistry>,
    runner: SliceJobRunner,
}

impl RequestService {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        registry: Arc<JobRegistry>,
        runner: SliceJobRunner,
    ) -> Self {
        Self {
            metadata,
            registry,
            runner,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        self.runner.cache()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Validate, resolve the dataset, and start (or reuse) the job for it.
    /// Returns as soon as the job is registered; never waits for it.
    pub async fn request_map(&self, params: MapParameters) -> Result<MapHandle, SliceMapError> {
        validate_geometry(&params.origin, &params.dimensions)?;
        validate_counts(params.subset_count, params.output_size)?;

        let dataset_root = self
            .metadata
            .dataset_path(&params.token, &params.user, &params.dataset)
            .await?;
        let data_path = resolve_slice_directory(&dataset_root);

        let fingerprint = compute_fingerprint(
            &data_path.to_string_lossy(),
            &params.origin,
            &params.dimensions,
        );

        if self.cache().is_complete(&fingerprint, params.subset_count) {
            tracing::debug!("💾 Cache hit for {}", fingerprint);
            return Ok(MapHandle {
                fingerprint,
                started: false,
            });
        }

        let request = SliceRequest {
            data_path,
            origin: params.origin,
            dimensions: params.dimensions,
            subset_count: params.subset_count,
            output_size: params.output_size,
        };

        let runner = self.runner.clone();
        let job_fingerprint = fingerprint.clone();
        let started = self.registry.try_start(&fingerprint, move |cancel| async move {
            runner.run(&job_fingerprint, &request, &cancel).await
        });

        Ok(MapHandle {
            fingerprint,
            started,
        })
    }

    pub fn check_status(&self, fingerprint: &Fingerprint) -> JobStatus {
        self.registry.poll_status(fingerprint)
    }

    pub async fn fetch_tile(
        &self,
        fingerprint: &Fingerprint,
        subset_index: u32,
    ) -> Result<Vec<u8>, SliceMapError> {
        self.cache().read_tile(fingerprint, subset_index).await
    }
}
