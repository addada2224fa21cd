use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::jobs::JobRegistry;
use crate::metadata::{HttpMetadataClient, MetadataClient};
use crate::pipeline::{SlicePipeline, UfoLauncher};
use crate::runner::SliceJobRunner;
use crate::service::RequestService;

pub struct AppState {
    pub service: RequestService,
    pub cache_dir: String,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the production collaborators from configuration
    pub fn new(config: &Config) -> Result<Self> {
        let metadata = HttpMetadataClient::with_timeout(
            config.get_metadata_url(),
            config.get_metadata_timeout(),
        )?;
        let pipeline = UfoLauncher::new(config.get_executable());
        let registry = Arc::new(JobRegistry::new(config.get_job_timeout()));

        Ok(Self::with_collaborators(
            config.get_cache_directory(),
            Arc::new(metadata),
            Arc::new(pipeline),
            registry,
            config.get_tile_edge(),
            config.get_slice_extension(),
        ))
    }

    /// Build the state around injected collaborators
    pub fn with_collaborators(
        cache_dir: String,
        metadata: Arc<dyn MetadataClient>,
        pipeline: Arc<dyn SlicePipeline>,
        registry: Arc<JobRegistry>,
        tile_edge: u32,
        slice_extension: String,
    ) -> Self {
        let cache = CacheStore::new(PathBuf::from(&cache_dir));
        let runner = SliceJobRunner::new(cache, pipeline)
            .with_tile_edge(tile_edge)
            .with_slice_extension(slice_extension);

        Self {
            service: RequestService::new(metadata, registry, runner),
            cache_dir,
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        self.service.registry()
    }
}
