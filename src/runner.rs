use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::error::SliceMapError;
use crate::fingerprint::Fingerprint;
use crate::geometry::{CropGeometry, VolumeInfo};
use crate::models::SliceRequest;
use crate::pipeline::{PipelineInvocation, SlicePipeline};

/// Default tile grid edge: each output tile packs 16 × 16 slices
pub const DEFAULT_TILE_EDGE: u32 = 16;

/// Default extension of source slice files
pub const DEFAULT_SLICE_EXTENSION: &str = "tif";

/// Source slice files at `dir` with the given extension, sorted by name
pub fn list_slices(dir: &Path, extension: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(extension));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Width/height from the first slice's raster header, depth from the file count
pub fn scan_volume(dir: &Path, extension: &str) -> Result<VolumeInfo, SliceMapError> {
    let slices = list_slices(dir, extension)?;
    let first = slices
        .first()
        .ok_or_else(|| SliceMapError::SourceDataMissing(dir.to_path_buf()))?;

    let (width, height) = image::image_dimensions(first).map_err(|e| {
        SliceMapError::PipelineFailure(format!("cannot read {}: {}", first.display(), e))
    })?;

    Ok(VolumeInfo {
        width,
        height,
        depth: slices.len(),
    })
}

/// Turns a validated request into cached tile files via the external pipeline.
#[derive(Clone)]
pub struct SliceJobRunner {
    cache: CacheStore,
    pipeline: Arc<dyn SlicePipeline>,
    tile_edge: u32,
    slice_extension: String,
}

impl SliceJobRunner {
    pub fn new(cache: CacheStore, pipeline: Arc<dyn SlicePipeline>) -> Self {
        Self {
            cache,
            pipeline,
            tile_edge: DEFAULT_TILE_EDGE,
            slice_extension: DEFAULT_SLICE_EXTENSION.to_string(),
        }
    }

    pub fn with_tile_edge(mut self, tile_edge: u32) -> Self {
        self.tile_edge = tile_edge;
        self
    }

    pub fn with_slice_extension(mut self, extension: impl Into<String>) -> Self {
        self.slice_extension = extension.into();
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn slices_per_tile(&self) -> usize {
        (self.tile_edge as usize).pow(2)
    }

    /// Build the pipeline invocation for `request` against a scanned volume.
    pub fn plan(
        &self,
        fingerprint: &Fingerprint,
        request: &SliceRequest,
        volume: &VolumeInfo,
    ) -> PipelineInvocation {
        PipelineInvocation {
            source: request.data_path.clone(),
            slice_count: self.slices_per_tile() * request.subset_count as usize,
            crop: CropGeometry::compute(volume, &request.origin, &request.dimensions),
            mask: request.dimensions.is_full_extent(),
            output_size: request.output_size,
            slices_per_tile: self.slices_per_tile(),
            output_dir: self.cache.path_for(fingerprint),
        }
    }

    pub async fn run(
        &self,
        fingerprint: &Fingerprint,
        request: &SliceRequest,
        cancel: &CancellationToken,
    ) -> Result<(), SliceMapError> {
        if self.cache.is_complete(fingerprint, request.subset_count) {
            tracing::debug!("💾 {} already cached, nothing to do", fingerprint);
            return Ok(());
        }

        if !request.data_path.is_dir() {
            tracing::error!("❌ {} does not exist", request.data_path.display());
            return Err(SliceMapError::SourceDataMissing(request.data_path.clone()));
        }

        let data_path = request.data_path.clone();
        let extension = self.slice_extension.clone();
        let volume = tokio::task::spawn_blocking(move || scan_volume(&data_path, &extension))
            .await
            .map_err(|e| SliceMapError::PipelineFailure(format!("volume scan aborted: {}", e)))??;

        tracing::debug!(
            "📐 Volume {}: {}x{} with {} slices",
            request.data_path.display(),
            volume.width,
            volume.height,
            volume.depth
        );

        let invocation = self.plan(fingerprint, request, &volume);

        let cache = self.cache.clone();
        let fp = fingerprint.clone();
        tokio::task::spawn_blocking(move || cache.ensure_directories(&fp))
            .await
            .map_err(|e| SliceMapError::PipelineFailure(format!("directory setup aborted: {}", e)))??;

        tracing::info!(
            "🎨 Rendering {} tile(s) of {}px for {}",
            request.subset_count,
            request.output_size,
            fingerprint
        );
        self.pipeline.run(&invocation, cancel).await
    }
}
