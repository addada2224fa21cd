//! Seam to the external image-processing pipeline.
//!
//! The pipeline is an opaque executable. [`UfoLauncher`] renders a
//! [`PipelineInvocation`] as one `ufo-launch` command line:
//!
//! ```text
//! read ! crop ! [mask !] rescale ! map-slice ! write
//! ```

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::SliceMapError;
use crate::geometry::CropGeometry;

/// printf-style template for tile file names written by the pipeline
pub const TILE_NAME_TEMPLATE: &str = "%05d.jpg";

/// Everything the pipeline needs to render the tiles of one job
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInvocation {
    pub source: PathBuf,
    /// Total number of slices to read
    pub slice_count: usize,
    pub crop: CropGeometry,
    /// Mask stage is inserted when the crop covers the full extent
    pub mask: bool,
    /// Edge length of the square output tiles
    pub output_size: u32,
    /// Slices packed into one output tile
    pub slices_per_tile: usize,
    pub output_dir: PathBuf,
}

impl PipelineInvocation {
    pub fn output_template(&self) -> PathBuf {
        self.output_dir.join(TILE_NAME_TEMPLATE)
    }
}

#[async_trait]
pub trait SlicePipeline: Send + Sync {
    /// Run to completion, writing `%05d.jpg` tiles into `output_dir`.
    async fn run(
        &self,
        invocation: &PipelineInvocation,
        cancel: &CancellationToken,
    ) -> Result<(), SliceMapError>;
}

/// Launches the UFO image-processing framework as a child process
#[derive(Debug, Clone)]
pub struct UfoLauncher {
    executable: String,
}

impl Default for UfoLauncher {
    fn default() -> Self {
        Self::new("ufo-launch")
    }
}

impl UfoLauncher {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Arguments passed to the executable, one token each
    pub fn arguments(invocation: &PipelineInvocation) -> Vec<String> {
        let crop = &invocation.crop;
        let mut stages = vec![
            vec![
                "read".to_string(),
                format!("path={}", invocation.source.display()),
                format!("number={}", invocation.slice_count),
                format!("start={}", crop.first_slice),
            ],
            vec![
                "crop".to_string(),
                format!("x={}", crop.x),
                format!("y={}", crop.y),
                format!("width={}", crop.width),
                format!("height={}", crop.height),
            ],
        ];

        if invocation.mask {
            stages.push(vec!["mask".to_string()]);
        }

        stages.push(vec![
            "rescale".to_string(),
            format!("width={}", invocation.output_size),
            format!("height={}", invocation.output_size),
        ]);
        stages.push(vec![
            "map-slice".to_string(),
            format!("number={}", invocation.slices_per_tile),
        ]);
        stages.push(vec![
            "write".to_string(),
            format!("filename={}", invocation.output_template().display()),
            "minimum=0".to_string(),
            "maximum=255".to_string(),
        ]);

        let separator = "!".to_string();
        stages.join(&separator)
    }
}

#[async_trait]
impl SlicePipeline for UfoLauncher {
    async fn run(
        &self,
        invocation: &PipelineInvocation,
        cancel: &CancellationToken,
    ) -> Result<(), SliceMapError> {
        let args = Self::arguments(invocation);
        tracing::debug!("🔧 {} {}", self.executable, args.join(" "));

        let mut child = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SliceMapError::PipelineFailure(format!("failed to launch {}: {}", self.executable, e))
            })?;

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                tracing::warn!("🛑 Killing {} for {:?}", self.executable, invocation.output_dir);
                child.kill().await?;
                return Err(SliceMapError::Cancelled);
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(SliceMapError::PipelineFailure(format!(
                "{} exited with {}",
                self.executable, status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(mask: bool) -> PipelineInvocation {
        PipelineInvocation {
            source: PathBuf::from("/data/ds/slices"),
            slice_count: 512,
            crop: CropGeometry {
                x: 10,
                y: 20,
                width: 300,
                height: 400,
                first_slice: 5,
            },
            mask,
            output_size: 256,
            slices_per_tile: 256,
            output_dir: PathBuf::from("/cache/ab/cd/ef"),
        }
    }

    #[test]
    fn test_arguments_without_mask() {
        let args = UfoLauncher::arguments(&invocation(false)).join(" ");
        assert_eq!(
            args,
            "read path=/data/ds/slices number=512 start=5 ! \
             crop x=10 y=20 width=300 height=400 ! \
             rescale width=256 height=256 ! \
             map-slice number=256 ! \
             write filename=/cache/ab/cd/ef/%05d.jpg minimum=0 maximum=255"
        );
    }

    #[test]
    fn test_arguments_with_mask() {
        let args = UfoLauncher::arguments(&invocation(true));
        let crop = args.iter().position(|a| a == "crop").unwrap();
        let mask = args.iter().position(|a| a == "mask").unwrap();
        let rescale = args.iter().position(|a| a == "rescale").unwrap();
        assert!(crop < mask && mask < rescale);
        assert_eq!(args[mask - 1], "!");
        assert_eq!(args[mask + 1], "!");
    }

    #[tokio::test]
    async fn test_missing_executable_is_pipeline_failure() {
        let launcher = UfoLauncher::new("definitely-not-a-real-ufo-launch");
        let result = launcher
            .run(&invocation(false), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SliceMapError::PipelineFailure(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_pipeline_failure() {
        let launcher = UfoLauncher::new("false");
        let result = launcher
            .run(&invocation(false), &CancellationToken::new())
            .await;
        match result {
            Err(SliceMapError::PipelineFailure(reason)) => assert!(reason.contains("false")),
            other => panic!("expected pipeline failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_kills_child() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("slow-pipeline");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let launcher = UfoLauncher::new(script.to_string_lossy());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = launcher.run(&invocation(false), &cancel).await;
        assert!(matches!(result, Err(SliceMapError::Cancelled)));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
