use crate::models::{Dimensions, Origin};

/// Raster size and slice count of a source volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub width: u32,
    pub height: u32,
    pub depth: usize,
}

/// Absolute crop window in source pixels, plus the first slice to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropGeometry {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub first_slice: usize,
}

impl CropGeometry {
    /// Convert normalized coordinates to pixels. The window is clamped so it
    /// never extends past the right or bottom edge of the raster.
    pub fn compute(volume: &VolumeInfo, origin: &Origin, dimensions: &Dimensions) -> Self {
        let width = f64::from(volume.width);
        let height = f64::from(volume.height);

        let x = (origin.x * width) as u32;
        let y = (origin.y * height) as u32;

        let crop_width = (width - f64::from(x)).min(dimensions.width * width) as u32;
        let crop_height = (height - f64::from(y)).min(dimensions.height * height) as u32;

        Self {
            x,
            y,
            width: crop_width,
            height: crop_height,
            first_slice: (origin.z * volume.depth as f64) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLUME: VolumeInfo = VolumeInfo {
        width: 1000,
        height: 1000,
        depth: 100,
    };

    #[test]
    fn test_crop_is_clamped_to_raster() {
        let geometry = CropGeometry::compute(
            &VOLUME,
            &Origin { x: 0.9, y: 0.0, z: 0.0 },
            &Dimensions { width: 0.5, height: 1.0 },
        );
        assert_eq!(geometry.x, 900);
        assert_eq!(geometry.width, 100);
        assert_eq!(geometry.height, 1000);
    }

    #[test]
    fn test_full_extent() {
        let geometry = CropGeometry::compute(&VOLUME, &Origin::default(), &Dimensions::default());
        assert_eq!(
            geometry,
            CropGeometry {
                x: 0,
                y: 0,
                width: 1000,
                height: 1000,
                first_slice: 0,
            }
        );
    }

    #[test]
    fn test_depth_offset_and_inner_window() {
        let volume = VolumeInfo {
            width: 640,
            height: 480,
            depth: 250,
        };
        let geometry = CropGeometry::compute(
            &volume,
            &Origin { x: 0.25, y: 0.5, z: 0.4 },
            &Dimensions { width: 0.5, height: 0.25 },
        );
        assert_eq!(geometry.x, 160);
        assert_eq!(geometry.y, 240);
        assert_eq!(geometry.width, 320);
        assert_eq!(geometry.height, 120);
        assert_eq!(geometry.first_slice, 100);
    }

    #[test]
    fn test_origin_at_far_edge_yields_empty_window() {
        let geometry = CropGeometry::compute(
            &VOLUME,
            &Origin { x: 1.0, y: 1.0, z: 1.0 },
            &Dimensions::default(),
        );
        assert_eq!(geometry.width, 0);
        assert_eq!(geometry.height, 0);
        assert_eq!(geometry.first_slice, 100);
    }
}
