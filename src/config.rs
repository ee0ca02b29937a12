use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level pipeline settings.
///
/// Every field has a default, so a JSON file only needs to name the values it
/// changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub crop: CropConfig,
    pub render: RenderConfig,
    pub detection: DetectionConfig,
    pub labeling: LabelingConfig,
    pub merge: MergeConfig,
    pub workers: WorkerConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Bounding-box margins around the fiducials, as fractions of the fiducial
/// extent along each axis of the aligned frame (X right, Y up, Z forward).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub left: f64,
    pub right: f64,
    pub up: f64,
    /// Kept large so the occipital bone survives while the neck is cut.
    pub down: f64,
    pub front: f64,
    pub back: f64,
    /// Signed offset of the cutting plane along its upward normal, in mesh units.
    pub plane_offset: f64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            left: 0.15,
            right: 0.15,
            up: 0.25,
            down: 0.6,
            front: 0.2,
            back: 0.15,
            plane_offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Vertical field of view in degrees.
    pub fov_deg: f64,
    pub background: [u8; 3],
    /// Lower bound for each bounding-box extent used to place cameras, as a
    /// fraction of the largest extent. Keeps flat or thin meshes framed.
    pub extent_floor: f64,
    pub near_clip: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            fov_deg: 30.0,
            background: [255, 255, 255],
            extent_floor: 0.75,
            near_clip: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Image width at which the per-view pixel defaults were tuned.
    pub reference_width: u32,
    /// Allowed distance of a background pixel below the estimated background level.
    pub background_tolerance: u8,
    /// Maximum channel spread of a background pixel.
    pub background_max_spread: u8,
    pub gamma: f32,
    pub denoise_sigma: f32,
    pub circularity: f64,
    pub circularity_radial: f64,
    pub dog_sigma_small: f32,
    pub dog_sigma_large: f32,
    pub median_radius: u32,
    /// Relative accumulator threshold for the circle detector.
    pub hough_relative_votes: f64,
    /// Minimum inside/outside darkness difference (grey levels) for a circle.
    pub min_circle_contrast: f64,
    pub frst: FrstConfig,
    pub slic: SlicConfig,
    pub semantic: SemanticConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            reference_width: 1024,
            background_tolerance: 25,
            background_max_spread: 30,
            gamma: 0.8,
            denoise_sigma: 1.0,
            circularity: 0.75,
            circularity_radial: 0.5,
            dog_sigma_small: 2.5,
            dog_sigma_large: 5.0,
            median_radius: 2,
            hough_relative_votes: 0.35,
            min_circle_contrast: 12.0,
            frst: FrstConfig::default(),
            slic: SlicConfig::default(),
            semantic: SemanticConfig::default(),
        }
    }
}

/// Fast radial symmetry transform settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrstConfig {
    /// Radii as fractions of the view's minimum electrode radius.
    pub radius_scales: Vec<f64>,
    pub alpha: f64,
    /// Gradient magnitudes below this fraction of the maximum are ignored.
    pub beta: f64,
    /// Weight of the radial symmetry response when folded into the grey image.
    pub blend: f64,
}

impl Default for FrstConfig {
    fn default() -> Self {
        Self {
            radius_scales: vec![1.0, 1.5, 2.0, 3.0],
            alpha: 2.0,
            beta: 0.1,
            blend: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicConfig {
    /// Superpixel grid step as a multiple of the view's maximum electrode
    /// radius, so one electrode spans about one grid cell.
    pub step_factor: f64,
    pub compactness: f64,
    pub iterations: usize,
}

impl Default for SlicConfig {
    fn default() -> Self {
        Self {
            step_factor: 2.0,
            compactness: 10.0,
            iterations: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub min_circularity: f64,
    pub max_eccentricity: f64,
    pub min_solidity: f64,
    pub max_aspect: f64,
    /// Required fraction of a superpixel inside the classical mask.
    pub mask_overlap: f64,
    /// Width in pixels of the surrounding ring used for local contrast.
    pub ring_width: u8,
    pub gmm_max_iterations: usize,
    pub gmm_tolerance: f64,
    /// Fewer superpixels than this and clustering is not attempted.
    pub gmm_min_samples: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            min_circularity: 0.75,
            max_eccentricity: 0.75,
            min_solidity: 0.9,
            max_aspect: 1.5,
            mask_overlap: 0.5,
            ring_width: 3,
            gmm_max_iterations: 100,
            gmm_tolerance: 1e-6,
            gmm_min_samples: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    /// Half-width of the central column, as a fraction of image width.
    pub center_tolerance: f64,
    /// Half-height of a horizontal row band, as a fraction of image height.
    pub row_tolerance: f64,
    pub front_target_angle_deg: f64,
    pub front_angle_tolerance_deg: f64,
    /// Allowed relative difference of left/right distances in the fallback search.
    pub front_symmetry_tolerance: f64,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            center_tolerance: 0.06,
            row_tolerance: 0.08,
            front_target_angle_deg: 30.0,
            front_angle_tolerance_deg: 15.0,
            front_symmetry_tolerance: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Single-linkage cut distance, in mesh units (millimetres for scans).
    pub distance_threshold: f64,
    pub median_max_iterations: usize,
    pub median_tolerance: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 15.0,
            median_max_iterations: 100,
            median_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on concurrently running detection units; 0 means one per CPU.
    pub max_concurrent: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_concurrent: 0 }
    }
}
