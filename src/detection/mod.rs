pub mod circles;
pub mod classical;
pub mod contours;
pub mod field;
pub mod frst;
pub mod gmm;
pub mod preprocessing;
pub mod semantic;
pub mod superpixels;

use image::{GrayImage, RgbImage};

pub use classical::{BlobTarget, ClassicalDetector};
pub use semantic::SemanticDetector;

use crate::config::DetectionConfig;
use crate::error::CapscanError;
use crate::models::{Circle, DetectionCandidate, DetectionMethod};
use crate::projection::{BlobLimits, CameraView, RenderedView};

/// A rendered view ready for detection: the image plus its foreground mask.
///
/// Owned, so each detection task can take its own copy.
#[derive(Debug, Clone)]
pub struct PreparedView {
    pub view: CameraView,
    pub image: RgbImage,
    pub foreground: GrayImage,
    /// Image width over the reference width the per-view limits were set at.
    pub scale: f64,
}

impl PreparedView {
    pub fn new(view: CameraView, image: RgbImage, config: &DetectionConfig) -> Self {
        let foreground = preprocessing::foreground_mask(
            &image,
            config.background_tolerance,
            config.background_max_spread,
        );
        let scale = if config.reference_width == 0 {
            1.0
        } else {
            image.width() as f64 / config.reference_width as f64
        };
        Self {
            view,
            image,
            foreground,
            scale,
        }
    }

    pub fn from_rendered(rendered: &RenderedView, config: &DetectionConfig) -> Self {
        Self::new(rendered.view(), rendered.image.clone(), config)
    }

    pub fn has_foreground(&self) -> bool {
        preprocessing::count_set(&self.foreground) > 0
    }

    pub fn electrode_limits(&self) -> BlobLimits {
        self.view.params().electrode.scaled(self.scale)
    }

    pub fn marker_limits(&self) -> BlobLimits {
        self.view.params().marker.scaled(self.scale)
    }
}

/// Intermediate images recorded while a detector runs, for debug dumps.
#[derive(Debug, Default)]
pub struct StageTrace {
    enabled: bool,
    stages: Vec<(String, GrayImage)>,
}

impl StageTrace {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            stages: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, image: impl FnOnce() -> GrayImage) {
        if self.enabled {
            self.stages.push((name.to_string(), image()));
        }
    }

    pub fn into_stages(self) -> Vec<(String, GrayImage)> {
        self.stages
    }
}

/// One 2D detection strategy.
pub trait ViewDetector: Send + Sync {
    fn method(&self) -> DetectionMethod;

    /// Circles found in `view`; an empty vector when nothing qualifies.
    fn detect(&self, view: &PreparedView, trace: &mut StageTrace) -> Vec<Circle>;

    /// Run the detector and tag its circles as candidates of this method.
    fn candidates(&self, view: &PreparedView, trace: &mut StageTrace) -> Vec<DetectionCandidate> {
        if !view.has_foreground() {
            log::debug!("{}: empty foreground, skipping {}", view.view, self.method());
            return Vec::new();
        }
        let circles = self.detect(view, trace);
        if circles.is_empty() {
            log::info!(
                "{}",
                CapscanError::EmptyDetection {
                    view: view.view,
                    method: self.method(),
                }
            );
        }
        circles
            .into_iter()
            .map(|c| DetectionCandidate::from_circle(view.view, self.method(), c))
            .collect()
    }
}

/// The detector behind each detection method.
pub fn detector_for(method: DetectionMethod, config: &DetectionConfig) -> Box<dyn ViewDetector> {
    match method {
        DetectionMethod::Marker => {
            Box::new(ClassicalDetector::new(config.clone(), BlobTarget::Marker))
        }
        DetectionMethod::ElectrodeBasic => {
            Box::new(ClassicalDetector::new(config.clone(), BlobTarget::Electrode))
        }
        DetectionMethod::Electrode => Box::new(SemanticDetector::new(config.clone())),
    }
}
