//! Threshold / band-pass / circle detector.
//!
//! Two variants run on every view: the plain one, and one where a radial
//! symmetry response is folded into the grey image first so faint round
//! blobs survive thresholding. Their circles are unioned.

use image::GrayImage;

use super::circles::{self, HoughParams};
use super::contours;
use super::frst::{self, RadialSymmetry};
use super::preprocessing;
use super::{PreparedView, StageTrace, ViewDetector};
use crate::config::DetectionConfig;
use crate::models::{Circle, DetectionMethod};
use crate::projection::BlobLimits;

/// What the classical pipeline is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobTarget {
    /// Large painted reference dots.
    Marker,
    /// Electrode housings; green marker paint is suppressed first.
    Electrode,
}

pub struct ClassicalDetector {
    config: DetectionConfig,
    target: BlobTarget,
}

impl ClassicalDetector {
    pub fn new(config: DetectionConfig, target: BlobTarget) -> Self {
        Self { config, target }
    }

    fn prefix(&self) -> &'static str {
        match self.target {
            BlobTarget::Marker => "marker",
            BlobTarget::Electrode => "electrode_basic",
        }
    }

    pub fn limits(&self, view: &PreparedView) -> BlobLimits {
        match self.target {
            BlobTarget::Marker => view.marker_limits(),
            BlobTarget::Electrode => view.electrode_limits(),
        }
    }

    /// Grey image with dark contrast boosted, denoised and stretched over the
    /// foreground. Background pixels are white.
    pub fn preprocess(&self, view: &PreparedView) -> GrayImage {
        let rgb = match self.target {
            BlobTarget::Electrode => preprocessing::suppress_green(&view.image),
            BlobTarget::Marker => view.image.clone(),
        };
        let gray = preprocessing::to_grayscale(&rgb);
        let boosted = preprocessing::apply_gamma(&gray, self.config.gamma);
        let denoised = preprocessing::apply_blur(&boosted, self.config.denoise_sigma);
        preprocessing::normalize_in_mask(&denoised, &view.foreground)
    }

    /// Dark, round blobs of `gray` inside the foreground: Otsu threshold,
    /// morphological cleanup, then area and circularity filtering.
    pub fn blob_mask(&self, view: &PreparedView, gray: &GrayImage, circularity: f64) -> GrayImage {
        let limits = self.limits(view);
        let level = preprocessing::otsu_in_mask(gray, &view.foreground);
        let binary = preprocessing::threshold_dark(gray, &view.foreground, level);
        let cleaned = preprocessing::clean_binary(&binary);
        let (labels, regions) = contours::find_contours(&cleaned, limits.min_area);
        let keep: Vec<u32> = regions
            .iter()
            .filter(|r| r.is_circular(circularity))
            .map(|r| r.label)
            .collect();
        log::debug!(
            "{} {}: Otsu level {level}, {} of {} regions circular",
            view.view,
            self.prefix(),
            keep.len(),
            regions.len()
        );
        contours::mask_of_labels(&labels, &keep)
    }

    /// Mask of the plain variant, shared with the superpixel detector.
    pub fn electrode_mask(&self, view: &PreparedView) -> GrayImage {
        let gray = self.preprocess(view);
        self.blob_mask(view, &gray, self.config.circularity)
    }

    fn circles_in_mask(
        &self,
        view: &PreparedView,
        gray: &GrayImage,
        mask: &GrayImage,
        original: &GrayImage,
        trace: &mut StageTrace,
        stage: &str,
    ) -> Vec<Circle> {
        let limits = self.limits(view);
        let masked = preprocessing::apply_mask(gray, mask);
        let band = preprocessing::band_pass(
            &masked,
            self.config.dog_sigma_small,
            self.config.dog_sigma_large,
        );
        let smooth = preprocessing::apply_median(&band, self.config.median_radius);
        trace.record(&format!("{}_{stage}_bandpass", self.prefix()), || smooth.clone());

        let params = HoughParams {
            min_radius: limits.min_radius,
            max_radius: limits.max_radius,
            min_distance: limits.min_distance,
            relative_votes: self.config.hough_relative_votes,
        };
        let found = circles::detect_circles(&smooth, &params);
        let valid =
            circles::filter_dark_circles(&found, original, mask, self.config.min_circle_contrast);
        log::debug!(
            "{} {} {stage}: {} circles, {} validated",
            view.view,
            self.prefix(),
            found.len(),
            valid.len()
        );
        valid
    }
}

impl ViewDetector for ClassicalDetector {
    fn method(&self) -> DetectionMethod {
        match self.target {
            BlobTarget::Marker => DetectionMethod::Marker,
            BlobTarget::Electrode => DetectionMethod::ElectrodeBasic,
        }
    }

    fn detect(&self, view: &PreparedView, trace: &mut StageTrace) -> Vec<Circle> {
        let limits = self.limits(view);
        let original = preprocessing::to_grayscale(&view.image);
        let gray = self.preprocess(view);
        trace.record(&format!("{}_preprocessed", self.prefix()), || gray.clone());

        let mask = self.blob_mask(view, &gray, self.config.circularity);
        trace.record(&format!("{}_mask", self.prefix()), || mask.clone());
        let plain = self.circles_in_mask(view, &gray, &mask, &original, trace, "plain");

        let symmetry = RadialSymmetry {
            radii: self
                .config
                .frst
                .radius_scales
                .iter()
                .map(|s| s * limits.min_radius)
                .collect(),
            alpha: self.config.frst.alpha,
            beta: self.config.frst.beta,
        };
        let response = symmetry.dark_response(&gray).normalized();
        let folded = frst::fold_into_gray(&gray, &response, self.config.frst.blend);
        trace.record(&format!("{}_radial", self.prefix()), || folded.clone());

        let radial_mask = self.blob_mask(view, &folded, self.config.circularity_radial);
        let radial = self.circles_in_mask(view, &folded, &radial_mask, &original, trace, "radial");

        circles::merge_keep_larger(&plain, &radial, limits.min_distance)
    }
}
