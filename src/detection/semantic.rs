//! Superpixel detector.
//!
//! The foreground is cut into SLIC superpixels about one electrode across,
//! with a centre planted on every blob of the classical mask. Each one is
//! described by colour, shape, contrast against its surroundings and mean
//! radial symmetry. A two-component mixture over {contrast, radial symmetry}
//! separates the rare electrode-like superpixels from the rest, which are
//! then shape-filtered, cross-checked against the classical blob mask,
//! scored and thinned by non-maximum suppression.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use nalgebra::Vector2;

use super::classical::{BlobTarget, ClassicalDetector};
use super::contours::{self, Contour, LabelImage};
use super::frst::RadialSymmetry;
use super::gmm;
use super::preprocessing;
use super::superpixels::{self, SlicParams};
use super::{PreparedView, StageTrace, ViewDetector};
use crate::config::DetectionConfig;
use crate::models::{Circle, DetectionMethod};

/// Per-superpixel description.
#[derive(Debug, Clone)]
pub struct SuperpixelFeatures {
    pub contour: Contour,
    pub mean_lab: [f64; 3],
    pub std_lab: [f64; 3],
    /// Mean grey of the surrounding ring minus mean grey inside, over 255.
    pub contrast: f64,
    /// Mean normalised radial symmetry response inside.
    pub radial: f64,
    /// Fraction of pixels inside the classical blob mask.
    pub mask_overlap: f64,
}

impl SuperpixelFeatures {
    /// Mean of circularity, roundness, solidity and inverse aspect ratio.
    pub fn shape_score(&self) -> f64 {
        let c = &self.contour;
        (c.circularity().min(1.0)
            + (1.0 - c.eccentricity())
            + c.solidity()
            + 1.0 / c.aspect_ratio())
            / 4.0
    }

    pub fn confidence(&self) -> f64 {
        0.5 * self.contrast.abs() + 0.3 * self.shape_score() + 0.2 * self.radial.abs()
    }
}

pub struct SemanticDetector {
    config: DetectionConfig,
}

impl SemanticDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Describe every superpixel of `labels`.
    pub fn describe(
        &self,
        view: &PreparedView,
        labels: &LabelImage,
        gray: &GrayImage,
        symmetry: &[f32],
        classical_mask: &GrayImage,
    ) -> Vec<SuperpixelFeatures> {
        let regions = contours::contours_from_labels(labels, 1.0);
        let max_label = regions.iter().map(|r| r.label).max().unwrap_or(0) as usize;
        let mut pixels: Vec<Vec<(u32, u32)>> = vec![Vec::new(); max_label + 1];
        for (x, y, l) in labels.enumerate_pixels() {
            let l = l.0[0] as usize;
            if l != 0 && l <= max_label {
                pixels[l].push((x, y));
            }
        }

        let width = gray.width() as usize;
        regions
            .into_iter()
            .map(|contour| {
                let members = &pixels[contour.label as usize];
                let n = members.len().max(1) as f64;

                let mut sum = [0.0f64; 3];
                let mut sum_sq = [0.0f64; 3];
                let (mut inner, mut radial, mut overlap) = (0.0, 0.0, 0usize);
                for &(x, y) in members {
                    let lab = preprocessing::rgb_to_lab(view.image.get_pixel(x, y));
                    for c in 0..3 {
                        sum[c] += lab[c] as f64;
                        sum_sq[c] += (lab[c] as f64).powi(2);
                    }
                    inner += gray.get_pixel(x, y).0[0] as f64;
                    radial += symmetry[y as usize * width + x as usize] as f64;
                    if classical_mask.get_pixel(x, y).0[0] > 0 {
                        overlap += 1;
                    }
                }
                let mean_lab = sum.map(|s| s / n);
                let std_lab =
                    [0, 1, 2].map(|c| (sum_sq[c] / n - mean_lab[c].powi(2)).max(0.0).sqrt());
                let ring = self.ring_mean(gray, labels, &contour);
                let contrast = ring.map(|r| (r - inner / n) / 255.0).unwrap_or(0.0);

                SuperpixelFeatures {
                    contour,
                    mean_lab,
                    std_lab,
                    contrast,
                    radial: radial / n,
                    mask_overlap: overlap as f64 / n,
                }
            })
            .collect()
    }

    /// Mean grey of the band obtained by dilating the region.
    fn ring_mean(&self, gray: &GrayImage, labels: &LabelImage, region: &Contour) -> Option<f64> {
        let pad = self.config.semantic.ring_width as u32 + 1;
        let (w, h) = gray.dimensions();
        let x0 = region.min_x.saturating_sub(pad);
        let y0 = region.min_y.saturating_sub(pad);
        let x1 = (region.max_x + pad).min(w - 1);
        let y1 = (region.max_y + pad).min(h - 1);

        let mut patch = GrayImage::new(x1 - x0 + 1, y1 - y0 + 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                if labels.get_pixel(x, y).0[0] == region.label {
                    patch.put_pixel(x - x0, y - y0, Luma([255]));
                }
            }
        }
        let grown = dilate(&patch, Norm::LInf, self.config.semantic.ring_width);

        let (mut sum, mut count) = (0.0, 0usize);
        for (px, py, p) in grown.enumerate_pixels() {
            if p.0[0] > 0 && patch.get_pixel(px, py).0[0] == 0 {
                sum += gray.get_pixel(px + x0, py + y0).0[0] as f64;
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Superpixels in the minority mixture component. On a tie the
    /// component with the higher mean contrast wins.
    pub fn minority(&self, features: &[SuperpixelFeatures]) -> Vec<usize> {
        let settings = &self.config.semantic;
        if features.len() < settings.gmm_min_samples.max(2) {
            log::debug!("only {} superpixels, skipping clustering", features.len());
            return Vec::new();
        }
        let raw: Vec<Vector2<f64>> = features
            .iter()
            .map(|f| Vector2::new(f.contrast, f.radial))
            .collect();
        let samples = gmm::standardize(&raw);
        let fit = match gmm::fit_two_components(
            &samples,
            settings.gmm_max_iterations,
            settings.gmm_tolerance,
        ) {
            Ok(fit) => fit,
            Err(e) => {
                log::warn!("superpixel clustering failed: {e}");
                return Vec::new();
            }
        };
        if !fit.converged {
            log::debug!("mixture fit stopped after {} iterations", fit.iterations);
        }

        let (c0, c1) = (fit.count(0), fit.count(1));
        let minority = match c0.cmp(&c1) {
            std::cmp::Ordering::Less => 0,
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Equal => {
                if fit.model.means[0].x >= fit.model.means[1].x { 0 } else { 1 }
            }
        };
        fit.assignments
            .iter()
            .enumerate()
            .filter(|(_, a)| **a == minority)
            .map(|(i, _)| i)
            .collect()
    }

    fn passes_shape(&self, f: &SuperpixelFeatures, min_area: f64) -> bool {
        let s = &self.config.semantic;
        let c = &f.contour;
        c.area() >= min_area
            && c.circularity() >= s.min_circularity
            && c.eccentricity() < s.max_eccentricity
            && c.solidity() > s.min_solidity
            && c.aspect_ratio() < s.max_aspect
            && f.mask_overlap >= s.mask_overlap
    }
}

impl ViewDetector for SemanticDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Electrode
    }

    fn detect(&self, view: &PreparedView, trace: &mut StageTrace) -> Vec<Circle> {
        let limits = view.electrode_limits();
        let classical = ClassicalDetector::new(self.config.clone(), BlobTarget::Electrode);
        let gray = classical.preprocess(view);
        let classical_mask = classical.electrode_mask(view);
        let (_, blobs) = contours::find_contours(&classical_mask, limits.min_area);
        let anchors: Vec<Circle> = blobs
            .iter()
            .map(|b| Circle::new(b.centroid.0, b.centroid.1, b.radius()))
            .collect();

        let params = SlicParams {
            step: (self.config.slic.step_factor * limits.max_radius).max(4.0),
            compactness: self.config.slic.compactness,
            iterations: self.config.slic.iterations,
        };
        let labels = superpixels::slic(&view.image, &view.foreground, &params, &anchors);
        trace.record("electrode_superpixels", || {
            let mut img = GrayImage::new(labels.width(), labels.height());
            for (o, l) in img.pixels_mut().zip(labels.pixels()) {
                if l.0[0] != 0 {
                    o.0[0] = (l.0[0].wrapping_mul(97) % 200 + 55) as u8;
                }
            }
            img
        });

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
        }
        .dark_response(&gray)
        .normalized();

        let features = self.describe(view, &labels, &gray, symmetry.data(), &classical_mask);
        let selected = self.minority(&features);

        let mut scored: Vec<(f64, &SuperpixelFeatures)> = selected
            .into_iter()
            .map(|i| &features[i])
            .filter(|f| self.passes_shape(f, limits.min_area))
            .map(|f| (f.confidence(), f))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut kept: Vec<Circle> = Vec::new();
        for (_, f) in scored {
            let (x, y) = f.contour.centroid;
            // Equivalent radius as used downstream: twice the area-equivalent radius.
            let circle = Circle::new(x, y, 2.0 * (f.contour.area() / std::f64::consts::PI).sqrt());
            if kept.iter().all(|k| k.distance_to(&circle) >= limits.min_distance) {
                kept.push(circle);
            }
        }
        log::debug!(
            "{} electrode: {} superpixels around {} blobs, {} kept",
            view.view,
            features.len(),
            anchors.len(),
            kept.len()
        );
        kept
    }
}
