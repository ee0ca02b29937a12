//! Fast radial symmetry transform, dark-centre half.
//!
//! Every strong gradient pixel votes at the point `n` pixels against its
//! gradient, where the centre of a dark disc of radius `n` would sit. The
//! orientation and magnitude projections are combined per radius, smoothed,
//! and averaged over all radii.

use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use super::field::ScalarField;

#[derive(Debug, Clone, PartialEq)]
pub struct RadialSymmetry {
    pub radii: Vec<f64>,
    /// Radial strictness exponent.
    pub alpha: f64,
    /// Gradients weaker than `beta` times the strongest one do not vote.
    pub beta: f64,
}

impl RadialSymmetry {
    /// Non-negative response, high at the centres of dark round blobs.
    pub fn dark_response(&self, gray: &GrayImage) -> ScalarField {
        let (w, h) = gray.dimensions();
        let mut total = ScalarField::zeros(w, h);
        if w < 3 || h < 3 || self.radii.is_empty() {
            return total;
        }

        let gx = horizontal_sobel(gray);
        let gy = vertical_sobel(gray);
        let magnitudes: Vec<f32> = gx
            .as_raw()
            .iter()
            .zip(gy.as_raw())
            .map(|(&a, &b)| (a as f32).hypot(b as f32))
            .collect();
        let max_mag = magnitudes.iter().copied().fold(0.0f32, f32::max);
        if max_mag <= f32::EPSILON {
            return total;
        }
        let threshold = self.beta as f32 * max_mag;

        let mut used = 0usize;
        for &n in &self.radii {
            if n < 1.0 {
                continue;
            }
            let mut orientation = ScalarField::zeros(w, h);
            let mut magnitude = ScalarField::zeros(w, h);
            for y in 0..h {
                for x in 0..w {
                    let i = (y * w + x) as usize;
                    let mag = magnitudes[i];
                    if mag < threshold || mag <= 0.0 {
                        continue;
                    }
                    let dx = gx.as_raw()[i] as f32 / mag;
                    let dy = gy.as_raw()[i] as f32 / mag;
                    let px = (x as f32 - dx * n as f32).round();
                    let py = (y as f32 - dy * n as f32).round();
                    if px < 0.0 || py < 0.0 || px >= w as f32 || py >= h as f32 {
                        continue;
                    }
                    let j = orientation.index(px as u32, py as u32);
                    orientation.data_mut()[j] += 1.0;
                    magnitude.data_mut()[j] += mag;
                }
            }

            let kn: f32 = if n < 1.5 { 8.0 } else { 9.9 };
            let mut f = ScalarField::zeros(w, h);
            for ((out, &o), &m) in f.data_mut().iter_mut().zip(orientation.data()).zip(magnitude.data()) {
                let o_tilde = o.min(kn) / kn;
                *out = (m / kn) * o_tilde.powf(self.alpha as f32);
            }
            let smoothed = f.gaussian_blur((0.25 * n) as f32);
            for (t, s) in total.data_mut().iter_mut().zip(smoothed.data()) {
                *t += s;
            }
            used += 1;
        }

        if used > 0 {
            for t in total.data_mut() {
                *t /= used as f32;
            }
        }
        total
    }
}

/// Darken `gray` where the radial symmetry response is strong.
/// `response` is expected in `[0, 1]`.
pub fn fold_into_gray(gray: &GrayImage, response: &ScalarField, blend: f64) -> GrayImage {
    let blend = blend.clamp(0.0, 1.0) as f32;
    let mut out = gray.clone();
    for (p, r) in out.pixels_mut().zip(response.data()) {
        let v = p.0[0] as f32 * (1.0 - blend) + 255.0 * (1.0 - r.clamp(0.0, 1.0)) * blend;
        p.0[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}
