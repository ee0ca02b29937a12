use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use super::field::ScalarField;
use crate::models::Circle;

/// Gradients below this fraction of the strongest one do not vote.
const GRADIENT_FRACTION: f32 = 0.2;
const ACCUMULATOR_SIGMA: f32 = 1.0;
const REFINE_WINDOW: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    pub min_radius: f64,
    pub max_radius: f64,
    pub min_distance: f64,
    /// Accumulator peaks below this fraction of the global maximum are ignored.
    pub relative_votes: f64,
}

struct Gradients {
    gx: Vec<f32>,
    gy: Vec<f32>,
    mag: Vec<f32>,
    width: u32,
    height: u32,
}

impl Gradients {
    fn of(gray: &GrayImage) -> Self {
        let gx: Vec<f32> = horizontal_sobel(gray).as_raw().iter().map(|&v| v as f32).collect();
        let gy: Vec<f32> = vertical_sobel(gray).as_raw().iter().map(|&v| v as f32).collect();
        let mag = gx.iter().zip(&gy).map(|(a, b)| a.hypot(*b)).collect();
        Self {
            gx,
            gy,
            mag,
            width: gray.width(),
            height: gray.height(),
        }
    }
}

/// Gradient-voting circle detector.
///
/// Each strong edge pixel votes along both gradient directions for every
/// radius in range; centres appear as accumulator peaks. Peaks are
/// suppressed within `min_distance`, refined to sub-pixel precision, and
/// given the radius best supported by the surrounding edges.
pub fn detect_circles(gray: &GrayImage, params: &HoughParams) -> Vec<Circle> {
    let (w, h) = gray.dimensions();
    if w < 4 || h < 4 || params.max_radius < params.min_radius {
        return Vec::new();
    }
    let grads = Gradients::of(gray);
    let max_mag = grads.mag.iter().copied().fold(0.0f32, f32::max);
    if max_mag <= f32::EPSILON {
        return Vec::new();
    }
    let edge_threshold = GRADIENT_FRACTION * max_mag;

    let radii: Vec<f32> = {
        let mut r = params.min_radius.max(1.0) as f32;
        let mut out = Vec::new();
        while r <= params.max_radius as f32 {
            out.push(r);
            r += 1.0;
        }
        out
    };

    let mut accum = ScalarField::zeros(w, h);
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) as usize;
            let mag = grads.mag[i];
            if mag < edge_threshold {
                continue;
            }
            let dx = grads.gx[i] / mag;
            let dy = grads.gy[i] / mag;
            for &r in &radii {
                accum.splat(x as f32 + dx * r, y as f32 + dy * r, 1.0);
                accum.splat(x as f32 - dx * r, y as f32 - dy * r, 1.0);
            }
        }
    }
    let smoothed = accum.gaussian_blur(ACCUMULATOR_SIGMA);

    let peak = smoothed.max();
    if peak <= 0.0 {
        return Vec::new();
    }
    let vote_threshold = (params.relative_votes as f32 * peak).max(params.min_radius as f32);

    let mut peaks = local_maxima(&smoothed, vote_threshold, params.min_distance.max(1.0));
    peaks.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut circles: Vec<Circle> = Vec::new();
    for (px, py, _) in peaks {
        let (cx, cy) = refine_peak(&smoothed, px, py);
        let candidate = Circle::new(cx, cy, 0.0);
        if circles.iter().any(|c| c.distance_to(&candidate) < params.min_distance) {
            continue;
        }
        if let Some(radius) = estimate_radius(&grads, edge_threshold, cx, cy, params) {
            circles.push(Circle::new(cx, cy, radius));
        }
    }
    circles
}

fn local_maxima(field: &ScalarField, threshold: f32, radius: f64) -> Vec<(u32, u32, f32)> {
    let r = radius.ceil() as i64;
    let r_sq = radius * radius;
    let (w, h) = (field.width() as i64, field.height() as i64);
    let mut out = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = field.data()[(y * w + x) as usize];
            if v < threshold {
                continue;
            }
            let mut is_max = true;
            'scan: for dy in -r..=r {
                for dx in -r..=r {
                    if (dx == 0 && dy == 0) || (dx * dx + dy * dy) as f64 > r_sq {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let n = (ny * w + nx) as usize;
                    let nv = field.data()[n];
                    // Ties go to the earlier pixel in raster order.
                    if nv > v || (nv == v && n < (y * w + x) as usize) {
                        is_max = false;
                        break 'scan;
                    }
                }
            }
            if is_max {
                out.push((x as u32, y as u32, v));
            }
        }
    }
    out
}

/// Weighted centroid of the accumulator around a peak.
fn refine_peak(field: &ScalarField, px: u32, py: u32) -> (f64, f64) {
    let (w, h) = (field.width() as i64, field.height() as i64);
    let (mut sx, mut sy, mut sw) = (0.0f64, 0.0f64, 0.0f64);
    for dy in -REFINE_WINDOW..=REFINE_WINDOW {
        for dx in -REFINE_WINDOW..=REFINE_WINDOW {
            let (x, y) = (px as i64 + dx, py as i64 + dy);
            if x < 0 || y < 0 || x >= w || y >= h {
                continue;
            }
            let v = field.data()[(y * w + x) as usize].max(0.0) as f64;
            sx += v * x as f64;
            sy += v * y as f64;
            sw += v;
        }
    }
    if sw <= 0.0 {
        (px as f64, py as f64)
    } else {
        (sx / sw, sy / sw)
    }
}

/// Radius with the most radially aligned edge support around `(cx, cy)`.
fn estimate_radius(
    grads: &Gradients,
    edge_threshold: f32,
    cx: f64,
    cy: f64,
    params: &HoughParams,
) -> Option<f64> {
    const BIN: f64 = 0.5;
    let lo = params.min_radius.max(1.0);
    let hi = params.max_radius;
    let bins = ((hi - lo) / BIN).floor() as usize + 1;
    let mut hist = vec![0.0f64; bins];
    let mut samples: Vec<(f64, f64)> = Vec::new();

    let reach = hi.ceil() as i64 + 1;
    let (w, h) = (grads.width as i64, grads.height as i64);
    let (icx, icy) = (cx.round() as i64, cy.round() as i64);
    for y in (icy - reach).max(0)..=(icy + reach).min(h - 1) {
        for x in (icx - reach).max(0)..=(icx + reach).min(w - 1) {
            let i = (y * w + x) as usize;
            let mag = grads.mag[i];
            if mag < edge_threshold {
                continue;
            }
            let (rx, ry) = (x as f64 - cx, y as f64 - cy);
            let d = rx.hypot(ry);
            if d < lo || d > hi {
                continue;
            }
            let radial = grads.gx[i] as f64 * rx + grads.gy[i] as f64 * ry;
            let alignment = (radial / (mag as f64 * d)).abs();
            if alignment < 0.7 {
                continue;
            }
            let weight = mag as f64 * alignment;
            let bin = (((d - lo) / BIN) as usize).min(bins - 1);
            hist[bin] += weight;
            samples.push((d, weight));
        }
    }

    let (best_bin, best) = hist
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if *best <= 0.0 {
        return None;
    }
    let centre = lo + (best_bin as f64 + 0.5) * BIN;
    let (mut sd, mut sw) = (0.0, 0.0);
    for (d, weight) in samples {
        if (d - centre).abs() <= 1.0 {
            sd += d * weight;
            sw += weight;
        }
    }
    Some(if sw > 0.0 { sd / sw } else { centre })
}

/// Keep circles whose centre lies in `mask` and whose inside is darker than
/// the surrounding annulus of `gray` by at least `min_contrast` grey levels.
pub fn filter_dark_circles(
    circles: &[Circle],
    gray: &GrayImage,
    mask: &GrayImage,
    min_contrast: f64,
) -> Vec<Circle> {
    circles
        .iter()
        .filter(|c| {
            let (x, y) = (c.x.round(), c.y.round());
            if x < 0.0 || y < 0.0 || x >= mask.width() as f64 || y >= mask.height() as f64 {
                return false;
            }
            if mask.get_pixel(x as u32, y as u32).0[0] == 0 {
                return false;
            }
            match (
                ring_mean(gray, c, 0.0, 0.6 * c.radius),
                ring_mean(gray, c, 1.3 * c.radius, 1.8 * c.radius + 1.0),
            ) {
                (Some(inner), Some(outer)) => outer - inner >= min_contrast,
                _ => false,
            }
        })
        .copied()
        .collect()
}

/// Mean grey level between two radii around a circle's centre.
pub fn ring_mean(gray: &GrayImage, c: &Circle, r_in: f64, r_out: f64) -> Option<f64> {
    let reach = r_out.ceil() as i64;
    let (w, h) = (gray.width() as i64, gray.height() as i64);
    let (icx, icy) = (c.x.round() as i64, c.y.round() as i64);
    let (mut sum, mut count) = (0.0, 0usize);
    for y in (icy - reach).max(0)..=(icy + reach).min(h - 1) {
        for x in (icx - reach).max(0)..=(icx + reach).min(w - 1) {
            let d = (x as f64 - c.x).hypot(y as f64 - c.y);
            if d >= r_in && d <= r_out {
                sum += gray.get_pixel(x as u32, y as u32).0[0] as f64;
                count += 1;
            }
        }
    }
    (count > 0).then(|| sum / count as f64)
}

/// Union of two detection sets. Overlapping pairs (centres closer than the
/// sum of the radii, or than `min_distance`) keep the larger circle.
pub fn merge_keep_larger(a: &[Circle], b: &[Circle], min_distance: f64) -> Vec<Circle> {
    let mut all: Vec<Circle> = a.iter().chain(b).copied().collect();
    all.sort_by(|p, q| q.radius.total_cmp(&p.radius));
    let mut kept: Vec<Circle> = Vec::new();
    for c in all {
        let overlaps = kept.iter().any(|k| {
            let d = k.distance_to(&c);
            d < k.radius + c.radius || d < min_distance
        });
        if !overlaps {
            kept.push(c);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn disc_image(centres: &[(f64, f64)], radius: f64) -> GrayImage {
        let mut img = GrayImage::from_pixel(120, 120, Luma([230]));
        for y in 0..120u32 {
            for x in 0..120u32 {
                if centres
                    .iter()
                    .any(|(cx, cy)| (x as f64 - cx).hypot(y as f64 - cy) <= radius)
                {
                    img.put_pixel(x, y, Luma([25]));
                }
            }
        }
        img
    }

    #[test]
    fn finds_two_discs() {
        let img = disc_image(&[(35.0, 40.0), (85.0, 75.0)], 10.0);
        let params = HoughParams {
            min_radius: 6.0,
            max_radius: 16.0,
            min_distance: 15.0,
            relative_votes: 0.35,
        };
        let circles = detect_circles(&img, &params);
        assert_eq!(circles.len(), 2, "{circles:?}");
        for (cx, cy) in [(35.0, 40.0), (85.0, 75.0)] {
            let hit = circles
                .iter()
                .find(|c| (c.x - cx).hypot(c.y - cy) < 2.0)
                .expect("disc found");
            assert!((hit.radius - 10.0).abs() < 2.0, "radius {}", hit.radius);
        }
    }

    #[test]
    fn larger_circle_wins_overlap() {
        let a = [Circle::new(10.0, 10.0, 5.0)];
        let b = [Circle::new(12.0, 10.0, 7.0), Circle::new(60.0, 10.0, 4.0)];
        let merged = merge_keep_larger(&a, &b, 3.0);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|c| c.radius == 7.0));
        assert!(merged.iter().all(|c| c.radius != 5.0));
    }
}
