use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology::{close, dilate, erode, open};

/// Level assumed for the background when the image border is not bright.
const FALLBACK_BACKGROUND: u8 = 235;

/// Convert image to grayscale
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    image::DynamicImage::ImageRgb8(img.clone()).to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return img.clone();
    }
    gaussian_blur_f32(img, sigma)
}

pub fn apply_median(img: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    median_filter(img, radius, radius)
}

/// Estimate the near-white background level from the image border.
pub fn background_level(img: &RgbImage) -> u8 {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return FALLBACK_BACKGROUND;
    }
    let mut samples: Vec<u8> = Vec::with_capacity(2 * (w + h) as usize);
    for x in 0..w {
        samples.push(min_channel(img.get_pixel(x, 0)));
        samples.push(min_channel(img.get_pixel(x, h - 1)));
    }
    for y in 0..h {
        samples.push(min_channel(img.get_pixel(0, y)));
        samples.push(min_channel(img.get_pixel(w - 1, y)));
    }
    samples.sort_unstable();
    let median = samples[samples.len() / 2];
    if median < 200 {
        FALLBACK_BACKGROUND
    } else {
        median
    }
}

fn min_channel(p: &Rgb<u8>) -> u8 {
    p.0.iter().copied().min().unwrap_or(0)
}

fn channel_spread(p: &Rgb<u8>) -> u8 {
    let max = p.0.iter().copied().max().unwrap_or(0);
    max - min_channel(p)
}

/// Foreground mask (255 = object) from adaptive near-white background
/// detection, cleaned with a small opening.
pub fn foreground_mask(img: &RgbImage, tolerance: u8, max_spread: u8) -> GrayImage {
    let level = background_level(img).saturating_sub(tolerance);
    let (w, h) = img.dimensions();
    let mut mask = GrayImage::new(w, h);
    for (x, y, p) in img.enumerate_pixels() {
        let background = min_channel(p) >= level && channel_spread(p) <= max_spread;
        if !background {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    open(&mask, Norm::LInf, 1)
}

pub fn count_set(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v > 0).count()
}

/// Hue in degrees, saturation and value in `[0, 1]`.
pub fn rgb_to_hsv(p: &Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = p.0.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, saturation, max)
}

/// Paint saturated green pixels white so reference markers do not compete
/// with electrodes.
pub fn suppress_green(img: &RgbImage) -> RgbImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(p);
        if (70.0..=170.0).contains(&h) && s > 0.25 && v > 0.15 {
            *p = Rgb([255, 255, 255]);
        }
    }
    out
}

/// Power-law curve with exponent `1 / gamma`; `gamma < 1` pushes dark pixels
/// further down.
pub fn apply_gamma(img: &GrayImage, gamma: f32) -> GrayImage {
    if gamma <= 0.0 || (gamma - 1.0).abs() < f32::EPSILON {
        return img.clone();
    }
    let lut: Vec<u8> = (0..=255u32)
        .map(|v| (255.0 * (v as f32 / 255.0).powf(1.0 / gamma)).round() as u8)
        .collect();
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

/// Stretch the grey range found inside `mask` onto `0..=255`. Pixels outside
/// the mask become white.
pub fn normalize_in_mask(img: &GrayImage, mask: &GrayImage) -> GrayImage {
    let (mut lo, mut hi) = (u8::MAX, u8::MIN);
    for (p, m) in img.pixels().zip(mask.pixels()) {
        if m.0[0] > 0 {
            lo = lo.min(p.0[0]);
            hi = hi.max(p.0[0]);
        }
    }
    let mut out = GrayImage::from_pixel(img.width(), img.height(), Luma([255]));
    if lo > hi {
        return out;
    }
    let span = (hi - lo).max(1) as f32;
    for ((o, p), m) in out.pixels_mut().zip(img.pixels()).zip(mask.pixels()) {
        if m.0[0] > 0 {
            o.0[0] = (255.0 * (p.0[0] - lo) as f32 / span).round() as u8;
        }
    }
    out
}

/// Compute Otsu threshold from a set of sample intensities.
pub fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }
    let mut hist = [0u32; 256];
    let (mut min_v, mut max_v) = (u8::MAX, u8::MIN);
    for &v in samples {
        hist[v as usize] += 1;
        min_v = min_v.min(v);
        max_v = max_v.max(v);
    }
    if min_v == max_v {
        return min_v;
    }
    if hist.iter().filter(|&&h| h > 0).count() <= 2 {
        return ((min_v as u16 + max_v as u16) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist.iter().enumerate().map(|(i, &h)| i as f64 * h as f64).sum();
    let (mut sum_b, mut w_b) = (0.0f64, 0.0f64);
    let (mut best_var, mut best_t) = (-1.0f64, 127u8);
    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }
    best_t
}

/// Otsu threshold over the pixels inside `mask`.
pub fn otsu_in_mask(img: &GrayImage, mask: &GrayImage) -> u8 {
    let samples: Vec<u8> = img
        .pixels()
        .zip(mask.pixels())
        .filter(|(_, m)| m.0[0] > 0)
        .map(|(p, _)| p.0[0])
        .collect();
    otsu_threshold_from_samples(&samples)
}

/// Binary image of the masked pixels at or below `level` (dark = 255).
pub fn threshold_dark(img: &GrayImage, mask: &GrayImage, level: u8) -> GrayImage {
    let mut out = GrayImage::new(img.width(), img.height());
    for ((o, p), m) in out.pixels_mut().zip(img.pixels()).zip(mask.pixels()) {
        if m.0[0] > 0 && p.0[0] <= level {
            o.0[0] = 255;
        }
    }
    out
}

/// Open, close, erode, dilate: drops speckle, fills pinholes and separates
/// blobs joined by thin bridges.
pub fn clean_binary(binary: &GrayImage) -> GrayImage {
    let opened = open(binary, Norm::LInf, 1);
    let closed = close(&opened, Norm::LInf, 1);
    let eroded = erode(&closed, Norm::LInf, 1);
    dilate(&eroded, Norm::LInf, 1)
}

/// Difference of Gaussians `blur(small) - blur(large)` stretched to `u8`.
pub fn band_pass(img: &GrayImage, sigma_small: f32, sigma_large: f32) -> GrayImage {
    let small = super::field::ScalarField::from_gray(&apply_blur(img, sigma_small));
    let large = super::field::ScalarField::from_gray(&apply_blur(img, sigma_large));
    let mut diff = small;
    for (d, l) in diff.data_mut().iter_mut().zip(large.data()) {
        *d -= l;
    }
    diff.to_gray()
}

/// Keep `img` inside `mask`, paint the rest white.
pub fn apply_mask(img: &GrayImage, mask: &GrayImage) -> GrayImage {
    let mut out = img.clone();
    for (o, m) in out.pixels_mut().zip(mask.pixels()) {
        if m.0[0] == 0 {
            o.0[0] = 255;
        }
    }
    out
}

/// CIE L*a*b* (D65) for superpixel clustering.
pub fn rgb_to_lab(p: &Rgb<u8>) -> [f32; 3] {
    fn linear(c: u8) -> f32 {
        let c = c as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }
    fn f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }
    let [r, g, b] = p.0.map(linear);
    let x = (0.4124 * r + 0.3576 * g + 0.1805 * b) / 0.95047;
    let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let z = (0.0193 * r + 0.1192 * g + 0.9505 * b) / 1.08883;
    let (fx, fy, fz) = (f(x), f(y), f(z));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otsu_splits_bimodal_samples() {
        let mut samples = vec![20u8; 50];
        samples.extend(vec![30u8; 50]);
        samples.extend(vec![200u8; 60]);
        samples.extend(vec![210u8; 40]);
        let t = otsu_threshold_from_samples(&samples);
        assert!((30..200).contains(&t));
    }

    #[test]
    fn green_is_painted_white() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([10, 10, 10]));
        img.put_pixel(1, 1, Rgb([20, 180, 40]));
        let out = suppress_green(&img);
        assert_eq!(out.get_pixel(1, 1), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgb([10, 10, 10]));
    }

    #[test]
    fn white_border_yields_empty_mask() {
        let img = RgbImage::from_pixel(16, 16, Rgb([250, 250, 250]));
        let mask = foreground_mask(&img, 25, 30);
        assert_eq!(count_set(&mask), 0);
    }
}
