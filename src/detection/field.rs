use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Single-channel `f32` image, the pixel type imageproc filters accept.
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Dense `f32` grid used for accumulators and filter responses that do not
/// fit in `u8`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    image: FloatImage,
}

impl ScalarField {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            image: FloatImage::new(width, height),
        }
    }

    pub fn from_gray(gray: &GrayImage) -> Self {
        Self {
            image: FloatImage::from_fn(gray.width(), gray.height(), |x, y| {
                Luma([gray.get_pixel(x, y).0[0] as f32])
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row-major values.
    pub fn data(&self) -> &[f32] {
        self.image.as_raw()
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.image
    }

    pub fn as_image(&self) -> &FloatImage {
        &self.image
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width() as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.image.get_pixel(x, y).0[0]
    }

    pub fn max(&self) -> f32 {
        self.data().iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min(&self) -> f32 {
        self.data().iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// Add `weight` at a fractional position, split bilinearly over the four
    /// neighbouring cells. Positions outside the field are ignored.
    pub fn splat(&mut self, x: f32, y: f32, weight: f32) {
        let (w, h) = self.image.dimensions();
        if w < 2 || h < 2 || x < 0.0 || y < 0.0 || x >= (w - 1) as f32 || y >= (h - 1) as f32 {
            return;
        }
        let stride = w as usize;
        let x0 = x as usize;
        let y0 = y as usize;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let base = y0 * stride + x0;
        let data = self.data_mut();
        data[base] += weight * (1.0 - fx) * (1.0 - fy);
        data[base + 1] += weight * fx * (1.0 - fy);
        data[base + stride] += weight * (1.0 - fx) * fy;
        data[base + stride + 1] += weight * fx * fy;
    }

    /// Gaussian blur; a non-positive sigma returns a copy.
    pub fn gaussian_blur(&self, sigma: f32) -> ScalarField {
        if sigma <= 0.0 || self.image.width() == 0 || self.image.height() == 0 {
            return self.clone();
        }
        Self {
            image: gaussian_blur_f32(&self.image, sigma),
        }
    }

    /// Linear stretch of the value range onto `0..=255`.
    pub fn to_gray(&self) -> GrayImage {
        let (lo, hi) = (self.min(), self.max());
        let span = hi - lo;
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let v = self.get(x, y);
            if span <= f32::EPSILON {
                Luma([0])
            } else {
                Luma([(255.0 * (v - lo) / span).round().clamp(0.0, 255.0) as u8])
            }
        })
    }

    /// Values divided by the maximum, so the result lies in `[0, 1]` for a
    /// non-negative field.
    pub fn normalized(&self) -> ScalarField {
        let hi = self.max();
        let mut out = self.clone();
        for v in out.data_mut() {
            *v = if hi > 0.0 { *v / hi } else { 0.0 };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splat_spreads_weight_bilinearly() {
        let mut field = ScalarField::zeros(4, 4);
        field.splat(1.25, 2.5, 4.0);
        assert!((field.get(1, 2) - 1.5).abs() < 1e-6);
        assert!((field.get(2, 2) - 0.5).abs() < 1e-6);
        assert!((field.get(1, 3) - 1.5).abs() < 1e-6);
        assert!((field.get(2, 3) - 0.5).abs() < 1e-6);

        field.splat(3.5, 0.0, 10.0);
        assert!((field.data().iter().sum::<f32>() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn blur_keeps_mass_and_centre() {
        let mut field = ScalarField::zeros(41, 41);
        field.data_mut()[20 * 41 + 20] = 100.0;
        let blurred = field.gaussian_blur(2.0);
        assert!((blurred.data().iter().sum::<f32>() - 100.0).abs() < 0.5);
        assert_eq!(blurred.max(), blurred.get(20, 20));
        assert!((blurred.get(18, 20) - blurred.get(22, 20)).abs() < 1e-4);
    }
}
