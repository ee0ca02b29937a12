use std::collections::BTreeMap;

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::contours::{BorderType, find_contours as trace_borders};
use imageproc::geometry::{arc_length, contour_area, convex_hull};
use imageproc::point::Point;
use imageproc::region_labelling::{Connectivity, connected_components};

/// Integer label image; 0 is background.
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Shape statistics of one labelled region.
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
    pub centroid: (f64, f64),
    /// Central second moments (mu20, mu02, mu11), normalised by pixel count.
    pub moments: (f64, f64, f64),
    /// Outer border as pixel centres, in tracing order.
    pub border: Vec<Point<i32>>,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> f64 {
        self.pixel_count as f64
    }

    pub fn perimeter(&self) -> f64 {
        arc_length(&self.border, true)
    }

    /// Area enclosed by the traced border.
    pub fn polygon_area(&self) -> f64 {
        contour_area(&self.border)
    }

    /// `4 pi A / P^2` on the traced border; 0 for degenerate borders.
    pub fn circularity(&self) -> f64 {
        let perimeter = self.perimeter();
        let area = self.polygon_area();
        if perimeter <= 0.0 || area <= 0.0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * area / (perimeter * perimeter)
    }

    /// Polygon area over convex hull area.
    pub fn solidity(&self) -> f64 {
        let hull = contour_area(&convex_hull(self.border.clone()));
        if hull <= 0.0 {
            return 0.0;
        }
        (self.polygon_area() / hull).min(1.0)
    }

    /// Eccentricity of the moment-equivalent ellipse.
    pub fn eccentricity(&self) -> f64 {
        let (major, minor) = self.axis_variances();
        if major <= 0.0 {
            return 0.0;
        }
        (1.0 - minor / major).max(0.0).sqrt()
    }

    /// Ratio of the longer to the shorter bounding box side.
    pub fn aspect_ratio(&self) -> f64 {
        let (w, h) = (self.width() as f64, self.height() as f64);
        w.max(h) / w.min(h)
    }

    /// Radius of the disc with the same pixel area.
    pub fn radius(&self) -> f64 {
        (self.area() / std::f64::consts::PI).sqrt()
    }

    pub fn is_circular(&self, threshold: f64) -> bool {
        self.circularity() >= threshold
    }

    fn axis_variances(&self) -> (f64, f64) {
        let (a, b, c) = self.moments;
        let mean = 0.5 * (a + b);
        let spread = (0.25 * (a - b) * (a - b) + c * c).sqrt();
        (mean + spread, (mean - spread).max(0.0))
    }
}

/// Find the 8-connected foreground regions of a binary image.
pub fn find_contours(binary: &GrayImage, min_area: f64) -> (LabelImage, Vec<Contour>) {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0]));
    let contours = contours_from_labels(&labels, min_area);
    (labels, contours)
}

#[derive(Default)]
struct Accum {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    count: u32,
    sx: f64,
    sy: f64,
    sxx: f64,
    syy: f64,
    sxy: f64,
}

/// Shape statistics of every non-zero label with at least `min_area` pixels,
/// ordered by label.
pub fn contours_from_labels(labels: &LabelImage, min_area: f64) -> Vec<Contour> {
    let mut regions: BTreeMap<u32, Accum> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        let acc = regions.entry(label).or_insert_with(|| Accum {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            ..Accum::default()
        });
        acc.min_x = acc.min_x.min(x);
        acc.min_y = acc.min_y.min(y);
        acc.max_x = acc.max_x.max(x);
        acc.max_y = acc.max_y.max(y);
        acc.count += 1;
        let (fx, fy) = (x as f64, y as f64);
        acc.sx += fx;
        acc.sy += fy;
        acc.sxx += fx * fx;
        acc.syy += fy * fy;
        acc.sxy += fx * fy;
    }

    regions
        .into_iter()
        .filter(|(_, acc)| acc.count as f64 >= min_area)
        .map(|(label, acc)| {
            let n = acc.count as f64;
            let (cx, cy) = (acc.sx / n, acc.sy / n);
            Contour {
                label,
                min_x: acc.min_x,
                min_y: acc.min_y,
                max_x: acc.max_x,
                max_y: acc.max_y,
                pixel_count: acc.count,
                centroid: (cx, cy),
                moments: (
                    acc.sxx / n - cx * cx,
                    acc.syy / n - cy * cy,
                    acc.sxy / n - cx * cy,
                ),
                border: trace_outer_border(
                    labels,
                    label,
                    (acc.min_x, acc.min_y, acc.max_x, acc.max_y),
                ),
            }
        })
        .collect()
}

/// Longest outer border of `label`, traced on a padded crop of its bounding box.
fn trace_outer_border(
    labels: &LabelImage,
    label: u32,
    (x0, y0, x1, y1): (u32, u32, u32, u32),
) -> Vec<Point<i32>> {
    let (w, h) = (x1 - x0 + 3, y1 - y0 + 3);
    let mut patch = GrayImage::new(w, h);
    for y in y0..=y1 {
        for x in x0..=x1 {
            if labels.get_pixel(x, y).0[0] == label {
                patch.put_pixel(x - x0 + 1, y - y0 + 1, Luma([255]));
            }
        }
    }
    trace_borders::<i32>(&patch)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .max_by_key(|c| c.points.len())
        .map(|c| {
            c.points
                .iter()
                .map(|p| Point::new(p.x - 1 + x0 as i32, p.y - 1 + y0 as i32))
                .collect()
        })
        .unwrap_or_default()
}

/// Binary image holding only the pixels of the given labels.
pub fn mask_of_labels(labels: &LabelImage, keep: &[u32]) -> GrayImage {
    let keep: std::collections::HashSet<u32> = keep.iter().copied().collect();
    let mut out = GrayImage::new(labels.width(), labels.height());
    for (x, y, l) in labels.enumerate_pixels() {
        if l.0[0] != 0 && keep.contains(&l.0[0]) {
            out.put_pixel(x, y, Luma([255]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notched_square_loses_solidity() {
        let mut img = GrayImage::new(40, 40);
        for y in 5..35u32 {
            for x in 5..35u32 {
                let notch = (15..25).contains(&x) && y < 20;
                if !notch {
                    img.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let (_, contours) = find_contours(&img, 10.0);
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert!((140.0..150.0).contains(&c.perimeter()), "perimeter {}", c.perimeter());
        assert!(c.solidity() < 0.9, "solidity {}", c.solidity());
        assert_eq!(c.aspect_ratio(), 1.0);
    }

    #[test]
    fn disc_is_circular_and_solid() {
        let mut img = GrayImage::new(60, 60);
        for y in 0..60u32 {
            for x in 0..60u32 {
                let d = ((x as f64 - 30.0).powi(2) + (y as f64 - 30.0).powi(2)).sqrt();
                if d <= 15.0 {
                    img.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let (_, contours) = find_contours(&img, 10.0);
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert!(c.circularity() > 0.8, "circularity {}", c.circularity());
        assert!(c.solidity() > 0.95);
        assert!(c.eccentricity() < 0.2);
        assert!((c.centroid.0 - 30.0).abs() < 0.5);
    }
}
