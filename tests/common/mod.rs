mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from capscan for tests
pub use capscan::geometry::Mesh;
pub use capscan::models::{Detected3DPoint, DetectionCandidate, DetectionMethod, FiducialSet};
pub use capscan::projection::CameraView;

use nalgebra::Point3;

/// Largest distance between corresponding points.
pub fn max_deviation(a: &[Point3<f64>], b: &[Point3<f64>]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q).norm())
        .fold(0.0, f64::max)
}

/// A mapped point with no label.
pub fn point(view: CameraView, method: DetectionMethod, x: f64, y: f64, z: f64) -> Detected3DPoint {
    Detected3DPoint::new(view, method, Point3::new(x, y, z))
}

/// A marker candidate at pixel (x, y).
pub fn marker_at(view: CameraView, x: f64, y: f64) -> DetectionCandidate {
    DetectionCandidate {
        view,
        method: DetectionMethod::Marker,
        pixel_x: x,
        pixel_y: y,
        pixel_radius: 15.0,
        label: None,
    }
}
