//! Pinhole camera used both to render a view and to back-project its pixels.
//!
//! Pixel coordinates are column/row indices: pixel `(i, j)` covers the
//! continuous square `[i - 0.5, i + 0.5] x [j - 0.5, j + 0.5]`, so the centroid
//! of a blob's pixel indices is directly a pixel coordinate.

use nalgebra::{Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use super::views::CameraView;
use crate::error::{CapscanError, Result};
use crate::geometry::Ray;

/// Immutable render-time camera for one view.
///
/// The orthonormal basis is stored rather than recomputed so that
/// back-projection always uses exactly the geometry the image was rendered
/// with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub view: CameraView,
    pub position: Point3<f64>,
    pub focal_point: Point3<f64>,
    pub right: Vector3<f64>,
    pub up: Vector3<f64>,
    pub forward: Vector3<f64>,
    /// Vertical field of view in degrees.
    pub fov_deg: f64,
    pub width: u32,
    pub height: u32,
}

impl Camera {
    pub fn look_at(
        view: CameraView,
        position: Point3<f64>,
        focal_point: Point3<f64>,
        up_hint: &Vector3<f64>,
        fov_deg: f64,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CapscanError::GeometryDegenerate(format!(
                "empty image shape {width}x{height} for view {view}"
            )));
        }
        let forward = Unit::try_new(focal_point - position, 1e-12).ok_or_else(|| {
            CapscanError::GeometryDegenerate(format!("camera for {view} sits on its focal point"))
        })?;
        let right = Unit::try_new(forward.cross(up_hint), 1e-9).ok_or_else(|| {
            CapscanError::GeometryDegenerate(format!("up vector parallel to view direction for {view}"))
        })?;
        let up = right.cross(forward.as_ref());

        Ok(Self {
            view,
            position,
            focal_point,
            right: right.into_inner(),
            up,
            forward: forward.into_inner(),
            fov_deg,
            width,
            height,
        })
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    fn tan_half_fov(&self) -> f64 {
        (self.fov_deg.to_radians() * 0.5).tan()
    }

    /// Focal length in pixels.
    pub fn focal_px(&self) -> f64 {
        0.5 * self.height as f64 / self.tan_half_fov()
    }

    /// Camera-space coordinates (right, up, depth along forward).
    pub fn to_camera_space(&self, p: &Point3<f64>) -> Vector3<f64> {
        let d = p - self.position;
        Vector3::new(d.dot(&self.right), d.dot(&self.up), d.dot(&self.forward))
    }

    /// Project a world point to pixel coordinates. `None` behind the camera.
    pub fn project(&self, p: &Point3<f64>) -> Option<[f64; 2]> {
        let c = self.to_camera_space(p);
        if c.z <= 1e-12 {
            return None;
        }
        let f = self.focal_px();
        let x = 0.5 * self.width as f64 + f * c.x / c.z - 0.5;
        let y = 0.5 * self.height as f64 - f * c.y / c.z - 0.5;
        Some([x, y])
    }

    /// Ray through the centre of pixel `(x, y)`, built from normalized device
    /// coordinates and the stored basis.
    pub fn pixel_to_ray(&self, x: f64, y: f64) -> Ray {
        let ndc_x = 2.0 * (x + 0.5) / self.width as f64 - 1.0;
        let ndc_y = 1.0 - 2.0 * (y + 0.5) / self.height as f64;
        let t = self.tan_half_fov();
        let dir = self.forward + self.right * (ndc_x * t * self.aspect()) + self.up * (ndc_y * t);
        Ray {
            origin: self.position,
            direction: Unit::new_normalize(dir),
        }
    }
}
