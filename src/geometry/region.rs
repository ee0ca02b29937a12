use nalgebra::{Matrix3, Point3, Unit, Vector3};

use super::mesh::{Aabb, Mesh};
use crate::config::CropConfig;
use crate::error::{CapscanError, Result};
use crate::models::{FiducialSet, LPA, NAS, RPA};

/// Plane `normal · p = offset` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub point: Point3<f64>,
    pub normal: Unit<Vector3<f64>>,
}

impl Plane {
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&(p - self.point))
    }

    /// Least-squares plane through `points` via SVD of the centred coordinates.
    /// The normal is oriented so that it points along +Y.
    pub fn fit(points: &[Point3<f64>]) -> Result<Plane> {
        if points.len() < 3 {
            return Err(CapscanError::GeometryDegenerate(format!(
                "plane fit needs 3 points, got {}",
                points.len()
            )));
        }
        let n = points.len() as f64;
        let centroid = Point3::from(points.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n);

        // 3x3 scatter matrix; its singular vectors match those of the centred
        // coordinate matrix.
        let mut scatter = Matrix3::zeros();
        for p in points {
            let d = p - centroid;
            scatter += d * d.transpose();
        }
        let svd = scatter.svd(false, true);
        let v_t = svd.v_t.ok_or_else(|| {
            CapscanError::GeometryDegenerate("plane fit SVD did not converge".into())
        })?;
        let smallest = svd.singular_values.imin();
        let spread = svd.singular_values.max();
        let mut normal: Vector3<f64> = v_t.row(smallest).transpose();

        // Collinear or coincident points leave the normal undetermined.
        let mut sorted = [
            svd.singular_values[0],
            svd.singular_values[1],
            svd.singular_values[2],
        ];
        sorted.sort_by(|a, b| a.total_cmp(b));
        if spread <= 0.0 || sorted[1] <= 1e-12 * spread {
            return Err(CapscanError::GeometryDegenerate(
                "plane fit points are collinear".into(),
            ));
        }

        if normal.y < 0.0 {
            normal = -normal;
        }
        Ok(Plane {
            point: centroid,
            normal: Unit::new_normalize(normal),
        })
    }
}

/// Isolates the cap region of an aligned head mesh.
#[derive(Debug, Clone, Default)]
pub struct RegionExtractor {
    config: CropConfig,
}

impl RegionExtractor {
    pub fn new(config: CropConfig) -> Self {
        Self { config }
    }

    /// Crop box around the five required fiducials with the configured margins.
    pub fn crop_box(&self, fiducials: &FiducialSet) -> Result<Aabb> {
        let points = fiducials.require_all()?;
        let tight = Aabb::from_points(&points)
            .ok_or_else(|| CapscanError::MissingInput("no fiducials".into()))?;
        let ext = tight.extents();
        let c = &self.config;
        Ok(Aabb {
            min: Point3::new(
                tight.min.x - c.left * ext.x,
                tight.min.y - c.down * ext.y,
                tight.min.z - c.back * ext.z,
            ),
            max: Point3::new(
                tight.max.x + c.right * ext.x,
                tight.max.y + c.up * ext.y,
                tight.max.z + c.front * ext.z,
            ),
        })
    }

    /// Crop to the fiducial box and keep the largest connected piece.
    pub fn crop(&self, mesh: &Mesh, fiducials: &FiducialSet) -> Result<Mesh> {
        let bbox = self.crop_box(fiducials)?;
        let cropped = mesh.filter_triangles(|tri| tri.iter().all(|p| bbox.contains(p)));
        log::debug!(
            "crop box kept {} of {} triangles",
            cropped.triangle_count(),
            mesh.triangle_count()
        );
        Ok(cropped.largest_component())
    }

    /// Plane through NAS, LPA and RPA, normal pointing up.
    pub fn fiducial_plane(&self, fiducials: &FiducialSet) -> Result<Plane> {
        let points = [
            fiducials.require(NAS)?,
            fiducials.require(LPA)?,
            fiducials.require(RPA)?,
        ];
        let mut plane = Plane::fit(&points)?;
        plane.point += plane.normal.into_inner() * self.config.plane_offset;
        Ok(plane)
    }

    /// Remove everything below the fiducial plane and keep the largest piece.
    pub fn cut_below_plane(&self, mesh: &Mesh, fiducials: &FiducialSet) -> Result<Mesh> {
        let plane = self.fiducial_plane(fiducials)?;
        let above = mesh.filter_triangles(|tri| tri.iter().all(|p| plane.signed_distance(p) >= 0.0));
        log::debug!(
            "plane cut kept {} of {} triangles",
            above.triangle_count(),
            mesh.triangle_count()
        );
        Ok(above.largest_component())
    }

    /// Full extraction: crop, component filter, plane cut, component filter.
    pub fn extract(&self, mesh: &Mesh, fiducials: &FiducialSet) -> Result<Mesh> {
        fiducials.require_all()?;
        let cropped = self.crop(mesh, fiducials)?;
        let cap = self.cut_below_plane(&cropped, fiducials)?;
        log::info!(
            "cap region: {} triangles ({} before extraction)",
            cap.triangle_count(),
            mesh.triangle_count()
        );
        Ok(cap)
    }
}
