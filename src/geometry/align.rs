//! Canonical head frame from fiducials.
//!
//! The aligned frame has X to the right, Y up and Z forward (towards the
//! nasion), with its origin at the centroid of NAS, LPA, RPA and INI.

use nalgebra::{Point3, Rotation3, Unit, Vector3};

use super::mesh::Mesh;
use crate::error::{CapscanError, Result};
use crate::models::{FiducialSet, INI, LPA, NAS, RPA};

const PARALLEL_EPS: f64 = 1e-9;
const LEVEL_EPS: f64 = 1e-9;

/// Rigid transform into the canonical head frame: `p' = R (p - origin)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    pub origin: Point3<f64>,
    pub rotation: Rotation3<f64>,
}

impl Alignment {
    pub fn identity() -> Self {
        Self {
            origin: Point3::origin(),
            rotation: Rotation3::identity(),
        }
    }

    pub fn apply_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * (p - self.origin))
    }

    pub fn apply_mesh(&self, mesh: &Mesh) -> Mesh {
        mesh.transformed(|p| self.apply_point(p))
    }

    pub fn apply_fiducials(&self, fiducials: &FiducialSet) -> FiducialSet {
        fiducials.map_points(|p| self.apply_point(p))
    }
}

/// Derives [`Alignment`] from the NAS/LPA/RPA/INI landmarks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateFrameAligner;

impl CoordinateFrameAligner {
    pub fn new() -> Self {
        Self
    }

    /// Compute the canonical frame. Fails with `MissingInput` before touching
    /// anything when a required landmark is absent.
    pub fn compute(&self, fiducials: &FiducialSet) -> Result<Alignment> {
        let nas = fiducials.require(NAS)?;
        let lpa = fiducials.require(LPA)?;
        let rpa = fiducials.require(RPA)?;
        let ini = fiducials.require(INI)?;

        let origin = Point3::from((nas.coords + lpa.coords + rpa.coords + ini.coords) / 4.0);

        // The inion is lifted to ear height so that head pitch in the scan
        // does not leak into the forward direction.
        let ear_height = 0.5 * (lpa.y + rpa.y);
        let ini_level = Point3::new(ini.x, ear_height, ini.z);
        let forward = nas - ini_level;

        let r1 = match Unit::try_new(forward, PARALLEL_EPS) {
            Some(forward) => rotation_onto_z(&forward),
            None => {
                log::warn!(
                    "{}; keeping identity",
                    CapscanError::GeometryDegenerate("NAS coincides with levelled INI".into())
                );
                Rotation3::identity()
            }
        };

        let l = r1 * (lpa - origin);
        let r = r1 * (rpa - origin);
        let r2 = level_ears(&l, &r);

        Ok(Alignment {
            origin,
            rotation: r2 * r1,
        })
    }

    /// Compute the frame and return transformed copies of the inputs.
    pub fn align(&self, mesh: &Mesh, fiducials: &FiducialSet) -> Result<(Mesh, FiducialSet, Alignment)> {
        let alignment = self.compute(fiducials)?;
        Ok((
            alignment.apply_mesh(mesh),
            alignment.apply_fiducials(fiducials),
            alignment,
        ))
    }
}

/// Closed-form axis–angle rotation taking `forward` onto +Z.
fn rotation_onto_z(forward: &Unit<Vector3<f64>>) -> Rotation3<f64> {
    let z = Vector3::z();
    let cos = forward.dot(&z).clamp(-1.0, 1.0);
    let axis = forward.cross(&z);

    match Unit::try_new(axis, PARALLEL_EPS) {
        Some(axis) => Rotation3::from_axis_angle(&axis, cos.acos()),
        None if cos > 0.0 => Rotation3::identity(),
        None => {
            log::warn!(
                "{}; rotating by pi about an orthogonal axis",
                CapscanError::GeometryDegenerate("forward vector antiparallel to +Z".into())
            );
            let helper = if forward.x.abs() < 0.9 {
                Vector3::x()
            } else {
                Vector3::y()
            };
            let orthogonal = Unit::new_normalize(forward.cross(&helper));
            Rotation3::from_axis_angle(&orthogonal, std::f64::consts::PI)
        }
    }
}

/// Roll about +Z that brings both ear points to the same height.
fn level_ears(lpa: &Vector3<f64>, rpa: &Vector3<f64>) -> Rotation3<f64> {
    let dx = lpa.x - rpa.x;
    let dy = lpa.y - rpa.y;
    let horizontal = dx.abs();
    if horizontal < LEVEL_EPS {
        log::warn!(
            "{}; skipping roll correction",
            CapscanError::GeometryDegenerate("LPA and RPA horizontally coincident".into())
        );
        return Rotation3::identity();
    }

    let tilt = dy.atan2(horizontal);
    // Sign depends on which side of the head LPA ended up on.
    let angle = if dx < 0.0 { tilt } else { -tilt };
    Rotation3::from_axis_angle(&Vector3::z_axis(), angle)
}
