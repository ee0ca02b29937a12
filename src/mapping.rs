use std::collections::HashMap;

use crate::error::CapscanError;
use crate::geometry::Mesh;
use crate::models::{Detected3DPoint, DetectionCandidate};
use crate::projection::{Camera, CameraView};

/// Casts 2D detections onto the mesh using the cameras the views were
/// rendered with.
pub struct ElectrodeMapper<'a> {
    mesh: &'a Mesh,
    cameras: HashMap<CameraView, &'a Camera>,
}

impl<'a> ElectrodeMapper<'a> {
    pub fn new(mesh: &'a Mesh, cameras: impl IntoIterator<Item = &'a Camera>) -> Self {
        Self {
            mesh,
            cameras: cameras.into_iter().map(|c| (c.view, c)).collect(),
        }
    }

    /// Closest surface hit for one candidate.
    pub fn map_one(&self, candidate: &DetectionCandidate) -> Result<Detected3DPoint, CapscanError> {
        let camera = self.cameras.get(&candidate.view).ok_or_else(|| {
            CapscanError::MissingInput(format!("no camera recorded for view {}", candidate.view))
        })?;
        let ray = camera.pixel_to_ray(candidate.pixel_x, candidate.pixel_y);
        let hit = self
            .mesh
            .intersect_ray(&ray)
            .ok_or(CapscanError::NoIntersection {
                view: candidate.view,
                x: candidate.pixel_x,
                y: candidate.pixel_y,
            })?;
        Ok(Detected3DPoint::new(candidate.view, candidate.method, hit.point)
            .with_label(candidate.label.clone()))
    }

    /// Map every candidate; those whose ray misses are dropped with a warning.
    pub fn map(&self, candidates: &[DetectionCandidate]) -> Vec<Detected3DPoint> {
        let mut points = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match self.map_one(candidate) {
                Ok(point) => points.push(point),
                Err(e) => log::warn!("dropping {} candidate: {e}", candidate.method),
            }
        }
        log::debug!("mapped {} of {} candidates", points.len(), candidates.len());
        points
    }
}
