use std::collections::BTreeMap;
use std::fmt;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{CapscanError, Result};
use crate::projection::CameraView;

/// Nasion.
pub const NAS: &str = "NAS";
/// Left pre-auricular point.
pub const LPA: &str = "LPA";
/// Right pre-auricular point.
pub const RPA: &str = "RPA";
/// Inion.
pub const INI: &str = "INI";
/// Vertex.
pub const VTX: &str = "VTX";

/// Fiducial codes every session must provide.
pub const REQUIRED_FIDUCIALS: [&str; 5] = [NAS, LPA, RPA, INI, VTX];

/// Named anatomical landmarks in mesh coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiducialSet {
    points: BTreeMap<String, Point3<f64>>,
}

impl FiducialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a landmark. Codes are unique; a second insert of the same code fails.
    pub fn insert(&mut self, code: impl Into<String>, point: Point3<f64>) -> Result<()> {
        let code = code.into();
        if self.points.contains_key(&code) {
            return Err(CapscanError::DuplicateFiducial(code));
        }
        self.points.insert(code, point);
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<Point3<f64>> {
        self.points.get(code).copied()
    }

    /// Look up a landmark that the calling stage cannot work without.
    pub fn require(&self, code: &str) -> Result<Point3<f64>> {
        self.get(code)
            .ok_or_else(|| CapscanError::MissingInput(format!("required fiducial {code} missing")))
    }

    /// Check that all of [`REQUIRED_FIDUCIALS`] are present.
    pub fn require_all(&self) -> Result<[Point3<f64>; 5]> {
        Ok([
            self.require(NAS)?,
            self.require(LPA)?,
            self.require(RPA)?,
            self.require(INI)?,
            self.require(VTX)?,
        ])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Point3<f64>)> {
        self.points.iter().map(|(code, p)| (code.as_str(), p))
    }

    /// Apply `f` to every landmark, returning a new set.
    pub fn map_points(&self, f: impl Fn(&Point3<f64>) -> Point3<f64>) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|(code, p)| (code.clone(), f(p)))
                .collect(),
        }
    }
}

/// How a detection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionMethod {
    /// Painted reference marker found by the classical detector.
    Marker,
    /// Electrode found by the classical threshold/DoG/circle detector.
    ElectrodeBasic,
    /// Electrode found by the superpixel/mixture-model detector.
    Electrode,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 3] = [
        DetectionMethod::Marker,
        DetectionMethod::ElectrodeBasic,
        DetectionMethod::Electrode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::Marker => "MARKER",
            DetectionMethod::ElectrodeBasic => "ELECTRODE_BASIC",
            DetectionMethod::Electrode => "ELECTRODE",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A circle in pixel coordinates (column, row, radius).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl Circle {
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { x, y, radius }
    }

    pub fn distance_to(&self, other: &Circle) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A 2D detection in one rendered view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub view: CameraView,
    pub method: DetectionMethod,
    pub pixel_x: f64,
    pub pixel_y: f64,
    pub pixel_radius: f64,
    pub label: Option<String>,
}

impl DetectionCandidate {
    pub fn from_circle(view: CameraView, method: DetectionMethod, circle: Circle) -> Self {
        Self {
            view,
            method,
            pixel_x: circle.x,
            pixel_y: circle.y,
            pixel_radius: circle.radius,
            label: None,
        }
    }
}

/// The ray-cast image of a [`DetectionCandidate`] on the mesh surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detected3DPoint {
    pub view: CameraView,
    pub method: DetectionMethod,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub label: Option<String>,
}

impl Detected3DPoint {
    pub fn new(view: CameraView, method: DetectionMethod, position: Point3<f64>) -> Self {
        Self {
            view,
            method,
            x: position.x,
            y: position.y,
            z: position.z,
            label: None,
        }
    }

    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }
}

/// Final electrode after multi-view merging.
///
/// `view` and `method` carry the provenance of the candidate chosen to
/// represent its cluster; `support` is the cluster size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedElectrode {
    pub view: CameraView,
    pub method: DetectionMethod,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub label: Option<String>,
    pub support: usize,
}

impl MergedElectrode {
    pub fn position(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }
}
