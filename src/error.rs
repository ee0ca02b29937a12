use std::path::PathBuf;

use crate::models::DetectionMethod;
use crate::projection::CameraView;

/// Errors raised by the electrode localisation pipeline.
///
/// Only [`CapscanError::MissingInput`] and the I/O wrappers are fatal. The
/// remaining geometric variants are produced by stages that recover from them
/// and log the fallback they took.
#[derive(thiserror::Error, Debug)]
pub enum CapscanError {
    #[error("required input missing: {0}")]
    MissingInput(String),

    #[error("fiducial {0} given more than once")]
    DuplicateFiducial(String),

    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),

    #[error("no {method} candidates detected in view {view}")]
    EmptyDetection {
        view: CameraView,
        method: DetectionMethod,
    },

    #[error("ray from view {view} at pixel ({x:.1}, {y:.1}) does not hit the mesh")]
    NoIntersection { view: CameraView, x: f64, y: f64 },

    #[error("malformed {what} at {path}:{line}: {reason}")]
    Parse {
        what: &'static str,
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CapscanError>;
