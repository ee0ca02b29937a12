use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::labeling::{LabelRule, Side};

/// Fixed camera identities around the aligned head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CameraView {
    Front,
    Back,
    Left,
    Right,
    Top,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
    TopFront,
    TopBack,
    TopLeft,
    TopRight,
    TopFrontLeft,
    TopFrontRight,
    TopBackLeft,
    TopBackRight,
}

impl CameraView {
    pub const ALL: [CameraView; 17] = [
        CameraView::Front,
        CameraView::Back,
        CameraView::Left,
        CameraView::Right,
        CameraView::Top,
        CameraView::FrontLeft,
        CameraView::FrontRight,
        CameraView::BackLeft,
        CameraView::BackRight,
        CameraView::TopFront,
        CameraView::TopBack,
        CameraView::TopLeft,
        CameraView::TopRight,
        CameraView::TopFrontLeft,
        CameraView::TopFrontRight,
        CameraView::TopBackLeft,
        CameraView::TopBackRight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CameraView::Front => "FRONT",
            CameraView::Back => "BACK",
            CameraView::Left => "LEFT",
            CameraView::Right => "RIGHT",
            CameraView::Top => "TOP",
            CameraView::FrontLeft => "FRONT_LEFT",
            CameraView::FrontRight => "FRONT_RIGHT",
            CameraView::BackLeft => "BACK_LEFT",
            CameraView::BackRight => "BACK_RIGHT",
            CameraView::TopFront => "TOP_FRONT",
            CameraView::TopBack => "TOP_BACK",
            CameraView::TopLeft => "TOP_LEFT",
            CameraView::TopRight => "TOP_RIGHT",
            CameraView::TopFrontLeft => "TOP_FRONT_LEFT",
            CameraView::TopFrontRight => "TOP_FRONT_RIGHT",
            CameraView::TopBackLeft => "TOP_BACK_LEFT",
            CameraView::TopBackRight => "TOP_BACK_RIGHT",
        }
    }

    /// File stem used for the rendered image of this view.
    pub fn file_stem(self) -> String {
        self.name().to_lowercase()
    }

    pub fn params(self) -> &'static ViewParams {
        &VIEW_TABLE[self as usize]
    }
}

impl fmt::Display for CameraView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CameraView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace('-', "_");
        CameraView::ALL
            .into_iter()
            .find(|v| v.name() == wanted)
            .ok_or_else(|| format!("unknown camera view '{s}'"))
    }
}

/// Size limits for blob detection in one view, in pixels at the reference width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlobLimits {
    pub min_area: f64,
    pub min_distance: f64,
    pub min_radius: f64,
    pub max_radius: f64,
}

impl BlobLimits {
    /// Rescale for an image whose width differs from the reference width.
    pub fn scaled(&self, scale: f64) -> BlobLimits {
        BlobLimits {
            min_area: self.min_area * scale * scale,
            min_distance: self.min_distance * scale,
            min_radius: (self.min_radius * scale).max(1.0),
            max_radius: (self.max_radius * scale).max(2.0),
        }
    }
}

/// Constant per-view configuration: camera placement and detection defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewParams {
    pub view: CameraView,
    /// Direction from the mesh centre to the camera, per axis of the aligned frame.
    pub direction: Vector3<f64>,
    pub up: Vector3<f64>,
    /// Camera offset as a multiple of the bounding-box extent on each axis.
    pub distance_scale: f64,
    pub electrode: BlobLimits,
    pub marker: BlobLimits,
    pub expected_markers: usize,
    pub label_rules: Vec<LabelRule>,
}

const ELECTRODE_AXIAL: BlobLimits = BlobLimits {
    min_area: 60.0,
    min_distance: 14.0,
    min_radius: 6.0,
    max_radius: 28.0,
};

const ELECTRODE_OBLIQUE: BlobLimits = BlobLimits {
    min_area: 45.0,
    min_distance: 12.0,
    min_radius: 5.0,
    max_radius: 26.0,
};

const MARKER_AXIAL: BlobLimits = BlobLimits {
    min_area: 250.0,
    min_distance: 30.0,
    min_radius: 9.0,
    max_radius: 40.0,
};

const MARKER_OBLIQUE: BlobLimits = BlobLimits {
    min_area: 200.0,
    min_distance: 26.0,
    min_radius: 8.0,
    max_radius: 36.0,
};

static VIEW_TABLE: LazyLock<Vec<ViewParams>> =
    LazyLock::new(|| CameraView::ALL.into_iter().map(build_params).collect());

fn build_params(view: CameraView) -> ViewParams {
    use CameraView::*;

    let (x, y, z): (f64, f64, f64) = match view {
        Front => (0.0, 0.0, 1.0),
        Back => (0.0, 0.0, -1.0),
        Left => (-1.0, 0.0, 0.0),
        Right => (1.0, 0.0, 0.0),
        Top => (0.0, 1.0, 0.0),
        FrontLeft => (-1.0, 0.0, 1.0),
        FrontRight => (1.0, 0.0, 1.0),
        BackLeft => (-1.0, 0.0, -1.0),
        BackRight => (1.0, 0.0, -1.0),
        TopFront => (0.0, 1.0, 1.0),
        TopBack => (0.0, 1.0, -1.0),
        TopLeft => (-1.0, 1.0, 0.0),
        TopRight => (1.0, 1.0, 0.0),
        TopFrontLeft => (-1.0, 1.0, 1.0),
        TopFrontRight => (1.0, 1.0, 1.0),
        TopBackLeft => (-1.0, 1.0, -1.0),
        TopBackRight => (1.0, 1.0, -1.0),
    };
    let axes = [x, y, z].iter().filter(|c| **c != 0.0).count();

    // Looking straight down, the nose points to the top of the image.
    let up = if view == Top {
        Vector3::z()
    } else {
        Vector3::y()
    };

    let distance_scale = match axes {
        1 => 2.5,
        2 => 2.0,
        _ => 1.75,
    };

    let (electrode, marker) = if axes == 1 {
        (ELECTRODE_AXIAL, MARKER_AXIAL)
    } else {
        (ELECTRODE_OBLIQUE, MARKER_OBLIQUE)
    };

    let (expected_markers, label_rules) = match view {
        Front => (
            3,
            vec![LabelRule::FrontTriad {
                top: "Fz".into(),
                left: "Fp2".into(),
                right: "Fp1".into(),
            }],
        ),
        TopBack => (
            5,
            vec![
                LabelRule::MidlineColumn {
                    labels: vec!["Cz".into(), "Pz".into(), "Oz".into()],
                },
                LabelRule::HorizontalRow {
                    height_fraction: 0.55,
                    labels: vec!["P4".into(), "Pz".into(), "P3".into()],
                },
            ],
        ),
        BackLeft => (
            2,
            vec![
                LabelRule::LowestInHalf {
                    side: Side::Left,
                    label: "O2".into(),
                },
                LabelRule::LowestInHalf {
                    side: Side::Right,
                    label: "TP9".into(),
                },
            ],
        ),
        BackRight => (
            2,
            vec![
                LabelRule::LowestInHalf {
                    side: Side::Left,
                    label: "TP10".into(),
                },
                LabelRule::LowestInHalf {
                    side: Side::Right,
                    label: "O1".into(),
                },
            ],
        ),
        _ => (0, Vec::new()),
    };

    ViewParams {
        view,
        direction: Vector3::new(x, y, z),
        up,
        distance_scale,
        electrode,
        marker,
        expected_markers,
        label_rules,
    }
}
