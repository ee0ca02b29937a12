pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod io;
pub mod labeling;
pub mod mapping;
pub mod merge;
pub mod models;
pub mod pipeline;
pub mod projection;

pub use config::PipelineConfig;
pub use detection::{PreparedView, StageTrace, ViewDetector, detector_for};
pub use error::{CapscanError, Result};
pub use geometry::{Alignment, CoordinateFrameAligner, Mesh, RegionExtractor};
pub use labeling::{LabelRule, MarkerLabeler};
pub use mapping::ElectrodeMapper;
pub use merge::ElectrodeMerger;
pub use models::{
    Circle, Detected3DPoint, DetectionCandidate, DetectionMethod, FiducialSet, MergedElectrode,
};
pub use pipeline::{DebugConfig, Pipeline, SessionInputs, SessionReport};
pub use projection::{Camera, CameraView, MultiViewProjector, RenderedView};
