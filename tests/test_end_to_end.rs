mod common;

use capscan::config::{DetectionConfig, MergeConfig, RenderConfig};
use capscan::detection::{PreparedView, StageTrace, ViewDetector, detector_for};
use capscan::mapping::ElectrodeMapper;
use capscan::merge::ElectrodeMerger;
use capscan::projection::{Camera, MultiViewProjector};
use common::*;
use image::{Rgb, RgbImage};
use nalgebra::Point3;

const PLATE: f64 = 200.0;
const BLOB_RADIUS: f64 = 4.0;

/// The FRONT view of the blob plate, ready for detection.
struct FrontView {
    plate: Mesh,
    camera: Camera,
    prepared: PreparedView,
}

fn front_view(base: Rgb<u8>) -> anyhow::Result<FrontView> {
    let plate = textured_plate(PLATE, 8);
    let texture = blob_texture_on(1024, PLATE, &plate_blobs(), BLOB_RADIUS, base);
    let projector = MultiViewProjector::new(&plate, Some(&texture), RenderConfig::default());
    let camera = projector.camera(CameraView::Front)?;
    let image = projector.render(&camera);
    let prepared = PreparedView::new(CameraView::Front, image, &DetectionConfig::default());
    Ok(FrontView {
        plate,
        camera,
        prepared,
    })
}

impl FrontView {
    fn candidates(&self, method: DetectionMethod) -> Vec<DetectionCandidate> {
        detector_for(method, &DetectionConfig::default())
            .candidates(&self.prepared, &mut StageTrace::disabled())
    }

    fn points(&self, method: DetectionMethod) -> Vec<Detected3DPoint> {
        ElectrodeMapper::new(&self.plate, [&self.camera]).map(&self.candidates(method))
    }
}

fn nearest_blob(p: &Point3<f64>) -> f64 {
    plate_blobs()
        .iter()
        .map(|b| (b - p).norm())
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn painted_markers_are_recovered_in_3d() -> anyhow::Result<()> {
    let points = front_view(Rgb([255, 255, 255]))?.points(DetectionMethod::Marker);
    let merged = ElectrodeMerger::new(MergeConfig::default()).merge(&points);

    assert_eq!(merged.len(), 5, "merged: {merged:?}");
    for blob in plate_blobs() {
        let closest = merged
            .iter()
            .map(|e| (e.position() - blob).norm())
            .fold(f64::INFINITY, f64::min);
        assert!(closest < 2.0, "blob at {blob:?} missed by {closest:.2} mm");
    }
    assert!(merged.iter().all(|e| e.method == DetectionMethod::Marker));
    Ok(())
}

#[test]
fn classical_electrodes_sit_on_blobs() -> anyhow::Result<()> {
    let points = front_view(Rgb([255, 255, 255]))?.points(DetectionMethod::ElectrodeBasic);

    assert!(!points.is_empty());
    for p in &points {
        let d = nearest_blob(&p.position());
        assert!(d < 2.0, "electrode at {:?} is {d:.2} mm from any blob", p.position());
        assert!(p.z.abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn all_methods_fuse_into_one_electrode_per_blob() -> anyhow::Result<()> {
    let view = front_view(SKIN)?;
    let mut points = Vec::new();
    for method in DetectionMethod::ALL {
        let found = view.points(method);
        assert!(!found.is_empty(), "{method} found nothing");
        points.extend(found);
    }
    let merged = ElectrodeMerger::new(MergeConfig::default()).merge(&points);

    assert_eq!(merged.len(), 5, "merged: {merged:?}");
    for blob in plate_blobs() {
        let near: Vec<_> = merged
            .iter()
            .filter(|e| (e.position() - blob).norm() < 2.0)
            .collect();
        assert_eq!(near.len(), 1, "blob at {blob:?}: {near:?}");
        assert_eq!(near[0].method, DetectionMethod::Marker);
        assert!(near[0].support >= 3, "support {}", near[0].support);
    }
    Ok(())
}

#[test]
fn superpixel_detector_finds_each_blob_once() -> anyhow::Result<()> {
    let view = front_view(SKIN)?;
    let candidates = view.candidates(DetectionMethod::Electrode);
    let centres: Vec<[f64; 2]> = plate_blobs()
        .iter()
        .filter_map(|b| view.camera.project(b))
        .collect();
    assert_eq!(centres.len(), 5);

    assert_eq!(candidates.len(), 5, "candidates: {candidates:?}");
    for [cx, cy] in centres {
        let hits: Vec<_> = candidates
            .iter()
            .filter(|c| (c.pixel_x - cx).hypot(c.pixel_y - cy) < 3.0)
            .collect();
        assert_eq!(hits.len(), 1, "blob at ({cx:.1}, {cy:.1}): {hits:?}");
        assert_eq!(hits[0].method, DetectionMethod::Electrode);
    }
    Ok(())
}

#[test]
fn blank_view_yields_no_candidates() {
    let config = DetectionConfig::default();
    let blank = RgbImage::from_pixel(256, 256, Rgb([255, 255, 255]));
    let prepared = PreparedView::new(CameraView::Top, blank, &config);
    assert!(!prepared.has_foreground());

    for method in DetectionMethod::ALL {
        let found = detector_for(method, &config).candidates(&prepared, &mut StageTrace::disabled());
        assert!(found.is_empty(), "{method} found {} candidates", found.len());
    }
}
