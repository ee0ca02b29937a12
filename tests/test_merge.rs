mod common;

use capscan::config::MergeConfig;
use capscan::merge::{ElectrodeMerger, geometric_median};
use common::*;
use nalgebra::Point3;

fn merger(threshold: f64) -> ElectrodeMerger {
    ElectrodeMerger::new(MergeConfig {
        distance_threshold: threshold,
        ..MergeConfig::default()
    })
}

/// Points along a line with growing gaps: 0, 4, 12, 24, 40, 60.
fn spread_points() -> Vec<Detected3DPoint> {
    let mut x = 0.0;
    let mut out = Vec::new();
    for gap in [0.0, 4.0, 8.0, 12.0, 16.0, 20.0] {
        x += gap;
        out.push(point(CameraView::Front, DetectionMethod::Electrode, x, 0.0, 0.0));
    }
    out
}

#[test]
fn larger_threshold_never_adds_clusters() {
    let points = spread_points();
    let mut previous = usize::MAX;
    for threshold in [0.0, 3.0, 4.0, 7.9, 8.0, 12.0, 16.0, 19.0, 20.0, 100.0] {
        let count = merger(threshold).clusters(&points).len();
        assert!(count <= previous, "threshold {threshold}: {count} > {previous}");
        previous = count;
    }
}

#[test]
fn zero_threshold_keeps_every_distinct_point() {
    let points = spread_points();
    assert_eq!(merger(0.0).merge(&points).len(), points.len());
}

#[test]
fn infinite_threshold_gives_one_electrode() {
    let points = spread_points();
    let merged = merger(f64::INFINITY).merge(&points);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].support, points.len());
}

#[test]
fn single_linkage_chains_close_neighbours() {
    // 0-10-20: each neighbour within 15, ends 20 apart.
    let points: Vec<_> = [0.0, 10.0, 20.0]
        .into_iter()
        .map(|x| point(CameraView::Top, DetectionMethod::Electrode, x, 0.0, 0.0))
        .collect();
    assert_eq!(merger(15.0).clusters(&points), vec![vec![0, 1, 2]]);
}

#[test]
fn marker_wins_over_electrodes() {
    let points = vec![
        point(CameraView::Front, DetectionMethod::Electrode, 0.0, 0.0, 0.0),
        point(CameraView::Left, DetectionMethod::ElectrodeBasic, 0.5, 0.0, 0.0),
        point(CameraView::Right, DetectionMethod::Marker, 5.0, 0.0, 0.0),
        point(CameraView::Top, DetectionMethod::Electrode, 0.2, 0.1, 0.0),
    ];
    let merged = merger(15.0).merge(&points);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].method, DetectionMethod::Marker);
    assert_eq!(merged[0].view, CameraView::Right);
    assert_eq!(merged[0].position(), Point3::new(5.0, 0.0, 0.0));
}

#[test]
fn labelled_marker_wins_over_unlabelled_marker() {
    let points = vec![
        point(CameraView::Front, DetectionMethod::Marker, 0.0, 0.0, 0.0),
        point(CameraView::Left, DetectionMethod::Marker, 3.0, 0.0, 0.0)
            .with_label(Some("Fz".into())),
        point(CameraView::Top, DetectionMethod::Electrode, 1.0, 0.0, 0.0)
            .with_label(Some("Cz".into())),
    ];
    let merged = merger(15.0).merge(&points);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].label.as_deref(), Some("Fz"));
    assert_eq!(merged[0].view, CameraView::Left);
}

#[test]
fn representative_is_an_actual_member_near_the_median() {
    let points = vec![
        point(CameraView::Front, DetectionMethod::Electrode, 0.0, 0.0, 0.0),
        point(CameraView::Left, DetectionMethod::Electrode, 1.0, 0.0, 0.0),
        point(CameraView::Right, DetectionMethod::Electrode, 0.9, 0.1, 0.0),
        point(CameraView::Top, DetectionMethod::Electrode, 9.0, 0.0, 0.0),
    ];
    let merged = merger(15.0).merge(&points);
    assert_eq!(merged.len(), 1);
    assert!(points.iter().any(|p| p.position() == merged[0].position()));
    assert_ne!(merged[0].view, CameraView::Top);
}

#[test]
fn median_of_square_corners_is_its_centre() {
    let corners = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(2.0, 2.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
    ];
    let median = geometric_median(&corners, 100, 1e-9).expect("non-empty input");
    assert!((median - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-6);
}

#[test]
fn median_survives_a_point_on_the_estimate() {
    // The centroid start coincides with one input point.
    let points = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(-1.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
    ];
    let median = geometric_median(&points, 100, 1e-9).expect("non-empty input");
    assert!(median.coords.iter().all(|c| c.is_finite()));
    assert!(median.x.abs() < 1e-6);
}

#[test]
fn empty_input_merges_to_nothing() {
    assert!(merger(15.0).merge(&[]).is_empty());
    assert!(geometric_median(&[], 100, 1e-6).is_none());
}
