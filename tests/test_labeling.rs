mod common;

use capscan::config::LabelingConfig;
use capscan::labeling::MarkerLabeler;
use common::*;

const SHAPE: (u32, u32) = (1024, 1024);

fn labeler() -> MarkerLabeler {
    MarkerLabeler::new(LabelingConfig::default())
}

fn label_of(candidates: &[DetectionCandidate], i: usize) -> Option<&str> {
    candidates[i].label.as_deref()
}

#[test]
fn front_triad_at_thirty_degrees() {
    let mut candidates = vec![
        marker_at(CameraView::Front, 515.0, 380.0),
        marker_at(CameraView::Front, 400.0, 580.0),
        marker_at(CameraView::Front, 630.0, 585.0),
        DetectionCandidate {
            method: DetectionMethod::Electrode,
            ..marker_at(CameraView::Front, 512.0, 512.0)
        },
    ];

    let labelled = labeler().label(CameraView::Front, SHAPE, &mut candidates);

    assert_eq!(labelled, 3);
    assert_eq!(label_of(&candidates, 0), Some("Fz"));
    assert_eq!(label_of(&candidates, 1), Some("Fp2"));
    assert_eq!(label_of(&candidates, 2), Some("Fp1"));
    assert_eq!(label_of(&candidates, 3), None);
}

#[test]
fn front_triad_falls_back_to_symmetric_pair() {
    let mut candidates = vec![
        marker_at(CameraView::Front, 512.0, 400.0),
        marker_at(CameraView::Front, 297.0, 440.0),
        marker_at(CameraView::Front, 727.0, 445.0),
        marker_at(CameraView::Front, 900.0, 900.0),
    ];

    labeler().label(CameraView::Front, SHAPE, &mut candidates);

    assert_eq!(label_of(&candidates, 0), Some("Fz"));
    assert_eq!(label_of(&candidates, 1), Some("Fp2"));
    assert_eq!(label_of(&candidates, 2), Some("Fp1"));
    assert_eq!(label_of(&candidates, 3), None);
}

#[test]
fn front_fallback_measures_symmetry_from_image_centre() {
    // The top marker sits right of centre; the pair is symmetric about the
    // centre column but not about the top marker.
    let mut candidates = vec![
        marker_at(CameraView::Front, 560.0, 400.0),
        marker_at(CameraView::Front, 352.0, 440.0),
        marker_at(CameraView::Front, 672.0, 445.0),
    ];

    let labelled = labeler().label(CameraView::Front, SHAPE, &mut candidates);

    assert_eq!(labelled, 3);
    assert_eq!(label_of(&candidates, 0), Some("Fz"));
    assert_eq!(label_of(&candidates, 1), Some("Fp2"));
    assert_eq!(label_of(&candidates, 2), Some("Fp1"));
}

#[test]
fn top_back_column_and_row() {
    let mut candidates = vec![
        marker_at(CameraView::TopBack, 512.0, 200.0),
        marker_at(CameraView::TopBack, 510.0, 560.0),
        marker_at(CameraView::TopBack, 515.0, 900.0),
        marker_at(CameraView::TopBack, 300.0, 560.0),
        marker_at(CameraView::TopBack, 720.0, 565.0),
    ];

    let labelled = labeler().label(CameraView::TopBack, SHAPE, &mut candidates);

    assert_eq!(labelled, 5);
    let labels: Vec<_> = (0..5).map(|i| label_of(&candidates, i)).collect();
    assert_eq!(
        labels,
        vec![Some("Cz"), Some("Pz"), Some("Oz"), Some("P4"), Some("P3")]
    );
}

#[test]
fn lowest_marker_per_half() {
    let mut candidates = vec![
        marker_at(CameraView::BackLeft, 200.0, 300.0),
        marker_at(CameraView::BackLeft, 300.0, 700.0),
        marker_at(CameraView::BackLeft, 800.0, 650.0),
        marker_at(CameraView::BackLeft, 700.0, 200.0),
    ];

    labeler().label(CameraView::BackLeft, SHAPE, &mut candidates);

    assert_eq!(label_of(&candidates, 0), None);
    assert_eq!(label_of(&candidates, 1), Some("O2"));
    assert_eq!(label_of(&candidates, 2), Some("TP9"));
    assert_eq!(label_of(&candidates, 3), None);
}

#[test]
fn existing_labels_are_kept() {
    let mut candidates = vec![
        DetectionCandidate {
            label: Some("AFz".into()),
            ..marker_at(CameraView::Front, 515.0, 380.0)
        },
        marker_at(CameraView::Front, 400.0, 580.0),
        marker_at(CameraView::Front, 630.0, 585.0),
    ];

    let labelled = labeler().label(CameraView::Front, SHAPE, &mut candidates);

    assert_eq!(labelled, 2);
    assert_eq!(label_of(&candidates, 0), Some("AFz"));
}

#[test]
fn views_without_rules_label_nothing() {
    let mut candidates = vec![marker_at(CameraView::Left, 512.0, 512.0)];
    assert_eq!(labeler().label(CameraView::Left, SHAPE, &mut candidates), 0);
    assert_eq!(candidates[0].label, None);
}
