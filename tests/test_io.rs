mod common;

use std::io::Write;

use capscan::error::CapscanError;
use capscan::io;
use capscan::models::{MergedElectrode, NAS, VTX};
use common::*;
use nalgebra::Point3;

#[test]
fn fiducial_rows_are_trimmed() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "NAS, 0.0, 10.5, 90")?;
    writeln!(file, "LPA,-80,0,0")?;
    writeln!(file, "RPA , 80 , 0 , 0")?;
    writeln!(file, "INI,0,0,-90")?;
    writeln!(file, "VTX,0,95,0")?;
    writeln!(file, "Cz,0,94,1")?;

    let fiducials = io::load_fiducials(file.path())?;

    assert_eq!(fiducials.len(), 6);
    assert_eq!(fiducials.get(NAS), Some(Point3::new(0.0, 10.5, 90.0)));
    assert_eq!(fiducials.get("RPA"), Some(Point3::new(80.0, 0.0, 0.0)));
    fiducials.require_all()?;
    Ok(())
}

#[test]
fn duplicate_fiducial_row_is_an_error() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "VTX,0,95,0")?;
    writeln!(file, "VTX,0,96,0")?;

    let err = io::load_fiducials(file.path()).unwrap_err();
    assert!(matches!(err, CapscanError::DuplicateFiducial(code) if code == VTX));
    Ok(())
}

#[test]
fn bad_coordinate_reports_its_line() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "NAS,0,0,90")?;
    writeln!(file, "LPA,-80,zero,0")?;

    match io::load_fiducials(file.path()) {
        Err(CapscanError::Parse { line, .. }) => assert_eq!(line, 2),
        other => panic!("expected a parse error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn electrode_files_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let points = vec![
        point(CameraView::Front, DetectionMethod::Marker, 1.5, -2.0, 90.25).with_label(Some("Fz".into())),
        point(CameraView::TopBackLeft, DetectionMethod::ElectrodeBasic, 0.0, 3.0, 4.0),
    ];
    let merged = vec![MergedElectrode {
        view: CameraView::Front,
        method: DetectionMethod::Marker,
        x: 1.5,
        y: -2.0,
        z: 90.25,
        label: Some("Fz".into()),
        support: 4,
    }];

    let points_path = dir.path().join("electrodes.csv");
    let merged_path = dir.path().join("merged_electrodes.csv");
    io::save_electrodes(&points_path, &points)?;
    io::save_merged(&merged_path, &merged)?;

    let text = std::fs::read_to_string(&points_path)?;
    assert_eq!(text.lines().next(), Some("FRONT,MARKER,1.5,-2.0,90.25,Fz"));
    assert_eq!(io::load_electrodes(&points_path)?, points);
    assert_eq!(io::load_merged(&merged_path)?, merged);
    Ok(())
}

#[test]
fn obj_file_loads_from_disk() -> anyhow::Result<()> {
    let mut file = tempfile::Builder::new().suffix(".obj").tempfile()?;
    writeln!(file, "# unit triangle")?;
    writeln!(file, "v 0 0 0")?;
    writeln!(file, "v 1 0 0")?;
    writeln!(file, "v 0 1 0")?;
    writeln!(file, "f 1 2 3")?;

    let mesh = io::load_obj(file.path())?;
    assert_eq!(mesh.vertex_count(), 3);
    assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
    Ok(())
}
