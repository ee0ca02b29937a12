mod common;

use capscan::config::CropConfig;
use capscan::error::CapscanError;
use capscan::geometry::RegionExtractor;
use capscan::models::VTX;
use common::*;
use nalgebra::Point3;

/// Sphere plus a small loose triangle floating inside it.
fn sphere_with_debris() -> Mesh {
    let mut mesh = uv_sphere(90.0, 16, 32);
    let base = mesh.vertices.len() as u32;
    mesh.vertices.extend([
        Point3::new(0.0, 10.0, 0.0),
        Point3::new(2.0, 10.0, 0.0),
        Point3::new(0.0, 12.0, 0.0),
    ]);
    mesh.triangles.push([base, base + 1, base + 2]);
    mesh
}

#[test]
fn keeps_the_upper_cap_only() -> anyhow::Result<()> {
    let mesh = sphere_with_debris();
    let fiducials = canonical_fiducials(90.0);

    let cap = RegionExtractor::new(CropConfig::default()).extract(&mesh, &fiducials)?;

    assert!(!cap.is_empty());
    assert!(cap.triangle_count() < mesh.triangle_count());
    assert!(cap.vertices.iter().all(|p| p.y >= -1e-6));
    let top = cap.vertices.iter().map(|p| p.y).fold(f64::MIN, f64::max);
    assert!((top - 90.0).abs() < 1e-9, "vertex cut away, top at {top}");
    // The loose triangle is not part of the largest component.
    assert!(!cap.vertices.contains(&Point3::new(0.0, 12.0, 0.0)));
    Ok(())
}

#[test]
fn input_mesh_is_not_modified() -> anyhow::Result<()> {
    let mesh = sphere_with_debris();
    let before = mesh.clone();
    RegionExtractor::new(CropConfig::default()).extract(&mesh, &canonical_fiducials(90.0))?;
    assert_eq!(mesh, before);
    Ok(())
}

#[test]
fn crop_box_uses_independent_margins() -> anyhow::Result<()> {
    let extractor = RegionExtractor::new(CropConfig::default());
    let bbox = extractor.crop_box(&canonical_fiducials(90.0))?;

    // Fiducial extents: 180 wide, 90 tall, 180 deep.
    assert!((bbox.min.x - (-90.0 - 0.15 * 180.0)).abs() < 1e-9);
    assert!((bbox.max.y - (90.0 + 0.25 * 90.0)).abs() < 1e-9);
    assert!((bbox.min.y - (0.0 - 0.6 * 90.0)).abs() < 1e-9);
    assert!((bbox.max.z - (90.0 + 0.2 * 180.0)).abs() < 1e-9);
    Ok(())
}

#[test]
fn fiducial_plane_points_up() -> anyhow::Result<()> {
    let plane = RegionExtractor::default().fiducial_plane(&canonical_fiducials(90.0))?;
    assert!((plane.normal.y - 1.0).abs() < 1e-9);
    assert!(plane.signed_distance(&Point3::new(0.0, 5.0, 0.0)) > 0.0);
    Ok(())
}

#[test]
fn collinear_fiducials_are_degenerate() {
    let mut fiducials = FiducialSet::new();
    for (code, x) in [("NAS", 0.0), ("LPA", -90.0), ("RPA", 90.0)] {
        fiducials.insert(code, Point3::new(x, 0.0, 0.0)).unwrap();
    }
    let result = RegionExtractor::default().fiducial_plane(&fiducials);
    assert!(matches!(result, Err(CapscanError::GeometryDegenerate(_))));
}

#[test]
fn missing_vertex_fiducial_is_fatal() {
    let mut fiducials = FiducialSet::new();
    for (code, p) in canonical_fiducials(90.0).iter() {
        if code != VTX {
            fiducials.insert(code, *p).unwrap();
        }
    }
    let result = RegionExtractor::default().extract(&uv_sphere(90.0, 8, 16), &fiducials);
    assert!(matches!(result, Err(CapscanError::MissingInput(_))));
}
