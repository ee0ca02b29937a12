use capscan::geometry::Mesh;
use capscan::models::{FiducialSet, INI, LPA, NAS, RPA, VTX};
use image::{Rgb, RgbImage};
use nalgebra::Point3;

/// Closed UV sphere centred at the origin.
pub fn uv_sphere(radius: f64, stacks: u32, slices: u32) -> Mesh {
    let mut vertices = vec![Point3::new(0.0, radius, 0.0)];
    for i in 1..stacks {
        let phi = std::f64::consts::PI * i as f64 / stacks as f64;
        for j in 0..slices {
            let theta = std::f64::consts::TAU * j as f64 / slices as f64;
            vertices.push(Point3::new(
                radius * phi.sin() * theta.cos(),
                radius * phi.cos(),
                radius * phi.sin() * theta.sin(),
            ));
        }
    }
    let bottom = vertices.len() as u32;
    vertices.push(Point3::new(0.0, -radius, 0.0));

    let ring = |i: u32, j: u32| 1 + (i - 1) * slices + j % slices;
    let mut triangles = Vec::new();
    for j in 0..slices {
        triangles.push([0, ring(1, j + 1), ring(1, j)]);
    }
    for i in 1..stacks - 1 {
        for j in 0..slices {
            let (a, b) = (ring(i, j), ring(i, j + 1));
            let (c, d) = (ring(i + 1, j), ring(i + 1, j + 1));
            triangles.push([a, b, d]);
            triangles.push([a, d, c]);
        }
    }
    for j in 0..slices {
        triangles.push([bottom, ring(stacks - 1, j), ring(stacks - 1, j + 1)]);
    }
    Mesh::new(vertices, triangles)
}

/// Landmarks of a head of radius `r` already in the canonical frame.
pub fn canonical_fiducials(r: f64) -> FiducialSet {
    let mut set = FiducialSet::new();
    for (code, p) in [
        (NAS, Point3::new(0.0, 0.0, r)),
        (INI, Point3::new(0.0, 0.0, -r)),
        (LPA, Point3::new(-r, 0.0, 0.0)),
        (RPA, Point3::new(r, 0.0, 0.0)),
        (VTX, Point3::new(0.0, r, 0.0)),
    ] {
        set.insert(code, p).expect("fixture codes are unique");
    }
    set
}

/// Square plate in the z = 0 plane, `size` wide, facing +Z, with UVs
/// spanning the whole texture.
pub fn textured_plate(size: f64, divisions: u32) -> Mesh {
    let half = size / 2.0;
    let n = divisions + 1;
    let mut vertices = Vec::new();
    let mut uv = Vec::new();
    for j in 0..n {
        for i in 0..n {
            let u = i as f64 / divisions as f64;
            let v = j as f64 / divisions as f64;
            vertices.push(Point3::new(-half + u * size, -half + v * size, 0.0));
            uv.push([u as f32, v as f32]);
        }
    }
    let mut triangles = Vec::new();
    let mut face_uvs = Vec::new();
    for j in 0..divisions {
        for i in 0..divisions {
            let a = j * n + i;
            let (b, c, d) = (a + 1, a + n, a + n + 1);
            for tri in [[a, b, d], [a, d, c]] {
                face_uvs.push(tri.map(|k| uv[k as usize]));
                triangles.push(tri);
            }
        }
    }
    Mesh::new(vertices, triangles)
        .with_face_uvs(face_uvs)
        .expect("one uv triple per triangle")
}

/// Blob centres on the plate, in millimetres, at least 30 mm apart.
pub fn plate_blobs() -> Vec<Point3<f64>> {
    vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(-50.0, 40.0, 0.0),
        Point3::new(50.0, 40.0, 0.0),
        Point3::new(-50.0, -40.0, 0.0),
        Point3::new(50.0, -40.0, 0.0),
    ]
}

/// Light skin tone for textures that should read as foreground.
pub const SKIN: Rgb<u8> = Rgb([224, 172, 140]);

/// White texture for [`textured_plate`] with black discs of `radius_mm`
/// at `blobs`.
pub fn blob_texture(pixels: u32, plate_size: f64, blobs: &[Point3<f64>], radius_mm: f64) -> RgbImage {
    blob_texture_on(pixels, plate_size, blobs, radius_mm, Rgb([255, 255, 255]))
}

/// Like [`blob_texture`], on a `base` colour instead of white.
pub fn blob_texture_on(
    pixels: u32,
    plate_size: f64,
    blobs: &[Point3<f64>],
    radius_mm: f64,
    base: Rgb<u8>,
) -> RgbImage {
    let half = plate_size / 2.0;
    let scale = (pixels - 1) as f64 / plate_size;
    let radius_px = radius_mm * scale;
    let centres: Vec<(f64, f64)> = blobs
        .iter()
        .map(|p| ((p.x + half) * scale, (half - p.y) * scale))
        .collect();
    RgbImage::from_fn(pixels, pixels, |x, y| {
        let inside = centres
            .iter()
            .any(|(cx, cy)| (x as f64 - cx).hypot(y as f64 - cy) <= radius_px);
        if inside { Rgb([15, 15, 15]) } else { base }
    })
}
