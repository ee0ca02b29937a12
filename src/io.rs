//! Reading and writing session files: OBJ meshes, textures, fiducial and
//! electrode CSVs, and the camera metadata of a rendered session.

use std::fs;
use std::path::Path;

use image::RgbImage;
use nalgebra::Point3;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CapscanError, Result};
use crate::geometry::Mesh;
use crate::models::{Detected3DPoint, FiducialSet, MergedElectrode};
use crate::projection::Camera;

fn parse_error(what: &'static str, path: &Path, line: usize, reason: impl Into<String>) -> CapscanError {
    CapscanError::Parse {
        what,
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Resolve a 1-based (or negative, relative) OBJ index against `count` items.
fn resolve_index(raw: &str, count: usize) -> Option<usize> {
    let i: i64 = raw.parse().ok()?;
    let resolved = match i {
        0 => return None,
        i if i > 0 => i - 1,
        i => count as i64 + i,
    };
    (0..count as i64).contains(&resolved).then_some(resolved as usize)
}

/// Parse Wavefront OBJ text. Polygons are fan-triangulated; texture
/// coordinates are kept only when every face carries them.
pub fn parse_obj(text: &str, path: &Path) -> Result<Mesh> {
    const WHAT: &str = "OBJ mesh";

    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::new();
    let mut face_uvs: Vec<[[f32; 2]; 3]> = Vec::new();
    let mut all_faces_textured = true;

    for (n, line) in text.lines().enumerate() {
        let line_no = n + 1;
        let line = line.split('#').next().unwrap_or("").trim();
        let mut fields = line.split_whitespace();
        let Some(tag) = fields.next() else {
            continue;
        };
        match tag {
            "v" => {
                let coords: Vec<f64> = fields
                    .take(3)
                    .map(str::parse::<f64>)
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| parse_error(WHAT, path, line_no, format!("bad vertex: {e}")))?;
                if coords.len() != 3 {
                    return Err(parse_error(WHAT, path, line_no, "vertex needs three coordinates"));
                }
                vertices.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            "vt" => {
                let coords: Vec<f32> = fields
                    .take(2)
                    .map(str::parse::<f32>)
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| parse_error(WHAT, path, line_no, format!("bad uv: {e}")))?;
                if coords.len() != 2 {
                    return Err(parse_error(WHAT, path, line_no, "uv needs two coordinates"));
                }
                uvs.push([coords[0], coords[1]]);
            }
            "f" => {
                let mut corners: Vec<(u32, Option<[f32; 2]>)> = Vec::new();
                for token in fields {
                    let mut parts = token.split('/');
                    let v = parts
                        .next()
                        .and_then(|raw| resolve_index(raw, vertices.len()))
                        .ok_or_else(|| {
                            parse_error(WHAT, path, line_no, format!("bad vertex index '{token}'"))
                        })?;
                    let uv = match parts.next() {
                        Some(raw) if !raw.is_empty() => {
                            let t = resolve_index(raw, uvs.len()).ok_or_else(|| {
                                parse_error(WHAT, path, line_no, format!("bad uv index '{token}'"))
                            })?;
                            Some(uvs[t])
                        }
                        _ => None,
                    };
                    corners.push((v as u32, uv));
                }
                if corners.len() < 3 {
                    return Err(parse_error(WHAT, path, line_no, "face needs at least three corners"));
                }
                for k in 1..corners.len() - 1 {
                    let tri = [corners[0], corners[k], corners[k + 1]];
                    triangles.push(tri.map(|c| c.0));
                    match (tri[0].1, tri[1].1, tri[2].1) {
                        (Some(a), Some(b), Some(c)) => face_uvs.push([a, b, c]),
                        _ => all_faces_textured = false,
                    }
                }
            }
            _ => {}
        }
    }

    log::debug!(
        "{}: {} vertices, {} triangles",
        path.display(),
        vertices.len(),
        triangles.len()
    );
    let mesh = Mesh::new(vertices, triangles);
    if all_faces_textured && !face_uvs.is_empty() {
        mesh.with_face_uvs(face_uvs)
    } else {
        Ok(mesh)
    }
}

pub fn load_obj(path: &Path) -> Result<Mesh> {
    let text = fs::read_to_string(path)?;
    parse_obj(&text, path)
}

pub fn load_texture(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Read `code,x,y,z` rows without a header. Codes are trimmed and must be
/// unique; codes outside the required set are kept.
pub fn load_fiducials(path: &Path) -> Result<FiducialSet> {
    const WHAT: &str = "fiducial file";

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut fiducials = FiducialSet::new();
    for (n, record) in reader.records().enumerate() {
        let record = record?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(n + 1);
        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() != 4 {
            return Err(parse_error(
                WHAT,
                path,
                line,
                format!("expected 4 fields, found {}", record.len()),
            ));
        }
        let mut coords = [0.0f64; 3];
        for (slot, field) in coords.iter_mut().zip(record.iter().skip(1)) {
            *slot = field
                .parse::<f64>()
                .map_err(|e| parse_error(WHAT, path, line, format!("bad coordinate '{field}': {e}")))?;
        }
        fiducials.insert(&record[0], Point3::from(coords))?;
    }
    log::debug!("{}: {} fiducials", path.display(), fiducials.len());
    Ok(fiducials)
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// `view,method,x,y,z,label` rows, one per mapped detection.
pub fn save_electrodes(path: &Path, points: &[Detected3DPoint]) -> Result<()> {
    write_rows(path, points)
}

pub fn load_electrodes(path: &Path) -> Result<Vec<Detected3DPoint>> {
    read_rows(path)
}

/// `view,method,x,y,z,label,support` rows, one per merged electrode.
pub fn save_merged(path: &Path, electrodes: &[MergedElectrode]) -> Result<()> {
    write_rows(path, electrodes)
}

pub fn load_merged(path: &Path) -> Result<Vec<MergedElectrode>> {
    read_rows(path)
}

pub fn save_cameras(path: &Path, cameras: &[Camera]) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(cameras)?)?;
    Ok(())
}

pub fn load_cameras(path: &Path) -> Result<Vec<Camera>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
