use image::{Rgb, RgbImage};
use nalgebra::Point3;

use super::camera::Camera;
use crate::geometry::Mesh;

/// Offscreen z-buffered rasterizer.
///
/// Textured meshes are drawn unlit so the image keeps the scan's colours;
/// meshes without texture coordinates fall back to Lambert shading.
pub struct Rasterizer<'a> {
    camera: &'a Camera,
    background: [u8; 3],
    near_clip: f64,
}

struct ScreenVertex {
    x: f64,
    y: f64,
    inv_depth: f64,
}

impl<'a> Rasterizer<'a> {
    pub fn new(camera: &'a Camera, background: [u8; 3], near_clip: f64) -> Self {
        Self {
            camera,
            background,
            near_clip,
        }
    }

    pub fn render(&self, mesh: &Mesh, texture: Option<&RgbImage>) -> RgbImage {
        let (w, h) = (self.camera.width, self.camera.height);
        let mut image = RgbImage::from_pixel(w, h, Rgb(self.background));
        let mut depth = vec![f64::INFINITY; (w as usize) * (h as usize)];

        let uvs = match (texture, mesh.face_uvs.as_ref()) {
            (Some(tex), Some(uvs)) => Some((tex, uvs)),
            _ => None,
        };

        for t in 0..mesh.triangle_count() {
            let tri = mesh.triangle(t);
            let Some(screen) = self.project_triangle(&tri) else {
                continue;
            };

            let flat = if uvs.is_none() {
                Some(self.lambert(mesh, t))
            } else {
                None
            };

            let area = edge(&screen[0], &screen[1], screen[2].x, screen[2].y);
            if area.abs() < 1e-12 {
                continue;
            }

            let min_x = screen.iter().map(|v| v.x).fold(f64::INFINITY, f64::min).floor().max(0.0) as u32;
            let max_x = screen.iter().map(|v| v.x).fold(f64::NEG_INFINITY, f64::max).ceil();
            let min_y = screen.iter().map(|v| v.y).fold(f64::INFINITY, f64::min).floor().max(0.0) as u32;
            let max_y = screen.iter().map(|v| v.y).fold(f64::NEG_INFINITY, f64::max).ceil();
            if max_x < 0.0 || max_y < 0.0 {
                continue;
            }
            let max_x = (max_x as u32).min(w - 1);
            let max_y = (max_y as u32).min(h - 1);

            for py in min_y..=max_y {
                for px in min_x..=max_x {
                    let (fx, fy) = (px as f64, py as f64);
                    let b0 = edge(&screen[1], &screen[2], fx, fy) / area;
                    let b1 = edge(&screen[2], &screen[0], fx, fy) / area;
                    let b2 = edge(&screen[0], &screen[1], fx, fy) / area;
                    if b0 < -1e-9 || b1 < -1e-9 || b2 < -1e-9 {
                        continue;
                    }

                    let inv_depth =
                        b0 * screen[0].inv_depth + b1 * screen[1].inv_depth + b2 * screen[2].inv_depth;
                    if inv_depth <= 0.0 {
                        continue;
                    }
                    let z = 1.0 / inv_depth;
                    let slot = py as usize * w as usize + px as usize;
                    if z >= depth[slot] {
                        continue;
                    }
                    depth[slot] = z;

                    let color = match (flat, uvs) {
                        (Some(c), _) => c,
                        (None, Some((tex, uvs))) => {
                            let corner = &uvs[t];
                            // Perspective-correct interpolation of texture coordinates.
                            let w0 = b0 * screen[0].inv_depth * z;
                            let w1 = b1 * screen[1].inv_depth * z;
                            let w2 = b2 * screen[2].inv_depth * z;
                            let u = w0 * corner[0][0] as f64 + w1 * corner[1][0] as f64 + w2 * corner[2][0] as f64;
                            let v = w0 * corner[0][1] as f64 + w1 * corner[1][1] as f64 + w2 * corner[2][1] as f64;
                            sample_texture(tex, u, v)
                        }
                        (None, None) => Rgb(self.background),
                    };
                    image.put_pixel(px, py, color);
                }
            }
        }

        image
    }

    fn project_triangle(&self, tri: &[Point3<f64>; 3]) -> Option<[ScreenVertex; 3]> {
        let mut out = [
            ScreenVertex { x: 0.0, y: 0.0, inv_depth: 0.0 },
            ScreenVertex { x: 0.0, y: 0.0, inv_depth: 0.0 },
            ScreenVertex { x: 0.0, y: 0.0, inv_depth: 0.0 },
        ];
        for (slot, p) in out.iter_mut().zip(tri) {
            let depth = self.camera.to_camera_space(p).z;
            if depth <= self.near_clip {
                return None;
            }
            let [x, y] = self.camera.project(p)?;
            *slot = ScreenVertex {
                x,
                y,
                inv_depth: 1.0 / depth,
            };
        }
        Some(out)
    }

    fn lambert(&self, mesh: &Mesh, triangle: usize) -> Rgb<u8> {
        let shade = mesh
            .triangle_normal(triangle)
            .map(|n| n.dot(&self.camera.forward).abs())
            .unwrap_or(0.0);
        let level = (40.0 + 180.0 * shade).round().clamp(0.0, 255.0) as u8;
        Rgb([level, level, level])
    }
}

fn edge(a: &ScreenVertex, b: &ScreenVertex, x: f64, y: f64) -> f64 {
    (b.x - a.x) * (y - a.y) - (b.y - a.y) * (x - a.x)
}

/// Bilinear texture lookup; `v` runs bottom to top.
pub fn sample_texture(texture: &RgbImage, u: f64, v: f64) -> Rgb<u8> {
    let (w, h) = texture.dimensions();
    let tx = (u.clamp(0.0, 1.0) * (w - 1) as f64).max(0.0);
    let ty = ((1.0 - v.clamp(0.0, 1.0)) * (h - 1) as f64).max(0.0);
    let x0 = tx.floor() as u32;
    let y0 = ty.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = tx - x0 as f64;
    let fy = ty - y0 as f64;

    let p00 = texture.get_pixel(x0, y0).0;
    let p10 = texture.get_pixel(x1, y0).0;
    let p01 = texture.get_pixel(x0, y1).0;
    let p11 = texture.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let a = p00[c] as f64 + fx * (p10[c] as f64 - p00[c] as f64);
        let b = p01[c] as f64 + fx * (p11[c] as f64 - p01[c] as f64);
        out[c] = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
