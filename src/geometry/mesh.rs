use nalgebra::{Point3, Unit, Vector3};

use super::disjoint_set::DisjointSet;
use crate::error::{CapscanError, Result};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for p in iter {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Some(Self { min, max })
    }

    pub fn extents(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|axis| p[axis] >= self.min[axis] && p[axis] <= self.max[axis])
    }

    /// Slab test. Returns the entry distance when the ray touches the box.
    pub fn ray_entry(&self, ray: &Ray) -> Option<f64> {
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;
        for axis in 0..3 {
            let o = ray.origin[axis];
            let d = ray.direction[axis];
            if d.abs() < 1e-15 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (self.min[axis] - o) * inv;
            let mut t1 = (self.max[axis] - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max < t_min {
                return None;
            }
        }
        (t_max >= 0.0).then_some(t_min.max(0.0))
    }
}

/// Half-line with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Option<Self> {
        Unit::try_new(direction, 1e-12).map(|direction| Self { origin, direction })
    }

    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction.into_inner() * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Point3<f64>,
    pub distance: f64,
    pub triangle: usize,
}

/// Triangulated surface with optional face-varying texture coordinates.
///
/// Stages never mutate a mesh they were handed; every operation that changes
/// geometry returns a new mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
    /// One (u, v) pair per triangle corner, parallel to `triangles`.
    pub face_uvs: Option<Vec<[[f32; 2]; 3]>>,
}

impl Mesh {
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
            face_uvs: None,
        }
    }

    pub fn with_face_uvs(mut self, uvs: Vec<[[f32; 2]; 3]>) -> Result<Self> {
        if uvs.len() != self.triangles.len() {
            return Err(CapscanError::GeometryDegenerate(format!(
                "{} uv triples for {} triangles",
                uvs.len(),
                self.triangles.len()
            )));
        }
        self.face_uvs = Some(uvs);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, index: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.triangles[index];
        [
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ]
    }

    pub fn triangle_normal(&self, index: usize) -> Option<Unit<Vector3<f64>>> {
        let [a, b, c] = self.triangle(index);
        Unit::try_new((b - a).cross(&(c - a)), 1e-15)
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }

    /// Apply a point transform to every vertex.
    pub fn transformed(&self, f: impl Fn(&Point3<f64>) -> Point3<f64>) -> Mesh {
        Mesh {
            vertices: self.vertices.iter().map(f).collect(),
            triangles: self.triangles.clone(),
            face_uvs: self.face_uvs.clone(),
        }
    }

    /// Keep the triangles for which `keep` holds, dropping unreferenced vertices.
    pub fn filter_triangles(&self, keep: impl Fn(&[Point3<f64>; 3]) -> bool) -> Mesh {
        let selected: Vec<usize> = (0..self.triangles.len())
            .filter(|&i| keep(&self.triangle(i)))
            .collect();
        self.subset(&selected)
    }

    /// Build a compact mesh from the given triangle indices.
    pub fn subset(&self, triangle_ids: &[usize]) -> Mesh {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut vertices = Vec::new();
        let mut triangles = Vec::with_capacity(triangle_ids.len());

        for &t in triangle_ids {
            let mut tri = [0u32; 3];
            for (corner, &v) in self.triangles[t].iter().enumerate() {
                let slot = &mut remap[v as usize];
                if *slot == u32::MAX {
                    *slot = vertices.len() as u32;
                    vertices.push(self.vertices[v as usize]);
                }
                tri[corner] = *slot;
            }
            triangles.push(tri);
        }

        let face_uvs = self
            .face_uvs
            .as_ref()
            .map(|uvs| triangle_ids.iter().map(|&t| uvs[t]).collect());

        Mesh {
            vertices,
            triangles,
            face_uvs,
        }
    }

    /// Triangle indices grouped by vertex connectivity, largest group first.
    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut sets = DisjointSet::new(self.vertices.len());
        for &[a, b, c] in &self.triangles {
            sets.union(a as usize, b as usize);
            sets.union(b as usize, c as usize);
        }

        let mut groups: std::collections::HashMap<usize, Vec<usize>> =
            std::collections::HashMap::new();
        for (t, tri) in self.triangles.iter().enumerate() {
            let root = sets.find(tri[0] as usize);
            groups.entry(root).or_default().push(t);
        }

        let mut components: Vec<Vec<usize>> = groups.into_values().collect();
        components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
        components
    }

    /// The connected component with the most triangles.
    pub fn largest_component(&self) -> Mesh {
        let components = self.connected_components();
        match components.first() {
            Some(largest) if components.len() > 1 => {
                log::debug!(
                    "keeping largest of {} components ({} of {} triangles)",
                    components.len(),
                    largest.len(),
                    self.triangles.len()
                );
                self.subset(largest)
            }
            _ => self.clone(),
        }
    }

    /// Closest intersection of `ray` with the surface, both faces counted.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<RayHit> {
        self.bounds()?.ray_entry(ray)?;

        let mut best: Option<RayHit> = None;
        for index in 0..self.triangles.len() {
            let tri = self.triangle(index);
            if let Some(t) = intersect_triangle(ray, &tri) {
                if best.is_none_or(|hit| t < hit.distance) {
                    best = Some(RayHit {
                        point: ray.at(t),
                        distance: t,
                        triangle: index,
                    });
                }
            }
        }
        best
    }
}

/// Möller–Trumbore ray/triangle intersection returning the ray parameter.
pub fn intersect_triangle(ray: &Ray, tri: &[Point3<f64>; 3]) -> Option<f64> {
    const EPS: f64 = 1e-12;
    const EDGE_SLACK: f64 = 1e-9;

    let edge1 = tri[1] - tri[0];
    let edge2 = tri[2] - tri[0];
    let dir = ray.direction.into_inner();
    let h = dir.cross(&edge2);
    let a = edge1.dot(&h);
    if a.abs() < EPS {
        return None;
    }
    let f = 1.0 / a;
    let s = ray.origin - tri[0];
    let u = f * s.dot(&h);
    if !(-EDGE_SLACK..=1.0 + EDGE_SLACK).contains(&u) {
        return None;
    }
    let q = s.cross(&edge1);
    let v = f * dir.dot(&q);
    if v < -EDGE_SLACK || u + v > 1.0 + EDGE_SLACK {
        return None;
    }
    let t = f * edge2.dot(&q);
    (t > EPS).then_some(t)
}
