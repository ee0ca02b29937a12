//! Multi-view merging of mapped detections.
//!
//! Points are clustered by single linkage cut at a distance threshold, and
//! each cluster is resolved to one of its own members: markers first, then
//! labelled points, then whichever remaining point lies closest to the
//! geometric median of the rest.

use nalgebra::Point3;

use crate::config::MergeConfig;
use crate::geometry::DisjointSet;
use crate::models::{Detected3DPoint, DetectionMethod, MergedElectrode};

const COINCIDENT_EPS: f64 = 1e-12;

pub struct ElectrodeMerger {
    config: MergeConfig,
}

impl ElectrodeMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> f64 {
        self.config.distance_threshold
    }

    /// Pairwise Euclidean distances, row-major `n x n`.
    pub fn distance_matrix(points: &[Detected3DPoint]) -> Vec<f64> {
        let n = points.len();
        let positions: Vec<Point3<f64>> = points.iter().map(|p| p.position()).collect();
        let mut out = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = nalgebra::distance(&positions[i], &positions[j]);
                out[i * n + j] = d;
                out[j * n + i] = d;
            }
        }
        out
    }

    /// Connected components of the graph joining points at most `threshold`
    /// apart. Each cluster lists point indices in ascending order.
    pub fn clusters(&self, points: &[Detected3DPoint]) -> Vec<Vec<usize>> {
        let n = points.len();
        let distances = Self::distance_matrix(points);
        let mut sets = DisjointSet::new(n);
        for i in 0..n {
            for j in (i + 1)..n {
                if distances[i * n + j] <= self.config.distance_threshold {
                    sets.union(i, j);
                }
            }
        }
        sets.groups()
    }

    /// Index (into `points`) of the member chosen to stand for `cluster`.
    pub fn representative(&self, points: &[Detected3DPoint], cluster: &[usize]) -> Option<usize> {
        let mut pool: Vec<usize> = cluster.to_vec();

        let markers: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|&i| points[i].method == DetectionMethod::Marker)
            .collect();
        if !markers.is_empty() {
            pool = markers;
        }

        let labelled: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|&i| points[i].label.is_some())
            .collect();
        if !labelled.is_empty() {
            pool = labelled;
        }

        if pool.len() <= 1 {
            return pool.first().copied();
        }

        let positions: Vec<Point3<f64>> = pool.iter().map(|&i| points[i].position()).collect();
        let median = geometric_median(
            &positions,
            self.config.median_max_iterations,
            self.config.median_tolerance,
        )?;
        pool.into_iter().min_by(|&a, &b| {
            let da = nalgebra::distance(&points[a].position(), &median);
            let db = nalgebra::distance(&points[b].position(), &median);
            da.total_cmp(&db)
        })
    }

    /// Collapse all mapped points into the final electrode list.
    pub fn merge(&self, points: &[Detected3DPoint]) -> Vec<MergedElectrode> {
        let clusters = self.clusters(points);
        let mut merged = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            let Some(index) = self.representative(points, cluster) else {
                continue;
            };
            let rep = &points[index];
            merged.push(MergedElectrode {
                view: rep.view,
                method: rep.method,
                x: rep.x,
                y: rep.y,
                z: rep.z,
                label: rep.label.clone(),
                support: cluster.len(),
            });
        }
        log::info!(
            "merged {} points into {} electrodes (threshold {})",
            points.len(),
            merged.len(),
            self.config.distance_threshold
        );
        merged
    }
}

/// Weiszfeld iteration for the point minimising the summed distance to
/// `points`. Points coincident with the current estimate are left out of
/// that step's weights.
pub fn geometric_median(
    points: &[Point3<f64>],
    max_iterations: usize,
    tolerance: f64,
) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let mut estimate = Point3::from(
        points
            .iter()
            .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords)
            / n,
    );

    for _ in 0..max_iterations {
        let mut weighted = nalgebra::Vector3::zeros();
        let mut total = 0.0;
        for p in points {
            let d = nalgebra::distance(p, &estimate);
            if d < COINCIDENT_EPS {
                continue;
            }
            weighted += p.coords / d;
            total += 1.0 / d;
        }
        if total == 0.0 {
            break;
        }
        let next = Point3::from(weighted / total);
        let shift = nalgebra::distance(&next, &estimate);
        estimate = next;
        if shift < tolerance {
            break;
        }
    }
    Some(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_single_point_is_that_point() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let m = geometric_median(&[p], 100, 1e-6).unwrap();
        assert!(nalgebra::distance(&m, &p) < 1e-12);
    }

    #[test]
    fn median_resists_an_outlier() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(100.0, 100.0, 0.0),
        ];
        let m = geometric_median(&points, 100, 1e-9).unwrap();
        let centroid_x = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
        assert!(m.x < centroid_x / 2.0);
    }
}
