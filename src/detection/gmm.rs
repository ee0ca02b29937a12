//! Two-component Gaussian mixture in the plane, fitted by EM.

use nalgebra::{Matrix2, Vector2};

use crate::error::{CapscanError, Result};

const COVARIANCE_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    pub weights: [f64; 2],
    pub means: [Vector2<f64>; 2],
    pub covariances: [Matrix2<f64>; 2],
}

#[derive(Debug, Clone)]
pub struct MixtureFit {
    pub model: GaussianMixture,
    /// Hard assignment of every sample to its most responsible component.
    pub assignments: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
}

impl MixtureFit {
    pub fn count(&self, component: usize) -> usize {
        self.assignments.iter().filter(|&&a| a == component).count()
    }
}

/// Z-score each column; a constant column becomes all zeros.
pub fn standardize(samples: &[Vector2<f64>]) -> Vec<Vector2<f64>> {
    if samples.is_empty() {
        return Vec::new();
    }
    let n = samples.len() as f64;
    let mean = samples.iter().fold(Vector2::zeros(), |acc, s| acc + s) / n;
    let var = samples
        .iter()
        .fold(Vector2::zeros(), |acc, s| acc + (s - mean).component_mul(&(s - mean)))
        / n;
    let std = var.map(|v| if v > 1e-24 { v.sqrt() } else { 0.0 });
    samples
        .iter()
        .map(|s| {
            let d = s - mean;
            Vector2::new(
                if std.x > 0.0 { d.x / std.x } else { 0.0 },
                if std.y > 0.0 { d.y / std.y } else { 0.0 },
            )
        })
        .collect()
}

fn log_density(x: &Vector2<f64>, mean: &Vector2<f64>, cov: &Matrix2<f64>) -> Option<f64> {
    let det = cov.determinant();
    if det <= 0.0 || !det.is_finite() {
        return None;
    }
    let inv = cov.try_inverse()?;
    let d = x - mean;
    let mahalanobis = (d.transpose() * inv * d)[(0, 0)];
    Some(-0.5 * mahalanobis - 0.5 * det.ln() - std::f64::consts::TAU.ln())
}

/// Fit two components by expectation-maximisation.
///
/// Samples are ordered by coordinate sum; component 0 starts at the median
/// sample and component 1 at the largest one, both with the global
/// covariance. Fails with `GeometryDegenerate` when the samples are too few
/// or the fit produces non-finite numbers.
pub fn fit_two_components(
    samples: &[Vector2<f64>],
    max_iterations: usize,
    tolerance: f64,
) -> Result<MixtureFit> {
    let n = samples.len();
    if n < 2 {
        return Err(CapscanError::GeometryDegenerate(format!(
            "mixture fit needs at least 2 samples, got {n}"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let key = |i: usize| samples[i].x + samples[i].y;
    order.sort_by(|&a, &b| key(a).total_cmp(&key(b)));

    let global_mean = samples.iter().fold(Vector2::zeros(), |acc, s| acc + s) / n as f64;
    let mut global_cov = Matrix2::zeros();
    for s in samples {
        let d = s - global_mean;
        global_cov += d * d.transpose();
    }
    global_cov = global_cov / n as f64 + Matrix2::identity() * COVARIANCE_FLOOR;

    let mut model = GaussianMixture {
        weights: [0.5, 0.5],
        means: [samples[order[n / 2]], samples[order[n - 1]]],
        covariances: [global_cov, global_cov],
    };

    let mut resp = vec![[0.0f64; 2]; n];
    let mut previous = f64::NEG_INFINITY;
    let mut converged = false;
    let mut iterations = 0;

    for it in 0..max_iterations.max(1) {
        iterations = it + 1;

        // E-step.
        let mut log_likelihood = 0.0;
        for (x, r) in samples.iter().zip(resp.iter_mut()) {
            let mut logs = [0.0f64; 2];
            for k in 0..2 {
                let density = log_density(x, &model.means[k], &model.covariances[k])
                    .ok_or_else(|| {
                        CapscanError::GeometryDegenerate("singular mixture covariance".into())
                    })?;
                logs[k] = model.weights[k].max(f64::MIN_POSITIVE).ln() + density;
            }
            let top = logs[0].max(logs[1]);
            let total = top + ((logs[0] - top).exp() + (logs[1] - top).exp()).ln();
            r[0] = (logs[0] - total).exp();
            r[1] = (logs[1] - total).exp();
            log_likelihood += total;
        }
        if !log_likelihood.is_finite() {
            return Err(CapscanError::GeometryDegenerate(
                "mixture log-likelihood is not finite".into(),
            ));
        }

        // M-step.
        for k in 0..2 {
            let nk: f64 = resp.iter().map(|r| r[k]).sum();
            if nk <= 1e-12 {
                continue;
            }
            let mean = samples
                .iter()
                .zip(&resp)
                .fold(Vector2::zeros(), |acc, (x, r)| acc + x * r[k])
                / nk;
            let mut cov = Matrix2::zeros();
            for (x, r) in samples.iter().zip(&resp) {
                let d = x - mean;
                cov += d * d.transpose() * r[k];
            }
            model.means[k] = mean;
            model.covariances[k] = cov / nk + Matrix2::identity() * COVARIANCE_FLOOR;
            model.weights[k] = nk / n as f64;
        }

        if (log_likelihood - previous).abs() < tolerance {
            converged = true;
            break;
        }
        previous = log_likelihood;
    }

    let assignments = resp
        .iter()
        .map(|r| if r[1] > r[0] { 1 } else { 0 })
        .collect();
    Ok(MixtureFit {
        model,
        assignments,
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_two_blobs() {
        let mut samples = Vec::new();
        for i in 0..40 {
            let t = i as f64 * 0.01;
            samples.push(Vector2::new(-2.0 + t, -2.0 - t));
        }
        for i in 0..8 {
            let t = i as f64 * 0.01;
            samples.push(Vector2::new(3.0 + t, 3.0 - t));
        }
        let fit = fit_two_components(&samples, 100, 1e-6).unwrap();
        let minority = if fit.count(0) < fit.count(1) { 0 } else { 1 };
        assert_eq!(fit.count(minority), 8);
        assert!(fit.assignments[40..].iter().all(|&a| a == minority));
    }

    #[test]
    fn sparse_outliers_beat_a_one_sided_tail() {
        // A tight majority, a tail on one side and a few strong outliers on
        // the other: the outliers end up alone in the smaller component.
        let mut samples = vec![Vector2::new(0.0, 0.0); 300];
        for i in 0..20 {
            samples.push(Vector2::new(-0.25 - 0.001 * i as f64, 0.01));
        }
        for i in 0..5 {
            samples.push(Vector2::new(1.0 + 0.01 * i as f64, 0.6));
        }
        let fit = fit_two_components(&standardize(&samples), 100, 1e-6).unwrap();
        assert_eq!(fit.count(1), 5);
        assert!(fit.assignments[320..].iter().all(|&a| a == 1));
    }

    #[test]
    fn too_few_samples_fail() {
        assert!(fit_two_components(&[Vector2::new(0.0, 0.0)], 10, 1e-6).is_err());
    }
}
