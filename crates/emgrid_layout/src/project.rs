//! Neighbor-preserving 2D projection (exact t-SNE).
//!
//! Affinities are computed exactly (O(n²)), which is the right trade at the
//! scale this engine targets. The seed is a fixed constant by default, so
//! repeated calls on identical input produce identical output.

use ndarray::{Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use emgrid_store::PrincipalComponents;

use crate::LayoutError;

/// Runtime configuration for the projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectionConfig {
    /// Upper bound on the neighborhood size; the effective perplexity is
    /// `min(perplexity_cap, n / 3)` so the parameter stays valid as n
    /// shrinks.
    pub perplexity_cap: f64,
    /// Total gradient-descent iterations.
    pub n_iter: usize,
    /// Iterations spent in the early-exaggeration phase.
    pub exaggeration_iters: usize,
    /// Affinity multiplier during early exaggeration.
    pub exaggeration: f64,
    pub learning_rate: f64,
    /// Random seed for the initial layout. Fixed, not request-varying.
    pub seed: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            perplexity_cap: 30.0,
            n_iter: 500,
            exaggeration_iters: 250,
            exaggeration: 12.0,
            learning_rate: 200.0,
            seed: 0,
        }
    }
}

const MOMENTUM_EARLY: f64 = 0.5;
const MOMENTUM_LATE: f64 = 0.8;
/// Below this many points the perplexity bound collapses; a deterministic
/// variance-maximizing projection stands in so tiny grids still lay out.
const MIN_TSNE_POINTS: usize = 4;

/// Project `data` (rows are vectors) to one 2D point per row.
pub fn project_2d(
    data: ArrayView2<'_, f32>,
    cfg: &ProjectionConfig,
) -> Result<Array2<f32>, LayoutError> {
    let n = data.nrows();
    if n == 0 {
        return Ok(Array2::zeros((0, 2)));
    }
    if n < MIN_TSNE_POINTS {
        return PrincipalComponents::fit_transform(data, 2)
            .map_err(|err| LayoutError::Computation(err.to_string()));
    }

    let perplexity = cfg.perplexity_cap.min(n as f64 / 3.0);
    let distances = squared_distances(data);
    let affinities = joint_affinities(&distances, perplexity);

    let mut layout = initial_layout(n, cfg.seed);
    let mut velocity = Array2::<f64>::zeros((n, 2));

    for iter in 0..cfg.n_iter {
        let exaggeration = if iter < cfg.exaggeration_iters {
            cfg.exaggeration
        } else {
            1.0
        };
        let momentum = if iter < cfg.exaggeration_iters {
            MOMENTUM_EARLY
        } else {
            MOMENTUM_LATE
        };

        let gradient = gradient(&layout, &affinities, exaggeration);
        for i in 0..n {
            for axis in 0..2 {
                velocity[[i, axis]] =
                    momentum * velocity[[i, axis]] - cfg.learning_rate * gradient[[i, axis]];
                layout[[i, axis]] += velocity[[i, axis]];
            }
        }

        // Recentre so the layout does not drift.
        if let Some(mean) = layout.mean_axis(Axis(0)) {
            for i in 0..n {
                layout[[i, 0]] -= mean[0];
                layout[[i, 1]] -= mean[1];
            }
        }
    }

    if layout.iter().any(|v| !v.is_finite()) {
        return Err(LayoutError::Computation(
            "projection diverged to a non-finite layout".into(),
        ));
    }
    Ok(layout.mapv(|v| v as f32))
}

fn squared_distances(data: ArrayView2<'_, f32>) -> Array2<f64> {
    let n = data.nrows();
    let mut out = Array2::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let d = data
                .row(i)
                .iter()
                .zip(data.row(j).iter())
                .map(|(a, b)| {
                    let diff = f64::from(*a) - f64::from(*b);
                    diff * diff
                })
                .sum();
            out[[i, j]] = d;
            out[[j, i]] = d;
        }
    }
    out
}

/// Symmetrized affinities with per-point precision found by binary search so
/// each conditional distribution hits the target perplexity.
fn joint_affinities(distances: &Array2<f64>, perplexity: f64) -> Array2<f64> {
    let n = distances.nrows();
    let target_entropy = perplexity.ln();

    let mut conditional = Array2::zeros((n, n));
    for i in 0..n {
        let row = conditional_row(distances, i, target_entropy);
        for (j, p) in row.into_iter().enumerate() {
            conditional[[i, j]] = p;
        }
    }

    let mut joint = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let p = (conditional[[i, j]] + conditional[[j, i]]) / (2.0 * n as f64);
            joint[[i, j]] = p.max(1e-12);
        }
    }
    joint
}

fn conditional_row(distances: &Array2<f64>, i: usize, target_entropy: f64) -> Vec<f64> {
    let n = distances.nrows();
    let mut beta = 1.0_f64;
    let mut beta_min = f64::NEG_INFINITY;
    let mut beta_max = f64::INFINITY;
    let mut row = vec![0.0; n];

    for _ in 0..50 {
        let mut sum_p = 0.0;
        let mut sum_dp = 0.0;
        for j in 0..n {
            if j == i {
                row[j] = 0.0;
                continue;
            }
            let p = (-distances[[i, j]] * beta).exp();
            row[j] = p;
            sum_p += p;
            sum_dp += distances[[i, j]] * p;
        }
        let sum_p = sum_p.max(1e-300);
        let entropy = sum_p.ln() + beta * sum_dp / sum_p;

        let diff = entropy - target_entropy;
        if diff.abs() < 1e-5 {
            break;
        }
        if diff > 0.0 {
            beta_min = beta;
            beta = if beta_max.is_infinite() {
                beta * 2.0
            } else {
                (beta + beta_max) / 2.0
            };
        } else {
            beta_max = beta;
            beta = if beta_min.is_infinite() {
                beta / 2.0
            } else {
                (beta + beta_min) / 2.0
            };
        }
    }

    let total: f64 = row.iter().sum();
    let total = total.max(1e-300);
    for p in &mut row {
        *p /= total;
    }
    row
}

fn initial_layout(n: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut layout = Array2::zeros((n, 2));
    for i in 0..n {
        let (a, b) = normal_pair(&mut rng);
        layout[[i, 0]] = a * 1e-4;
        layout[[i, 1]] = b * 1e-4;
    }
    layout
}

/// Box-Muller transform; `rand` stays the only randomness source so a fixed
/// seed fixes the whole run.
fn normal_pair(rng: &mut StdRng) -> (f64, f64) {
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    let radius = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * std::f64::consts::PI * u2;
    (radius * theta.cos(), radius * theta.sin())
}

/// Kullback-Leibler gradient of the student-t layout against the input
/// affinities (scaled by `exaggeration` during the early phase).
fn gradient(layout: &Array2<f64>, affinities: &Array2<f64>, exaggeration: f64) -> Array2<f64> {
    let n = layout.nrows();

    let mut kernel = Array2::zeros((n, n));
    let mut kernel_sum = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = layout[[i, 0]] - layout[[j, 0]];
            let dy = layout[[i, 1]] - layout[[j, 1]];
            let k = 1.0 / (1.0 + dx * dx + dy * dy);
            kernel[[i, j]] = k;
            kernel[[j, i]] = k;
            kernel_sum += 2.0 * k;
        }
    }
    let kernel_sum = kernel_sum.max(1e-300);

    let mut grad = Array2::zeros((n, 2));
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let q = kernel[[i, j]] / kernel_sum;
            let factor = 4.0 * (exaggeration * affinities[[i, j]] - q) * kernel[[i, j]];
            grad[[i, 0]] += factor * (layout[[i, 0]] - layout[[j, 0]]);
            grad[[i, 1]] += factor * (layout[[i, 1]] - layout[[j, 1]]);
        }
    }
    grad
}
