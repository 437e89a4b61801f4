//! Lloyd's k-means with k-means++ seeding.

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ClusterError;

/// Restart policy for the local search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Restarts {
    /// One run: k-means++ seeding already tames initialization sensitivity.
    Auto,
    /// A fixed number of independently seeded runs; the lowest-inertia
    /// labeling wins.
    Exact(usize),
}

/// Runtime configuration for clustering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KMeansConfig {
    /// Number of groups. Must satisfy `1 <= k <= n`.
    pub k: usize,
    /// Iteration cap per run.
    pub max_iter: usize,
    /// Convergence threshold on the largest squared centroid movement.
    pub tol: f64,
    pub restarts: Restarts,
    /// Seed for centroid sampling. Fixed, not request-varying.
    pub seed: u64,
}

impl KMeansConfig {
    pub fn with_k(k: usize) -> Self {
        Self {
            k,
            max_iter: 300,
            tol: 1e-4,
            restarts: Restarts::Auto,
            seed: 0,
        }
    }
}

/// Partition the rows of `data` into `cfg.k` groups. Returns one label in
/// `[0, k)` per row, aligned with the input order.
pub fn cluster(data: ArrayView2<'_, f32>, cfg: &KMeansConfig) -> Result<Vec<usize>, ClusterError> {
    let n = data.nrows();
    if cfg.k == 0 || cfg.k > n {
        return Err(ClusterError::InvalidClusterCount { k: cfg.k, n });
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(ClusterError::Computation(
            "non-finite value in input vectors".into(),
        ));
    }

    let runs = match cfg.restarts {
        Restarts::Auto => 1,
        Restarts::Exact(r) => r.max(1),
    };

    let mut best: Option<(f64, Vec<usize>)> = None;
    for run in 0..runs {
        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(run as u64));
        let (labels, inertia, iterations) = lloyd(data, cfg, &mut rng);
        debug!(run, iterations, inertia, "kmeans_run_finished");
        if best.as_ref().map(|(b, _)| inertia < *b).unwrap_or(true) {
            best = Some((inertia, labels));
        }
    }

    match best {
        Some((_, labels)) => Ok(labels),
        // runs >= 1, so a result always exists.
        None => Err(ClusterError::Computation("no clustering run produced a result".into())),
    }
}

fn lloyd(
    data: ArrayView2<'_, f32>,
    cfg: &KMeansConfig,
    rng: &mut StdRng,
) -> (Vec<usize>, f64, usize) {
    let n = data.nrows();
    let d = data.ncols();
    let k = cfg.k;

    let mut centroids = plus_plus_init(data, k, rng);
    let mut labels = vec![0usize; n];
    let mut iterations = 0;

    for iter in 0..cfg.max_iter {
        iterations = iter + 1;

        for (i, label) in labels.iter_mut().enumerate() {
            *label = nearest_centroid(data.row(i), &centroids);
        }
        repair_empty_clusters(data, &mut labels, k);

        let mut sums = Array2::<f64>::zeros((k, d));
        let mut counts = vec![0usize; k];
        for (i, &label) in labels.iter().enumerate() {
            counts[label] += 1;
            for (j, value) in data.row(i).iter().enumerate() {
                sums[[label, j]] += f64::from(*value);
            }
        }

        let mut max_shift = 0.0_f64;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let mut shift = 0.0;
            for j in 0..d {
                let updated = sums[[c, j]] / counts[c] as f64;
                let delta = updated - centroids[[c, j]];
                shift += delta * delta;
                centroids[[c, j]] = updated;
            }
            max_shift = max_shift.max(shift);
        }

        if max_shift < cfg.tol {
            break;
        }
    }

    // Final assignment against the converged centroids.
    for (i, label) in labels.iter_mut().enumerate() {
        *label = nearest_centroid(data.row(i), &centroids);
    }
    repair_empty_clusters(data, &mut labels, k);

    let inertia = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| squared_distance(data.row(i), centroids.row(label).view()))
        .sum();

    (labels, inertia, iterations)
}

/// k-means++ seeding: the first centroid is sampled uniformly, each further
/// one with probability proportional to its squared distance from the
/// nearest centroid chosen so far.
fn plus_plus_init(data: ArrayView2<'_, f32>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let d = data.ncols();
    let mut centroids = Array2::<f64>::zeros((k, d));
    let mut chosen = Vec::with_capacity(k);

    let first = rng.gen_range(0..n);
    chosen.push(first);
    assign_row(&mut centroids, 0, data.row(first));

    let mut min_dist = vec![f64::INFINITY; n];
    for c in 1..k {
        let last = centroids.row(c - 1);
        for (i, slot) in min_dist.iter_mut().enumerate() {
            let dist = squared_distance(data.row(i), last.view());
            if dist < *slot {
                *slot = dist;
            }
        }

        let total: f64 = min_dist.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = n - 1;
            for (i, &dist) in min_dist.iter().enumerate() {
                if target < dist {
                    pick = i;
                    break;
                }
                target -= dist;
            }
            pick
        } else {
            // All remaining points coincide with a centroid; walk the input
            // order for a deterministic fill.
            (0..n).find(|i| !chosen.contains(i)).unwrap_or(0)
        };

        chosen.push(pick);
        assign_row(&mut centroids, c, data.row(pick));
    }

    centroids
}

/// Any cluster that lost all members adopts the point farthest from its own
/// group's mean, so every label in `[0, k)` stays populated.
fn repair_empty_clusters(data: ArrayView2<'_, f32>, labels: &mut [usize], k: usize) {
    let d = data.ncols();
    let mut counts = vec![0usize; k];
    for &label in labels.iter() {
        counts[label] += 1;
    }
    if counts.iter().all(|&c| c > 0) {
        return;
    }

    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }

        let mut means = Array2::<f64>::zeros((k, d));
        for (i, &label) in labels.iter().enumerate() {
            for (j, value) in data.row(i).iter().enumerate() {
                means[[label, j]] += f64::from(*value);
            }
        }
        for c in 0..k {
            if counts[c] > 0 {
                let count = counts[c] as f64;
                means.row_mut(c).mapv_inplace(|v| v / count);
            }
        }

        let mut farthest = None;
        let mut farthest_dist = -1.0_f64;
        for (i, &label) in labels.iter().enumerate() {
            if counts[label] <= 1 {
                continue;
            }
            let dist = squared_distance(data.row(i), means.row(label));
            if dist > farthest_dist {
                farthest_dist = dist;
                farthest = Some(i);
            }
        }
        if let Some(i) = farthest {
            counts[labels[i]] -= 1;
            labels[i] = empty;
            counts[empty] += 1;
        }
    }
}

fn assign_row(centroids: &mut Array2<f64>, c: usize, row: ArrayView1<'_, f32>) {
    for (j, value) in row.iter().enumerate() {
        centroids[[c, j]] = f64::from(*value);
    }
}

fn nearest_centroid(row: ArrayView1<'_, f32>, centroids: &Array2<f64>) -> usize {
    let mut best = 0usize;
    let mut best_dist = f64::INFINITY;
    for (c, centroid) in centroids.outer_iter().enumerate() {
        let dist = squared_distance(row, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = c;
        }
    }
    best
}

fn squared_distance(row: ArrayView1<'_, f32>, centroid: ArrayView1<'_, f64>) -> f64 {
    row.iter()
        .zip(centroid.iter())
        .map(|(a, b)| {
            let diff = f64::from(*a) - b;
            diff * diff
        })
        .sum()
}
