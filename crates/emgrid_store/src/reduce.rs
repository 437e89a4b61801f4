//! Variance-maximizing linear reduction (PCA).
//!
//! Fitted once per cache entry and reused for every vector in it, so the
//! per-request cost of downstream distance computations stays bounded by the
//! target dimension instead of the raw embedding width.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::StoreError;

const POWER_ITERATIONS: usize = 128;
const CONVERGENCE_EPS: f64 = 1e-12;

/// A fitted reduction: the training mean plus `n_components` orthogonal
/// directions of maximal variance, found by power iteration with deflation
/// on the covariance matrix.
///
/// Degenerate directions (no variance left to explain) come out as zero
/// components; the transform then maps onto those axes as constant zero
/// rather than failing.
#[derive(Debug, Clone)]
pub struct PrincipalComponents {
    mean: Array1<f64>,
    components: Array2<f64>,
}

impl PrincipalComponents {
    /// Fit `n_components` directions on `data` (rows are observations).
    pub fn fit(data: ArrayView2<'_, f32>, n_components: usize) -> Result<Self, StoreError> {
        let n = data.nrows();
        let d = data.ncols();
        if n == 0 {
            return Err(StoreError::Reduction(
                "cannot fit a reduction on an empty vector set".into(),
            ));
        }

        let x = data.mapv(|v| f64::from(v));
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(d));
        let centered = &x - &mean.view().insert_axis(Axis(0));
        let mut cov = centered.t().dot(&centered) / n as f64;

        let mut components: Vec<Array1<f64>> = Vec::with_capacity(n_components);
        for comp in 0..n_components {
            let v = dominant_eigenvector(&cov, &components, comp);
            match v {
                Some(v) => {
                    let lambda = v.dot(&cov.dot(&v));
                    let outer = v
                        .view()
                        .insert_axis(Axis(1))
                        .dot(&v.view().insert_axis(Axis(0)));
                    cov.scaled_add(-lambda, &outer);
                    components.push(v);
                }
                None => components.push(Array1::zeros(d)),
            }
        }

        let mut matrix = Array2::zeros((n_components, d));
        for (i, v) in components.iter().enumerate() {
            matrix.row_mut(i).assign(v);
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(StoreError::Reduction(
                "non-finite value in fitted components".into(),
            ));
        }

        Ok(Self {
            mean,
            components: matrix,
        })
    }

    /// Project `data` onto the fitted directions. Output is
    /// `data.nrows() × n_components`.
    pub fn transform(&self, data: ArrayView2<'_, f32>) -> Array2<f32> {
        let x = data.mapv(|v| f64::from(v));
        let centered = &x - &self.mean.view().insert_axis(Axis(0));
        let projected = centered.dot(&self.components.t());
        projected.mapv(|v| v as f32)
    }

    /// Fit on `data` and project it in one step.
    pub fn fit_transform(
        data: ArrayView2<'_, f32>,
        n_components: usize,
    ) -> Result<Array2<f32>, StoreError> {
        let fitted = Self::fit(data, n_components)?;
        Ok(fitted.transform(data))
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }
}

/// Power iteration for the dominant eigenvector of `cov`, kept orthogonal to
/// the already-extracted `previous` components. Returns `None` when the
/// remaining spectrum is (numerically) zero.
fn dominant_eigenvector(
    cov: &Array2<f64>,
    previous: &[Array1<f64>],
    comp: usize,
) -> Option<Array1<f64>> {
    let d = cov.nrows();
    // Deterministic pseudo-random start so repeated fits agree bit-for-bit.
    let mut v = Array1::from_iter((0..d).map(|j| ((j + 7 * comp + 1) as f64).sin()));
    orthogonalize(&mut v, previous);
    let norm = v.dot(&v).sqrt();
    if norm < CONVERGENCE_EPS {
        return None;
    }
    v.mapv_inplace(|x| x / norm);

    for _ in 0..POWER_ITERATIONS {
        let mut w = cov.dot(&v);
        orthogonalize(&mut w, previous);
        let norm = w.dot(&w).sqrt();
        if norm < CONVERGENCE_EPS {
            return None;
        }
        w.mapv_inplace(|x| x / norm);
        let delta = (&w - &v).mapv(|x| x * x).sum().sqrt();
        v = w;
        if delta < CONVERGENCE_EPS {
            break;
        }
    }
    Some(v)
}

fn orthogonalize(v: &mut Array1<f64>, previous: &[Array1<f64>]) {
    for prev in previous {
        let proj = prev.dot(&*v);
        v.scaled_add(-proj, prev);
    }
}
