//! Uniform grid construction and point-set normalization.

use ndarray::{Array2, Axis};

/// Evenly spaced values over `[0, end]`, endpoints included. A single step
/// degenerates to `[0]`.
fn linspace(end: f32, steps: usize) -> Vec<f32> {
    if steps <= 1 {
        return vec![0.0; steps];
    }
    let delta = end / (steps - 1) as f32;
    (0..steps).map(|i| i as f32 * delta).collect()
}

/// Coordinates of an `n_rows × n_cols` grid over `[0, width] × [0, height]`,
/// one `(x, y)` row per cell in row-major order (column varies fastest):
/// cell `i` corresponds to `(row, col) = (i / n_cols, i % n_cols)`.
pub fn build_grid(width: f32, height: f32, n_rows: usize, n_cols: usize) -> Array2<f32> {
    let xs = linspace(width, n_cols);
    let ys = linspace(height, n_rows);

    let mut grid = Array2::zeros((n_rows * n_cols, 2));
    for row in 0..n_rows {
        for col in 0..n_cols {
            let i = row * n_cols + col;
            grid[[i, 0]] = xs[col];
            grid[[i, 1]] = ys[row];
        }
    }
    grid
}

/// Normalize `points` into `[0, width] × [0, height]` in place: translate so
/// each axis's minimum is 0, then scale each axis independently so its
/// maximum hits the target extent. A constant axis keeps scale factor 1
/// instead of dividing by zero.
pub fn fit_to_rect(points: &mut Array2<f32>, width: f32, height: f32) {
    if points.nrows() == 0 {
        return;
    }
    for (axis, extent) in [(0usize, width), (1usize, height)] {
        let column = points.index_axis(Axis(1), axis);
        let min = column.iter().copied().fold(f32::INFINITY, f32::min);
        let max = column.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;
        let scale = if range > 0.0 { extent / range } else { 1.0 };
        for value in points.index_axis_mut(Axis(1), axis) {
            *value = (*value - min) * scale;
        }
    }
}
