//! emgrid_layout: similarity-preserving grid layout.
//!
//! Pipeline: project high-dimensional vectors to 2D (neighbor-preserving),
//! normalize the point set into the grid's rectangle, then solve a
//! rectangular minimum-cost bipartite matching between points and cells.
//!
//! Everything here is a synchronous pure computation; determinism for a
//! fixed seed is part of the contract.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod assign;
pub mod grid;
pub mod project;

pub use assign::{cost_matrix, solve_assignment};
pub use grid::{build_grid, fit_to_rect};
pub use project::{project_2d, ProjectionConfig};

/// Errors surfaced by projection and assignment.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Grid dimensions are unusable for the requested point count.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),
    /// Numerical failure (degenerate input, non-finite intermediate).
    #[error("layout computation failed: {0}")]
    Computation(String),
}

/// A cell of the target grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

/// Runtime configuration for the full layout pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LayoutConfig {
    pub projection: ProjectionConfig,
    /// Build the assignment cost matrix in parallel. Results are identical
    /// either way.
    pub use_parallel: bool,
}

/// Assign each input vector to a distinct cell of an `n_rows × n_cols`
/// grid, minimizing the total squared distance between the projected points
/// and their cells. Output is aligned with the input rows.
///
/// Requires `n_rows * n_cols >= n`; surplus cells stay unused, and the
/// solver picks the cost-minimizing subset of cells. The matching runs in
/// O(n·m²) time for m cells: fine for hundreds to low thousands of items,
/// and a hard scaling ceiling beyond that.
pub fn assign_grid(
    embeddings: ArrayView2<'_, f32>,
    n_rows: usize,
    n_cols: usize,
    cfg: &LayoutConfig,
) -> Result<Vec<GridCell>, LayoutError> {
    let n = embeddings.nrows();
    if n_rows == 0 || n_cols == 0 {
        return Err(LayoutError::InvalidGrid(format!(
            "grid dimensions must be positive (got {n_rows}x{n_cols})"
        )));
    }
    let capacity = n_rows * n_cols;
    if capacity < n {
        return Err(LayoutError::InvalidGrid(format!(
            "grid capacity {capacity} is below item count {n}"
        )));
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    // Per-cell aspect stays square regardless of the row/column ratio.
    let width = 1.0_f32;
    let height = n_rows as f32 / n_cols as f32;

    let mut points = project_2d(embeddings, &cfg.projection)?;
    fit_to_rect(&mut points, width, height);
    let cells = build_grid(width, height, n_rows, n_cols);

    let cost = cost_matrix(cells.view(), points.view(), cfg.use_parallel)?;
    let assigned = solve_assignment(cost.view())?;
    debug!(n, n_rows, n_cols, "grid_assignment_solved");

    Ok(assigned
        .into_iter()
        .map(|cell| GridCell {
            row: cell / n_cols,
            col: cell % n_cols,
        })
        .collect())
}
