//! Rectangular minimum-cost bipartite matching.
//!
//! The cost matrix is cells × points (m × n, m >= n); the solver runs
//! shortest augmenting paths over reduced costs (Jonker-Volgenant style
//! potentials), one augmentation per point, O(n·m²) total. Every point gets
//! a distinct cell; with m > n the cost-minimizing subset of cells is chosen
//! and the surplus stays unused.

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;

use crate::LayoutError;

/// Squared Euclidean distances between every cell (rows of `cells`) and
/// every point (rows of `points`). With `use_parallel` the rows are computed
/// on the rayon pool; the result is identical either way.
pub fn cost_matrix(
    cells: ArrayView2<'_, f32>,
    points: ArrayView2<'_, f32>,
    use_parallel: bool,
) -> Result<Array2<f64>, LayoutError> {
    let m = cells.nrows();
    let n = points.nrows();

    let row_costs = |i: usize| -> Vec<f64> {
        let cx = f64::from(cells[[i, 0]]);
        let cy = f64::from(cells[[i, 1]]);
        (0..n)
            .map(|j| {
                let dx = cx - f64::from(points[[j, 0]]);
                let dy = cy - f64::from(points[[j, 1]]);
                dx * dx + dy * dy
            })
            .collect()
    };

    let rows: Vec<Vec<f64>> = if use_parallel {
        (0..m).into_par_iter().map(row_costs).collect()
    } else {
        (0..m).map(row_costs).collect()
    };

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((m, n), flat)
        .map_err(|err| LayoutError::Computation(format!("cost matrix shape: {err}")))
}

/// Solve the rectangular linear assignment problem on `cost` (cells ×
/// points, `nrows >= ncols`). Returns, for each point, the index of its
/// assigned cell; the total cost over returned pairs is minimal.
pub fn solve_assignment(cost: ArrayView2<'_, f64>) -> Result<Vec<usize>, LayoutError> {
    let m = cost.nrows();
    let n = cost.ncols();
    if m < n {
        return Err(LayoutError::InvalidGrid(format!(
            "{n} points cannot share {m} cells"
        )));
    }
    if n == 0 {
        return Ok(Vec::new());
    }
    if cost.iter().any(|c| !c.is_finite()) {
        return Err(LayoutError::Computation(
            "non-finite entry in assignment costs".into(),
        ));
    }

    // Index m is a virtual cell that roots each augmenting path.
    let virtual_cell = m;
    let mut point_potential = vec![0.0_f64; n];
    let mut cell_potential = vec![0.0_f64; m + 1];
    // Point currently matched to each cell; usize::MAX marks a free cell.
    let mut matched_point = vec![usize::MAX; m + 1];
    let mut predecessor = vec![virtual_cell; m + 1];

    for point in 0..n {
        matched_point[virtual_cell] = point;
        let mut cursor = virtual_cell;
        let mut slack = vec![f64::INFINITY; m + 1];
        let mut visited = vec![false; m + 1];

        // Dijkstra over reduced costs until a free cell is reached.
        loop {
            visited[cursor] = true;
            let active = matched_point[cursor];
            let mut delta = f64::INFINITY;
            let mut next = virtual_cell;

            for cell in 0..m {
                if visited[cell] {
                    continue;
                }
                let reduced =
                    cost[[cell, active]] - point_potential[active] - cell_potential[cell];
                if reduced < slack[cell] {
                    slack[cell] = reduced;
                    predecessor[cell] = cursor;
                }
                if slack[cell] < delta {
                    delta = slack[cell];
                    next = cell;
                }
            }
            if !delta.is_finite() {
                return Err(LayoutError::Computation(
                    "no augmenting path in assignment".into(),
                ));
            }

            for cell in 0..=m {
                if visited[cell] {
                    point_potential[matched_point[cell]] += delta;
                    cell_potential[cell] -= delta;
                } else {
                    slack[cell] -= delta;
                }
            }

            cursor = next;
            if matched_point[cursor] == usize::MAX {
                break;
            }
        }

        // Flip the augmenting path back to the virtual root.
        while cursor != virtual_cell {
            let prev = predecessor[cursor];
            matched_point[cursor] = matched_point[prev];
            cursor = prev;
        }
    }

    let mut assigned = vec![0usize; n];
    for cell in 0..m {
        let point = matched_point[cell];
        if point != usize::MAX {
            assigned[point] = cell;
        }
    }
    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn total_cost(cost: &Array2<f64>, assigned: &[usize]) -> f64 {
        assigned
            .iter()
            .enumerate()
            .map(|(point, &cell)| cost[[cell, point]])
            .sum()
    }

    /// Exhaustive minimum over all injective point-to-cell maps.
    fn brute_force(cost: &Array2<f64>) -> f64 {
        let mut best = f64::INFINITY;
        let mut taken = vec![false; cost.nrows()];
        fn recurse(
            cost: &Array2<f64>,
            point: usize,
            acc: f64,
            taken: &mut Vec<bool>,
            best: &mut f64,
        ) {
            let n = cost.ncols();
            if point == n {
                if acc < *best {
                    *best = acc;
                }
                return;
            }
            for cell in 0..cost.nrows() {
                if !taken[cell] {
                    taken[cell] = true;
                    recurse(cost, point + 1, acc + cost[[cell, point]], taken, best);
                    taken[cell] = false;
                }
            }
        }
        recurse(cost, 0, 0.0, &mut taken, &mut best);
        best
    }

    #[test]
    fn square_case_picks_the_obvious_matching() {
        // Cell i is cheap for point i.
        let cost = array![[0.0, 10.0], [10.0, 0.0]];
        let assigned = solve_assignment(cost.view()).unwrap();
        assert_eq!(assigned, vec![0, 1]);
    }

    #[test]
    fn rectangular_case_skips_expensive_cells() {
        // Three cells, two points; the middle cell is best for both, the
        // outer cells break the tie.
        let cost = array![[1.0, 8.0], [2.0, 2.0], [9.0, 1.0]];
        let assigned = solve_assignment(cost.view()).unwrap();
        assert_eq!(assigned.len(), 2);
        assert_ne!(assigned[0], assigned[1]);
        assert_eq!(total_cost(&cost, &assigned), brute_force(&cost));
    }

    #[test]
    fn matches_brute_force_on_small_rectangles() {
        // Deterministic pseudo-random costs over several shapes.
        for (m, n) in [(2, 2), (4, 3), (5, 3), (6, 4), (6, 6)] {
            let mut cost = Array2::zeros((m, n));
            for i in 0..m {
                for j in 0..n {
                    cost[[i, j]] = (((i * 31 + j * 17 + 7) % 23) as f64) / 3.0;
                }
            }
            let assigned = solve_assignment(cost.view()).unwrap();

            let distinct: std::collections::HashSet<_> = assigned.iter().collect();
            assert_eq!(distinct.len(), n);
            let solved = total_cost(&cost, &assigned);
            let optimal = brute_force(&cost);
            assert!(
                (solved - optimal).abs() < 1e-9,
                "{m}x{n}: solver {solved} vs brute force {optimal}"
            );
        }
    }

    #[test]
    fn more_points_than_cells_rejected() {
        let cost = Array2::zeros((2, 3));
        assert!(matches!(
            solve_assignment(cost.view()),
            Err(LayoutError::InvalidGrid(_))
        ));
    }

    #[test]
    fn non_finite_costs_rejected() {
        let cost = array![[0.0, f64::NAN], [1.0, 1.0]];
        assert!(matches!(
            solve_assignment(cost.view()),
            Err(LayoutError::Computation(_))
        ));
    }

    #[test]
    fn cost_matrix_is_squared_euclidean() {
        let cells = array![[0.0_f32, 0.0], [1.0, 0.0]];
        let points = array![[0.0_f32, 3.0]];
        let cost = cost_matrix(cells.view(), points.view(), false).unwrap();
        assert_eq!(cost[[0, 0]], 9.0);
        assert_eq!(cost[[1, 0]], 10.0);
    }

    #[test]
    fn parallel_cost_matrix_matches_serial() {
        let cells = build_demo_points(12, 0.0);
        let points = build_demo_points(7, 0.3);
        let serial = cost_matrix(cells.view(), points.view(), false).unwrap();
        let parallel = cost_matrix(cells.view(), points.view(), true).unwrap();
        assert_eq!(serial, parallel);
    }

    fn build_demo_points(count: usize, offset: f32) -> Array2<f32> {
        let mut out = Array2::zeros((count, 2));
        for i in 0..count {
            out[[i, 0]] = offset + (i as f32 * 0.37).sin();
            out[[i, 1]] = offset + (i as f32 * 0.91).cos();
        }
        out
    }
}
