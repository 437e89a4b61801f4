//! Representative selection: the item nearest a group's mean.

use ndarray::{ArrayView2, Axis};

/// Index of the row nearest the arithmetic mean of all rows, or `None` for
/// an empty set. Ties break toward the earliest row.
pub fn nearest_to_centroid(vectors: ArrayView2<'_, f32>) -> Option<usize> {
    let centroid = vectors.mean_axis(Axis(0))?;

    let mut best = None;
    let mut best_dist = f64::INFINITY;
    for (i, row) in vectors.outer_iter().enumerate() {
        let dist: f64 = row
            .iter()
            .zip(centroid.iter())
            .map(|(a, b)| {
                let diff = f64::from(*a) - f64::from(*b);
                diff * diff
            })
            .sum();
        // Strict comparison keeps the earliest row on ties.
        if dist < best_dist {
            best_dist = dist;
            best = Some(i);
        }
    }
    best
}

/// Id of the item whose vector is nearest the group mean. `vectors` rows
/// align with `ids`; an empty group yields `None` rather than an error.
pub fn find_center<'a, S: AsRef<str>>(
    vectors: ArrayView2<'_, f32>,
    ids: &'a [S],
) -> Option<&'a str> {
    debug_assert_eq!(vectors.nrows(), ids.len());
    nearest_to_centroid(vectors).and_then(|i| ids.get(i).map(|id| id.as_ref()))
}
