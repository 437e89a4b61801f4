//! emgrid_cluster: vector grouping and representative selection.
//!
//! Partitions embedding sets into k groups by within-group variance
//! (Lloyd's local search with k-means++ seeding) and picks the item nearest
//! a group's mean as its representative. Both are deterministic for a fixed
//! seed.

use thiserror::Error;

mod center;
mod kmeans;

pub use center::{find_center, nearest_to_centroid};
pub use kmeans::{cluster, KMeansConfig, Restarts};

/// Errors surfaced by clustering.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// k must satisfy `1 <= k <= n`.
    #[error("cluster count {k} out of range for {n} vectors")]
    InvalidClusterCount { k: usize, n: usize },
    /// Numerical failure (non-finite input or intermediate).
    #[error("clustering computation failed: {0}")]
    Computation(String),
}
