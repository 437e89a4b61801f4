//! Umbrella crate for the emgrid layout engine.
//!
//! Stitches together the embedding store, grid layout, and clustering
//! crates so callers can go from id lists to grid cells, cluster labels,
//! and representative items with a single API entry point.
//!
//! All operations are synchronous pure computations over the supplied ids
//! plus the shared embedding cache; projection and assignment can take
//! seconds for hundreds of items, so callers size worker pools and timeouts
//! externally.

pub use emgrid_cluster::{ClusterError, KMeansConfig, Restarts};
pub use emgrid_layout::{
    assign_grid, GridCell, LayoutConfig, LayoutError, ProjectionConfig,
};
pub use emgrid_store::{
    filename_stem, read_records, EmbeddingRecord, EmbeddingStore, PrincipalComponents,
    StoreConfig, StoreError,
};

mod config;
pub use config::{ConfigLoadError, EmgridConfig};

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use thiserror::Error;
use tracing::{info, warn, Level};

/// Errors that can occur while running an operation through the engine.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("embedding store failure: {0}")]
    Store(#[from] StoreError),
    #[error("grid layout failure: {0}")]
    Layout(#[from] LayoutError),
    #[error("clustering failure: {0}")]
    Cluster(#[from] ClusterError),
}

/// Lay the items out on an `n_rows × n_cols` grid by similarity, using
/// default store and layout configuration.
pub fn grid_assignment<S: AsRef<str>>(
    store: &EmbeddingStore,
    ids: &[S],
    source: &Path,
    n_rows: usize,
    n_cols: usize,
) -> Result<BTreeMap<String, GridCell>, PipelineError> {
    grid_assignment_with_configs(
        store,
        ids,
        source,
        n_rows,
        n_cols,
        &StoreConfig::default(),
        &LayoutConfig::default(),
    )
}

/// Grid layout with explicit configuration for every stage.
pub fn grid_assignment_with_configs<S: AsRef<str>>(
    store: &EmbeddingStore,
    ids: &[S],
    source: &Path,
    n_rows: usize,
    n_cols: usize,
    store_cfg: &StoreConfig,
    layout_cfg: &LayoutConfig,
) -> Result<BTreeMap<String, GridCell>, PipelineError> {
    let start = Instant::now();
    let span = tracing::span!(
        Level::INFO,
        "emgrid.grid_assignment",
        items = ids.len(),
        n_rows,
        n_cols
    );
    let _guard = span.enter();

    let result = (|| {
        let vectors = store.get_vectors(ids, source, store_cfg)?;
        let cells = assign_grid(vectors.view(), n_rows, n_cols, layout_cfg)?;
        Ok(ids
            .iter()
            .zip(cells)
            .map(|(id, cell)| (id.as_ref().to_string(), cell))
            .collect())
    })();

    match result {
        Ok(mapping) => {
            info!(
                elapsed_micros = start.elapsed().as_micros() as u64,
                "grid_assignment_success"
            );
            Ok(mapping)
        }
        Err(err) => {
            warn!(error = %err, "grid_assignment_failure");
            Err(err)
        }
    }
}

/// Partition the items into `k` groups, using default configuration.
pub fn cluster_labels<S: AsRef<str>>(
    store: &EmbeddingStore,
    ids: &[S],
    source: &Path,
    k: usize,
) -> Result<BTreeMap<String, usize>, PipelineError> {
    cluster_labels_with_configs(
        store,
        ids,
        source,
        &KMeansConfig::with_k(k),
        &StoreConfig::default(),
    )
}

/// Clustering with explicit configuration (the cluster count rides in
/// `kmeans_cfg.k`).
pub fn cluster_labels_with_configs<S: AsRef<str>>(
    store: &EmbeddingStore,
    ids: &[S],
    source: &Path,
    kmeans_cfg: &KMeansConfig,
    store_cfg: &StoreConfig,
) -> Result<BTreeMap<String, usize>, PipelineError> {
    let start = Instant::now();
    let span = tracing::span!(
        Level::INFO,
        "emgrid.cluster_labels",
        items = ids.len(),
        k = kmeans_cfg.k
    );
    let _guard = span.enter();

    let result = (|| {
        let vectors = store.get_vectors(ids, source, store_cfg)?;
        let labels = emgrid_cluster::cluster(vectors.view(), kmeans_cfg)?;
        Ok(ids
            .iter()
            .zip(labels)
            .map(|(id, label)| (id.as_ref().to_string(), label))
            .collect())
    })();

    match result {
        Ok(mapping) => {
            info!(
                elapsed_micros = start.elapsed().as_micros() as u64,
                "cluster_labels_success"
            );
            Ok(mapping)
        }
        Err(err) => {
            warn!(error = %err, "cluster_labels_failure");
            Err(err)
        }
    }
}

/// Id of the item nearest the group's mean embedding, or `None` for an
/// empty group.
pub fn find_center<S: AsRef<str>>(
    store: &EmbeddingStore,
    ids: &[S],
    source: &Path,
) -> Result<Option<String>, PipelineError> {
    find_center_with_config(store, ids, source, &StoreConfig::default())
}

/// Representative selection with explicit store configuration.
pub fn find_center_with_config<S: AsRef<str>>(
    store: &EmbeddingStore,
    ids: &[S],
    source: &Path,
    store_cfg: &StoreConfig,
) -> Result<Option<String>, PipelineError> {
    if ids.is_empty() {
        return Ok(None);
    }
    let vectors = store.get_vectors(ids, source, store_cfg)?;
    Ok(emgrid_cluster::find_center(vectors.view(), ids).map(str::to_string))
}

/// Representative selection applied independently to each group, one result
/// per group in input order.
pub fn find_centers<S: AsRef<str>>(
    store: &EmbeddingStore,
    groups: &[Vec<S>],
    source: &Path,
) -> Result<Vec<Option<String>>, PipelineError> {
    find_centers_with_config(store, groups, source, &StoreConfig::default())
}

pub fn find_centers_with_config<S: AsRef<str>>(
    store: &EmbeddingStore,
    groups: &[Vec<S>],
    source: &Path,
    store_cfg: &StoreConfig,
) -> Result<Vec<Option<String>>, PipelineError> {
    groups
        .iter()
        .map(|ids| find_center_with_config(store, ids, source, store_cfg))
        .collect()
}
