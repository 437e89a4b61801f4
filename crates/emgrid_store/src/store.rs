//! Process-wide embedding cache with single-flight population.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use ndarray::{Array2, ArrayView1};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::record::read_records;
use crate::reduce::PrincipalComponents;
use crate::StoreError;

/// Runtime configuration for vector lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum number of dimensions to keep after reduction. `None` keeps
    /// the raw embedding width; values at or above the raw width also skip
    /// reduction.
    pub max_dim: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        // 20 dimensions keep nearest-neighbor structure while making the
        // downstream distance computations cheap.
        Self { max_dim: Some(20) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    max_dim: Option<usize>,
}

type VectorMap = Arc<HashMap<String, Vec<f32>>>;

/// Caches id-to-vector mappings per (resource, target dimension) key.
///
/// Population of a not-yet-seen key is serialized through a per-key cell so
/// that concurrent first requests parse the resource and fit the reduction
/// exactly once; reads after population only clone an `Arc`.
#[derive(Debug, Default)]
pub struct EmbeddingStore {
    entries: RwLock<HashMap<CacheKey, Arc<OnceCell<VectorMap>>>>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the vectors for `ids` in the resource at `path`, one row per
    /// id in request order.
    ///
    /// The cache entry for `(path, max_dim)` is populated lazily; when
    /// `max_dim` is below the raw embedding width, a reduction is fitted
    /// once for the entry and applied to every stored vector.
    pub fn get_vectors<S: AsRef<str>>(
        &self,
        ids: &[S],
        path: &Path,
        cfg: &StoreConfig,
    ) -> Result<Array2<f32>, StoreError> {
        let map = self.entry(path, cfg.max_dim)?;

        let dim = map.values().next().map(|v| v.len()).unwrap_or(0);
        let mut out = Array2::zeros((ids.len(), dim));
        for (i, id) in ids.iter().enumerate() {
            let id = id.as_ref();
            let vector = map
                .get(id)
                .ok_or_else(|| StoreError::UnknownId(id.to_string()))?;
            out.row_mut(i).assign(&ArrayView1::from(vector.as_slice()));
        }
        Ok(out)
    }

    fn entry(&self, path: &Path, max_dim: Option<usize>) -> Result<VectorMap, StoreError> {
        let key = CacheKey {
            path: path.to_path_buf(),
            max_dim,
        };

        let cell = {
            let entries = self
                .entries
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            entries.get(&key).cloned()
        };
        let cell = match cell {
            Some(cell) => cell,
            None => {
                let mut entries = self
                    .entries
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                entries
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new()))
                    .clone()
            }
        };

        cell.get_or_try_init(|| populate(&key.path, key.max_dim))
            .cloned()
    }
}

fn populate(path: &Path, max_dim: Option<usize>) -> Result<VectorMap, StoreError> {
    let start = Instant::now();
    let records = read_records(path)?;
    let raw_dim = records.first().map(|r| r.embedding.len()).unwrap_or(0);

    let reduced = match max_dim {
        Some(target) if target < raw_dim => {
            let mut data = Array2::zeros((records.len(), raw_dim));
            for (i, record) in records.iter().enumerate() {
                data.row_mut(i)
                    .assign(&ArrayView1::from(record.embedding.as_slice()));
            }
            Some(PrincipalComponents::fit_transform(data.view(), target)?)
        }
        _ => None,
    };

    let mut map = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let vector = match &reduced {
            Some(matrix) => matrix.row(i).to_vec(),
            None => record.embedding.clone(),
        };
        if map.insert(record.id().to_string(), vector).is_some() {
            debug!(id = record.id(), "duplicate id in resource; keeping last");
        }
    }

    info!(
        path = %path.display(),
        records = records.len(),
        raw_dim,
        target_dim = reduced.as_ref().map(|m| m.ncols()).unwrap_or(raw_dim),
        elapsed_micros = start.elapsed().as_micros() as u64,
        "embedding_cache_populated"
    );
    Ok(Arc::new(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Barrier;
    use std::thread;
    use tempfile::TempDir;

    fn write_resource(dir: &TempDir, name: &str, records: &[(&str, Vec<f32>)]) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for (filename, embedding) in records {
            let json = serde_json::json!({ "filename": filename, "embedding": embedding });
            writeln!(file, "{json}").unwrap();
        }
        path
    }

    fn raw_config() -> StoreConfig {
        StoreConfig { max_dim: None }
    }

    #[test]
    fn vectors_follow_request_order() {
        let dir = TempDir::new().unwrap();
        let path = write_resource(
            &dir,
            "emb.jsonl",
            &[
                ("a.png", vec![1.0, 0.0]),
                ("b.png", vec![2.0, 0.0]),
                ("c.png", vec![3.0, 0.0]),
            ],
        );
        let store = EmbeddingStore::new();

        let out = store
            .get_vectors(&["c", "a", "b"], &path, &raw_config())
            .unwrap();
        assert_eq!(out.row(0).to_vec(), vec![3.0, 0.0]);
        assert_eq!(out.row(1).to_vec(), vec![1.0, 0.0]);
        assert_eq!(out.row(2).to_vec(), vec![2.0, 0.0]);
    }

    #[test]
    fn unknown_id_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write_resource(&dir, "emb.jsonl", &[("a.png", vec![1.0])]);
        let store = EmbeddingStore::new();

        let res = store.get_vectors(&["a", "ghost"], &path, &raw_config());
        assert!(matches!(res, Err(StoreError::UnknownId(id)) if id == "ghost"));
    }

    #[test]
    fn second_read_hits_the_cache() {
        let dir = TempDir::new().unwrap();
        let path = write_resource(&dir, "emb.jsonl", &[("a.png", vec![1.0, 2.0])]);
        let store = EmbeddingStore::new();

        let first = store.get_vectors(&["a"], &path, &raw_config()).unwrap();
        std::fs::remove_file(&path).unwrap();
        // The file is gone, so a non-cached read would fail.
        let second = store.get_vectors(&["a"], &path, &raw_config()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn reduction_applied_when_target_below_width() {
        let dir = TempDir::new().unwrap();
        let path = write_resource(
            &dir,
            "emb.jsonl",
            &[
                ("a.png", vec![0.0, 0.0, 1.0, 0.5]),
                ("b.png", vec![1.0, 0.5, 0.0, 0.0]),
                ("c.png", vec![2.0, 1.0, 1.0, 0.5]),
            ],
        );
        let store = EmbeddingStore::new();

        let out = store
            .get_vectors(&["a", "b", "c"], &path, &StoreConfig { max_dim: Some(2) })
            .unwrap();
        assert_eq!(out.dim(), (3, 2));
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn wide_target_skips_reduction() {
        let dir = TempDir::new().unwrap();
        let path = write_resource(&dir, "emb.jsonl", &[("a.png", vec![1.0, 2.0])]);
        let store = EmbeddingStore::new();

        let out = store
            .get_vectors(&["a"], &path, &StoreConfig { max_dim: Some(16) })
            .unwrap();
        assert_eq!(out.row(0).to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn separate_dimensions_are_separate_entries() {
        let dir = TempDir::new().unwrap();
        let path = write_resource(
            &dir,
            "emb.jsonl",
            &[
                ("a.png", vec![1.0, 2.0, 3.0]),
                ("b.png", vec![4.0, 5.0, 6.0]),
            ],
        );
        let store = EmbeddingStore::new();

        let raw = store.get_vectors(&["a"], &path, &raw_config()).unwrap();
        let reduced = store
            .get_vectors(&["a"], &path, &StoreConfig { max_dim: Some(1) })
            .unwrap();
        assert_eq!(raw.ncols(), 3);
        assert_eq!(reduced.ncols(), 1);
    }

    #[test]
    fn concurrent_first_access_populates_once() {
        let dir = TempDir::new().unwrap();
        let path = write_resource(
            &dir,
            "emb.jsonl",
            &[("a.png", vec![1.0, 0.0]), ("b.png", vec![0.0, 1.0])],
        );
        let store = Arc::new(EmbeddingStore::new());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                let path = path.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store
                        .get_vectors(&["a", "b"], &path, &StoreConfig { max_dim: None })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for pair in results.windows(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn empty_id_list_yields_empty_matrix() {
        let dir = TempDir::new().unwrap();
        let path = write_resource(&dir, "emb.jsonl", &[("a.png", vec![1.0, 2.0])]);
        let store = EmbeddingStore::new();

        let out = store
            .get_vectors::<&str>(&[], &path, &raw_config())
            .unwrap();
        assert_eq!(out.nrows(), 0);
    }
}
