//! Failure paths surface the documented error kinds; nothing is retried or
//! silently papered over.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use emgrid::{
    cluster_labels, find_center, grid_assignment, ClusterError, EmbeddingStore, LayoutError,
    PipelineError, StoreError,
};

fn write_resource(dir: &TempDir, lines: &[&str]) -> PathBuf {
    let path = dir.path().join("embeddings.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    path
}

fn valid_lines() -> Vec<&'static str> {
    vec![
        r#"{"filename": "a.png", "embedding": [0.0, 1.0, 2.0]}"#,
        r#"{"filename": "b.png", "embedding": [4.0, 5.0, 6.0]}"#,
    ]
}

#[test]
fn missing_resource_is_resource_not_found() {
    let store = EmbeddingStore::new();
    let res = grid_assignment(&store, &["a"], Path::new("/no/such/file.jsonl"), 1, 1);
    assert!(matches!(
        res,
        Err(PipelineError::Store(StoreError::ResourceNotFound(_)))
    ));
}

#[test]
fn unknown_id_is_reported_by_name() {
    let dir = TempDir::new().unwrap();
    let path = write_resource(&dir, &valid_lines());
    let store = EmbeddingStore::new();

    let res = find_center(&store, &["a", "ghost"], &path);
    assert!(
        matches!(res, Err(PipelineError::Store(StoreError::UnknownId(ref id))) if id == "ghost")
    );
}

#[test]
fn malformed_record_is_a_format_error() {
    let dir = TempDir::new().unwrap();
    let path = write_resource(&dir, &[r#"{"filename": "a.png"}"#]);
    let store = EmbeddingStore::new();

    let res = cluster_labels(&store, &["a"], &path, 1);
    assert!(matches!(
        res,
        Err(PipelineError::Store(StoreError::Format { line: 1, .. }))
    ));
}

#[test]
fn cluster_count_out_of_range_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_resource(&dir, &valid_lines());
    let store = EmbeddingStore::new();

    let too_many = cluster_labels(&store, &["a", "b"], &path, 3);
    assert!(matches!(
        too_many,
        Err(PipelineError::Cluster(ClusterError::InvalidClusterCount {
            k: 3,
            n: 2
        }))
    ));

    let zero = cluster_labels(&store, &["a", "b"], &path, 0);
    assert!(matches!(
        zero,
        Err(PipelineError::Cluster(ClusterError::InvalidClusterCount {
            k: 0,
            ..
        }))
    ));
}

#[test]
fn undersized_grid_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_resource(&dir, &valid_lines());
    let store = EmbeddingStore::new();

    let res = grid_assignment(&store, &["a", "b"], &path, 1, 1);
    assert!(matches!(
        res,
        Err(PipelineError::Layout(LayoutError::InvalidGrid(_)))
    ));
}

#[test]
fn zero_sized_grid_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_resource(&dir, &valid_lines());
    let store = EmbeddingStore::new();

    let res = grid_assignment(&store, &["a"], &path, 0, 5);
    assert!(matches!(
        res,
        Err(PipelineError::Layout(LayoutError::InvalidGrid(_)))
    ));
}

#[test]
fn error_messages_carry_context() {
    let store = EmbeddingStore::new();
    let err = grid_assignment(&store, &["a"], Path::new("/no/such/file.jsonl"), 1, 1)
        .unwrap_err()
        .to_string();
    assert!(err.contains("/no/such/file.jsonl"), "got: {err}");
}
