//! JSONL embedding records and the filename-to-id convention.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// One line of the embedding resource: a filename paired with a
/// fixed-length vector. The public id is the filename stem; reserved path
/// characters are percent-escaped upstream, so the stem is always a usable
/// identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub filename: String,
    pub embedding: Vec<f32>,
}

impl EmbeddingRecord {
    /// Id under which this record is served.
    pub fn id(&self) -> &str {
        filename_stem(&self.filename)
    }
}

/// Text before the first `.` of a filename.
pub fn filename_stem(filename: &str) -> &str {
    filename.split('.').next().unwrap_or(filename)
}

/// Parse the JSONL embedding resource at `path`.
///
/// All records must carry vectors of the same length; a length mismatch is
/// reported as a format error on the offending line rather than deferred to
/// downstream distance computations.
pub fn read_records(path: &Path) -> Result<Vec<EmbeddingRecord>, StoreError> {
    let file = File::open(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::ResourceNotFound(path.display().to_string())
        } else {
            StoreError::Io {
                path: path.display().to_string(),
                source,
            }
        }
    })?;

    let reader = BufReader::new(file);
    let mut records: Vec<EmbeddingRecord> = Vec::new();
    let mut dim: Option<usize> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let record: EmbeddingRecord =
            serde_json::from_str(&line).map_err(|err| StoreError::Format {
                path: path.display().to_string(),
                line: idx + 1,
                message: err.to_string(),
            })?;

        match dim {
            None => dim = Some(record.embedding.len()),
            Some(expected) if expected != record.embedding.len() => {
                return Err(StoreError::Format {
                    path: path.display().to_string(),
                    line: idx + 1,
                    message: format!(
                        "vector length {} differs from {expected}",
                        record.embedding.len()
                    ),
                });
            }
            Some(_) => {}
        }

        records.push(record);
    }

    Ok(records)
}
