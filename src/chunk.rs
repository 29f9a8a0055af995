//! Chunk Metadata Loader - per-chunk frame metadata in two formats
//!
//! Every chunk of a store carries a sidecar file describing its frames:
//! `frame_number` (integers) and `frame_time` (reals), plus optional
//! named columns. Two encodings are supported and tried in priority
//! order against a path without extension:
//!
//! 1. `<path>.bin` - columnar binary (bincode)
//! 2. `<path>.json` - structured text (JSON)
//!
//! The binary format tolerates missing columns: absent fields are
//! logged and omitted from the result, partial data is accepted. The
//! text format requires both core fields.

use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Extension of the columnar binary format (tried first)
pub const BINARY_EXT: &str = "bin";
/// Extension of the structured-text format (fallback)
pub const TEXT_EXT: &str = "json";

const FRAME_NUMBER: &str = "frame_number";
const FRAME_TIME: &str = "frame_time";

/// One column of the binary format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Column {
    Int(Vec<i64>),
    Real(Vec<f64>),
    Text(Vec<String>),
}

/// Per-frame metadata for one chunk
///
/// `frame_number` and `frame_time` are positional: entry `i` of each
/// describes the frame at `frame_idx == i` within the chunk. Other
/// named fields found in the source file are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub frame_number: Vec<i64>,
    #[serde(default)]
    pub frame_time: Vec<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ChunkMetadata {
    pub fn new(frame_number: Vec<i64>, frame_time: Vec<f64>) -> Self {
        Self {
            frame_number,
            frame_time,
            extra: BTreeMap::new(),
        }
    }

    /// Write as columnar binary to `<path>.bin`
    ///
    /// Extra fields that cannot be expressed as a homogeneous column
    /// are dropped with a debug log.
    pub fn write_binary(&self, path_without_extension: &Path) -> IndexResult<()> {
        let mut columns: BTreeMap<String, Column> = BTreeMap::new();
        columns.insert(FRAME_NUMBER.to_string(), Column::Int(self.frame_number.clone()));
        columns.insert(FRAME_TIME.to_string(), Column::Real(self.frame_time.clone()));
        for (name, value) in &self.extra {
            match value_to_column(value) {
                Some(col) => {
                    columns.insert(name.clone(), col);
                }
                None => {
                    tracing::debug!(field = %name, "field is not columnar, dropped from binary index");
                }
            }
        }

        let path = with_suffix(path_without_extension, BINARY_EXT);
        let bytes = bincode::serialize(&columns)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Write as structured text to `<path>.json`
    pub fn write_text(&self, path_without_extension: &Path) -> IndexResult<()> {
        let path = with_suffix(path_without_extension, TEXT_EXT);
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

/// Load chunk metadata, trying `.bin` then `.json`
///
/// Returns `Ok(None)` when neither file exists, so the builder's
/// tolerant skip reads as explicit branching.
pub fn try_load(path_without_extension: &Path) -> IndexResult<Option<ChunkMetadata>> {
    for ext in [BINARY_EXT, TEXT_EXT] {
        let candidate = with_suffix(path_without_extension, ext);
        if !candidate.exists() {
            tracing::warn!(path = %candidate.display(), "chunk index candidate is missing");
            continue;
        }
        let metadata = if ext == BINARY_EXT {
            load_binary(&candidate)?
        } else {
            load_text(&candidate)?
        };
        return Ok(Some(metadata));
    }
    Ok(None)
}

/// Load chunk metadata, failing with [`IndexError::ChunkIndexNotFound`]
/// when neither format exists
pub fn load(path_without_extension: &Path) -> IndexResult<ChunkMetadata> {
    try_load(path_without_extension)?
        .ok_or_else(|| IndexError::ChunkIndexNotFound(path_without_extension.to_path_buf()))
}

fn with_suffix(path: &Path, ext: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", path.display(), ext))
}

fn load_binary(path: &Path) -> IndexResult<ChunkMetadata> {
    let bytes = std::fs::read(path)?;
    let mut columns: BTreeMap<String, Column> = bincode::deserialize(&bytes)?;

    let frame_number = match columns.remove(FRAME_NUMBER) {
        Some(Column::Int(values)) => values,
        Some(_) => {
            tracing::info!(field = FRAME_NUMBER, "field has unexpected column type, omitted");
            Vec::new()
        }
        None => {
            tracing::info!(field = FRAME_NUMBER, "field is not available in this dataset");
            Vec::new()
        }
    };

    let frame_time = match columns.remove(FRAME_TIME) {
        Some(Column::Real(values)) => values,
        // integer times appear in older writers
        Some(Column::Int(values)) => values.into_iter().map(|t| t as f64).collect(),
        Some(_) => {
            tracing::info!(field = FRAME_TIME, "field has unexpected column type, omitted");
            Vec::new()
        }
        None => {
            tracing::info!(field = FRAME_TIME, "field is not available in this dataset");
            Vec::new()
        }
    };

    let extra = columns
        .into_iter()
        .map(|(name, col)| (name, column_to_value(col)))
        .collect();

    Ok(ChunkMetadata {
        frame_number,
        frame_time,
        extra,
    })
}

fn load_text(path: &Path) -> IndexResult<ChunkMetadata> {
    let file = File::open(path)?;
    let metadata = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        IndexError::Serialization(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(metadata)
}

fn column_to_value(col: Column) -> serde_json::Value {
    match col {
        Column::Int(v) => serde_json::json!(v),
        Column::Real(v) => serde_json::json!(v),
        Column::Text(v) => serde_json::json!(v),
    }
}

fn value_to_column(value: &serde_json::Value) -> Option<Column> {
    let items = value.as_array()?;
    if items.iter().all(|v| v.as_i64().is_some()) {
        return Some(Column::Int(items.iter().filter_map(|v| v.as_i64()).collect()));
    }
    if items.iter().all(|v| v.as_f64().is_some()) {
        return Some(Column::Real(items.iter().filter_map(|v| v.as_f64()).collect()));
    }
    if items.iter().all(|v| v.is_string()) {
        return Some(Column::Text(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> ChunkMetadata {
        ChunkMetadata::new(vec![10, 11, 12], vec![100.0, 110.0, 120.0])
    }

    #[test]
    fn test_binary_round_trip() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("000000");

        sample().write_binary(&base).unwrap();
        let loaded = load(&base).unwrap();

        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_text_round_trip() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("000000");

        sample().write_text(&base).unwrap();
        let loaded = load(&base).unwrap();

        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_binary_takes_priority_over_text() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("000000");

        sample().write_binary(&base).unwrap();
        let mut other = sample();
        other.frame_number = vec![99];
        other.frame_time = vec![999.0];
        other.write_text(&base).unwrap();

        // .bin wins over .json
        let loaded = load(&base).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_missing_both_formats() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("000000");

        assert!(try_load(&base).unwrap().is_none());
        assert!(matches!(
            load(&base),
            Err(IndexError::ChunkIndexNotFound(_))
        ));
    }

    #[test]
    fn test_binary_missing_field_is_omitted() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("000000");

        // a binary file carrying only frame_number
        let mut columns: BTreeMap<String, Column> = BTreeMap::new();
        columns.insert("frame_number".to_string(), Column::Int(vec![1, 2]));
        let path = PathBuf::from(format!("{}.bin", base.display()));
        std::fs::write(path, bincode::serialize(&columns).unwrap()).unwrap();

        let loaded = load(&base).unwrap();
        assert_eq!(loaded.frame_number, vec![1, 2]);
        assert!(loaded.frame_time.is_empty());
    }

    #[test]
    fn test_extra_fields_preserved() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("000000");

        let mut metadata = sample();
        metadata.extra.insert(
            "frame_in_chunk".to_string(),
            serde_json::json!([0, 1, 2]),
        );

        metadata.write_binary(&base).unwrap();
        let loaded = load(&base).unwrap();
        assert_eq!(
            loaded.extra.get("frame_in_chunk"),
            Some(&serde_json::json!([0, 1, 2]))
        );
    }

    #[test]
    fn test_integer_frame_times_widen_to_real() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("000000");

        let mut columns: BTreeMap<String, Column> = BTreeMap::new();
        columns.insert("frame_number".to_string(), Column::Int(vec![1]));
        columns.insert("frame_time".to_string(), Column::Int(vec![100]));
        let path = PathBuf::from(format!("{}.bin", base.display()));
        std::fs::write(path, bincode::serialize(&columns).unwrap()).unwrap();

        let loaded = load(&base).unwrap();
        assert_eq!(loaded.frame_time, vec![100.0]);
    }
}
