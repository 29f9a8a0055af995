//! Chunk Interval Cache - derived (first, last) key pairs per chunk
//!
//! Scanning every chunk for its key interval is the slow part of
//! seeking, so the full mapping is computed once and cached twice
//! over: in-process behind a compute-once cell, and on disk in a
//! `cache/` subdirectory next to the store, keyed by a content hash of
//! the chunk set the store was built from. A different chunk set
//! hashes differently and gets its own cache file; an existing file is
//! treated as immutable.
//!
//! The cache file is written to a temporary path and renamed into
//! place, so a concurrent reader never observes a partial file.

use crate::error::{IndexError, IndexResult};
use crate::query::FrameKey;
use crate::store::IndexStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Per-chunk (largest, smallest) key intervals for both frame keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkIndex {
    pub frame_number: BTreeMap<i64, (f64, f64)>,
    pub frame_time: BTreeMap<i64, (f64, f64)>,
}

impl ChunkIndex {
    /// Interval for one chunk under the given key
    pub fn interval(&self, chunk_n: i64, key: FrameKey) -> Option<(f64, f64)> {
        match key {
            FrameKey::FrameNumber => self.frame_number.get(&chunk_n).copied(),
            FrameKey::FrameTime => self.frame_time.get(&chunk_n).copied(),
        }
    }
}

/// Deterministic digest of the sorted `(chunk, path)` set, hex encoded
pub(crate) fn content_hash(pairs: &[(i64, PathBuf)]) -> String {
    let mut sorted: Vec<&(i64, PathBuf)> = pairs.iter().collect();
    sorted.sort_by_key(|(chunk, _)| *chunk);

    let mut hasher = Sha256::new();
    for (chunk, path) in sorted {
        hasher.update(chunk.to_string().as_bytes());
        hasher.update(path.display().to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

impl IndexStore {
    /// The interval mapping for every chunk and both keys
    ///
    /// Computed lazily on first access and memoized for the life of
    /// the store. When the store knows the chunk set it was built from,
    /// the mapping is also persisted under
    /// `<dir>/cache/chunk_index_<hash>.json` and read back on later
    /// opens with the same hash. A store opened from a file has no
    /// chunk set to hash, so it memoizes in-process only.
    pub fn chunk_index(&self) -> IndexResult<&ChunkIndex> {
        if let Some(index) = self.chunk_index.get() {
            return Ok(index);
        }
        let index = self.load_or_compute_chunk_index()?;
        Ok(self.chunk_index.get_or_init(|| index))
    }

    fn load_or_compute_chunk_index(&self) -> IndexResult<ChunkIndex> {
        let cache_file = self.chunk_index_cache_file();

        if let Some(path) = &cache_file {
            if path.exists() {
                tracing::debug!(path = %path.display(), "reading cached chunk index");
                let file = File::open(path)?;
                let index = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                    IndexError::Serialization(format!(
                        "failed to load chunk index cache {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                return Ok(index);
            }
        }

        let index = self.compute_chunk_index()?;

        if let Some(path) = &cache_file {
            // cache persistence is best effort, the computed value is
            // already in hand
            if let Err(e) = persist_chunk_index(path, &index) {
                tracing::warn!(path = %path.display(), error = %e, "failed to persist chunk index cache");
            }
        }

        Ok(index)
    }

    fn compute_chunk_index(&self) -> IndexResult<ChunkIndex> {
        let mut index = ChunkIndex::default();
        for &chunk in self.chunks() {
            if let Some(interval) = self.get_chunk_interval(chunk, FrameKey::FrameNumber)? {
                index.frame_number.insert(chunk, interval);
            }
            if let Some(interval) = self.get_chunk_interval(chunk, FrameKey::FrameTime)? {
                index.frame_time.insert(chunk, interval);
            }
        }
        Ok(index)
    }

    fn chunk_index_cache_file(&self) -> Option<PathBuf> {
        let sources = self.sources.as_ref()?;
        let dir = self.dir.as_ref()?;
        let hash = content_hash(sources);
        Some(dir.join("cache").join(format!("chunk_index_{}.json", hash)))
    }
}

/// Write the cache file atomically: temp file in the same directory,
/// then rename into place
fn persist_chunk_index(path: &Path, index: &ChunkIndex) -> IndexResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| IndexError::InvalidArgument("cache path has no parent".to_string()))?;
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| IndexError::InvalidArgument("cache path has no file name".to_string()))?;
    let tmp = dir.join(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, index)?;
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;

    tracing::debug!(path = %path.display(), "persisted chunk index cache");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkMetadata;
    use tempfile::tempdir;

    fn example_pairs(dir: &Path) -> Vec<(i64, PathBuf)> {
        let chunk0 = dir.join("000000");
        let chunk1 = dir.join("000001");
        ChunkMetadata::new(vec![10, 11, 12], vec![100.0, 110.0, 120.0])
            .write_binary(&chunk0)
            .unwrap();
        ChunkMetadata::new(vec![13, 14], vec![130.0, 140.0])
            .write_binary(&chunk1)
            .unwrap();
        vec![(0, chunk0), (1, chunk1)]
    }

    #[test]
    fn test_chunk_index_values() {
        let dir = tempdir().unwrap();
        let store = IndexStore::build_from_chunks(&example_pairs(dir.path())).unwrap();

        let index = store.chunk_index().unwrap();
        assert_eq!(index.interval(0, FrameKey::FrameNumber), Some((12.0, 10.0)));
        assert_eq!(index.interval(1, FrameKey::FrameNumber), Some((14.0, 13.0)));
        assert_eq!(index.interval(0, FrameKey::FrameTime), Some((120.0, 100.0)));
        assert_eq!(index.interval(1, FrameKey::FrameTime), Some((140.0, 130.0)));
        assert_eq!(index.interval(7, FrameKey::FrameNumber), None);
    }

    #[test]
    fn test_cache_file_created() {
        let dir = tempdir().unwrap();
        let pairs = example_pairs(dir.path());
        let store = IndexStore::build_from_chunks(&pairs).unwrap();

        store.chunk_index().unwrap();

        let hash = content_hash(&pairs);
        let cache_file = dir
            .path()
            .join("cache")
            .join(format!("chunk_index_{}.json", hash));
        assert!(cache_file.exists());
    }

    #[test]
    fn test_cache_file_is_read_on_reopen() {
        let dir = tempdir().unwrap();
        let pairs = example_pairs(dir.path());

        IndexStore::build_from_chunks(&pairs)
            .unwrap()
            .chunk_index()
            .unwrap();

        // doctor the persisted cache; a second store with the same
        // hash must return the doctored values, proving the disk path
        let hash = content_hash(&pairs);
        let cache_file = dir
            .path()
            .join("cache")
            .join(format!("chunk_index_{}.json", hash));
        let mut doctored: ChunkIndex =
            serde_json::from_reader(BufReader::new(File::open(&cache_file).unwrap())).unwrap();
        doctored.frame_number.insert(0, (999.0, 998.0));
        serde_json::to_writer(File::create(&cache_file).unwrap(), &doctored).unwrap();

        let store = IndexStore::build_from_chunks(&pairs).unwrap();
        let index = store.chunk_index().unwrap();
        assert_eq!(index.interval(0, FrameKey::FrameNumber), Some((999.0, 998.0)));
    }

    #[test]
    fn test_chunk_index_memoized_in_process() {
        let dir = tempdir().unwrap();
        let store = IndexStore::build_from_chunks(&example_pairs(dir.path())).unwrap();

        let first = store.chunk_index().unwrap() as *const ChunkIndex;
        let second = store.chunk_index().unwrap() as *const ChunkIndex;
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunk_index_without_sources() {
        let dir = tempdir().unwrap();
        let store = IndexStore::build_from_chunks(&example_pairs(dir.path())).unwrap();
        let db_path = dir.path().join("store").join("index.db");
        std::fs::create_dir_all(db_path.parent().unwrap()).unwrap();
        store.to_file(&db_path).unwrap();

        // opened from a file: no chunk set to hash, computed in memory
        let reopened = IndexStore::open(&db_path).unwrap();
        let index = reopened.chunk_index().unwrap();
        assert_eq!(index.interval(1, FrameKey::FrameTime), Some((140.0, 130.0)));
        assert!(!db_path.parent().unwrap().join("cache").exists());
    }

    #[test]
    fn test_content_hash_ignores_input_order() {
        let a = vec![
            (0, PathBuf::from("/data/000000")),
            (1, PathBuf::from("/data/000001")),
        ];
        let mut b = a.clone();
        b.reverse();

        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_content_hash_differs_for_different_sets() {
        let a = vec![(0, PathBuf::from("/data/000000"))];
        let b = vec![(0, PathBuf::from("/data/000001"))];
        assert_ne!(content_hash(&a), content_hash(&b));
    }
}
