//! Index Builder - populates a fresh store from per-chunk metadata
//!
//! Consumes `(chunk_number, path)` pairs, loads each chunk's metadata
//! sidecar, and appends frame/chunk records while tracking running
//! min/max statistics. The dataset may have holes: a chunk whose
//! metadata is missing or corrupt is logged and skipped, the build
//! continues. Only failures of the store itself abort the build.

use crate::chunk;
use crate::error::{IndexError, IndexResult};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// Running min/max statistics over everything the builder has seen
#[derive(Debug, Clone, Copy)]
struct RunningSummary {
    frame_min: f64,
    frame_max: f64,
    frame_time_min: f64,
    frame_time_max: f64,
    frames_seen: bool,
}

impl RunningSummary {
    fn new() -> Self {
        Self {
            frame_min: f64::INFINITY,
            frame_max: f64::NEG_INFINITY,
            frame_time_min: f64::INFINITY,
            frame_time_max: f64::NEG_INFINITY,
            frames_seen: false,
        }
    }

    fn update(&mut self, metadata: &chunk::ChunkMetadata) {
        for &frame_number in &metadata.frame_number {
            self.frame_min = self.frame_min.min(frame_number as f64);
            self.frame_max = self.frame_max.max(frame_number as f64);
            self.frames_seen = true;
        }
        for &frame_time in &metadata.frame_time {
            self.frame_time_min = self.frame_time_min.min(frame_time);
            self.frame_time_max = self.frame_time_max.max(frame_time);
        }
    }

    /// Final values to persist: NaN for frame bounds and 0.0 for time
    /// bounds when no frames were ever seen
    fn rows(&self) -> [(&'static str, f64); 4] {
        if self.frames_seen {
            [
                ("frame_time_min", self.frame_time_min),
                ("frame_time_max", self.frame_time_max),
                ("frame_min", self.frame_min),
                ("frame_max", self.frame_max),
            ]
        } else {
            [
                ("frame_time_min", 0.0),
                ("frame_time_max", 0.0),
                ("frame_min", f64::NAN),
                ("frame_max", f64::NAN),
            ]
        }
    }
}

/// Populate `conn` (a freshly created, empty index schema) from the
/// given chunk set
pub(crate) fn build(conn: &Connection, pairs: &[(i64, PathBuf)]) -> IndexResult<()> {
    let mut pairs: Vec<(i64, PathBuf)> = pairs.to_vec();
    pairs.sort_by_key(|(chunk, _)| *chunk);

    let mut summary = RunningSummary::new();

    for (chunk_n, chunk_path) in &pairs {
        let metadata = match chunk::try_load(chunk_path) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                tracing::warn!(chunk = *chunk_n, "missing index for chunk");
                continue;
            }
            Err(e) => {
                tracing::warn!(chunk = *chunk_n, error = %e, "unreadable index for chunk, skipping");
                continue;
            }
        };

        if metadata.frame_number.is_empty() {
            // empty chunk
            continue;
        }

        summary.update(&metadata);

        if metadata.frame_number.len() != metadata.frame_time.len() {
            let err = IndexError::CorruptChunk {
                chunk: *chunk_n,
                reason: format!(
                    "{} frame numbers vs {} frame times",
                    metadata.frame_number.len(),
                    metadata.frame_time.len()
                ),
            };
            tracing::error!(error = %err, "corrupt chunk");
            continue;
        }

        insert_chunk(conn, *chunk_n, chunk_path, &metadata)
            .map_err(|e| IndexError::Build(format!("inserting chunk {}: {}", chunk_n, e)))?;
    }

    write_summary(conn, &summary)
        .map_err(|e| IndexError::Build(format!("writing summary: {}", e)))?;

    Ok(())
}

fn insert_chunk(
    conn: &Connection,
    chunk_n: i64,
    chunk_path: &Path,
    metadata: &chunk::ChunkMetadata,
) -> rusqlite::Result<()> {
    let mut frame_stmt = conn.prepare_cached("INSERT INTO frames VALUES (?1, ?2, ?3, ?4)")?;
    for (frame_idx, (frame_number, frame_time)) in metadata
        .frame_number
        .iter()
        .zip(metadata.frame_time.iter())
        .enumerate()
    {
        frame_stmt.execute(params![chunk_n, frame_idx as i64, frame_number, frame_time])?;
    }

    conn.execute(
        "INSERT INTO chunks VALUES (?1, ?2)",
        params![chunk_n, chunk_path.display().to_string()],
    )?;

    Ok(())
}

fn write_summary(conn: &Connection, summary: &RunningSummary) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("INSERT INTO summary VALUES (?1, ?2)")?;
    for (name, value) in summary.rows() {
        stmt.execute(params![name, value])?;
    }
    Ok(())
}
