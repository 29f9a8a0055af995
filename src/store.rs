//! Index Store - SQLite-backed container for frame/chunk/summary data
//!
//! Four logical tables hold the index:
//!
//! - `frames (chunk, frame_idx, frame_number, frame_time)` - one row
//!   per frame, rowid order is the global insertion order
//! - `chunks (chunk, chunk_path)` - one row per non-empty chunk
//! - `summary (name, value)` - min/max statistics, written once
//! - `index_information (name, value)` - format version
//!
//! Two lifecycles: build-from-chunks (in-memory, populated once) and
//! open-from-file (persisted). Either way the connection is mounted
//! read-only before any query runs; the builder is the only writer and
//! it finishes before the store is handed out.

use crate::builder;
use crate::cache::ChunkIndex;
use crate::error::{IndexError, IndexResult};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Expected index format version
pub const VERSION: &str = "1";

/// Min/max statistics over all frame records, computed at build time
///
/// For a store with zero frames, `frame_min`/`frame_max` are NaN and
/// the time bounds are 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub frame_min: f64,
    pub frame_max: f64,
    pub frame_time_min: f64,
    pub frame_time_max: f64,
}

/// A read-only frame index over a chunked store
pub struct IndexStore {
    pub(crate) conn: Connection,
    /// Directory holding the `cache/` subdirectory, when known
    pub(crate) dir: Option<PathBuf>,
    /// The chunk set this store was built from (None when opened from
    /// a file); keys the derived interval cache
    pub(crate) sources: Option<Vec<(i64, PathBuf)>>,
    frame_count: u64,
    summary: Summary,
    chunks: Vec<i64>,
    pub(crate) chunk_index: OnceLock<ChunkIndex>,
}

impl IndexStore {
    /// Build a new in-memory index from `(chunk_number, path)` pairs
    ///
    /// Pairs need not be sorted or contiguous; chunks whose metadata is
    /// missing or corrupt are skipped (the dataset may have holes).
    pub fn build_from_chunks(pairs: &[(i64, PathBuf)]) -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_database(&conn)?;
        builder::build(&conn, pairs)?;

        let dir = pairs
            .first()
            .and_then(|(_, path)| path.parent())
            .map(Path::to_path_buf);

        Self::attach(conn, dir, Some(pairs.to_vec()))
    }

    /// Open a persisted index file read-only
    pub fn open(path: &Path) -> IndexResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let dir = path.parent().map(Path::to_path_buf);
        Self::attach(conn, dir, None)
    }

    /// Mount the connection read-only and load version, row count,
    /// summary, and the chunk list
    fn attach(
        conn: Connection,
        dir: Option<PathBuf>,
        sources: Option<Vec<(i64, PathBuf)>>,
    ) -> IndexResult<Self> {
        conn.execute_batch("PRAGMA query_only = ON;")?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM index_information WHERE name = ?1",
                ["version"],
                |row| row.get(0),
            )
            .optional()?;
        match version.as_deref() {
            Some(v) if v == VERSION => {}
            Some(v) => {
                return Err(IndexError::VersionMismatch {
                    found: v.to_string(),
                    expected: VERSION,
                })
            }
            None => {
                return Err(IndexError::VersionMismatch {
                    found: "<missing>".to_string(),
                    expected: VERSION,
                })
            }
        }

        let frame_count: i64 = conn.query_row("SELECT COUNT(1) FROM frames", [], |row| row.get(0))?;
        let frame_count = frame_count as u64;

        let summary = if frame_count > 0 {
            Summary {
                frame_time_max: summary_value(&conn, "frame_time_max")?,
                frame_time_min: summary_value(&conn, "frame_time_min")?,
                frame_max: summary_value(&conn, "frame_max")?,
                frame_min: summary_value(&conn, "frame_min")?,
            }
        } else {
            Summary {
                frame_min: f64::NAN,
                frame_max: f64::NAN,
                frame_time_min: 0.0,
                frame_time_max: 0.0,
            }
        };

        tracing::debug!(
            frame_min = summary.frame_min,
            frame_max = summary.frame_max,
            "frame range"
        );

        let chunks = {
            let mut stmt = conn.prepare("SELECT chunk FROM chunks ORDER BY chunk")?;
            let chunks = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            chunks
        };

        Ok(Self {
            conn,
            dir,
            sources,
            frame_count,
            summary,
            chunks,
            chunk_index: OnceLock::new(),
        })
    }

    /// Number of frame records in the store
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The non-empty chunks present, in ascending chunk order
    pub fn chunks(&self) -> &[i64] {
        &self.chunks
    }

    /// Build-time min/max statistics
    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Serialize the whole store to a file
    ///
    /// Copies every row of every table in insertion order inside one
    /// transaction, so the result round-trips losslessly through
    /// [`IndexStore::open`].
    pub fn to_file(&self, path: &Path) -> IndexResult<()> {
        let mut dst = Connection::open(path)?;
        Self::create_tables(&dst)?;

        let tx = dst.transaction()?;
        {
            let mut read = self
                .conn
                .prepare("SELECT name, value FROM index_information ORDER BY rowid")?;
            let mut write = tx.prepare("INSERT INTO index_information VALUES (?1, ?2)")?;
            let mut rows = read.query([])?;
            while let Some(row) = rows.next()? {
                write.execute(params![row.get::<_, String>(0)?, row.get::<_, String>(1)?])?;
            }

            let mut read = self.conn.prepare(
                "SELECT chunk, frame_idx, frame_number, frame_time FROM frames ORDER BY rowid",
            )?;
            let mut write = tx.prepare("INSERT INTO frames VALUES (?1, ?2, ?3, ?4)")?;
            let mut rows = read.query([])?;
            while let Some(row) = rows.next()? {
                write.execute(params![
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, f64>(3)?,
                ])?;
            }

            let mut read = self
                .conn
                .prepare("SELECT chunk, chunk_path FROM chunks ORDER BY rowid")?;
            let mut write = tx.prepare("INSERT INTO chunks VALUES (?1, ?2)")?;
            let mut rows = read.query([])?;
            while let Some(row) = rows.next()? {
                write.execute(params![row.get::<_, i64>(0)?, row.get::<_, String>(1)?])?;
            }

            // summary values may be NULL (NaN does not survive as REAL)
            let mut read = self
                .conn
                .prepare("SELECT name, value FROM summary ORDER BY rowid")?;
            let mut write = tx.prepare("INSERT INTO summary VALUES (?1, ?2)")?;
            let mut rows = read.query([])?;
            while let Some(row) = rows.next()? {
                write.execute(params![
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    /// Create the four tables and the `(chunk, frame_idx)` index
    fn create_tables(conn: &Connection) -> IndexResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE frames
                (chunk INTEGER, frame_idx INTEGER, frame_number INTEGER, frame_time REAL);
            CREATE TABLE chunks (chunk INTEGER, chunk_path TEXT);
            CREATE TABLE index_information (name TEXT, value TEXT);
            CREATE TABLE summary (name TEXT, value REAL);
            CREATE INDEX chunk_index ON frames (chunk, frame_idx);
            ",
        )?;
        Ok(())
    }

    /// Create an empty index schema stamped with the current version
    fn create_database(conn: &Connection) -> IndexResult<()> {
        Self::create_tables(conn)?;
        conn.execute(
            "INSERT INTO index_information VALUES (?1, ?2)",
            params!["version", VERSION],
        )?;
        Ok(())
    }
}

/// Read one summary statistic; a missing or non-finite value reads as
/// NaN (older writers encoded "no value" as infinity)
fn summary_value(conn: &Connection, name: &str) -> IndexResult<f64> {
    let value: Option<Option<f64>> = conn
        .query_row("SELECT value FROM summary WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(match value.flatten() {
        Some(v) if v.is_finite() => v,
        _ => f64::NAN,
    })
}
