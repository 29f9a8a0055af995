//! Query Engine - read-only lookups against an opened [`IndexStore`]
//!
//! Three coordinate spaces are mapped onto each other: global row
//! order (SQLite rowid), chunk-relative position `(chunk, frame_idx)`,
//! and the two external keys `frame_number`/`frame_time`.
//!
//! Query shapes are a closed set of prepared statement templates
//! selected by enum, never assembled from caller strings.
//!
//! Lookup conventions:
//! - exact-match row lookups ([`IndexStore::find_chunk`]) return a
//!   `(-1, -1)` sentinel when nothing matches
//! - interval and metadata lookups return `None`/empty instead
//! - nearest-match with a directional constraint falls back to an
//!   unrestricted search when the constrained one is empty, so it is
//!   total for any store with at least one frame

use crate::error::{IndexError, IndexResult};
use crate::store::IndexStore;
use rusqlite::{params, OptionalExtension, Params};

/// One of the two externally meaningful frame keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKey {
    FrameNumber,
    FrameTime,
}

/// Directional constraint for nearest-match searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// No restriction
    #[default]
    All,
    /// Only rows whose key is >= the query value
    Future,
    /// Only rows whose key is <= the query value
    Past,
}

/// Row selector for [`IndexStore::find_chunk`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowLookup {
    /// First row with this exact frame number
    FrameNumber(i64),
    /// First row with this exact frame time
    FrameTime(f64),
    /// Row at this zero-based global insertion-order offset
    Index(u64),
}

/// Key selector for [`IndexStore::get_frame_time`]
///
/// Exactly one key is required; the enum makes a both-or-neither call
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTimeKey {
    FrameNumber(i64),
    FrameIdx(i64),
}

/// Column-wise frame metadata, positionally aligned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetadata {
    pub frame_number: Vec<i64>,
    pub frame_time: Vec<f64>,
}

/// Sentinel returned by [`IndexStore::find_chunk`] when no row matches
pub const NOT_FOUND: (i64, i64) = (-1, -1);

const NEAREST_NUMBER_ALL: &str =
    "SELECT chunk, frame_idx FROM frames ORDER BY ABS(?1 - frame_number) LIMIT 1";
const NEAREST_NUMBER_FUTURE: &str = "SELECT chunk, frame_idx FROM frames \
     WHERE frame_number >= ?1 ORDER BY ABS(?1 - frame_number) LIMIT 1";
const NEAREST_NUMBER_PAST: &str = "SELECT chunk, frame_idx FROM frames \
     WHERE frame_number <= ?1 ORDER BY ABS(?1 - frame_number) LIMIT 1";
const NEAREST_TIME_ALL: &str =
    "SELECT chunk, frame_idx FROM frames ORDER BY ABS(?1 - frame_time) LIMIT 1";
const NEAREST_TIME_FUTURE: &str = "SELECT chunk, frame_idx FROM frames \
     WHERE frame_time >= ?1 ORDER BY ABS(?1 - frame_time) LIMIT 1";
const NEAREST_TIME_PAST: &str = "SELECT chunk, frame_idx FROM frames \
     WHERE frame_time <= ?1 ORDER BY ABS(?1 - frame_time) LIMIT 1";

impl IndexStore {
    /// Frame metadata by global row position
    ///
    /// - `None`: every row in insertion order
    /// - positive `rowid`: the single row at that absolute position
    ///   (rowids are 1-based)
    /// - negative `rowid`: end-relative, `-1` is the last row
    /// - `0`: not a valid rowid, interpreted as `1` with a warning
    pub fn get_all_metadata(&self, rowid: Option<i64>) -> IndexResult<FrameMetadata> {
        let rowid = match rowid {
            Some(0) => {
                tracing::warn!("rowid=0 is not valid, interpreting as rowid=1");
                Some(1)
            }
            other => other,
        };

        match rowid {
            None => self.collect_metadata(
                "SELECT frame_number, frame_time FROM frames ORDER BY rowid",
                [],
            ),
            Some(id) if id > 0 => self.collect_metadata(
                "SELECT frame_number, frame_time FROM frames WHERE rowid = ?1",
                [id],
            ),
            Some(id) => self.collect_metadata(
                "SELECT frame_number, frame_time FROM frames \
                 ORDER BY rowid DESC LIMIT 1 OFFSET ?1",
                [-id - 1],
            ),
        }
    }

    /// All frame metadata for one chunk, in insertion order
    pub fn get_chunk_metadata(&self, chunk_n: i64) -> IndexResult<FrameMetadata> {
        self.collect_metadata(
            "SELECT frame_number, frame_time FROM frames WHERE chunk = ?1 ORDER BY rowid",
            [chunk_n],
        )
    }

    /// The frame time of the first row matching the given key
    pub fn get_frame_time(&self, key: FrameTimeKey) -> IndexResult<Option<f64>> {
        let (sql, value) = match key {
            FrameTimeKey::FrameNumber(n) => (
                "SELECT frame_time FROM frames WHERE frame_number = ?1 ORDER BY rowid LIMIT 1",
                n,
            ),
            FrameTimeKey::FrameIdx(i) => (
                "SELECT frame_time FROM frames WHERE frame_idx = ?1 ORDER BY rowid LIMIT 1",
                i,
            ),
        };
        let time = self
            .conn
            .prepare_cached(sql)?
            .query_row([value], |row| row.get(0))
            .optional()?;
        Ok(time)
    }

    /// The (largest, smallest) value of `key` within one chunk
    ///
    /// Tuple order is descending, matching a descending scan of the
    /// chunk: first element is the largest key value, second the
    /// smallest. `None` for a chunk with no rows.
    pub fn get_chunk_interval(
        &self,
        chunk_n: i64,
        key: FrameKey,
    ) -> IndexResult<Option<(f64, f64)>> {
        let sql = match key {
            FrameKey::FrameNumber => {
                "SELECT MAX(frame_number), MIN(frame_number) FROM frames WHERE chunk = ?1"
            }
            FrameKey::FrameTime => {
                "SELECT MAX(frame_time), MIN(frame_time) FROM frames WHERE chunk = ?1"
            }
        };
        let (last, first): (Option<f64>, Option<f64>) = self
            .conn
            .prepare_cached(sql)?
            .query_row([chunk_n], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(match (last, first) {
            (Some(last), Some(first)) => Some((last, first)),
            _ => None,
        })
    }

    /// `(chunk, frame_idx)` of the first row with this frame number
    pub fn get_chunk_and_frame_idx_from_frame_number(
        &self,
        frame_number: i64,
    ) -> IndexResult<Option<(i64, i64)>> {
        let row = self
            .conn
            .prepare_cached(
                "SELECT chunk, frame_idx FROM frames \
                 WHERE frame_number = ?1 ORDER BY rowid LIMIT 1",
            )?
            .query_row([frame_number], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        Ok(row)
    }

    /// `(chunk, frame_idx)` of the first row with this frame time
    pub fn get_chunk_and_frame_idx_from_frame_time(
        &self,
        frame_time: f64,
    ) -> IndexResult<Option<(i64, i64)>> {
        let row = self
            .conn
            .prepare_cached(
                "SELECT chunk, frame_idx FROM frames \
                 WHERE frame_time = ?1 ORDER BY rowid LIMIT 1",
            )?
            .query_row([frame_time], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        Ok(row)
    }

    /// Deprecated alias for
    /// [`IndexStore::get_chunk_and_frame_idx_from_frame_number`]
    #[deprecated(note = "use get_chunk_and_frame_idx_from_frame_number")]
    pub fn get_chunk_and_frame_idx(&self, frame_number: i64) -> IndexResult<Option<(i64, i64)>> {
        tracing::warn!("get_chunk_and_frame_idx is deprecated, use get_chunk_and_frame_idx_from_frame_number");
        self.get_chunk_and_frame_idx_from_frame_number(frame_number)
    }

    /// `(chunk, frame_idx)` of the selected row, or the `(-1, -1)`
    /// sentinel when no row matches (never an error)
    pub fn find_chunk(&self, lookup: RowLookup) -> IndexResult<(i64, i64)> {
        let row = match lookup {
            RowLookup::Index(offset) => self.position_row(
                "SELECT chunk, frame_idx FROM frames ORDER BY rowid LIMIT 1 OFFSET ?1",
                [offset as i64],
            )?,
            RowLookup::FrameNumber(n) => self.position_row(
                "SELECT chunk, frame_idx FROM frames \
                 WHERE frame_number = ?1 ORDER BY rowid LIMIT 1",
                params![n],
            )?,
            RowLookup::FrameTime(t) => self.position_row(
                "SELECT chunk, frame_idx FROM frames \
                 WHERE frame_time = ?1 ORDER BY rowid LIMIT 1",
                params![t],
            )?,
        };
        Ok(row.unwrap_or(NOT_FOUND))
    }

    /// `(chunk, frame_idx)` of the row whose `key` is nearest to
    /// `value`, subject to `direction`
    ///
    /// Ties go to the smallest absolute difference; among equal
    /// differences the winner is whichever row the scan surfaces
    /// first. When the constrained direction has no candidates the
    /// search retries unrestricted (one bounded fallback, no
    /// recursion), so any non-empty store yields a result. An empty
    /// store fails with [`IndexError::EmptyStore`].
    pub fn find_chunk_nearest(
        &self,
        key: FrameKey,
        value: f64,
        direction: Direction,
    ) -> IndexResult<(i64, i64)> {
        if self.frame_count() == 0 {
            return Err(IndexError::EmptyStore);
        }

        if let Some(row) = self.nearest_row(key, value, direction)? {
            return Ok(row);
        }
        // nothing in the constrained direction, retry unrestricted
        self.nearest_row(key, value, Direction::All)?
            .ok_or(IndexError::EmptyStore)
    }

    fn nearest_row(
        &self,
        key: FrameKey,
        value: f64,
        direction: Direction,
    ) -> IndexResult<Option<(i64, i64)>> {
        let sql = match (key, direction) {
            (FrameKey::FrameNumber, Direction::All) => NEAREST_NUMBER_ALL,
            (FrameKey::FrameNumber, Direction::Future) => NEAREST_NUMBER_FUTURE,
            (FrameKey::FrameNumber, Direction::Past) => NEAREST_NUMBER_PAST,
            (FrameKey::FrameTime, Direction::All) => NEAREST_TIME_ALL,
            (FrameKey::FrameTime, Direction::Future) => NEAREST_TIME_FUTURE,
            (FrameKey::FrameTime, Direction::Past) => NEAREST_TIME_PAST,
        };
        self.position_row(sql, [value])
    }

    fn position_row(&self, sql: &str, params: impl Params) -> IndexResult<Option<(i64, i64)>> {
        let row = self
            .conn
            .prepare_cached(sql)?
            .query_row(params, |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        Ok(row)
    }

    fn collect_metadata(&self, sql: &str, params: impl Params) -> IndexResult<FrameMetadata> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut rows = stmt.query(params)?;
        let mut metadata = FrameMetadata::default();
        while let Some(row) = rows.next()? {
            metadata.frame_number.push(row.get(0)?);
            metadata.frame_time.push(row.get(1)?);
        }
        Ok(metadata)
    }
}
