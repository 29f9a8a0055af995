//! # Framedex
//!
//! SQLite-backed frame index for chunked video stores.
//!
//! A store's frames live in numbered chunks, each with a metadata
//! sidecar listing its `frame_number` and `frame_time` columns.
//! Framedex assembles those sidecars into a single read-only index and
//! answers point, interval, and nearest-match lookups across three
//! coordinate spaces: global row order, chunk-relative position, and
//! the two external keys.
//!
//! ## Modules
//!
//! - [`chunk`]: per-chunk metadata loader (columnar binary / text)
//! - [`store`]: the index store, its schema and lifecycles
//! - [`query`]: read-only point/interval/nearest-match lookups
//! - [`cache`]: derived chunk-interval cache keyed by content hash
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framedex::{Direction, FrameKey, IndexStore, RowLookup};
//! use std::path::PathBuf;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build an index from per-chunk metadata sidecars
//!     let pairs: Vec<(i64, PathBuf)> = vec![
//!         (0, PathBuf::from("/data/store/000000")),
//!         (1, PathBuf::from("/data/store/000001")),
//!     ];
//!     let index = IndexStore::build_from_chunks(&pairs)?;
//!
//!     println!("{} frames in {} chunks", index.frame_count(), index.chunks().len());
//!
//!     // Where does frame 1234 live?
//!     let (chunk, frame_idx) = index.find_chunk(RowLookup::FrameNumber(1234))?;
//!
//!     // The frame closest to t=2000ms, not after it
//!     let (chunk, frame_idx) =
//!         index.find_chunk_nearest(FrameKey::FrameTime, 2000.0, Direction::Past)?;
//!
//!     // Persist for later sessions
//!     index.to_file(&PathBuf::from("/data/store/index.db"))?;
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chunk;
pub mod error;
pub mod query;
pub mod store;

mod builder;

// Re-export top-level types for convenience
pub use cache::ChunkIndex;
pub use chunk::{ChunkMetadata, Column};
pub use error::{IndexError, IndexResult};
pub use query::{Direction, FrameKey, FrameMetadata, FrameTimeKey, RowLookup, NOT_FOUND};
pub use store::{IndexStore, Summary, VERSION};
