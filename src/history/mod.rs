//! Persistent video history
//!
//! One [`HistoryRecord`] per local video: where it came from, its technical
//! metadata and, once processed, its transcript. [`FjallHistoryStore`] keeps
//! the records in an embedded Fjall keyspace:
//!
//! - records are keyed by UUIDv7 ids, so a reverse scan yields newest first
//! - a lookup partition maps (source, title) and (source, file name) to the
//!   latest record id
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vidscribe::history::{FjallHistoryStore, HistoryRecord, HistoryStore, VideoSource};
//!
//! let store = FjallHistoryStore::open("data/history")?;
//! let record = HistoryRecord::builder()
//!     .title("clip.mp4")
//!     .source(VideoSource::Upload)
//!     .video_path("clip.mp4")
//!     .build();
//! store.insert(record)?;
//! let recent = store.list_recent(10)?;
//! ```

pub mod error;
pub mod models;
pub mod partitions;
pub mod store;

pub use error::{HistoryError, Result};
pub use models::{HistoryRecord, HistoryUpdate, VideoSource};
pub use store::FjallHistoryStore;

/// Record persistence used by the pipeline and the HTTP layer
pub trait HistoryStore: Send + Sync {
    fn insert(&self, record: HistoryRecord) -> Result<HistoryRecord>;

    /// Applies `update` to an existing record.
    fn update(&self, id: &str, update: HistoryUpdate) -> Result<HistoryRecord>;

    /// Applies `update` to the record matching `record`'s source and file
    /// name (then title), or inserts `record` with the update applied.
    ///
    /// The lookup and the write happen as one step, so concurrent calls for
    /// the same video end with a single record.
    fn upsert(&self, record: HistoryRecord, update: HistoryUpdate) -> Result<HistoryRecord>;

    /// Latest record with exactly this title and source
    fn find(&self, title: &str, source: VideoSource) -> Result<Option<HistoryRecord>>;

    /// Latest record for a local file name and source
    fn find_by_path(&self, video_path: &str, source: VideoSource) -> Result<Option<HistoryRecord>>;

    fn get(&self, id: &str) -> Result<Option<HistoryRecord>>;

    /// Removes a record, returning it when it existed.
    fn delete(&self, id: &str) -> Result<Option<HistoryRecord>>;

    fn list_recent(&self, limit: usize) -> Result<Vec<HistoryRecord>>;

    /// Newest first; pages start at 1.
    fn page(&self, page: usize, per_page: usize) -> Result<Vec<HistoryRecord>>;

    fn count(&self) -> Result<usize>;
}
