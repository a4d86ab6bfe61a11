//! Transcode status records.
//!
//! One record per source path, moving `processing -> {completed | failed}`.
//! Terminal records are never rewritten.

mod sqlite_store;
mod store;

pub use sqlite_store::SqliteStatusStore;
pub use store::*;
