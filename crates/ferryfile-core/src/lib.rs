//! Core types for ferryfile.
//!
//! This crate holds the data shared by every storage backend and by the
//! transfer engine: file entries, listing order, the provider error type and
//! the engine configuration.

mod config;
mod entry;
mod error;
mod listing;

pub use config::{APP_DIR, Settings, TransferConfig, TransferConfigBuilder};
pub use entry::{
    EntryStamp, FileEntry, PARENT_MARKER, format_size, format_timestamp, permissions_text,
    split_extension,
};
pub use error::{VfsError, VfsResult};
pub use listing::{SortColumn, SortSpec, compare_entries, sort_entries};
