//! Write buffering and grouping for exportflow.
//!
//! Formatted records are routed to one temp file per group. When a group's
//! file reaches the items or bytes threshold it is packed: footer written,
//! compression finished, size and optional hash computed, and a
//! [`WriteInfo`](ef_types::WriteInfo) descriptor handed to the writer.
//!
//! - [`GroupingInfo`] - Per-group counters and path-safe keys
//! - [`BufferFile`] - One compressing temp file
//! - [`GroupingBufferFilesTracker`] / [`ReservoirSamplingTracker`] - File ownership policies
//! - [`WriteBuffer`] - Threshold policy and pack operation

pub mod buffer;
pub mod file;
pub mod grouping;
pub mod tracker;

pub use buffer::{
    hash_file, WriteBuffer, WriteBufferOptions, DEFAULT_ITEMS_PER_BUFFER_WRITE,
    DEFAULT_SIZE_PER_BUFFER_WRITE,
};
pub use file::BufferFile;
pub use grouping::{is_path_safe, GroupInfo, GroupingInfo, RandomTokens};
pub use tracker::{EndedFile, FilesTracker, GroupingBufferFilesTracker, ReservoirSamplingTracker};
