//! Resumable readers for exportflow.
//!
//! - [`RandomReader`] - Synthetic records, position is the count emitted
//! - [`FsReader`] - JSON-lines files under a directory, position `{file, line}`
//! - [`S3Reader`] - JSON-lines objects in a bucket, position `{key, line}`
//!
//! File and S3 readers also expose their raw inputs as read streams for
//! the stream bypass.

mod fs;
mod lines;
mod random;
mod s3;

pub use fs::{FsReader, FsSource};
pub use lines::{JsonLinesReader, UnitSource};
pub use random::RandomReader;
pub use s3::{S3Reader, S3Source};
