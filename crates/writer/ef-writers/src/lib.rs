//! Writers for exportflow.
//!
//! [`BufferedWriter`] is the generic part every export uses: it buffers
//! formatted records per group, enforces the flush thresholds and the items
//! limit, and hands packed files to a destination [`Writer`](ef_traits::Writer):
//!
//! - [`ConsoleWriter`] - Prints files to stdout, uncompressed
//! - [`FsWriter`] - Numbered files under a filebase on local disk
//! - [`S3Writer`] - Objects in a bucket, with optional save-pointer
//! - [`AzureBlobWriter`] - Blobs in an Azure container
//! - [`AzureFileWriter`] - Files in an Azure file share

mod azure_blob;
mod azure_file;
mod buffered;
mod console;
mod delivered;
mod filebase;
mod fs;
mod options;
mod s3;

pub use azure_blob::AzureBlobWriter;
pub use azure_file::{AzureFileWriter, MAX_RANGE_BYTES};
pub use buffered::{BatchOutcome, BufferedWriter, WRITER_MODULE};
pub use console::ConsoleWriter;
pub use delivered::DeliveredFile;
pub use filebase::{FileCounters, Filebase, RenderedFilebase};
pub use fs::FsWriter;
pub use options::{
    bypass_blocking_option, bypass_ignored_options, WriteBufferKind, WriterOptions,
    BYPASS_BLOCKING_OPTIONS, BYPASS_IGNORED_OPTIONS, GENERIC_WRITER_OPTIONS,
};
pub use s3::S3Writer;
