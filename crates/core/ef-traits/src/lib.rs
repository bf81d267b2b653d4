//! Stage contracts for exportflow.
//!
//! This crate defines the interfaces every pipeline stage implements:
//! - [`Reader`] - Resumable batch source, optionally exposing raw byte streams
//! - [`Filter`] / [`FilterStage`] - Record predicates with progress counters
//! - [`Transform`] - Record-level rewrite, may expand 1:N
//! - [`Grouper`] - Sets each record's group membership
//! - [`Formatter`] - Serializes records and frames files
//! - [`Writer`] - Delivers packed files (and optionally raw streams)
//! - [`Persistence`] - Job records and checkpointed positions
//! - [`Notifier`] - Job lifecycle notifications

pub mod filter;
pub mod formatter;
pub mod grouper;
pub mod notifier;
pub mod persistence;
pub mod reader;
pub mod transform;
pub mod writer;

pub use filter::*;
pub use formatter::*;
pub use grouper::*;
pub use notifier::*;
pub use persistence::*;
pub use reader::*;
pub use transform::*;
pub use writer::*;

use ef_error::Result;
use ef_types::Record;

/// A lazy sequence of records flowing between synchronous stages.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Result<Record>> + Send + 'a>;

/// Wraps an owned batch as a [`RecordStream`].
pub fn stream_of(records: Vec<Record>) -> RecordStream<'static> {
    Box::new(records.into_iter().map(Ok))
}
