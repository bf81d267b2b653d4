//! Export orchestration for exportflow.
//!
//! [`Exporter`] runs one job: it builds every stage named by an
//! [`ExportConfig`](ef_types::ExportConfig) through the [`Registry`], either
//! skips the record pipeline with a [bypass](bypass) or drives batches from
//! the reader to the buffered writer, and checkpoints progress through the
//! configured [persistence](persistence) so a failed job can be resumed.
//!
//! Built-in plugins besides readers, writers and formatters:
//! - [`filters`] - `no_filter`, `key_value`
//! - [`transforms`] - `no_transform`, `project`
//! - [`groupers`] - `no_grouping`, `keys`
//! - [`persistence`] - `none`, `memory`, `file`, `sqlite`
//! - [`notifiers`] - `log`, `webhook`
//! - [`stats`] - `basic`, `none`

pub mod bypass;
mod exporter;
pub mod filters;
pub mod groupers;
pub mod notifiers;
pub mod persistence;
pub mod registry;
pub mod stats;
pub mod transforms;

pub use bypass::{try_bypass, BypassKind};
pub use exporter::{Exporter, READER_MODULE};
pub use persistence::{configuration_from_uri, job_from_uri};
pub use registry::{Capabilities, Plugins, Registry};
pub use stats::StatsManager;
