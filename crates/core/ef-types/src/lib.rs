//! Core types for exportflow.
//!
//! This crate provides the foundational types used throughout the system:
//! - [`Record`] - The unit of data moving through the pipeline
//! - [`ExportConfig`] - The immutable run configuration and plugin references
//! - [`OptionSpec`] - Declared plugin options and their resolution
//! - [`WriteInfo`] - Descriptor of a packed buffer file
//! - [`Metadata`] - Per-module key/value bag used for end-of-job reporting
//! - [`PersistedJob`] and bypass state shapes stored by the persistence layer

pub mod config;
pub mod metadata;
pub mod options;
pub mod record;
pub mod state;
pub mod write_info;

pub use config::*;
pub use metadata::*;
pub use options::*;
pub use record::*;
pub use state::*;
pub use write_info::*;
