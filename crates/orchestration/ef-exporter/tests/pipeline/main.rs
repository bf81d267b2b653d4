//! End-to-end tests of the export executor.
//!
//! These run the whole pipeline in-process with built-in plugins and the
//! in-memory plugins from `common`; no network access is needed.

mod bypass_test;
mod common;
mod export_test;
mod resume_test;
