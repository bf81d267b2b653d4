//! Common utilities for integration tests.
//!
//! Shared LocalStack client setup and S3 job configuration helpers.

pub mod localstack;

pub use localstack::{s3_module, unique_bucket, LocalStackTestContext};
