//! Consistency checks of the S3 writer against LocalStack.

use crate::common::{s3_module, unique_bucket, LocalStackTestContext};
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use ef_error::{ExportError, Result};
use ef_exporter::{job_from_uri, Capabilities, Exporter, Registry};
use ef_traits::Writer;
use ef_types::{ExportConfig, ModuleConfig, WriteInfo};
use ef_writers::S3Writer;

/// An S3 writer whose first delivered object is deleted by a third party
/// right before the consistency check runs.
struct VanishingS3Writer {
    inner: S3Writer,
    s3: S3Client,
}

#[async_trait]
impl Writer for VanishingS3Writer {
    async fn write(&mut self, info: &WriteInfo, group_keys: &[String]) -> Result<()> {
        self.inner.write(info, group_keys).await
    }

    async fn check_write_consistency(&mut self) -> Result<()> {
        if let Some(first) = self.inner.delivered().first() {
            self.s3
                .delete_object()
                .bucket(self.inner.bucket())
                .key(&first.destination)
                .send()
                .await
                .map_err(|e| ExportError::writer(format!("delete failed: {e}")))?;
        }
        self.inner.check_write_consistency().await
    }

    async fn finish(&mut self) -> Result<()> {
        self.inner.finish().await
    }

    fn name(&self) -> &str {
        "vanishing_s3"
    }
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_missing_object_fails_consistency_check() {
    let ctx = LocalStackTestContext::new().await;
    if !ctx.is_available().await {
        eprintln!("LocalStack not available, skipping test");
        return;
    }
    let bucket = unique_bucket("ef-consistency");
    ctx.create_bucket(&bucket).await.unwrap();

    let mut registry = Registry::with_builtins();
    let s3 = ctx.s3.clone();
    registry.writers.register(
        "vanishing_s3",
        S3Writer::OPTIONS,
        Capabilities::NONE,
        move |options| {
            Ok(Box::new(VanishingS3Writer {
                inner: S3Writer::from_options(options)?,
                s3: s3.clone(),
            }))
        },
    );

    let writer = s3_module("vanishing_s3", &bucket, &ctx.endpoint, &ctx.region)
        .with_option("filebase", "exports/part-")
        .with_option("items_per_buffer_write", 10)
        .with_option("check_consistency", true);
    let mut config = ExportConfig::new(
        ModuleConfig::new("random").with_option("number_of_items", 30),
        writer,
    );
    config.persistence = Some(ModuleConfig::new("memory"));

    let mut exporter = Exporter::new(config, registry).unwrap();
    let err = exporter.export().await.unwrap_err();

    let ExportError::InconsistentWriteState(message) = &err else {
        panic!("expected InconsistentWriteState, got {err:?}");
    };
    assert!(message.contains("exports/"), "{message}");
    assert!(message.contains("missing"), "{message}");

    let remaining = ctx.list_objects(&bucket, Some("exports/")).await.unwrap();
    assert_eq!(remaining.len(), 2);

    let uri = exporter.resume_uri().unwrap();
    assert!(job_from_uri(&uri).is_ok());
}
