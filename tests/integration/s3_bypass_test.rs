//! S3 to S3 key bypass against LocalStack.

use crate::common::{unique_bucket, LocalStackTestContext};
use ef_exporter::{job_from_uri, try_bypass, BypassKind, Exporter, Registry};
use ef_types::{ExportConfig, ModuleConfig};

async fn context() -> Option<LocalStackTestContext> {
    let ctx = LocalStackTestContext::new().await;
    if !ctx.is_available().await {
        eprintln!("LocalStack not available, skipping test");
        return None;
    }
    Some(ctx)
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_s3_to_s3_copies_keys_and_saves_pointer() {
    let Some(ctx) = context().await else { return };
    let source = unique_bucket("ef-source");
    let destination = unique_bucket("ef-destination");
    ctx.create_bucket(&source).await.unwrap();
    ctx.create_bucket(&destination).await.unwrap();

    ctx.put_object(&source, "prefix/a", b"{\"id\":1}\n").await.unwrap();
    ctx.put_object(&source, "prefix/b", b"{\"id\":2}\n{\"id\":3}\n").await.unwrap();

    let mut config = ExportConfig::new(
        ctx.module("readers.s3", &source).with_option("prefix", "prefix/"),
        ctx.module("writers.s3", &destination)
            .with_option("filebase", "out/%Y-%m-%d")
            .with_option("save_pointer", "pointer/LAST"),
    );
    config.persistence = Some(ModuleConfig::new("memory"));
    assert_eq!(
        try_bypass(&config, &Registry::with_builtins()),
        Some(BypassKind::S3ToS3)
    );

    let mut exporter = Exporter::new(config, Registry::with_builtins()).unwrap();
    exporter.export().await.unwrap();

    let today = format!("out/{}", chrono::Utc::now().format("%Y-%m-%d"));
    for name in ["a", "b"] {
        let (original, source_etag) = ctx
            .get_object(&source, &format!("prefix/{name}"))
            .await
            .unwrap();
        let (copied, copied_etag) = ctx
            .get_object(&destination, &format!("{today}/{name}"))
            .await
            .unwrap();
        assert_eq!(copied, original, "{name}");
        assert_eq!(copied_etag, source_etag, "{name}");
    }

    let (pointer, _) = ctx.get_object(&destination, "pointer/LAST").await.unwrap();
    assert_eq!(String::from_utf8(pointer).unwrap(), today);

    let metadata = exporter.metadata();
    assert!(metadata.bypassed_pipeline());
    assert_eq!(metadata.get_u64("writer", "written_files"), 2);

    let job_id = metadata
        .get_metadata("persistence", "job_id")
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap();
    assert!(job_from_uri(&format!("memory:{job_id}")).is_err());
}
