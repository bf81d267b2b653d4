//! LocalStack test context and utilities.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use ef_types::ModuleConfig;

const ACCESS_KEY: &str = "test";
const SECRET_KEY: &str = "test";

/// LocalStack test context providing an S3 client.
pub struct LocalStackTestContext {
    pub s3: S3Client,
    pub endpoint: String,
    pub region: String,
}

impl LocalStackTestContext {
    /// Create a new LocalStack test context.
    ///
    /// Uses the `LOCALSTACK_ENDPOINT` environment variable if set,
    /// otherwise defaults to `http://localhost:4566`.
    pub async fn new() -> Self {
        let endpoint = std::env::var("LOCALSTACK_ENDPOINT")
            .unwrap_or_else(|_| "http://localhost:4566".to_string());
        let region = "us-east-1".to_string();

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.clone()))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                ACCESS_KEY, SECRET_KEY, None, None, "localstack",
            ))
            .endpoint_url(&endpoint)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(true)
            .build();

        Self {
            s3: S3Client::from_conf(s3_config),
            endpoint,
            region,
        }
    }

    /// Check if LocalStack is available.
    pub async fn is_available(&self) -> bool {
        self.s3.list_buckets().send().await.is_ok()
    }

    /// Create an S3 bucket unless it already exists.
    pub async fn create_bucket(&self, name: &str) -> Result<(), aws_sdk_s3::Error> {
        let buckets = self.s3.list_buckets().send().await?;
        let exists = buckets
            .buckets()
            .iter()
            .any(|b| b.name().unwrap_or_default() == name);

        if !exists {
            self.s3.create_bucket().bucket(name).send().await?;
        }
        Ok(())
    }

    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
    ) -> Result<(), aws_sdk_s3::Error> {
        self.s3
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await?;
        Ok(())
    }

    /// Returns the object body and its ETag without quotes.
    pub async fn get_object(&self, bucket: &str, key: &str) -> Option<(Vec<u8>, String)> {
        let output = self.s3.get_object().bucket(bucket).key(key).send().await.ok()?;
        let etag = output.e_tag().unwrap_or_default().trim_matches('"').to_string();
        let body = output.body.collect().await.ok()?.into_bytes().to_vec();
        Some((body, etag))
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), aws_sdk_s3::Error> {
        self.s3
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    /// List object keys in a bucket with an optional prefix.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, aws_sdk_s3::Error> {
        let mut request = self.s3.list_objects_v2().bucket(bucket);
        if let Some(p) = prefix {
            request = request.prefix(p);
        }

        let result = request.send().await?;
        Ok(result
            .contents()
            .iter()
            .filter_map(|o| o.key().map(str::to_string))
            .collect())
    }

    /// Reader or writer module config pointing at LocalStack.
    pub fn module(&self, name: &str, bucket: &str) -> ModuleConfig {
        s3_module(name, bucket, &self.endpoint, &self.region)
    }
}

/// An `s3` module config with LocalStack credentials.
pub fn s3_module(name: &str, bucket: &str, endpoint: &str, region: &str) -> ModuleConfig {
    ModuleConfig::new(name)
        .with_option("bucket", bucket)
        .with_option("endpoint_url", endpoint)
        .with_option("aws_region", region)
        .with_option("aws_access_key_id", ACCESS_KEY)
        .with_option("aws_secret_access_key", SECRET_KEY)
}

/// A bucket name no other test run uses.
pub fn unique_bucket(prefix: &str) -> String {
    format!("{prefix}-{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}
