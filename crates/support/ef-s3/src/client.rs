//! S3 client configuration and creation.

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use ef_error::{ExportError, Result};
use ef_types::{OptionKind, OptionSpec};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

/// Connection options shared by every S3 plugin.
pub const S3_CONNECTION_OPTIONS: [OptionSpec; 4] = [
    OptionSpec::optional("aws_access_key_id", OptionKind::String).with_env("AWS_ACCESS_KEY_ID"),
    OptionSpec::optional("aws_secret_access_key", OptionKind::String)
        .with_env("AWS_SECRET_ACCESS_KEY"),
    OptionSpec::optional("aws_region", OptionKind::String).with_env("AWS_REGION"),
    OptionSpec::optional("endpoint_url", OptionKind::String).with_env("AWS_ENDPOINT_URL"),
];

/// Configuration for S3 access.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    /// AWS region
    #[serde(default, rename = "aws_region")]
    pub region: Option<String>,

    /// Custom endpoint URL (for LocalStack)
    #[serde(default, rename = "endpoint_url")]
    pub endpoint: Option<String>,

    /// Explicit AWS access key (optional)
    #[serde(default, rename = "aws_access_key_id")]
    pub access_key: Option<String>,

    /// Explicit AWS secret key (optional)
    #[serde(default, rename = "aws_secret_access_key")]
    pub secret_key: Option<String>,
}

impl S3Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom endpoint (for LocalStack).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the AWS region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set explicit credentials.
    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }
}

/// Create an S3 client from configuration.
pub async fn create_s3_client(config: &S3Config) -> Result<Client> {
    use aws_config::Region;

    let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        aws_config_loader = aws_config_loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint) = &config.endpoint {
        aws_config_loader = aws_config_loader.endpoint_url(endpoint);
    }

    match (&config.access_key, &config.secret_key) {
        (Some(access_key), Some(secret_key)) => {
            let credentials = aws_sdk_s3::config::Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "exportflow",
            );
            aws_config_loader = aws_config_loader.credentials_provider(credentials);
        }
        (None, None) => {}
        _ => {
            return Err(ExportError::config(
                "aws_access_key_id and aws_secret_access_key must be given together",
            ))
        }
    }

    let aws_config = aws_config_loader.load().await;

    // Path-style access for custom endpoints (LocalStack)
    let s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);
    let s3_config = if config.endpoint.is_some() {
        s3_config_builder.force_path_style(true).build()
    } else {
        s3_config_builder.build()
    };

    debug!(endpoint = ?config.endpoint, region = ?config.region, "Created S3 client");
    Ok(Client::from_conf(s3_config))
}

/// An S3 client created on first use.
///
/// Plugins are constructed synchronously by the registry; the client is
/// only built when the first request is made.
#[derive(Debug)]
pub struct LazyS3Client {
    config: S3Config,
    cell: OnceCell<Client>,
}

impl LazyS3Client {
    pub fn new(config: S3Config) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// Wraps an already built client.
    pub fn from_client(client: Client) -> Self {
        Self {
            config: S3Config::default(),
            cell: OnceCell::new_with(Some(client)),
        }
    }

    pub async fn get(&self) -> Result<&Client> {
        self.cell
            .get_or_try_init(|| create_s3_client(&self.config))
            .await
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_config_builder() {
        let config = S3Config::new()
            .with_endpoint("http://localhost:4566")
            .with_region("us-east-1")
            .with_credentials("access", "secret");

        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:4566"));
        assert_eq!(config.region.as_deref(), Some("us-east-1"));
        assert_eq!(config.access_key.as_deref(), Some("access"));
        assert_eq!(config.secret_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_s3_config_from_options() {
        let config: S3Config = serde_json::from_value(serde_json::json!({
            "aws_region": "eu-west-1",
            "endpoint_url": null,
            "bucket": "ignored"
        }))
        .unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert!(config.endpoint.is_none());
    }

    #[tokio::test]
    async fn test_partial_credentials_rejected() {
        let config = S3Config {
            access_key: Some("a".to_string()),
            ..Default::default()
        };
        assert!(create_s3_client(&config).await.is_err());
    }
}
