//! Bucket-to-bucket object copy.

use super::keys::{KeyDestination, KeySource, SourceBucket, SourceObject};
use super::{basename, join_path, specific_writer_options};
use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_retry::{with_retry, RetryConfig};
use ef_s3::aws_sdk_s3::types::{
    AccessControlPolicy, Grant, Grantee, MetadataDirective, Owner, Permission, Type,
};
use ef_s3::aws_sdk_s3::Client;
use ef_s3::{is_simple_etag, normalize_etag, sdk_error_message, verify_etag};
use ef_types::ExportConfig;
use ef_writers::S3Writer;
use std::fmt::Write;
use tracing::{info, warn};

/// ACL of a source object before a temporary grant.
struct SavedAcl {
    owner: Option<Owner>,
    grants: Option<Vec<Grant>>,
}

/// Copies objects into the bucket of an S3 writer.
///
/// Objects are copied server-side with their metadata. If the destination
/// credentials cannot read the source, a temporary READ grant is added to
/// the source object and removed afterwards; if the copy still fails the
/// object is downloaded and uploaded.
pub struct S3Destination {
    writer: S3Writer,
    dir: String,
}

impl S3Destination {
    pub fn new(writer: S3Writer) -> Result<Self> {
        let dir = writer.filebase().render(&[])?.as_dir();
        Ok(Self { writer, dir })
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        Self::new(S3Writer::from_options(&specific_writer_options(config)?)?)
    }

    /// Destination key for a source key.
    pub fn destination_key(&self, source_key: &str) -> String {
        join_path(&self.dir, basename(source_key))
    }

    async fn copy_object(
        &self,
        client: &Client,
        source: &SourceBucket,
        key: &str,
        dest_key: &str,
    ) -> Result<String> {
        let copy_source = encode_copy_source(source.bucket(), key);
        let copy_source = copy_source.as_str();
        let bucket = self.writer.bucket();
        let output = with_retry(&RetryConfig::short(), "s3_copy_object", || {
            let req = client
                .copy_object()
                .copy_source(copy_source)
                .bucket(bucket)
                .key(dest_key)
                .metadata_directive(MetadataDirective::Copy);
            async move {
                req.send().await.map_err(|e| {
                    ExportError::writer(format!(
                        "S3 copy failed for {copy_source} to s3://{bucket}/{dest_key}: {}",
                        sdk_error_message(e)
                    ))
                })
            }
        })
        .await?;
        Ok(output
            .copy_object_result
            .and_then(|r| r.e_tag)
            .as_deref()
            .map(normalize_etag)
            .unwrap_or_default())
    }

    /// Grants the destination bucket owner READ on the source object.
    ///
    /// Returns the previous ACL, or `None` if no grant could be made.
    async fn grant_read(&self, source: &SourceBucket, key: &str) -> Result<Option<SavedAcl>> {
        let dest_client = self.writer.client().get().await?;
        let source_client = source.client().get().await?;

        let bucket_acl = dest_client
            .get_bucket_acl()
            .bucket(self.writer.bucket())
            .send()
            .await
            .map_err(|e| ExportError::writer(sdk_error_message(e)))?;
        let Some(user_id) = bucket_acl.owner().and_then(|o| o.id()).map(str::to_string) else {
            return Ok(None);
        };

        let acl = source_client
            .get_object_acl()
            .bucket(source.bucket())
            .key(key)
            .send()
            .await
            .map_err(|e| ExportError::writer(sdk_error_message(e)))?;
        let saved = SavedAcl {
            owner: acl.owner,
            grants: acl.grants,
        };

        let grantee = Grantee::builder()
            .id(user_id)
            .r#type(Type::CanonicalUser)
            .build()
            .map_err(|e| ExportError::writer(format!("cannot build grantee: {e}")))?;
        let mut grants = saved.grants.clone().unwrap_or_default();
        grants.push(
            Grant::builder()
                .grantee(grantee)
                .permission(Permission::Read)
                .build(),
        );
        put_acl(source_client, source.bucket(), key, saved.owner.clone(), grants).await?;
        info!(bucket = source.bucket(), key, "Granted temporary read access");
        Ok(Some(saved))
    }

    async fn restore_acl(&self, source: &SourceBucket, key: &str, saved: SavedAcl) {
        let result = async {
            let client = source.client().get().await?;
            put_acl(
                client,
                source.bucket(),
                key,
                saved.owner,
                saved.grants.unwrap_or_default(),
            )
            .await
        }
        .await;
        if let Err(e) = result {
            warn!(bucket = source.bucket(), key, error = %e, "Failed to restore object ACL");
        }
    }

    /// Server-side copy, retried once with a temporary grant.
    async fn server_side_copy(
        &self,
        source: &SourceBucket,
        key: &str,
        dest_key: &str,
    ) -> Result<String> {
        let client = self.writer.client().get().await?;
        let first = match self.copy_object(client, source, key, dest_key).await {
            Ok(etag) => return Ok(etag),
            Err(e) => e,
        };
        if source.client().config() == self.writer.client().config() {
            return Err(first);
        }

        warn!(key, error = %first, "Direct copy failed, retrying with a temporary grant");
        let Some(saved) = self.grant_read(source, key).await? else {
            return Err(first);
        };
        let result = self.copy_object(client, source, key, dest_key).await;
        self.restore_acl(source, key, saved).await;
        result
    }
}

async fn put_acl(
    client: &Client,
    bucket: &str,
    key: &str,
    owner: Option<Owner>,
    grants: Vec<Grant>,
) -> Result<()> {
    let policy = AccessControlPolicy::builder()
        .set_owner(owner)
        .set_grants(Some(grants))
        .build();
    client
        .put_object_acl()
        .bucket(bucket)
        .key(key)
        .access_control_policy(policy)
        .send()
        .await
        .map_err(|e| {
            ExportError::writer(format!(
                "S3 put object ACL failed for s3://{bucket}/{key}: {}",
                sdk_error_message(e)
            ))
        })?;
    Ok(())
}

/// `bucket/key` with the key percent-encoded, as `x-amz-copy-source` expects.
fn encode_copy_source(bucket: &str, key: &str) -> String {
    let mut out = format!("{bucket}/");
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
    out
}

#[async_trait]
impl KeyDestination for S3Destination {
    async fn transfer(&mut self, source: &SourceBucket, object: &SourceObject) -> Result<()> {
        let dest_key = self.destination_key(&object.key);

        let etag = match self.server_side_copy(source, &object.key, &dest_key).await {
            Ok(etag) => etag,
            Err(e) => {
                warn!(key = %object.key, error = %e, "Server-side copy failed, downloading instead");
                let file = source.download(object).await?;
                self.writer
                    .upload_file(&dest_key, file.path(), object.items)
                    .await?
            }
        };

        if is_simple_etag(&object.e_tag) && is_simple_etag(&etag) {
            verify_etag(&dest_key, &object.e_tag, &etag)?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(pointer) = self.writer.save_pointer() {
            self.writer.write_pointer(pointer, &self.dir).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "s3"
    }
}
