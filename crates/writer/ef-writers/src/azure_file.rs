//! Azure file share writer, over the File service REST API.

use crate::filebase::Filebase;
use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_retry::{with_retry, RetryConfig};
use ef_traits::Writer;
use ef_types::{OptionKind, OptionSpec, WriteInfo};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::debug;
use uuid::Uuid;

const API_VERSION: &str = "2022-11-02";

/// Largest range accepted by a single Put Range call.
pub const MAX_RANGE_BYTES: usize = 4 * 1024 * 1024;

const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct AzureFileOptions {
    account: String,
    share: String,
    sas_token: String,
    filebase: String,
    endpoint: Option<String>,
}

/// Uploads packed files into a file share as `<filebase><uuid>.<ext>`,
/// creating missing directories.
pub struct AzureFileWriter {
    client: Client,
    base_url: String,
    sas_token: String,
    filebase: Filebase,
}

impl AzureFileWriter {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("account", OptionKind::String).with_env("AZURE_STORAGE_ACCOUNT"),
        OptionSpec::required("share", OptionKind::String),
        OptionSpec::required("sas_token", OptionKind::String).with_env("AZURE_STORAGE_SAS_TOKEN"),
        OptionSpec::required("filebase", OptionKind::String),
        OptionSpec::optional("endpoint", OptionKind::String),
    ];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: AzureFileOptions =
            ef_types::parse_options("writers.azure_file", Self::OPTIONS, options)?;
        let endpoint = opts
            .endpoint
            .unwrap_or_else(|| format!("https://{}.file.core.windows.net", opts.account));
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExportError::config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: format!("{}/{}", endpoint.trim_end_matches('/'), opts.share),
            sas_token: opts.sas_token.trim_start_matches('?').to_string(),
            filebase: Filebase::new(opts.filebase)?,
        })
    }

    pub fn filebase(&self) -> &Filebase {
        &self.filebase
    }

    fn url(&self, path: &str, query: &str) -> String {
        let mut url = format!("{}/{}?", self.base_url, path.trim_start_matches('/'));
        if !query.is_empty() {
            url.push_str(query);
            url.push('&');
        }
        url.push_str(&self.sas_token);
        url
    }

    /// Creates every directory of `dir` ("a/b/c" creates a, a/b, a/b/c).
    pub async fn ensure_directories(&self, dir: &str) -> Result<()> {
        let mut current = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);

            let url = self.url(&current, "restype=directory");
            let status = with_retry(&RetryConfig::short(), "azure_file_create_dir", || {
                let req = self
                    .client
                    .put(&url)
                    .header("x-ms-version", API_VERSION)
                    .header("Content-Length", "0");
                async move { req.send().await.map(|r| r.status()).map_err(http_error) }
            })
            .await?;
            if !status.is_success() && status != StatusCode::CONFLICT {
                return Err(ExportError::writer(format!(
                    "cannot create directory {current}: HTTP {status}"
                )));
            }
        }
        Ok(())
    }

    /// Uploads a local file to `dest`; its directory must already exist.
    pub async fn upload_file(&self, dest: &str, path: &Path) -> Result<()> {
        with_retry(&RetryConfig::long(), "azure_file_upload", move || {
            self.upload_once(dest, path)
        })
        .await?;
        debug!(dest, "Uploaded file to share");
        Ok(())
    }

    async fn upload_once(&self, dest: &str, path: &Path) -> Result<()> {
        let size = tokio::fs::metadata(path).await?.len();
        let response = self
            .client
            .put(self.url(dest, ""))
            .header("x-ms-version", API_VERSION)
            .header("x-ms-type", "file")
            .header("x-ms-content-length", size.to_string())
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(http_error)?;
        check_status(response.status(), "create file", dest)?;

        let mut file = tokio::fs::File::open(path).await?;
        let mut offset = 0u64;
        let mut chunk = vec![0u8; MAX_RANGE_BYTES];
        loop {
            let n = read_full(&mut file, &mut chunk).await?;
            if n == 0 {
                break;
            }
            let end = offset + n as u64 - 1;
            let response = self
                .client
                .put(self.url(dest, "comp=range"))
                .header("x-ms-version", API_VERSION)
                .header("x-ms-write", "update")
                .header("x-ms-range", format!("bytes={offset}-{end}"))
                .body(chunk[..n].to_vec())
                .send()
                .await
                .map_err(http_error)?;
            check_status(response.status(), "put range", dest)?;
            offset += n as u64;
        }
        Ok(())
    }
}

async fn read_full(file: &mut tokio::fs::File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn http_error(err: reqwest::Error) -> ExportError {
    ExportError::writer(format!("Azure file request failed: {err}"))
}

fn check_status(status: StatusCode, operation: &str, dest: &str) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ExportError::writer(format!("{operation} failed for {dest}: HTTP {status}")))
    }
}

#[async_trait]
impl Writer for AzureFileWriter {
    async fn write(&mut self, info: &WriteInfo, group_keys: &[String]) -> Result<()> {
        let rendered = self.filebase.render(group_keys)?;
        self.ensure_directories(&rendered.dir).await?;
        let dest = rendered.file(&format!("{}.{}", Uuid::new_v4().simple(), info.full_extension()));
        self.upload_file(&dest, &info.file_path).await
    }

    fn name(&self) -> &str {
        "azure_file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn writer() -> AzureFileWriter {
        let options = json!({
            "account": "acct",
            "share": "exports",
            "sas_token": "?sv=2022&sig=abc",
            "filebase": "daily/%Y/part_"
        })
        .as_object()
        .cloned()
        .unwrap();
        AzureFileWriter::from_options(&options).unwrap()
    }

    #[test]
    fn test_urls() {
        let writer = writer();
        assert_eq!(
            writer.url("daily/2024", "restype=directory"),
            "https://acct.file.core.windows.net/exports/daily/2024?restype=directory&sv=2022&sig=abc"
        );
        assert_eq!(
            writer.url("/a.jl.gz", ""),
            "https://acct.file.core.windows.net/exports/a.jl.gz?sv=2022&sig=abc"
        );
    }

    #[test]
    fn test_endpoint_override() {
        let options = json!({
            "account": "acct",
            "share": "s",
            "sas_token": "sig=1",
            "filebase": "x",
            "endpoint": "http://127.0.0.1:10004/acct/"
        })
        .as_object()
        .cloned()
        .unwrap();
        let writer = AzureFileWriter::from_options(&options).unwrap();
        assert_eq!(writer.url("f", ""), "http://127.0.0.1:10004/acct/s/f?sig=1");
    }

    #[tokio::test]
    async fn test_read_full_fills_chunks() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, vec![7u8; 10]).unwrap();
        let mut file = tokio::fs::File::open(&path).await.unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 4);
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 4);
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 2);
        assert_eq!(read_full(&mut file, &mut buf).await.unwrap(), 0);
    }
}
