//! MD5 and ETag helpers for verifying copies.

use base64::Engine;
use ef_error::{ExportError, Result};
use md5::{Digest, Md5};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Hex MD5 of a local file.
pub async fn md5_hex_of_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex MD5 of a byte slice.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Converts a hex MD5 into the base64 form of the `Content-MD5` header.
pub fn content_md5(md5_hex: &str) -> Result<String> {
    let raw = hex::decode(md5_hex)
        .map_err(|e| ExportError::writer(format!("invalid md5 '{md5_hex}': {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(raw))
}

/// True if the ETag is a plain MD5 (not a multipart upload ETag).
pub fn is_simple_etag(etag: &str) -> bool {
    etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit())
}

/// Fails with `InvalidKeyIntegrityCheck` unless both ETags agree.
pub fn verify_etag(key: &str, expected: &str, actual: &str) -> Result<()> {
    let expected = expected.trim_matches('"');
    let actual = actual.trim_matches('"');
    if expected.eq_ignore_ascii_case(actual) {
        Ok(())
    } else {
        Err(ExportError::InvalidKeyIntegrityCheck {
            key: key.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
