//! Records of delivered files, used by consistency checks.

use ef_error::{ExportError, Result};
use ef_types::{HashAlgorithm, WriteInfo};

/// A file accepted by a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredFile {
    pub destination: String,
    pub size: u64,
    pub hash: Option<String>,
    pub number_of_records: u64,
}

impl DeliveredFile {
    pub fn new(destination: impl Into<String>, info: &WriteInfo) -> Self {
        Self {
            destination: destination.into(),
            size: info.size_bytes,
            hash: info.file_hash.clone(),
            number_of_records: info.number_of_records,
        }
    }

    /// Fails with `InconsistentWriteState` if `actual_size` differs.
    pub fn check_size(&self, actual_size: u64) -> Result<()> {
        if actual_size != self.size {
            return Err(ExportError::InconsistentWriteState(format!(
                "{} has {actual_size} bytes, expected {}",
                self.destination, self.size
            )));
        }
        Ok(())
    }

    /// Fails with `InconsistentWriteState` if `actual_hash` differs from the
    /// recorded hash. Files delivered without a hash always pass.
    pub fn check_hash(&self, actual_hash: &str) -> Result<()> {
        match &self.hash {
            Some(expected) if !expected.eq_ignore_ascii_case(actual_hash) => {
                Err(ExportError::InconsistentWriteState(format!(
                    "{} has hash {actual_hash}, expected {expected}",
                    self.destination
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn missing(&self) -> ExportError {
        ExportError::InconsistentWriteState(format!("{} is missing", self.destination))
    }

    /// Algorithm that produced the recorded hash, judged by digest length.
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        match self.hash.as_ref().map(String::len) {
            Some(32) => Some(HashAlgorithm::Md5),
            Some(64) => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ef_types::Compression;
    use std::path::PathBuf;

    fn delivered(hash: Option<&str>) -> DeliveredFile {
        let info = WriteInfo {
            number_of_records: 2,
            file_path: PathBuf::from("/tmp/x.jl.gz"),
            size_bytes: 10,
            file_hash: hash.map(str::to_string),
            compression: Compression::Gz,
            file_extension: "jl".to_string(),
        };
        DeliveredFile::new("out/x.jl.gz", &info)
    }

    #[test]
    fn test_checks() {
        let file = delivered(Some("d41d8cd98f00b204e9800998ecf8427e"));
        assert!(file.check_size(10).is_ok());
        let err = file.check_size(9).unwrap_err();
        assert!(err.to_string().contains("out/x.jl.gz"));
        assert!(file.check_hash("D41D8CD98F00B204E9800998ECF8427E").is_ok());
        assert!(file.check_hash("00").is_err());
        assert_eq!(file.hash_algorithm(), Some(HashAlgorithm::Md5));
        assert!(matches!(file.missing(), ExportError::InconsistentWriteState(_)));
    }

    #[test]
    fn test_no_hash_passes() {
        let file = delivered(None);
        assert!(file.check_hash("anything").is_ok());
        assert_eq!(file.hash_algorithm(), None);
    }
}
