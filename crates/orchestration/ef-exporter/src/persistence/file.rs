//! JSON file per job.

use super::JobBackend;
use ef_error::{ExportError, Result};
use ef_types::{OptionKind, OptionSpec, PersistedJob};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct FileOptions {
    file_path: String,
}

/// Stores each job as `<dir>/<job_id>`, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub const OPTIONS: &'static [OptionSpec] =
        &[OptionSpec::required("file_path", OptionKind::String).with_default("\".\"")];

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: FileOptions =
            ef_types::parse_options("persistence.file", Self::OPTIONS, options)?;
        Ok(Self::new(opts.file_path))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, job_id: &str) -> PathBuf {
        self.dir.join(job_id)
    }
}

impl JobBackend for FileBackend {
    fn read(&self, job_id: &str) -> Result<Option<PersistedJob>> {
        let path = self.path(job_id);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                ExportError::persistence(format!("corrupt job file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ExportError::persistence(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    fn write(&mut self, job: &PersistedJob) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            ExportError::persistence(format!("cannot create {}: {e}", self.dir.display()))
        })?;
        let path = self.path(&job.job_id);
        let tmp = path.with_extension("tmp");
        let write = std::fs::write(&tmp, serde_json::to_vec_pretty(job)?)
            .and_then(|()| std::fs::rename(&tmp, &path));
        write.map_err(|e| {
            ExportError::persistence(format!("cannot write {}: {e}", path.display()))
        })
    }

    fn remove(&mut self, job_id: &str) -> Result<()> {
        let path = self.path(job_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExportError::persistence(format!(
                "cannot remove {}: {e}",
                path.display()
            ))),
        }
    }

    fn uri(&self, job_id: &str) -> Option<String> {
        Some(format!("file:{}", self.path(job_id).display()))
    }

    fn name(&self) -> &str {
        "file"
    }
}
