//! Trackers mapping groups to their active buffer files.

use crate::file::BufferFile;
use ef_error::{ExportError, Result};
use ef_traits::Formatter;
use ef_types::Compression;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::debug;

/// A closed group file and the number of records in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndedFile {
    pub path: PathBuf,
    pub records: u64,
}

/// Owns the temp directory and the active buffer file of every group.
pub trait FilesTracker: Send {
    /// Adds one formatted record to the group's current file.
    fn add_item(&mut self, key: &[String], payload: &[u8]) -> Result<()>;

    /// Content bytes in the group's current file.
    fn current_size(&self, key: &[String]) -> u64;

    /// Returns false if the tracker only flushes at end of job.
    fn supports_threshold_flush(&self) -> bool {
        true
    }

    /// Closes the group's current file. `None` if the group has no file.
    fn end_group_file(&mut self, key: &[String]) -> Result<Option<EndedFile>>;

    /// Opens a fresh file for the group.
    fn create_new_group_file(&mut self, key: &[String]) -> Result<()>;

    /// Directory holding every temp file of the tracker.
    fn tmp_dir(&self) -> &Path;

    /// Removes the temp directory and everything in it.
    fn close(&mut self) -> Result<()>;
}

struct TrackerDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl TrackerDir {
    fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("exportflow-").tempdir()?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "Created buffer directory");
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    fn close(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            dir.close()?;
        }
        Ok(())
    }
}

/// Appends every record to its group's file as it arrives.
pub struct GroupingBufferFilesTracker {
    dir: TrackerDir,
    formatter: Arc<dyn Formatter>,
    compression: Compression,
    files: HashMap<Vec<String>, BufferFile>,
}

impl GroupingBufferFilesTracker {
    pub fn new(formatter: Arc<dyn Formatter>, compression: Compression) -> Result<Self> {
        Ok(Self {
            dir: TrackerDir::new()?,
            formatter,
            compression,
            files: HashMap::new(),
        })
    }
}

impl FilesTracker for GroupingBufferFilesTracker {
    fn add_item(&mut self, key: &[String], payload: &[u8]) -> Result<()> {
        if !self.files.contains_key(key) {
            self.create_new_group_file(key)?;
        }
        match self.files.get_mut(key) {
            Some(file) => file.append(payload),
            None => Err(ExportError::writer("buffer file missing after creation")),
        }
    }

    fn current_size(&self, key: &[String]) -> u64 {
        self.files.get(key).map_or(0, BufferFile::bytes_written)
    }

    fn end_group_file(&mut self, key: &[String]) -> Result<Option<EndedFile>> {
        let Some(file) = self.files.remove(key) else {
            return Ok(None);
        };
        let records = file.records();
        let path = file.end_file()?;
        Ok(Some(EndedFile { path, records }))
    }

    fn create_new_group_file(&mut self, key: &[String]) -> Result<()> {
        let file = BufferFile::create(&self.dir.path, self.formatter.clone(), self.compression)?;
        self.files.insert(key.to_vec(), file);
        Ok(())
    }

    fn tmp_dir(&self) -> &Path {
        &self.dir.path
    }

    fn close(&mut self) -> Result<()> {
        self.files.clear();
        self.dir.close()
    }
}

#[derive(Default)]
struct Reservoir {
    items: Vec<Vec<u8>>,
    seen: u64,
}

/// Keeps a uniform random sample of `sample_size` records per group.
///
/// Records are only materialized when the group file is ended, in
/// reservoir order rather than arrival order.
pub struct ReservoirSamplingTracker {
    dir: TrackerDir,
    formatter: Arc<dyn Formatter>,
    compression: Compression,
    sample_size: usize,
    rng: StdRng,
    reservoirs: HashMap<Vec<String>, Reservoir>,
}

impl ReservoirSamplingTracker {
    pub fn new(
        formatter: Arc<dyn Formatter>,
        compression: Compression,
        sample_size: usize,
    ) -> Result<Self> {
        Self::with_rng(formatter, compression, sample_size, StdRng::from_os_rng())
    }

    /// Tracker with a seeded generator, for reproducible samples.
    pub fn seeded(
        formatter: Arc<dyn Formatter>,
        compression: Compression,
        sample_size: usize,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(formatter, compression, sample_size, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        formatter: Arc<dyn Formatter>,
        compression: Compression,
        sample_size: usize,
        rng: StdRng,
    ) -> Result<Self> {
        if sample_size == 0 {
            return Err(ExportError::config("write_buffer_options.sample_size must be > 0"));
        }
        Ok(Self {
            dir: TrackerDir::new()?,
            formatter,
            compression,
            sample_size,
            rng,
            reservoirs: HashMap::new(),
        })
    }
}

impl FilesTracker for ReservoirSamplingTracker {
    fn add_item(&mut self, key: &[String], payload: &[u8]) -> Result<()> {
        let reservoir = self.reservoirs.entry(key.to_vec()).or_default();
        if reservoir.items.len() < self.sample_size {
            reservoir.items.push(payload.to_vec());
        } else {
            let r = self.rng.random_range(0..=reservoir.seen);
            if r < self.sample_size as u64 {
                reservoir.items[r as usize] = payload.to_vec();
            }
        }
        reservoir.seen += 1;
        Ok(())
    }

    fn current_size(&self, key: &[String]) -> u64 {
        self.reservoirs
            .get(key)
            .map_or(0, |r| r.items.iter().map(|i| i.len() as u64).sum())
    }

    fn supports_threshold_flush(&self) -> bool {
        false
    }

    fn end_group_file(&mut self, key: &[String]) -> Result<Option<EndedFile>> {
        let Some(reservoir) = self.reservoirs.remove(key) else {
            return Ok(None);
        };
        let mut file =
            BufferFile::create(&self.dir.path, self.formatter.clone(), self.compression)?;
        for item in &reservoir.items {
            file.append(item)?;
        }
        let records = file.records();
        let path = file.end_file()?;
        Ok(Some(EndedFile { path, records }))
    }

    fn create_new_group_file(&mut self, key: &[String]) -> Result<()> {
        self.reservoirs.insert(key.to_vec(), Reservoir::default());
        Ok(())
    }

    fn tmp_dir(&self) -> &Path {
        &self.dir.path
    }

    fn close(&mut self) -> Result<()> {
        self.reservoirs.clear();
        self.dir.close()
    }
}
