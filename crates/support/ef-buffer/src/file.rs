//! Append-only temporary buffer files with streaming compression.

use bzip2::write::BzEncoder;
use ef_error::{ExportError, Result};
use ef_traits::Formatter;
use ef_types::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

enum Sink {
    Plain(BufWriter<File>),
    Gz(GzEncoder<BufWriter<File>>),
    Bz2(BzEncoder<BufWriter<File>>),
    /// Uncompressed sidecar, zipped into the final path on close
    Zip(BufWriter<File>),
}

impl Sink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(w) | Self::Zip(w) => w.write_all(bytes),
            Self::Gz(w) => w.write_all(bytes),
            Self::Bz2(w) => w.write_all(bytes),
        }
    }
}

/// A single buffer file tied to one group.
///
/// Created with the formatter header already written. Records are appended
/// with the formatter's item separator between them. [`end_file`](Self::end_file)
/// writes the footer and closes the file, which is then a deliverable artifact.
pub struct BufferFile {
    path: PathBuf,
    uncompressed_path: PathBuf,
    file_extension: String,
    compression: Compression,
    formatter: Arc<dyn Formatter>,
    sink: Sink,
    records: u64,
    bytes_written: u64,
}

impl BufferFile {
    /// Creates `{uuid}.{ext}[.{compression}]` in `dir` and writes the header.
    pub fn create(
        dir: &Path,
        formatter: Arc<dyn Formatter>,
        compression: Compression,
    ) -> Result<Self> {
        let file_extension = formatter.file_extension().to_string();
        let base = format!("{}.{file_extension}", uuid::Uuid::new_v4());
        let uncompressed_path = dir.join(&base);
        let path = match compression.extension() {
            Some(ext) => dir.join(format!("{base}.{ext}")),
            None => uncompressed_path.clone(),
        };

        let sink = match compression {
            Compression::None => Sink::Plain(BufWriter::new(File::create(&path)?)),
            Compression::Gz => Sink::Gz(GzEncoder::new(
                BufWriter::new(File::create(&path)?),
                flate2::Compression::default(),
            )),
            Compression::Bz2 => Sink::Bz2(BzEncoder::new(
                BufWriter::new(File::create(&path)?),
                bzip2::Compression::default(),
            )),
            Compression::Zip => Sink::Zip(BufWriter::new(File::create(&uncompressed_path)?)),
        };

        let mut file = Self {
            path,
            uncompressed_path,
            file_extension,
            compression,
            formatter,
            sink,
            records: 0,
            bytes_written: 0,
        };
        let header = file.formatter.format_header();
        file.write_raw(&header)?;
        Ok(file)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if !bytes.is_empty() {
            self.sink.write_all(bytes)?;
            self.bytes_written += bytes.len() as u64;
        }
        Ok(())
    }

    /// Appends one formatted record.
    pub fn append(&mut self, payload: &[u8]) -> Result<()> {
        if self.records > 0 {
            let separator = self.formatter.item_separator().to_vec();
            self.write_raw(&separator)?;
        }
        self.write_raw(payload)?;
        self.records += 1;
        Ok(())
    }

    /// Writes the footer and closes the file, returning the final path.
    pub fn end_file(mut self) -> Result<PathBuf> {
        let footer = self.formatter.format_footer();
        self.write_raw(&footer)?;

        match self.sink {
            Sink::Plain(mut w) => w.flush()?,
            Sink::Gz(w) => w.finish()?.flush()?,
            Sink::Bz2(w) => w.finish()?.flush()?,
            Sink::Zip(mut w) => {
                w.flush()?;
                drop(w);
                zip_sidecar(&self.uncompressed_path, &self.path)?;
                std::fs::remove_file(&self.uncompressed_path)?;
            }
        }
        Ok(self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    /// Content bytes written so far, before compression.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }
}

fn zip_sidecar(sidecar: &Path, target: &Path) -> Result<()> {
    let entry_name = sidecar
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExportError::writer(format!("bad sidecar path {}", sidecar.display())))?;

    let mut zip = ZipWriter::new(File::create(target)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);
    zip.start_file(entry_name, options)
        .map_err(|e| ExportError::writer(format!("zip {}: {e}", target.display())))?;
    let mut source = File::open(sidecar)?;
    io::copy(&mut source, &mut zip)?;
    zip.finish()
        .map_err(|e| ExportError::writer(format!("zip {}: {e}", target.display())))?;
    Ok(())
}
