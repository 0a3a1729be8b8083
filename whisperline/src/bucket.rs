//! Retention buckets: one output file per sampling interval.
//!
//! Every sub-archive with the same seconds-per-point value, across every
//! series in a run, lands in the same bucket file. Buckets are created
//! lazily on the first sample routed to their key and closed together when
//! the run completes.
//!
//! # Naming
//!
//! A new bucket takes the next name from the configured retention name
//! list. When the list is exhausted, the decimal key is used instead. Names
//! therefore depend on the order in which keys are first seen, which is why
//! series must be drained in a fixed order.
//!
//! # File Layout
//!
//! ```text
//! export_dir/
//! ├── 60-raw.txt        <- key 60, first retention name
//! ├── 3600-hourly.txt   <- key 3600, second retention name
//! └── 86400-86400.txt   <- names exhausted, key used as name
//! ```
//!
//! With compression enabled every file carries an additional `.gz` suffix.

use std::collections::{HashMap, VecDeque};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::config::BucketConfig;
use crate::error::{Result, WriteError};
use crate::line::bucket_header;

/// Output stream of a bucket, plain or gzipped.
enum BucketWriter {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl BucketWriter {
    fn new(file: File, compress: bool) -> Self {
        if compress {
            Self::Gzip(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Self::Plain(BufWriter::new(file))
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.write_all(bytes),
            Self::Gzip(w) => w.write_all(bytes),
        }
    }

    /// Flushes buffers and writes the gzip trailer.
    fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Gzip(w) => {
                let encoder = w.into_inner().map_err(io::IntoInnerError::into_error)?;
                encoder.finish()?.flush()
            }
        }
    }
}

impl std::fmt::Debug for BucketWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Plain(_) => "Plain",
            Self::Gzip(_) => "Gzip",
        })
    }
}

/// An open bucket file.
#[derive(Debug)]
pub struct RetentionBucket {
    key: u32,
    name: String,
    path: PathBuf,
    writer: BucketWriter,
    lines: u64,
}

impl RetentionBucket {
    /// Sampling interval this bucket collects.
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Name assigned at creation; written in the header and file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the bucket file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data lines written so far, excluding the header.
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Appends `line` followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Write`] if the stream rejects the bytes.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.write_raw(line.as_bytes())?;
        self.write_raw(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .map_err(|e| WriteError::Write {
                path: self.path.clone(),
                source: e,
            })?;
        Ok(())
    }

    fn close(self) -> Result<BucketSummary> {
        let Self {
            key,
            name,
            path,
            writer,
            lines,
        } = self;
        if let Err(e) = writer.finish() {
            return Err(WriteError::Finish { path, source: e }.into());
        }
        Ok(BucketSummary {
            key,
            name,
            path,
            lines,
        })
    }
}

/// What a closed bucket produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSummary {
    /// Sampling interval of the bucket.
    pub key: u32,
    /// Assigned bucket name.
    pub name: String,
    /// Path of the finished file.
    pub path: PathBuf,
    /// Data lines written, excluding the header.
    pub lines: u64,
}

/// Maps retention keys to lazily opened bucket files.
///
/// Owns the FIFO of retention names. One registry is shared by every series
/// in a run; it is not thread-safe and bucket creation order determines
/// bucket names.
#[derive(Debug)]
pub struct BucketRegistry {
    export_dir: PathBuf,
    database: String,
    compress: bool,
    names: VecDeque<String>,
    /// Key -> position in `buckets`.
    index: HashMap<u32, usize>,
    /// Buckets in creation order.
    buckets: Vec<RetentionBucket>,
}

impl BucketRegistry {
    /// Creates an empty registry. No files are touched until the first
    /// [`bucket_for`](Self::bucket_for) call.
    pub fn new(config: BucketConfig) -> Self {
        Self {
            export_dir: config.export_dir,
            database: config.database,
            compress: config.compress,
            names: config.retention_names.into(),
            index: HashMap::new(),
            buckets: Vec::new(),
        }
    }

    /// Returns the bucket for `key`, creating its file and header on first use.
    ///
    /// Repeated calls with the same key return the same bucket without
    /// reopening the file or writing another header.
    ///
    /// # Errors
    ///
    /// Returns a [`WriteError`] if the export directory or bucket file cannot
    /// be created or the header cannot be written.
    pub fn bucket_for(&mut self, key: u32) -> Result<&mut RetentionBucket> {
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                let bucket = self.create(key)?;
                self.buckets.push(bucket);
                let position = self.buckets.len() - 1;
                self.index.insert(key, position);
                position
            }
        };
        Ok(&mut self.buckets[position])
    }

    /// Returns the bucket for `key` if it has been created.
    pub fn get(&self, key: u32) -> Option<&RetentionBucket> {
        self.index.get(&key).map(|&position| &self.buckets[position])
    }

    /// Buckets in creation order.
    pub fn buckets(&self) -> &[RetentionBucket] {
        &self.buckets
    }

    /// Retention names not yet assigned to a bucket.
    pub fn remaining_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Flushes and closes every bucket in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError::Finish`] for the first bucket that fails to
    /// flush. Buckets after it are still dropped, which closes their files.
    pub fn close(self) -> Result<Vec<BucketSummary>> {
        self.buckets
            .into_iter()
            .map(RetentionBucket::close)
            .collect()
    }

    fn create(&mut self, key: u32) -> Result<RetentionBucket> {
        let name = self.names.pop_front().unwrap_or_else(|| key.to_string());

        let mut file_name = format!("{key}-{name}.txt");
        if self.compress {
            file_name.push_str(".gz");
        }
        let path = self.export_dir.join(file_name);

        fs::create_dir_all(&self.export_dir).map_err(|e| WriteError::CreateDir {
            path: self.export_dir.clone(),
            source: e,
        })?;
        let file = File::create(&path).map_err(|e| WriteError::Create {
            path: path.clone(),
            source: e,
        })?;

        debug!(key, name = %name, path = %path.display(), "created retention bucket");

        let header = bucket_header(&self.database, &name);
        let mut bucket = RetentionBucket {
            key,
            name,
            path,
            writer: BucketWriter::new(file, self.compress),
            lines: 0,
        };
        bucket.write_raw(header.as_bytes())?;
        Ok(bucket)
    }
}
