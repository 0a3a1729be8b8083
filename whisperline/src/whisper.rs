//! Read-only access to Whisper series archives.
//!
//! The export pipeline only needs three things from an archive: open it,
//! list its sub-archives, and dump one sub-archive's points. Those are the
//! [`ArchiveOpener`] and [`SeriesArchive`] traits; [`WhisperOpener`] is the
//! implementation for Whisper files on disk.
//!
//! # File Format
//!
//! All integers and floats are big-endian.
//!
//! ```text
//! [0..16)              Metadata: aggregation u32, max retention u32,
//!                      x-files factor f32, archive count u32
//! [16..16+12*N)        Archive info per sub-archive: offset u32,
//!                      seconds per point u32, points u32
//! [offset..)           Points: timestamp u32, value f64 (12 bytes each)
//! ```
//!
//! Points are returned in on-disk slot order. Slots that were never written
//! carry timestamp 0.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{ArchiveError, Result};

/// Size of the fixed metadata block.
const METADATA_SIZE: usize = 16;

/// Size of one archive info entry.
const ARCHIVE_INFO_SIZE: usize = 12;

/// Size of one stored point.
const POINT_SIZE: usize = 12;

/// One decoded sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since epoch.
    pub timestamp: u32,
    /// The stored value.
    pub value: f64,
}

impl Sample {
    /// Creates a sample.
    pub fn new(timestamp: u32, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Layout of one sub-archive (retention level) within a series file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Byte offset of the first point.
    pub offset: u32,
    /// Sampling interval; this is the retention bucket key.
    pub seconds_per_point: u32,
    /// Number of point slots.
    pub points: u32,
}

/// An opened series with one or more sub-archives.
pub trait SeriesArchive {
    /// Sub-archives in file order.
    fn archives(&self) -> &[ArchiveInfo];

    /// Decodes every point slot of the sub-archive at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Decode`] if the points cannot be read.
    fn dump(&self, index: usize) -> Result<Vec<Sample>>;
}

/// Opens series archives by path.
pub trait ArchiveOpener {
    /// Opens the archive at `path`.
    ///
    /// # Errors
    ///
    /// Returns an [`ArchiveError`] if the archive cannot be opened or its
    /// header is unreadable.
    fn open(&self, path: &Path) -> Result<Box<dyn SeriesArchive>>;
}

/// Opens Whisper files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhisperOpener;

impl ArchiveOpener for WhisperOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn SeriesArchive>> {
        Ok(Box::new(WhisperFile::open(path)?))
    }
}

/// Metadata block of a Whisper file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WhisperMetadata {
    /// Aggregation method id used by the writer.
    pub aggregation: u32,
    /// Longest retention across sub-archives, in seconds.
    pub max_retention: u32,
    /// Fraction of known points required to propagate.
    pub x_files_factor: f32,
}

/// A memory-mapped Whisper file.
#[derive(Debug)]
pub struct WhisperFile {
    path: PathBuf,
    mmap: Mmap,
    metadata: WhisperMetadata,
    archives: Vec<ArchiveInfo>,
}

impl WhisperFile {
    /// Opens and validates the header of a Whisper file.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Open`] if the file cannot be opened or mapped
    /// and [`ArchiveError::Corrupted`] if the header is truncated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |e| ArchiveError::Open {
            path: path.clone(),
            source: e,
        };

        let file = File::open(&path).map_err(open_err)?;
        let len = file.metadata().map_err(open_err)?.len();
        if len < METADATA_SIZE as u64 {
            return Err(ArchiveError::Corrupted {
                path: path.clone(),
                reason: format!("file too small: {len} bytes, expected at least {METADATA_SIZE}"),
            }
            .into());
        }

        // SAFETY: The mapping is read-only and lives as long as `WhisperFile`.
        // Every read goes through bounds-checked slice access, so a file
        // truncated underneath us fails decoding instead of reading past the map.
        let mmap = unsafe { Mmap::map(&file).map_err(open_err)? };

        let corrupted = |reason: String| ArchiveError::Corrupted {
            path: path.clone(),
            reason,
        };

        let (Some(aggregation), Some(max_retention), Some(xff), Some(count)) = (
            read_u32(&mmap, 0),
            read_u32(&mmap, 4),
            read_u32(&mmap, 8),
            read_u32(&mmap, 12),
        ) else {
            return Err(corrupted("truncated metadata".to_string()).into());
        };

        let count = count as usize;
        let info_end = count
            .checked_mul(ARCHIVE_INFO_SIZE)
            .and_then(|size| size.checked_add(METADATA_SIZE));
        if count == 0 || info_end.is_none_or(|end| end > mmap.len()) {
            return Err(corrupted(format!(
                "archive count {count} does not fit in {} bytes",
                mmap.len()
            ))
            .into());
        }

        let archives = (0..count)
            .map(|i| {
                let base = METADATA_SIZE + i * ARCHIVE_INFO_SIZE;
                Some(ArchiveInfo {
                    offset: read_u32(&mmap, base)?,
                    seconds_per_point: read_u32(&mmap, base + 4)?,
                    points: read_u32(&mmap, base + 8)?,
                })
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| corrupted("truncated archive info".to_string()))?;

        Ok(Self {
            path,
            mmap,
            metadata: WhisperMetadata {
                aggregation,
                max_retention,
                x_files_factor: f32::from_bits(xff),
            },
            archives,
        })
    }

    /// The file's metadata block.
    pub fn metadata(&self) -> &WhisperMetadata {
        &self.metadata
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeriesArchive for WhisperFile {
    fn archives(&self) -> &[ArchiveInfo] {
        &self.archives
    }

    fn dump(&self, index: usize) -> Result<Vec<Sample>> {
        let decode_err = |reason: String| ArchiveError::Decode {
            path: self.path.clone(),
            archive: index,
            reason,
        };

        let info = self
            .archives
            .get(index)
            .ok_or_else(|| decode_err(format!("only {} sub-archives", self.archives.len())))?;

        let start = info.offset as usize;
        let end = (info.points as usize)
            .checked_mul(POINT_SIZE)
            .and_then(|size| size.checked_add(start))
            .ok_or_else(|| {
                decode_err(format!(
                    "{} points at offset {start} overflow the address space",
                    info.points
                ))
            })?;
        let region = self.mmap.get(start..end).ok_or_else(|| {
            decode_err(format!(
                "points {start}..{end} exceed file size {}",
                self.mmap.len()
            ))
        })?;

        let samples = region
            .chunks_exact(POINT_SIZE)
            .filter_map(|point| {
                let timestamp = read_u32(point, 0)?;
                let value = point.get(4..12)?.try_into().ok().map(f64::from_be_bytes)?;
                Some(Sample::new(timestamp, value))
            })
            .collect();

        Ok(samples)
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset + 4)?
        .try_into()
        .ok()
        .map(u32::from_be_bytes)
}
