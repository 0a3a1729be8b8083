//! Export pipeline: drains matched series into retention buckets.
//!
//! For each series, in plan order:
//!
//! 1. Open the archive. On failure the series is logged, marked
//!    [`MatchState::ExportFailed`], and skipped.
//! 2. For each sub-archive, in file order, look up the bucket for its
//!    seconds-per-point, then decode its points. A decode failure skips only
//!    that sub-archive.
//! 3. Filter each point (zero values, time window), optionally rescale it,
//!    encode it, and append it to the bucket.
//!
//! Buckets outlive series: they are closed once, by [`Exporter::finish`] or
//! at the end of [`Exporter::run`]. Any bucket write error aborts the run.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use whisperline::bucket::BucketRegistry;
//! use whisperline::config::{load_rules, BucketConfig, ExportOptions};
//! use whisperline::export::Exporter;
//! use whisperline::matcher::RuleSet;
//! use whisperline::series::Plan;
//! use whisperline::whisper::WhisperOpener;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rules = RuleSet::compile(load_rules("rules.json")?)?;
//! let mut plan = Plan::build(Path::new("/var/lib/graphite/whisper"), &rules);
//!
//! let registry = BucketRegistry::new(BucketConfig::new("./export"));
//! let exporter = Exporter::new(WhisperOpener, registry, ExportOptions::default());
//! let summary = exporter.run(&mut plan.matched, |_, _| {})?;
//! println!("{} series, {} points", summary.exported, summary.points_written);
//! # Ok(())
//! # }
//! ```

use tracing::{debug, info, warn};

use crate::bucket::{BucketRegistry, BucketSummary};
use crate::config::ExportOptions;
use crate::error::Result;
use crate::line::{encode_into, output_value};
use crate::series::{MatchState, SeriesDescriptor};
use crate::whisper::ArchiveOpener;

/// Point counts for one exported series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesStats {
    /// Lines written to buckets.
    pub written: u64,
    /// Points dropped because their value was zero.
    pub skipped_zero: u64,
    /// Points dropped because their timestamp was outside the window.
    pub skipped_range: u64,
    /// Points dropped because the output value was NaN or infinite.
    pub skipped_non_finite: u64,
    /// Sub-archives that failed to decode.
    pub failed_archives: u64,
}

/// Totals for a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Series whose archive opened and was drained.
    pub exported: usize,
    /// Series whose archive could not be opened.
    pub failed: usize,
    /// Lines written across all buckets.
    pub points_written: u64,
    /// Sub-archives skipped after a decode failure.
    pub failed_archives: u64,
    /// Closed buckets, in creation order.
    pub buckets: Vec<BucketSummary>,
}

/// Drains series archives into a shared [`BucketRegistry`].
#[derive(Debug)]
pub struct Exporter<O> {
    opener: O,
    registry: BucketRegistry,
    options: ExportOptions,
    line: String,
}

impl<O: ArchiveOpener> Exporter<O> {
    /// Creates an exporter that owns `registry` for the rest of the run.
    pub fn new(opener: O, registry: BucketRegistry, options: ExportOptions) -> Self {
        Self {
            opener,
            registry,
            options,
            line: String::with_capacity(128),
        }
    }

    /// The bucket registry, with every bucket created so far.
    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    /// Exports one matched series.
    ///
    /// Series that are not [`MatchState::Matched`] are left untouched. An
    /// archive that fails to open marks the series
    /// [`MatchState::ExportFailed`] and is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::WriteError`] if a bucket cannot be created
    /// or written. The run should stop.
    pub fn export_series(&mut self, series: &mut SeriesDescriptor) -> Result<SeriesStats> {
        let mut stats = SeriesStats::default();
        if series.state() != MatchState::Matched {
            debug!(path = %series.source_path().display(), state = ?series.state(), "not exporting series");
            return Ok(stats);
        }

        let archive = match self.opener.open(series.source_path()) {
            Ok(archive) => archive,
            Err(e) => {
                warn!("skipping series: {e}");
                series.set_state(MatchState::ExportFailed);
                return Ok(stats);
            }
        };

        let ExportOptions {
            from,
            until,
            export_zeros,
            scale_by_interval,
        } = self.options;

        for (index, info) in archive.archives().iter().enumerate() {
            let key = info.seconds_per_point;
            let bucket = self.registry.bucket_for(key)?;

            let samples = match archive.dump(index) {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("skipping sub-archive: {e}");
                    stats.failed_archives += 1;
                    continue;
                }
            };

            for sample in samples {
                if !export_zeros && sample.value == 0.0 {
                    stats.skipped_zero += 1;
                    continue;
                }
                if sample.timestamp < from || sample.timestamp > until {
                    stats.skipped_range += 1;
                    continue;
                }
                let value = output_value(sample.value, key, scale_by_interval);
                if !value.is_finite() {
                    stats.skipped_non_finite += 1;
                    continue;
                }

                self.line.clear();
                encode_into(
                    &mut self.line,
                    series.measurement(),
                    series.tags(),
                    series.field(),
                    value,
                    sample.timestamp,
                );
                bucket.write_line(&self.line)?;
                stats.written += 1;
            }
        }

        series.set_state(MatchState::Exported);
        debug!(
            path = %series.source_path().display(),
            written = stats.written,
            "exported series"
        );
        Ok(stats)
    }

    /// Exports every series in order, then closes all buckets.
    ///
    /// `progress` is called after each series with its position and final
    /// state.
    ///
    /// # Errors
    ///
    /// Returns the first [`crate::error::WriteError`]; series after it are
    /// not processed.
    pub fn run<F>(mut self, series: &mut [SeriesDescriptor], mut progress: F) -> Result<ExportSummary>
    where
        F: FnMut(usize, &SeriesDescriptor),
    {
        let mut summary = ExportSummary::default();

        for (position, descriptor) in series.iter_mut().enumerate() {
            let stats = self.export_series(descriptor)?;
            match descriptor.state() {
                MatchState::Exported => summary.exported += 1,
                MatchState::ExportFailed => summary.failed += 1,
                _ => {}
            }
            summary.points_written += stats.written;
            summary.failed_archives += stats.failed_archives;
            progress(position, descriptor);
        }

        summary.buckets = self.finish()?;
        info!(
            exported = summary.exported,
            failed = summary.failed,
            points = summary.points_written,
            buckets = summary.buckets.len(),
            "export complete"
        );
        Ok(summary)
    }

    /// Closes every bucket in creation order.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::WriteError`] if a bucket fails to flush.
    pub fn finish(self) -> Result<Vec<BucketSummary>> {
        self.registry.close()
    }
}
