//! # whisperline
//!
//! Export Whisper time-series archives to line protocol files, one file per
//! retention bucket.
//!
//! A rule file maps dotted series paths to a measurement, a field and a tag
//! set using `{{ name }}` wildcards. Every `.wsp` file under a series root is
//! matched against those rules, and every point of every matched series is
//! written to the bucket file for its sub-archive's sampling interval.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Rules are compiled once; matching a path runs only prepared regexes
//! - First matching rule wins, in declaration order
//! - Buckets are shared across all series and opened lazily
//! - Each bucket file gets its header exactly once
//! - Strictly sequential: bucket names depend on discovery order
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use whisperline::{BucketConfig, BucketRegistry, ExportOptions, Exporter, Plan, Rule, RuleSet};
//! use whisperline::whisper::WhisperOpener;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rules = RuleSet::compile(vec![
//!     Rule::new("servers.{{ host }}.cpu.{{ metric }}")
//!         .with_measurement("cpu")
//!         .with_field("{{ metric }}")
//!         .with_tag("host", "{{ host }}"),
//! ])?;
//!
//! let mut plan = Plan::build(Path::new("/var/lib/graphite/whisper"), &rules);
//!
//! let mut buckets = BucketConfig::new("./export");
//! buckets.retention_names = vec!["raw".to_string(), "hourly".to_string()];
//!
//! let exporter = Exporter::new(
//!     WhisperOpener,
//!     BucketRegistry::new(buckets),
//!     ExportOptions::default(),
//! );
//! let summary = exporter.run(&mut plan.matched, |_, _| {})?;
//! for bucket in &summary.buckets {
//!     println!("{}: {} lines", bucket.path.display(), bucket.lines);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`] — Rule file model, export and bucket options
//! - [`template`] — Pattern compilation and template resolution
//! - [`matcher`] — First-match evaluation over a compiled rule set
//! - [`series`] — Path normalization, discovery, series descriptors
//! - [`whisper`] — Archive traits and the Whisper file reader
//! - [`bucket`] — Retention bucket registry and output files
//! - [`line`] — Line protocol encoding
//! - [`export`] — The export pipeline
//! - [`error`] — Error types

pub mod bucket;
pub mod config;
pub mod error;
pub mod export;
pub mod line;
pub mod matcher;
pub mod series;
pub mod template;
pub mod whisper;

// Re-export primary API types at crate root for convenience.
pub use bucket::{BucketRegistry, BucketSummary};
pub use config::{BucketConfig, ExportOptions, Rule, TagTemplate};
pub use error::{Result, WhisperlineError};
pub use export::{ExportSummary, Exporter, SeriesStats};
pub use matcher::RuleSet;
pub use series::{MatchState, Plan, SeriesDescriptor};
