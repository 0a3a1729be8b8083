//! Rule file model and export options.
//!
//! The rule file is a JSON array of [`Rule`] objects. Order is significant:
//! the first rule whose pattern matches a series path wins.
//!
//! ```json
//! [
//!   {
//!     "pattern": "stats.{{ host }}.cpu.{{ core }}",
//!     "measurement": "cpu",
//!     "tags": [
//!       { "tagkey": "host", "tagvalue": "{{ host }}" },
//!       { "tagkey": "core", "tagvalue": "{{ core }}" }
//!     ],
//!     "field": ""
//!   }
//! ]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Database name written in bucket headers when none is configured.
pub const DEFAULT_DATABASE: &str = "graphite";

/// A single path-to-metadata mapping rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Dotted path pattern with `{{ name }}` wildcards.
    pub pattern: String,

    /// Measurement template. Empty means "last path segment".
    #[serde(default)]
    pub measurement: String,

    /// Tag templates, emitted in declaration order.
    #[serde(default)]
    pub tags: Vec<TagTemplate>,

    /// Field template. Empty means `value`.
    #[serde(default)]
    pub field: String,
}

impl Rule {
    /// Creates a rule with only a pattern; every template is left empty.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            measurement: String::new(),
            tags: Vec::new(),
            field: String::new(),
        }
    }

    /// Sets the measurement template.
    #[must_use]
    pub fn with_measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = measurement.into();
        self
    }

    /// Sets the field template.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    /// Appends a tag template.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(TagTemplate {
            tagkey: key.into(),
            tagvalue: value.into(),
        });
        self
    }
}

/// A tag key paired with a value template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagTemplate {
    /// Tag key, emitted verbatim.
    pub tagkey: String,
    /// Tag value template.
    pub tagvalue: String,
}

/// Reads and parses a JSON rule file.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] if the file cannot be read and
/// [`ConfigError::Parse`] if it is not a JSON array of rules.
pub fn load_rules<P: AsRef<Path>>(path: P) -> Result<Vec<Rule>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let rules = serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(rules)
}

/// Per-sample filtering and rescaling options for an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Inclusive lower timestamp bound, seconds since epoch.
    pub from: u32,
    /// Inclusive upper timestamp bound, seconds since epoch.
    pub until: u32,
    /// Emit samples whose value is exactly zero.
    pub export_zeros: bool,
    /// Multiply each value by its sub-archive's seconds-per-point and round up.
    pub scale_by_interval: bool,
}

impl ExportOptions {
    /// Checks that the time window is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTimeRange`] if `from > until`.
    pub fn validate(&self) -> Result<()> {
        if self.from > self.until {
            return Err(ConfigError::InvalidTimeRange {
                from: self.from,
                until: self.until,
            }
            .into());
        }
        Ok(())
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            from: 0,
            until: u32::MAX,
            export_zeros: false,
            scale_by_interval: true,
        }
    }
}

/// Where and how bucket files are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketConfig {
    /// Directory receiving one file per retention bucket.
    pub export_dir: PathBuf,
    /// Database name written in every bucket header.
    pub database: String,
    /// Gzip bucket files and add a `.gz` suffix.
    pub compress: bool,
    /// Bucket names handed out in retention discovery order.
    pub retention_names: Vec<String>,
}

impl BucketConfig {
    /// Creates a config with the default database, no compression and no
    /// retention names.
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            database: DEFAULT_DATABASE.to_string(),
            compress: false,
            retention_names: Vec::new(),
        }
    }
}

/// Splits a comma-separated retention name list.
///
/// Entries are trimmed and empty entries dropped, so `""` yields no names.
pub fn parse_retention_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
