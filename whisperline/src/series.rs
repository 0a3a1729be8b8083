//! Series discovery and per-series metadata.
//!
//! A series is one `.wsp` file under the series root. Its path relative to
//! the root is normalized into a dotted name, matched against the rule set,
//! and resolved into a [`SeriesDescriptor`] carrying the measurement, field
//! and tags every exported line of that series will use.
//!
//! # Lifecycle
//!
//! ```text
//! Unresolved ──resolve──▶ Matched ──export──▶ Exported
//!      │                     └─────────────▶ ExportFailed
//!      └────────resolve──▶ Unmatched
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::path::Path;
//! use whisperline::series::normalize_path;
//!
//! assert_eq!(
//!     normalize_path(Path::new("/data"), Path::new("/data/stats/web 1/load,avg.wsp")),
//!     "stats.web_1.load_avg"
//! );
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{EnumerationError, Result};
use crate::matcher::RuleSet;
use crate::template::ResolvedTemplates;

/// File extension of series archives.
pub const ARCHIVE_EXTENSION: &str = "wsp";

/// Where a series is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchState {
    /// Not yet matched against the rule set.
    Unresolved,
    /// A rule matched and templates were resolved.
    Matched,
    /// No rule matched, or resolution was rejected. Never exported.
    Unmatched,
    /// All readable sub-archives were exported.
    Exported,
    /// The archive could not be opened.
    ExportFailed,
}

/// One discovered series and its resolved line metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesDescriptor {
    source_path: PathBuf,
    normalized_path: String,
    rule_index: Option<usize>,
    captures: Vec<String>,
    resolved: ResolvedTemplates,
    state: MatchState,
}

impl SeriesDescriptor {
    /// Creates an unresolved descriptor for `source_path` under `root`.
    pub fn new(root: &Path, source_path: impl Into<PathBuf>) -> Self {
        let source_path = source_path.into();
        let normalized_path = normalize_path(root, &source_path);
        Self {
            source_path,
            normalized_path,
            rule_index: None,
            captures: Vec::new(),
            resolved: ResolvedTemplates::default(),
            state: MatchState::Unresolved,
        }
    }

    /// Matches the normalized path against `rules` and resolves templates.
    ///
    /// Moves the descriptor to [`MatchState::Matched`] or
    /// [`MatchState::Unmatched`] and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::TemplateError`] if the matching rule's
    /// captures cannot be substituted safely. The descriptor is left
    /// [`MatchState::Unmatched`].
    pub fn resolve(&mut self, rules: &RuleSet) -> Result<MatchState> {
        let Some(matched) = rules.match_path(&self.normalized_path) else {
            self.state = MatchState::Unmatched;
            return Ok(self.state);
        };
        let Some(rule) = rules.get(matched.rule_index) else {
            self.state = MatchState::Unmatched;
            return Ok(self.state);
        };

        match rule.resolve(&self.normalized_path, &matched.captures) {
            Ok(resolved) => {
                self.rule_index = Some(matched.rule_index);
                self.captures = matched.captures;
                self.resolved = resolved;
                self.state = MatchState::Matched;
                Ok(self.state)
            }
            Err(e) => {
                self.state = MatchState::Unmatched;
                Err(e)
            }
        }
    }

    /// Path of the archive file.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Dotted, sanitized series name.
    pub fn normalized_path(&self) -> &str {
        &self.normalized_path
    }

    /// Index of the matching rule, once matched.
    pub fn rule_index(&self) -> Option<usize> {
        self.rule_index
    }

    /// Captured segments in wildcard-name order.
    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    /// Resolved measurement.
    pub fn measurement(&self) -> &str {
        &self.resolved.measurement
    }

    /// Resolved field key.
    pub fn field(&self) -> &str {
        &self.resolved.field
    }

    /// Resolved tag set, rendered as `,key=value` pairs.
    pub fn tags(&self) -> &str {
        &self.resolved.tags
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MatchState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: MatchState) {
        self.state = state;
    }
}

/// Converts an archive path into the dotted name rules are matched against.
///
/// The path is taken relative to `root`, its `.wsp` extension dropped,
/// components joined with `.`, and commas and spaces replaced by `_`.
pub fn normalize_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let joined = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".");
    let trimmed = joined
        .strip_suffix(".wsp")
        .unwrap_or(&joined);
    trimmed.replace([',', ' '], "_")
}

/// Lists every archive file under `root`, depth first, in lexical order.
///
/// A missing root yields no files. Subdirectories that cannot be read are
/// logged and skipped.
///
/// # Errors
///
/// Returns [`EnumerationError::ReadDir`] if `root` exists but cannot be
/// listed.
pub fn enumerate_archives(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }
    walk(root, &mut files)?;
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let read_dir = fs::read_dir(dir).map_err(|e| EnumerationError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut entries = readable_entries(dir, read_dir);
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
        if is_dir {
            if let Err(e) = walk(&path, files) {
                warn!("skipping unreadable directory: {e}");
            }
        } else if path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION) {
            files.push(path);
        }
    }
    Ok(())
}

/// Keeps the entries that could be read, logging the rest.
fn readable_entries<T, I>(dir: &Path, entries: I) -> Vec<T>
where
    I: IntoIterator<Item = std::io::Result<T>>,
{
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(dir = %dir.display(), "skipping unreadable directory entry: {e}");
                None
            }
        })
        .collect()
}

/// Discovered series split by match outcome, in enumeration order.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Series that matched a rule; these are exported.
    pub matched: Vec<SeriesDescriptor>,
    /// Series that matched no rule or were rejected during resolution.
    pub unmatched: Vec<SeriesDescriptor>,
}

impl Plan {
    /// Walks `root` and resolves every archive against `rules`.
    ///
    /// An unreadable root is logged and yields an empty plan.
    pub fn build(root: &Path, rules: &RuleSet) -> Self {
        let paths = match enumerate_archives(root) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("no series discovered: {e}");
                Vec::new()
            }
        };
        Self::from_paths(root, paths, rules)
    }

    /// Resolves an already enumerated list of archive paths.
    pub fn from_paths<I>(root: &Path, paths: I, rules: &RuleSet) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut plan = Self::default();
        for path in paths {
            let mut series = SeriesDescriptor::new(root, path);
            match series.resolve(rules) {
                Ok(MatchState::Matched) => plan.matched.push(series),
                Ok(_) => {
                    debug!(path = %series.source_path().display(), "series matched no rule");
                    plan.unmatched.push(series);
                }
                Err(e) => {
                    warn!(path = %series.source_path().display(), "rejecting series: {e}");
                    plan.unmatched.push(series);
                }
            }
        }
        plan
    }
}
