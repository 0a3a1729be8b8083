//! Error types for the whisperline export pipeline.
//!
//! Errors are split by concern. Whether an error is fatal is decided by the
//! caller, not the type: [`ConfigError`] and [`WriteError`] abort a run,
//! everything else is scoped to one series or one sub-archive and is logged
//! and counted by the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all whisperline operations.
#[derive(Error, Debug)]
pub enum WhisperlineError {
    /// The rule file or export options are unusable.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The series root could not be walked.
    #[error("enumeration error: {0}")]
    Enumeration(#[from] EnumerationError),

    /// A rule's templates could not be resolved for a path.
    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    /// A series archive could not be opened or decoded.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// A bucket output stream could not be created or written.
    #[error("write error: {0}")]
    Write(#[from] WriteError),
}

/// Errors raised while loading rules or validating export options.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The rule file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The rule file is not a valid JSON rule array.
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A pattern produced an invalid regular expression after wildcard
    /// substitution.
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as written in the rule file.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The export time window is empty.
    #[error("invalid time range: from {from} > until {until}")]
    InvalidTimeRange {
        /// Inclusive lower bound.
        from: u32,
        /// Inclusive upper bound.
        until: u32,
    },
}

/// Errors raised while walking the series root.
#[derive(Error, Debug)]
pub enum EnumerationError {
    /// A directory under the series root could not be listed.
    #[error("failed to list directory '{}': {source}", path.display())]
    ReadDir {
        /// The directory that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while substituting captured values into templates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A captured path segment itself looks like a wildcard token, so
    /// substitution would be ambiguous.
    #[error("captured value '{value}' for wildcard '{wildcard}' contains a wildcard token")]
    TokenInCapture {
        /// The wildcard whose capture was rejected.
        wildcard: String,
        /// The offending captured value.
        value: String,
    },
}

/// Errors raised by the archive reader.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The archive file could not be opened or mapped.
    #[error("failed to open archive '{}': {source}", path.display())]
    Open {
        /// The archive path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive header is truncated or inconsistent.
    #[error("archive '{}' is corrupted: {reason}", path.display())]
    Corrupted {
        /// The archive path.
        path: PathBuf,
        /// Description of the corruption.
        reason: String,
    },

    /// One sub-archive's points could not be decoded.
    #[error("failed to decode sub-archive {archive} of '{}': {reason}", path.display())]
    Decode {
        /// The archive path.
        path: PathBuf,
        /// Index of the sub-archive within the file.
        archive: usize,
        /// Description of the failure.
        reason: String,
    },
}

/// Errors raised while producing bucket output files.
#[derive(Error, Debug)]
pub enum WriteError {
    /// The export directory could not be created.
    #[error("failed to create export directory '{}': {source}", path.display())]
    CreateDir {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A bucket file could not be created.
    #[error("failed to create bucket file '{}': {source}", path.display())]
    Create {
        /// The bucket file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line could not be appended to a bucket file.
    #[error("failed to write bucket file '{}': {source}", path.display())]
    Write {
        /// The bucket file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Flushing or finishing the compressed stream failed at shutdown.
    #[error("failed to finish bucket file '{}': {source}", path.display())]
    Finish {
        /// The bucket file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Type alias for `Result<T, WhisperlineError>`.
pub type Result<T> = std::result::Result<T, WhisperlineError>;
