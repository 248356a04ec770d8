//! Output sinks: where commit, diff and analysis rows are persisted.
//!
//! Every table has a natural key. Commit and file snapshot rows are written
//! at most once and duplicates are dropped silently; the other tables follow
//! the run's [`ConflictPolicy`].

pub mod csv;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use serde::Serialize;
use std::ops::AddAssign;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{OutputConfig, OutputKind};
use crate::dispatch::{AnalysisIndex, AnalysisResult};
use crate::git::CommitInfo;

pub use self::csv::CsvSink;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteSink;

/// Errors raised by output sinks.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("{table}: a row with key ({key}) already exists; rerun with --resume to skip existing rows")]
    Conflict { table: &'static str, key: String },

    #[error("{path}: existing header {found:?} does not match {expected:?}")]
    HeaderMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] ::csv::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),

    #[error("output type {0} is not available in this build")]
    Unsupported(OutputKind),
}

/// What to do when a row's natural key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail the run (fresh runs).
    #[default]
    Fail,
    /// Count and skip the row (resumed runs).
    Skip,
}

/// Rows written and rows dropped as duplicates by one write call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WriteOutcome {
    pub written: usize,
    pub duplicates: usize,
}

impl AddAssign for WriteOutcome {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.duplicates += other.duplicates;
    }
}

/// Commit metadata row. Natural key: `hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub repository: String,
    pub branch: String,
    pub hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// RFC 3339 with the author's offset.
    pub author_date: String,
    pub committer_name: String,
    pub committer_email: String,
    /// RFC 3339 with the committer's offset.
    pub commit_date: String,
}

impl CommitRecord {
    pub fn from_info(info: &CommitInfo, repository: &str, branch: &str) -> Self {
        Self {
            repository: repository.to_string(),
            branch: branch.to_string(),
            hash: info.id.clone(),
            message: info.message.clone(),
            author_name: info.author_name.clone(),
            author_email: info.author_email.clone(),
            author_date: info.author_date.to_rfc3339(),
            committer_name: info.committer_name.clone(),
            committer_email: info.committer_email.clone(),
            commit_date: info.commit_date.to_rfc3339(),
        }
    }
}

/// A file in a snapshot commit. Natural key: `(commit_hash, path)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFileRecord {
    pub commit_hash: String,
    pub path: String,
    pub tech_stack: Option<String>,
    /// Blob id.
    pub hash: String,
}

/// A changed file between two commits.
/// Natural key: `(base_commit_hash, target_commit_hash, target_path)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
    pub base_commit_hash: String,
    pub target_commit_hash: String,
    pub base_path: String,
    pub target_path: String,
    pub change_type: String,
    pub base_tech_stack: Option<String>,
    pub target_tech_stack: Option<String>,
    pub base_file_hash: String,
    pub target_file_hash: String,
    pub lines_added: i64,
    pub lines_deleted: i64,
}

/// Decoded blob content (or its sentinel). Natural key: `file_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshotRecord {
    pub file_hash: String,
    pub content: String,
}

/// Destination for run output.
///
/// A sink has a single owner; the orchestrator calls it from one thread.
pub trait OutputSink {
    /// Create whatever storage the sink needs. Called once before writing.
    fn prepare(&mut self) -> Result<(), SinkError>;

    fn write_commits(&mut self, rows: &[CommitRecord]) -> Result<WriteOutcome, SinkError>;

    fn write_commit_files(&mut self, rows: &[CommitFileRecord]) -> Result<WriteOutcome, SinkError>;

    fn write_diff_results(&mut self, rows: &[DiffRecord]) -> Result<WriteOutcome, SinkError>;

    fn write_analysis_results(&mut self, rows: &[AnalysisResult]) -> Result<WriteOutcome, SinkError>;

    fn write_file_snapshots(&mut self, rows: &[FileSnapshotRecord]) -> Result<WriteOutcome, SinkError>;

    /// Analysis results already stored for any of `commits`.
    fn existing_analyses(&mut self, commits: &[String]) -> Result<AnalysisIndex, SinkError>;

    /// Drop every stored row.
    fn reset(&mut self) -> Result<(), SinkError>;
}

/// Open the sink selected by `output`.
pub fn open_sink(output: &OutputConfig, policy: ConflictPolicy) -> Result<Box<dyn OutputSink>, SinkError> {
    match output.kind {
        OutputKind::Csv => Ok(Box::new(CsvSink::new(&output.csv.path, policy))),
        #[cfg(feature = "sqlite")]
        OutputKind::Sqlite => Ok(Box::new(SqliteSink::open(&output.sqlite.database, policy)?)),
        #[cfg(not(feature = "sqlite"))]
        OutputKind::Sqlite => Err(SinkError::Unsupported(OutputKind::Sqlite)),
    }
}
