//! Read-only access to a Git repository.
//!
//! The orchestrator only talks to [`RepositoryReader`], so runs can be
//! driven from any history source; [`GitRepository`] is the libgit2 one.
//! Object ids cross this boundary as full lowercase hex strings.

mod blob;
mod repo;

pub use blob::{decode_blob, is_binary, is_zero_id, read_content, zero_content, BINARY_SNIFF_LEN, ZERO_ID};
pub use repo::GitRepository;

use chrono::{DateTime, FixedOffset};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from repository access.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("opening repository {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("branch {0:?} not found")]
    BranchNotFound(String),

    #[error("revision {0:?} not found")]
    RevisionNotFound(String),

    #[error("commit {commit} is not on branch {branch}")]
    NotOnBranch { commit: String, branch: String },

    #[error("HEAD does not point at a branch")]
    NoHeadBranch,

    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// Commit metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub id: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub author_date: DateTime<FixedOffset>,
    pub committer_name: String,
    pub committer_email: String,
    pub commit_date: DateTime<FixedOffset>,
    pub parent_ids: Vec<String>,
}

impl CommitInfo {
    pub fn first_parent(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }
}

/// A blob reachable from a commit's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// `/`-separated path relative to the repository root.
    pub path: String,
    pub blob_id: String,
}

/// One changed file between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub old_path: String,
    pub new_path: String,
    /// Single-letter status: A, M, D, R, C, =, ?, T, !, U, I, or X.
    pub change_type: char,
    /// Zero id when the file did not exist on the old side.
    pub old_blob: String,
    /// Zero id when the file does not exist on the new side.
    pub new_blob: String,
    pub lines_added: usize,
    pub lines_deleted: usize,
}

/// History and object access needed by a run.
pub trait RepositoryReader {
    /// Human-readable repository location, stored with commit rows.
    fn location(&self) -> String;

    /// Short name of the branch HEAD points at.
    fn head_branch(&self) -> Result<String, GitError>;

    /// Commit id at the tip of a local branch.
    fn branch_tip(&self, branch: &str) -> Result<String, GitError>;

    /// Resolve a revision (full or short hash, ref name) to a commit id.
    fn resolve(&self, revspec: &str) -> Result<String, GitError>;

    /// Whether `commit` is reachable from the tip of `branch`.
    fn branch_contains(&self, branch: &str, commit: &str) -> Result<bool, GitError>;

    /// Commits on `branch`, oldest first, excluding `since` and its ancestors.
    fn walk(&self, branch: &str, since: Option<&str>) -> Result<Vec<String>, GitError>;

    fn commit(&self, id: &str) -> Result<CommitInfo, GitError>;

    /// Every blob in a commit's tree, recursively.
    fn tree(&self, commit: &str) -> Result<Vec<TreeEntry>, GitError>;

    /// Changes from `base` (or the empty tree) to `target`.
    fn diff(&self, base: Option<&str>, target: &str) -> Result<Vec<DiffEntry>, GitError>;

    /// Raw blob bytes, or `None` when the object does not exist.
    fn blob(&self, id: &str) -> Result<Option<Vec<u8>>, GitError>;
}
