//! Values flowing through the dispatch pipeline.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Which side of a snapshot or diff a file version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Snapshot,
    Base,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Snapshot => write!(f, "snapshot"),
            Side::Base => write!(f, "base"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// Identity of a file version: the commit it was read from and its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubjectKey {
    pub commit_hash: String,
    pub path: String,
}

impl SubjectKey {
    pub fn new(commit_hash: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.commit_hash, self.path)
    }
}

pub const ADDED_TOKEN: &str = "<added>";
pub const DELETED_TOKEN: &str = "<deleted>";
pub const BINARY_TOKEN: &str = "<binary>";
pub const DECODE_ERROR_TOKEN: &str = "<utf-8-decode-error>";
pub const INVALID_TOKEN: &str = "<invalid>";

/// File content, or the reason there is none to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    /// Base side of a diff where the file did not exist yet.
    Added,
    /// Target side of a diff where the file no longer exists.
    Deleted,
    Binary,
    DecodeError,
    /// Missing or unreadable blob.
    Invalid,
}

impl Content {
    /// The sentinel token, or `None` for text.
    pub fn sentinel(&self) -> Option<&'static str> {
        match self {
            Content::Text(_) => None,
            Content::Added => Some(ADDED_TOKEN),
            Content::Deleted => Some(DELETED_TOKEN),
            Content::Binary => Some(BINARY_TOKEN),
            Content::DecodeError => Some(DECODE_ERROR_TOKEN),
            Content::Invalid => Some(INVALID_TOKEN),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.sentinel().is_some()
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text as stored in snapshot rows: the content itself or its token.
    pub fn stored(&self) -> &str {
        match self {
            Content::Text(text) => text,
            other => other.sentinel().unwrap_or(INVALID_TOKEN),
        }
    }
}

/// One side of a commit-file or diff-file pair, ready for analysis.
#[derive(Debug, Clone)]
pub struct FileVersion {
    pub subject: SubjectKey,
    pub side: Side,
    pub blob_hash: Option<String>,
    pub content: Content,
    pub tech_stack: Option<String>,
}

/// Output of one analyzer on one file version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub subject: SubjectKey,
    /// Descriptor name of the analyzer that produced this result.
    pub analyzer: String,
    pub count: i64,
    pub detail: Option<Value>,
}

impl AnalysisResult {
    /// Natural key: commit hash, path and analyzer name.
    pub fn key(&self) -> (String, String, String) {
        (
            self.subject.commit_hash.clone(),
            self.subject.path.clone(),
            self.analyzer.clone(),
        )
    }
}

/// Set of (subject, analyzer) pairs that already have a stored result.
#[derive(Debug, Clone, Default)]
pub struct AnalysisIndex {
    seen: HashSet<(String, String, String)>,
}

impl AnalysisIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, subject: &SubjectKey, analyzer: &str) -> bool {
        if self.seen.is_empty() {
            return false;
        }
        self.seen.contains(&(
            subject.commit_hash.clone(),
            subject.path.clone(),
            analyzer.to_string(),
        ))
    }

    pub fn insert(&mut self, subject: &SubjectKey, analyzer: &str) -> bool {
        self.seen.insert((
            subject.commit_hash.clone(),
            subject.path.clone(),
            analyzer.to_string(),
        ))
    }

    pub fn extend_from_results<'a>(&mut self, results: impl IntoIterator<Item = &'a AnalysisResult>) {
        for result in results {
            self.seen.insert(result.key());
        }
    }

    /// Fold another index into this one.
    pub fn merge(&mut self, other: AnalysisIndex) {
        self.seen.extend(other.seen);
    }

    /// Stored keys as (commit hash, path, analyzer).
    pub fn iter(&self) -> impl Iterator<Item = &(String, String, String)> {
        self.seen.iter()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl FromIterator<(String, String, String)> for AnalysisIndex {
    fn from_iter<T: IntoIterator<Item = (String, String, String)>>(iter: T) -> Self {
        Self {
            seen: iter.into_iter().collect(),
        }
    }
}
