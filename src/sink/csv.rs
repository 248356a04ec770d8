//! CSV output: one file per table, every field quoted.
//!
//! A fresh run truncates each file the first time it is written. A resumed
//! run appends, after checking that the existing header is byte-for-byte the
//! one this sink writes and loading the keys already present.

use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{
    CommitFileRecord, CommitRecord, ConflictPolicy, DiffRecord, FileSnapshotRecord, OutputSink,
    SinkError, WriteOutcome,
};
use crate::dispatch::{AnalysisIndex, AnalysisResult, SubjectKey};

/// A row type with a CSV file of its own.
pub trait CsvRecord {
    const FILE: &'static str;
    const HEADER: &'static [&'static str];
    /// Header positions forming the natural key.
    const KEY_COLUMNS: &'static [usize];

    fn fields(&self) -> Vec<String>;
}

impl CsvRecord for CommitRecord {
    const FILE: &'static str = "commits.csv";
    const HEADER: &'static [&'static str] = &[
        "repository",
        "branch",
        "hash",
        "message",
        "author_name",
        "author_email",
        "author_date",
        "committer_name",
        "committer_email",
        "commit_date",
    ];
    const KEY_COLUMNS: &'static [usize] = &[2];

    fn fields(&self) -> Vec<String> {
        vec![
            self.repository.clone(),
            self.branch.clone(),
            self.hash.clone(),
            self.message.clone(),
            self.author_name.clone(),
            self.author_email.clone(),
            self.author_date.clone(),
            self.committer_name.clone(),
            self.committer_email.clone(),
            self.commit_date.clone(),
        ]
    }
}

impl CsvRecord for CommitFileRecord {
    const FILE: &'static str = "commit_files.csv";
    const HEADER: &'static [&'static str] = &["commit_hash", "path", "tech_stack", "hash"];
    const KEY_COLUMNS: &'static [usize] = &[0, 1];

    fn fields(&self) -> Vec<String> {
        vec![
            self.commit_hash.clone(),
            self.path.clone(),
            self.tech_stack.clone().unwrap_or_default(),
            self.hash.clone(),
        ]
    }
}

impl CsvRecord for DiffRecord {
    const FILE: &'static str = "diff_results.csv";
    const HEADER: &'static [&'static str] = &[
        "base_commit_hash",
        "target_commit_hash",
        "base_path",
        "target_path",
        "diff_change_type",
        "base_tech_stack",
        "target_tech_stack",
        "base_file_hash",
        "target_file_hash",
        "lines_added",
        "lines_deleted",
    ];
    const KEY_COLUMNS: &'static [usize] = &[0, 1, 3];

    fn fields(&self) -> Vec<String> {
        vec![
            self.base_commit_hash.clone(),
            self.target_commit_hash.clone(),
            self.base_path.clone(),
            self.target_path.clone(),
            self.change_type.clone(),
            self.base_tech_stack.clone().unwrap_or_default(),
            self.target_tech_stack.clone().unwrap_or_default(),
            self.base_file_hash.clone(),
            self.target_file_hash.clone(),
            self.lines_added.to_string(),
            self.lines_deleted.to_string(),
        ]
    }
}

impl CsvRecord for AnalysisResult {
    const FILE: &'static str = "analysis_results.csv";
    const HEADER: &'static [&'static str] =
        &["commit_hash", "path", "analyzer_type", "count", "content"];
    const KEY_COLUMNS: &'static [usize] = &[0, 1, 2];

    fn fields(&self) -> Vec<String> {
        vec![
            self.subject.commit_hash.clone(),
            self.subject.path.clone(),
            self.analyzer.clone(),
            self.count.to_string(),
            self.detail
                .as_ref()
                .map(|detail| detail.to_string())
                .unwrap_or_default(),
        ]
    }
}

impl CsvRecord for FileSnapshotRecord {
    const FILE: &'static str = "file_snapshots.csv";
    const HEADER: &'static [&'static str] = &["commit_file_hash", "content_snapshot"];
    const KEY_COLUMNS: &'static [usize] = &[0];

    fn fields(&self) -> Vec<String> {
        vec![self.file_hash.clone(), self.content.clone()]
    }
}

/// Natural key of a row, one element per key column.
fn row_key<'a>(columns: &[usize], field: impl Fn(usize) -> Option<&'a str>) -> Vec<String> {
    columns
        .iter()
        .map(|&i| field(i).unwrap_or("").to_string())
        .collect()
}

/// The header line exactly as the writer emits it, without terminator.
fn header_line(header: &[&str]) -> Result<String, SinkError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| SinkError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).trim_end_matches(['\r', '\n']).to_string())
}

#[derive(Default)]
struct TableState {
    keys: HashSet<Vec<String>>,
}

/// CSV-backed [`OutputSink`].
pub struct CsvSink {
    dir: PathBuf,
    policy: ConflictPolicy,
    tables: HashMap<&'static str, TableState>,
    analyses: AnalysisIndex,
}

impl CsvSink {
    pub fn new<P: AsRef<Path>>(dir: P, policy: ConflictPolicy) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            policy,
            tables: HashMap::new(),
            analyses: AnalysisIndex::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
        move |source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Open a table for this run: truncate it on a fresh run, or verify and
    /// index it on a resumed one.
    fn ensure_table<R: CsvRecord>(&mut self) -> Result<(), SinkError> {
        if self.tables.contains_key(R::FILE) {
            return Ok(());
        }

        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))?;
        let path = self.dir.join(R::FILE);
        let expected = header_line(R::HEADER)?;
        let mut state = TableState::default();

        let current = match self.policy {
            ConflictPolicy::Skip => existing_header(&path)?,
            ConflictPolicy::Fail => None,
        };

        if let Some(found) = current {
            if found != expected {
                return Err(SinkError::HeaderMismatch {
                    path,
                    expected,
                    found,
                });
            }

            let mut reader = ReaderBuilder::new().has_headers(true).from_path(&path)?;
            let mut record = StringRecord::new();
            while reader.read_record(&mut record)? {
                state.keys.insert(row_key(R::KEY_COLUMNS, |i| record.get(i)));
                if R::FILE == AnalysisResult::FILE {
                    self.analyses.insert(
                        &SubjectKey::new(
                            record.get(0).unwrap_or(""),
                            record.get(1).unwrap_or(""),
                        ),
                        record.get(2).unwrap_or(""),
                    );
                }
            }
            debug!(file = %path.display(), rows = state.keys.len(), "resuming CSV table");
        } else {
            fs::write(&path, format!("{}\n", expected)).map_err(Self::io_err(&path))?;
            debug!(file = %path.display(), "CSV table created");
        }

        self.tables.insert(R::FILE, state);
        Ok(())
    }

    fn append<R: CsvRecord>(
        &mut self,
        rows: &[R],
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, SinkError> {
        self.ensure_table::<R>()?;
        let mut outcome = WriteOutcome::default();
        if rows.is_empty() {
            return Ok(outcome);
        }

        let state = self.tables.entry(R::FILE).or_default();

        // Check every key before writing so a conflict leaves the file untouched.
        let mut batch_keys = HashSet::new();
        let mut accepted = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row.fields();
            let key = row_key(R::KEY_COLUMNS, |i| fields.get(i).map(String::as_str));
            if state.keys.contains(&key) || !batch_keys.insert(key.clone()) {
                match policy {
                    ConflictPolicy::Fail => {
                        return Err(SinkError::Conflict {
                            table: R::FILE,
                            key: key.join(", "),
                        })
                    }
                    ConflictPolicy::Skip => {
                        outcome.duplicates += 1;
                        continue;
                    }
                }
            }
            accepted.push(fields);
        }

        let path = self.dir.join(R::FILE);
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(Self::io_err(&path))?;
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .has_headers(false)
            .from_writer(file);
        for fields in &accepted {
            writer.write_record(fields)?;
        }
        writer.flush().map_err(Self::io_err(&path))?;

        state.keys.extend(batch_keys);
        outcome.written = accepted.len();
        debug!(file = R::FILE, written = outcome.written, duplicates = outcome.duplicates, "CSV rows appended");
        Ok(outcome)
    }
}

/// First line of `path`, or `None` when the file is missing or empty.
fn existing_header(path: &Path) -> Result<Option<String>, SinkError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CsvSink::io_err(path)(e)),
    };

    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .map_err(CsvSink::io_err(path))?;
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

impl OutputSink for CsvSink {
    fn prepare(&mut self) -> Result<(), SinkError> {
        fs::create_dir_all(&self.dir).map_err(Self::io_err(&self.dir))
    }

    fn write_commits(&mut self, rows: &[CommitRecord]) -> Result<WriteOutcome, SinkError> {
        self.append(rows, ConflictPolicy::Skip)
    }

    fn write_commit_files(&mut self, rows: &[CommitFileRecord]) -> Result<WriteOutcome, SinkError> {
        self.append(rows, self.policy)
    }

    fn write_diff_results(&mut self, rows: &[DiffRecord]) -> Result<WriteOutcome, SinkError> {
        self.append(rows, self.policy)
    }

    fn write_analysis_results(&mut self, rows: &[AnalysisResult]) -> Result<WriteOutcome, SinkError> {
        let outcome = self.append(rows, self.policy)?;
        self.analyses.extend_from_results(rows);
        Ok(outcome)
    }

    fn write_file_snapshots(&mut self, rows: &[FileSnapshotRecord]) -> Result<WriteOutcome, SinkError> {
        self.append(rows, ConflictPolicy::Skip)
    }

    fn existing_analyses(&mut self, commits: &[String]) -> Result<AnalysisIndex, SinkError> {
        self.ensure_table::<AnalysisResult>()?;
        let wanted: HashSet<&str> = commits.iter().map(String::as_str).collect();
        Ok(self
            .analyses
            .iter()
            .filter(|(commit, _, _)| wanted.contains(commit.as_str()))
            .cloned()
            .collect())
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        for file in [
            CommitRecord::FILE,
            CommitFileRecord::FILE,
            DiffRecord::FILE,
            AnalysisResult::FILE,
            FileSnapshotRecord::FILE,
        ] {
            let path = self.dir.join(file);
            match fs::remove_file(&path) {
                Ok(()) => debug!(file = %path.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Self::io_err(&path)(e)),
            }
        }
        self.tables.clear();
        self.analyses = AnalysisIndex::new();
        Ok(())
    }
}
