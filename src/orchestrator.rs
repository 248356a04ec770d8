//! Run orchestration.
//!
//! The orchestrator turns a run mode into file versions, sends them through
//! the [`Dispatcher`] in bounded batches and writes every row through the
//! single [`OutputSink`] owner. Within a batch, blobs are read on the calling
//! thread, dispatch fans out over the rayon pool and writes happen back on
//! the calling thread.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::config::PathFilter;
use crate::dispatch::{
    AnalysisIndex, Content, DispatchError, DispatchOutcome, Dispatcher, FileVersion, Side,
    SubjectKey,
};
use crate::git::{is_zero_id, read_content, GitError, RepositoryReader, ZERO_ID};
use crate::sink::{
    CommitFileRecord, CommitRecord, DiffRecord, FileSnapshotRecord, OutputSink, SinkError,
    WriteOutcome,
};
use crate::stack::StackClassifier;

/// File versions per dispatch batch.
pub const DEFAULT_BATCH_SIZE: usize = 256;

const PROGRESS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// What a run walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Every file in one commit (the branch tip when `commit` is `None`).
    Snapshot {
        branch: String,
        commit: Option<String>,
    },
    /// First-parent diffs of every commit on `branch` after `since`.
    History {
        branch: String,
        since: Option<String>,
    },
    /// Changes between two commits of one branch.
    DiffCommits {
        branch: String,
        base: String,
        target: String,
    },
    /// Changes between the tips of two branches.
    DiffBranches { base: String, target: String },
}

impl RunMode {
    pub fn name(&self) -> &'static str {
        match self {
            RunMode::Snapshot { .. } => "snapshot",
            RunMode::History { .. } => "history",
            RunMode::DiffCommits { .. } => "diff",
            RunMode::DiffBranches { .. } => "diff-branch",
        }
    }
}

/// Process-wide cancellation flag, checked between batches and commits.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag on the first Ctrl-C; exit on the second.
    pub fn install_ctrl_c_handler(&self) -> std::io::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let flag = self.clone();

        std::thread::Builder::new()
            .name("git2base-signal".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    while tokio::signal::ctrl_c().await.is_ok() {
                        if flag.is_cancelled() {
                            std::process::exit(130);
                        }
                        tracing::warn!("interrupt received, stopping after the current batch");
                        flag.cancel();
                    }
                })
            })?;

        Ok(())
    }
}

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub batch_size: usize,
    /// Also write decoded blob content to the snapshot table.
    pub save_snapshots: bool,
    /// Report invalid UTF-8 as a decode error instead of replacing it.
    pub strict_utf8: bool,
    pub show_progress: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            save_snapshots: false,
            strict_utf8: false,
            show_progress: true,
        }
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: String,
    pub repository: String,
    /// Commits whose files were read.
    pub commits: usize,
    /// File versions that produced at least one new result.
    pub processed: usize,
    /// File versions with nothing left to run.
    pub skipped: usize,
    /// File versions whose blob was missing or failed to decode.
    pub failed: usize,
    /// Paths dropped by `input.include` / `input.exclude`.
    pub excluded: usize,
    /// File versions no stack rule matched.
    pub unclassified: usize,
    pub results_written: usize,
    /// Rows skipped because their key already existed.
    pub duplicates: usize,
    pub snapshots_written: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn record_writes(&mut self, outcome: WriteOutcome) {
        self.duplicates += outcome.duplicates;
    }
}

/// A file version whose blob has not been read yet.
#[derive(Debug, Clone)]
struct PendingVersion {
    subject: SubjectKey,
    side: Side,
    blob_id: Option<String>,
    tech_stack: Option<String>,
}

/// Drives one run over a repository.
pub struct Orchestrator<'a> {
    reader: &'a dyn RepositoryReader,
    dispatcher: &'a Dispatcher,
    classifier: &'a StackClassifier,
    sink: &'a mut dyn OutputSink,
    filter: PathFilter,
    options: RunOptions,
    cancel: CancelFlag,
    known: AnalysisIndex,
    snapshots_seen: HashSet<String>,
    summary: RunSummary,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        reader: &'a dyn RepositoryReader,
        dispatcher: &'a Dispatcher,
        classifier: &'a StackClassifier,
        sink: &'a mut dyn OutputSink,
    ) -> Self {
        Self {
            reader,
            dispatcher,
            classifier,
            sink,
            filter: PathFilter::allow_all(),
            options: RunOptions::default(),
            cancel: CancelFlag::new(),
            known: AnalysisIndex::new(),
            snapshots_seen: HashSet::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute `mode` and return the totals.
    ///
    /// A cancelled run returns `Ok` with `cancelled` set; rows already
    /// written stay valid and a `--resume` run picks up from them.
    pub fn run(mut self, mode: &RunMode) -> Result<RunSummary, RunError> {
        self.summary.mode = mode.name().to_string();
        self.summary.repository = self.reader.location();
        self.sink.prepare()?;

        tracing::info!(
            mode = mode.name(),
            repository = %self.summary.repository,
            analyzers = self.dispatcher.analyzers().len(),
            "starting run"
        );

        match mode {
            RunMode::Snapshot { branch, commit } => {
                let id = match commit {
                    Some(rev) => self.commit_on_branch(branch, rev)?,
                    None => self.reader.branch_tip(branch)?,
                };
                self.snapshot(branch, &id)?;
            }
            RunMode::History { branch, since } => {
                let since = match since {
                    Some(rev) => Some(self.commit_on_branch(branch, rev)?),
                    None => None,
                };
                self.history(branch, since.as_deref())?;
            }
            RunMode::DiffCommits { branch, base, target } => {
                let base = self.commit_on_branch(branch, base)?;
                let target = self.commit_on_branch(branch, target)?;
                self.diff(branch, Some(&base), branch, &target, false)?;
            }
            RunMode::DiffBranches { base, target } => {
                let base_id = self.reader.branch_tip(base)?;
                let target_id = self.reader.branch_tip(target)?;
                self.diff(base, Some(&base_id), target, &target_id, false)?;
            }
        }

        tracing::info!(
            processed = self.summary.processed,
            skipped = self.summary.skipped,
            results = self.summary.results_written,
            cancelled = self.summary.cancelled,
            "run finished"
        );
        Ok(self.summary)
    }

    /// Resolve `revspec` and check that it is reachable from `branch`.
    fn commit_on_branch(&self, branch: &str, revspec: &str) -> Result<String, RunError> {
        self.reader.branch_tip(branch)?;
        let id = self.reader.resolve(revspec)?;
        if !self.reader.branch_contains(branch, &id)? {
            return Err(GitError::NotOnBranch {
                commit: id,
                branch: branch.to_string(),
            }
            .into());
        }
        Ok(id)
    }

    fn snapshot(&mut self, branch: &str, commit: &str) -> Result<(), RunError> {
        let info = self.reader.commit(commit)?;
        let record = CommitRecord::from_info(&info, &self.summary.repository, branch);
        self.sink.write_commits(&[record])?;

        let mut files = Vec::new();
        let mut pending = Vec::new();
        for entry in self.reader.tree(commit)? {
            if !self.filter.is_included(&entry.path) {
                self.summary.excluded += 1;
                continue;
            }
            let tech_stack = self.classifier.classify(&entry.path).map(str::to_string);
            files.push(CommitFileRecord {
                commit_hash: commit.to_string(),
                path: entry.path.clone(),
                tech_stack: tech_stack.clone(),
                hash: entry.blob_id.clone(),
            });
            pending.push(PendingVersion {
                subject: SubjectKey::new(commit, entry.path),
                side: Side::Snapshot,
                blob_id: Some(entry.blob_id),
                tech_stack,
            });
        }

        tracing::info!(commit = %commit, files = pending.len(), "snapshot");
        let outcome = self.sink.write_commit_files(&files)?;
        self.summary.record_writes(outcome);
        self.summary.commits += 1;

        let bar = self.progress_bar(pending.len(), "files");
        self.process(&[commit.to_string()], pending, &bar)?;
        bar.finish_and_clear();
        Ok(())
    }

    fn history(&mut self, branch: &str, since: Option<&str>) -> Result<(), RunError> {
        let commits = self.reader.walk(branch, since)?;
        tracing::info!(branch = %branch, commits = commits.len(), "walking history");

        let bar = self.progress_bar(commits.len(), "commits");
        for id in &commits {
            if self.cancel.is_cancelled() {
                self.summary.cancelled = true;
                break;
            }
            let info = self.reader.commit(id)?;
            let parent = info.first_parent().map(str::to_string);
            self.diff(branch, parent.as_deref(), branch, id, true)?;
            bar.inc(1);
            if self.summary.cancelled {
                break;
            }
        }
        bar.finish_and_clear();
        Ok(())
    }

    /// Analyze the changes from `base` to `target`. A `None` base diffs
    /// against the empty tree and has no base-side versions.
    fn diff(
        &mut self,
        base_branch: &str,
        base: Option<&str>,
        target_branch: &str,
        target: &str,
        nested: bool,
    ) -> Result<(), RunError> {
        let mut commits = Vec::with_capacity(2);
        let mut records = Vec::with_capacity(2);
        if let Some(base) = base {
            let info = self.reader.commit(base)?;
            records.push(CommitRecord::from_info(&info, &self.summary.repository, base_branch));
            commits.push(base.to_string());
        }
        let info = self.reader.commit(target)?;
        records.push(CommitRecord::from_info(&info, &self.summary.repository, target_branch));
        commits.push(target.to_string());
        self.sink.write_commits(&records)?;

        let base_hash = base.unwrap_or(ZERO_ID);
        let mut rows = Vec::new();
        let mut pending = Vec::new();
        let mut target_paths = HashSet::new();
        let mut queued = HashSet::new();
        for entry in self.reader.diff(base, target)? {
            if !self.filter.is_included(&entry.old_path) && !self.filter.is_included(&entry.new_path) {
                self.summary.excluded += 1;
                continue;
            }
            // One change per target path; a later delta for the same path is dropped.
            if !target_paths.insert(entry.new_path.clone()) {
                tracing::debug!(path = %entry.new_path, status = %entry.change_type, "duplicate delta");
                continue;
            }
            let base_stack = self.classifier.classify(&entry.old_path).map(str::to_string);
            let target_stack = self.classifier.classify(&entry.new_path).map(str::to_string);

            rows.push(DiffRecord {
                base_commit_hash: base_hash.to_string(),
                target_commit_hash: target.to_string(),
                base_path: entry.old_path.clone(),
                target_path: entry.new_path.clone(),
                change_type: entry.change_type.to_string(),
                base_tech_stack: base_stack.clone(),
                target_tech_stack: target_stack.clone(),
                base_file_hash: entry.old_blob.clone(),
                target_file_hash: entry.new_blob.clone(),
                lines_added: entry.lines_added as i64,
                lines_deleted: entry.lines_deleted as i64,
            });

            if let Some(base) = base {
                let subject = SubjectKey::new(base, entry.old_path);
                if queued.insert(subject.clone()) {
                    pending.push(PendingVersion {
                        subject,
                        side: Side::Base,
                        blob_id: Some(entry.old_blob),
                        tech_stack: base_stack,
                    });
                }
            }
            let subject = SubjectKey::new(target, entry.new_path);
            if queued.insert(subject.clone()) {
                pending.push(PendingVersion {
                    subject,
                    side: Side::Target,
                    blob_id: Some(entry.new_blob),
                    tech_stack: target_stack,
                });
            }
        }

        tracing::debug!(base = %base_hash, target = %target, changes = rows.len(), "diff");
        let outcome = self.sink.write_diff_results(&rows)?;
        self.summary.record_writes(outcome);
        self.summary.commits += commits.len();

        let bar = if nested {
            ProgressBar::hidden()
        } else {
            self.progress_bar(pending.len(), "files")
        };
        self.process(&commits, pending, &bar)?;
        bar.finish_and_clear();
        Ok(())
    }

    /// Read, dispatch and store `pending` in batches.
    fn process(
        &mut self,
        commits: &[String],
        pending: Vec<PendingVersion>,
        bar: &ProgressBar,
    ) -> Result<(), RunError> {
        let existing = self.sink.existing_analyses(commits)?;
        self.known.merge(existing);

        let batch_size = self.options.batch_size.max(1);
        let mut remaining = pending.into_iter();
        loop {
            let batch: Vec<PendingVersion> = remaining.by_ref().take(batch_size).collect();
            if batch.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                self.summary.cancelled = true;
                break;
            }

            let versions = batch
                .into_iter()
                .map(|pending| self.load(pending))
                .collect::<Result<Vec<_>, GitError>>()?;

            let dispatcher = self.dispatcher;
            let known = &self.known;
            let outcomes = versions
                .par_iter()
                .map(|version| dispatcher.dispatch(version, known))
                .collect::<Result<Vec<_>, DispatchError>>()?;

            self.store(&versions, outcomes)?;
            bar.inc(versions.len() as u64);
        }
        Ok(())
    }

    fn load(&self, pending: PendingVersion) -> Result<FileVersion, GitError> {
        let content = read_content(
            self.reader,
            pending.blob_id.as_deref(),
            pending.side,
            self.options.strict_utf8,
        )?;
        Ok(FileVersion {
            subject: pending.subject,
            side: pending.side,
            blob_hash: pending.blob_id,
            content,
            tech_stack: pending.tech_stack,
        })
    }

    fn store(&mut self, versions: &[FileVersion], outcomes: Vec<DispatchOutcome>) -> Result<(), RunError> {
        let mut results = Vec::new();
        for (version, outcome) in versions.iter().zip(outcomes) {
            if matches!(version.content, Content::Invalid | Content::DecodeError) {
                self.summary.failed += 1;
            } else if outcome.results.is_empty() {
                self.summary.skipped += 1;
            } else {
                self.summary.processed += 1;
            }
            if outcome.unclassified {
                self.summary.unclassified += 1;
            }
            results.extend(outcome.results);
        }

        if !results.is_empty() {
            let outcome = self.sink.write_analysis_results(&results)?;
            self.summary.results_written += outcome.written;
            self.summary.record_writes(outcome);
            self.known.extend_from_results(&results);
        }

        if self.options.save_snapshots {
            let seen = &mut self.snapshots_seen;
            let rows: Vec<FileSnapshotRecord> = versions
                .iter()
                .filter_map(|version| {
                    let hash = version.blob_hash.as_deref()?;
                    if is_zero_id(hash) || !seen.insert(hash.to_string()) {
                        return None;
                    }
                    Some(FileSnapshotRecord {
                        file_hash: hash.to_string(),
                        content: version.content.stored().to_string(),
                    })
                })
                .collect();
            if !rows.is_empty() {
                self.summary.snapshots_written += self.sink.write_file_snapshots(&rows)?.written;
            }
        }
        Ok(())
    }

    fn progress_bar(&self, len: usize, unit: &str) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(unit.to_string());
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::AnalyzerRegistry;
    use crate::config::Config;
    use crate::git::{CommitInfo, DiffEntry, TreeEntry};
    use crate::sink::{ConflictPolicy, CsvSink};
    use chrono::{FixedOffset, TimeZone};
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// In-memory repository: one branch `main` with commits `c1` -> `c2`.
    struct FakeRepo {
        trees: HashMap<&'static str, Vec<TreeEntry>>,
        blobs: HashMap<&'static str, &'static [u8]>,
        /// Report modifications as a deletion plus an addition of the same path.
        split_modifications: bool,
    }

    impl FakeRepo {
        fn new() -> Self {
            let entry = |path: &str, blob: &str| TreeEntry {
                path: path.to_string(),
                blob_id: blob.to_string(),
            };
            let mut trees = HashMap::new();
            trees.insert("c1", vec![entry("src/a.py", "b1"), entry("logo.png", "b2")]);
            trees.insert(
                "c2",
                vec![entry("src/a.py", "b3"), entry("logo.png", "b2"), entry("README", "b4")],
            );
            let mut blobs: HashMap<&'static str, &'static [u8]> = HashMap::new();
            blobs.insert("b1", b"import os\n");
            blobs.insert("b2", b"\x89PNG\x00\x00");
            blobs.insert("b3", b"import os\nimport sys\n");
            blobs.insert("b4", b"hello");
            Self {
                trees,
                blobs,
                split_modifications: false,
            }
        }
    }

    impl RepositoryReader for FakeRepo {
        fn location(&self) -> String {
            "/fake".to_string()
        }

        fn head_branch(&self) -> Result<String, GitError> {
            Ok("main".to_string())
        }

        fn branch_tip(&self, branch: &str) -> Result<String, GitError> {
            match branch {
                "main" => Ok("c2".to_string()),
                other => Err(GitError::BranchNotFound(other.to_string())),
            }
        }

        fn resolve(&self, revspec: &str) -> Result<String, GitError> {
            match revspec {
                "c1" | "c2" | "x9" => Ok(revspec.to_string()),
                other => Err(GitError::RevisionNotFound(other.to_string())),
            }
        }

        fn branch_contains(&self, _branch: &str, commit: &str) -> Result<bool, GitError> {
            Ok(commit != "x9")
        }

        fn walk(&self, _branch: &str, since: Option<&str>) -> Result<Vec<String>, GitError> {
            Ok(match since {
                Some("c1") => vec!["c2".to_string()],
                _ => vec!["c1".to_string(), "c2".to_string()],
            })
        }

        fn commit(&self, id: &str) -> Result<CommitInfo, GitError> {
            let when = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            Ok(CommitInfo {
                id: id.to_string(),
                message: format!("commit {}", id),
                author_name: "A".to_string(),
                author_email: "a@example.com".to_string(),
                author_date: when,
                committer_name: "A".to_string(),
                committer_email: "a@example.com".to_string(),
                commit_date: when,
                parent_ids: if id == "c2" { vec!["c1".to_string()] } else { vec![] },
            })
        }

        fn tree(&self, commit: &str) -> Result<Vec<TreeEntry>, GitError> {
            self.trees
                .get(commit)
                .cloned()
                .ok_or_else(|| GitError::RevisionNotFound(commit.to_string()))
        }

        fn diff(&self, base: Option<&str>, target: &str) -> Result<Vec<DiffEntry>, GitError> {
            let old: HashMap<String, String> = match base {
                Some(base) => self.tree(base)?.into_iter().map(|e| (e.path, e.blob_id)).collect(),
                None => HashMap::new(),
            };
            let mut entries = Vec::new();
            for entry in self.tree(target)? {
                let (change_type, old_blob) = match old.get(&entry.path) {
                    Some(blob) if *blob == entry.blob_id => continue,
                    Some(blob) => ('M', blob.clone()),
                    None => ('A', ZERO_ID.to_string()),
                };
                if change_type == 'M' && self.split_modifications {
                    entries.push(DiffEntry {
                        old_path: entry.path.clone(),
                        new_path: entry.path.clone(),
                        change_type: 'D',
                        old_blob,
                        new_blob: ZERO_ID.to_string(),
                        lines_added: 0,
                        lines_deleted: 1,
                    });
                    entries.push(DiffEntry {
                        old_path: entry.path.clone(),
                        new_path: entry.path,
                        change_type: 'A',
                        old_blob: ZERO_ID.to_string(),
                        new_blob: entry.blob_id,
                        lines_added: 1,
                        lines_deleted: 0,
                    });
                    continue;
                }
                entries.push(DiffEntry {
                    old_path: entry.path.clone(),
                    new_path: entry.path,
                    change_type,
                    old_blob,
                    new_blob: entry.blob_id,
                    lines_added: 1,
                    lines_deleted: 0,
                });
            }
            Ok(entries)
        }

        fn blob(&self, id: &str) -> Result<Option<Vec<u8>>, GitError> {
            Ok(self.blobs.get(id).map(|bytes| bytes.to_vec()))
        }
    }

    const CONFIG: &str = r#"
output:
  type: csv
stacks:
  - name: Python
    extensions: [py]
analyzers:
  - name: Lines
    class: FileLineCountAnalyzer
    tech_stacks: [All]
  - name: Chars
    class: FileCharCountAnalyzer
    tech_stacks: [Python]
"#;

    fn fixture() -> (Dispatcher, StackClassifier) {
        let config = Config::from_yaml(CONFIG).unwrap();
        let registry = AnalyzerRegistry::with_builtins();
        let loaded = registry.load_from_config(&config.analyzers);
        (Dispatcher::new(&loaded).unwrap(), StackClassifier::new(config.stacks))
    }

    fn quiet() -> RunOptions {
        RunOptions {
            show_progress: false,
            ..Default::default()
        }
    }

    fn run(dir: &TempDir, policy: ConflictPolicy, mode: RunMode) -> Result<RunSummary, RunError> {
        let repo = FakeRepo::new();
        let (dispatcher, classifier) = fixture();
        let mut sink = CsvSink::new(dir.path(), policy);
        Orchestrator::new(&repo, &dispatcher, &classifier, &mut sink)
            .with_options(quiet())
            .run(&mode)
    }

    fn snapshot_mode() -> RunMode {
        RunMode::Snapshot {
            branch: "main".to_string(),
            commit: Some("c1".to_string()),
        }
    }

    #[test]
    fn test_snapshot_run() {
        let dir = TempDir::new().unwrap();
        let summary = run(&dir, ConflictPolicy::Fail, snapshot_mode()).unwrap();

        assert_eq!(summary.commits, 1);
        // a.py: Lines + Chars; logo.png: Lines on binary sentinel.
        assert_eq!(summary.results_written, 3);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.unclassified, 1);
        assert!(!summary.cancelled);

        let rows = fs::read_to_string(dir.path().join("analysis_results.csv")).unwrap();
        assert!(rows.contains("\"c1\",\"logo.png\",\"Lines\",\"0\""));
        assert!(rows.contains("\"c1\",\"src/a.py\",\"Chars\",\"10\""));
    }

    #[test]
    fn test_resume_skips_existing_results() {
        let dir = TempDir::new().unwrap();
        run(&dir, ConflictPolicy::Fail, snapshot_mode()).unwrap();

        let summary = run(&dir, ConflictPolicy::Skip, snapshot_mode()).unwrap();
        assert_eq!(summary.results_written, 0);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.processed, 0);
    }

    #[test]
    fn test_history_root_commit_has_no_base_side() {
        let dir = TempDir::new().unwrap();
        let summary = run(
            &dir,
            ConflictPolicy::Fail,
            RunMode::History {
                branch: "main".to_string(),
                since: None,
            },
        )
        .unwrap();

        let diffs = fs::read_to_string(dir.path().join("diff_results.csv")).unwrap();
        assert!(diffs.contains(&format!("\"{}\",\"c1\",\"src/a.py\"", ZERO_ID)));
        assert!(diffs.contains("\"c1\",\"c2\",\"src/a.py\",\"src/a.py\",\"M\""));
        // c1 is the base of the second diff and was already counted as a target.
        assert_eq!(summary.commits, 3);

        let results = fs::read_to_string(dir.path().join("analysis_results.csv")).unwrap();
        assert!(!results.contains(ZERO_ID));
        // c2/README was added, so its base side c1/README holds sentinel zeros.
        assert!(results.contains("\"c1\",\"README\",\"Lines\",\"0\""));
    }

    #[test]
    fn test_commit_must_be_on_branch() {
        let dir = TempDir::new().unwrap();
        let err = run(
            &dir,
            ConflictPolicy::Fail,
            RunMode::Snapshot {
                branch: "main".to_string(),
                commit: Some("x9".to_string()),
            },
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Git(GitError::NotOnBranch { .. })));
    }

    #[test]
    fn test_cancelled_run_is_partial() {
        let dir = TempDir::new().unwrap();
        let repo = FakeRepo::new();
        let (dispatcher, classifier) = fixture();
        let mut sink = CsvSink::new(dir.path(), ConflictPolicy::Fail);
        let cancel = CancelFlag::new();
        cancel.cancel();

        let summary = Orchestrator::new(&repo, &dispatcher, &classifier, &mut sink)
            .with_options(quiet())
            .with_cancel_flag(cancel)
            .run(&snapshot_mode())
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.results_written, 0);
    }

    #[test]
    fn test_snapshots_written_once_per_blob() {
        let dir = TempDir::new().unwrap();
        let repo = FakeRepo::new();
        let (dispatcher, classifier) = fixture();
        let mut sink = CsvSink::new(dir.path(), ConflictPolicy::Fail);
        let options = RunOptions {
            save_snapshots: true,
            batch_size: 1,
            ..quiet()
        };

        let summary = Orchestrator::new(&repo, &dispatcher, &classifier, &mut sink)
            .with_options(options)
            .with_filter(
                crate::config::InputConfig {
                    exclude: vec!["README".to_string()],
                    ..Default::default()
                }
                .path_filter()
                .unwrap(),
            )
            .run(&RunMode::DiffCommits {
                branch: "main".to_string(),
                base: "c1".to_string(),
                target: "c2".to_string(),
            })
            .unwrap();

        assert_eq!(summary.excluded, 1);
        // b1 (base a.py) and b3 (target a.py); logo.png did not change.
        assert_eq!(summary.snapshots_written, 2);
        let snapshots = fs::read_to_string(dir.path().join("file_snapshots.csv")).unwrap();
        assert!(snapshots.contains("\"b3\",\"import os\nimport sys\n\""));
    }

    #[test]
    fn test_split_deltas_for_one_path_are_analyzed_once() {
        let dir = TempDir::new().unwrap();
        let repo = FakeRepo {
            split_modifications: true,
            ..FakeRepo::new()
        };
        let (dispatcher, classifier) = fixture();
        let mut sink = CsvSink::new(dir.path(), ConflictPolicy::Fail);

        let summary = Orchestrator::new(&repo, &dispatcher, &classifier, &mut sink)
            .with_options(quiet())
            .run(&RunMode::DiffCommits {
                branch: "main".to_string(),
                base: "c1".to_string(),
                target: "c2".to_string(),
            })
            .unwrap();

        let diffs = fs::read_to_string(dir.path().join("diff_results.csv")).unwrap();
        assert_eq!(diffs.matches("\"c1\",\"c2\",\"src/a.py\"").count(), 1);
        // a.py base + target (Lines, Chars each), README base + target (Lines).
        assert_eq!(summary.results_written, 6);
    }
}
