//! SQLite output through sea-orm.
//!
//! The sink owns a Tokio runtime and blocks on every database call, so the
//! rest of the pipeline stays synchronous.

pub mod entities;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, Database,
    DatabaseConnection, DbErr, EntityTrait, IntoActiveModel, QueryFilter, SqlErr, TransactionTrait,
};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::debug;

use self::entities::{git_analysis_result, git_commit, git_commit_file, git_diff_result, git_file_snapshot};
use super::{
    CommitFileRecord, CommitRecord, ConflictPolicy, DiffRecord, FileSnapshotRecord, OutputSink,
    SinkError, WriteOutcome,
};
use crate::dispatch::{AnalysisIndex, AnalysisResult, SubjectKey};

/// Tables in drop order (dependents first).
const TABLES: &[&str] = &[
    "git_file_snapshot",
    "git_analysis_result",
    "git_diff_result",
    "git_commit_file",
    "git_commit",
];

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS git_commit (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        repository TEXT NOT NULL,
        branch TEXT NOT NULL,
        hash TEXT NOT NULL,
        message TEXT NOT NULL,
        author_name TEXT NOT NULL,
        author_email TEXT NOT NULL,
        author_date TEXT NOT NULL,
        committer_name TEXT NOT NULL,
        committer_email TEXT NOT NULL,
        commit_date TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_commit_hash ON git_commit (hash)",
    "CREATE TABLE IF NOT EXISTS git_commit_file (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        commit_hash TEXT NOT NULL,
        path TEXT NOT NULL,
        tech_stack TEXT,
        hash TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_hash_path ON git_commit_file (commit_hash, path)",
    "CREATE TABLE IF NOT EXISTS git_diff_result (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        base_commit_hash TEXT NOT NULL,
        target_commit_hash TEXT NOT NULL,
        base_path TEXT NOT NULL,
        target_path TEXT NOT NULL,
        diff_change_type TEXT NOT NULL,
        base_tech_stack TEXT,
        target_tech_stack TEXT,
        base_file_hash TEXT NOT NULL,
        target_file_hash TEXT NOT NULL,
        lines_added INTEGER NOT NULL,
        lines_deleted INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_base_target_hash
        ON git_diff_result (base_commit_hash, target_commit_hash, target_path)",
    "CREATE TABLE IF NOT EXISTS git_analysis_result (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        commit_hash TEXT NOT NULL,
        path TEXT NOT NULL,
        analyzer_type TEXT NOT NULL,
        count INTEGER NOT NULL,
        content TEXT
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_commit_file_analyzer
        ON git_analysis_result (commit_hash, path, analyzer_type)",
    "CREATE TABLE IF NOT EXISTS git_file_snapshot (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        commit_file_hash TEXT NOT NULL,
        content_snapshot TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_file_hash ON git_file_snapshot (commit_file_hash)",
];

/// Maximum bound parameters per `IN (...)` lookup.
const LOOKUP_CHUNK: usize = 500;

pub async fn establish_connection(db_path: &Path) -> Result<DatabaseConnection, DbErr> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbErr::Custom(format!("Failed to create database directory: {}", e))
            })?;
        }
    }

    let db_url = if db_path.as_os_str() == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite:{}?mode=rwc", db_path.display())
    };

    Database::connect(db_url).await
}

async fn insert_rows<A>(
    db: &DatabaseConnection,
    table: &'static str,
    rows: Vec<(String, A)>,
    policy: ConflictPolicy,
) -> Result<WriteOutcome, SinkError>
where
    A: ActiveModelTrait + Send,
    <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
{
    let mut outcome = WriteOutcome::default();
    if rows.is_empty() {
        return Ok(outcome);
    }

    let txn = db.begin().await?;
    for (key, model) in rows {
        match <A::Entity as EntityTrait>::insert(model)
            .exec_without_returning(&txn)
            .await
        {
            Ok(_) => outcome.written += 1,
            Err(err) => match err.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => match policy {
                    ConflictPolicy::Skip => outcome.duplicates += 1,
                    ConflictPolicy::Fail => {
                        txn.rollback().await?;
                        return Err(SinkError::Conflict { table, key });
                    }
                },
                _ => {
                    txn.rollback().await?;
                    return Err(err.into());
                }
            },
        }
    }
    txn.commit().await?;

    debug!(table, written = outcome.written, duplicates = outcome.duplicates, "rows inserted");
    Ok(outcome)
}

/// SQLite-backed [`OutputSink`].
pub struct SqliteSink {
    db: DatabaseConnection,
    runtime: Runtime,
    path: PathBuf,
    policy: ConflictPolicy,
}

impl SqliteSink {
    pub fn open<P: AsRef<Path>>(path: P, policy: ConflictPolicy) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let runtime = Runtime::new().map_err(|source| SinkError::Io {
            path: path.clone(),
            source,
        })?;
        let db = runtime.block_on(establish_connection(&path))?;
        debug!(database = %path.display(), "connected");

        Ok(Self {
            db,
            runtime,
            path,
            policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create_tables(&self) -> Result<(), SinkError> {
        self.runtime.block_on(async {
            for statement in SCHEMA {
                self.db.execute_unprepared(statement).await?;
            }
            Ok::<_, DbErr>(())
        })?;
        Ok(())
    }
}

impl OutputSink for SqliteSink {
    fn prepare(&mut self) -> Result<(), SinkError> {
        self.create_tables()
    }

    fn write_commits(&mut self, rows: &[CommitRecord]) -> Result<WriteOutcome, SinkError> {
        let models = rows
            .iter()
            .map(|r| {
                let model = git_commit::ActiveModel {
                    repository: Set(r.repository.clone()),
                    branch: Set(r.branch.clone()),
                    hash: Set(r.hash.clone()),
                    message: Set(r.message.clone()),
                    author_name: Set(r.author_name.clone()),
                    author_email: Set(r.author_email.clone()),
                    author_date: Set(r.author_date.clone()),
                    committer_name: Set(r.committer_name.clone()),
                    committer_email: Set(r.committer_email.clone()),
                    commit_date: Set(r.commit_date.clone()),
                    ..Default::default()
                };
                (r.hash.clone(), model)
            })
            .collect();
        self.runtime
            .block_on(insert_rows(&self.db, "git_commit", models, ConflictPolicy::Skip))
    }

    fn write_commit_files(&mut self, rows: &[CommitFileRecord]) -> Result<WriteOutcome, SinkError> {
        let models = rows
            .iter()
            .map(|r| {
                let model = git_commit_file::ActiveModel {
                    commit_hash: Set(r.commit_hash.clone()),
                    path: Set(r.path.clone()),
                    tech_stack: Set(r.tech_stack.clone()),
                    hash: Set(r.hash.clone()),
                    ..Default::default()
                };
                (format!("{}, {}", r.commit_hash, r.path), model)
            })
            .collect();
        self.runtime
            .block_on(insert_rows(&self.db, "git_commit_file", models, self.policy))
    }

    fn write_diff_results(&mut self, rows: &[DiffRecord]) -> Result<WriteOutcome, SinkError> {
        let models = rows
            .iter()
            .map(|r| {
                let model = git_diff_result::ActiveModel {
                    base_commit_hash: Set(r.base_commit_hash.clone()),
                    target_commit_hash: Set(r.target_commit_hash.clone()),
                    base_path: Set(r.base_path.clone()),
                    target_path: Set(r.target_path.clone()),
                    diff_change_type: Set(r.change_type.clone()),
                    base_tech_stack: Set(r.base_tech_stack.clone()),
                    target_tech_stack: Set(r.target_tech_stack.clone()),
                    base_file_hash: Set(r.base_file_hash.clone()),
                    target_file_hash: Set(r.target_file_hash.clone()),
                    lines_added: Set(r.lines_added),
                    lines_deleted: Set(r.lines_deleted),
                    ..Default::default()
                };
                let key = format!(
                    "{}, {}, {}",
                    r.base_commit_hash, r.target_commit_hash, r.target_path
                );
                (key, model)
            })
            .collect();
        self.runtime
            .block_on(insert_rows(&self.db, "git_diff_result", models, self.policy))
    }

    fn write_analysis_results(&mut self, rows: &[AnalysisResult]) -> Result<WriteOutcome, SinkError> {
        let models = rows
            .iter()
            .map(|r| {
                let model = git_analysis_result::ActiveModel {
                    commit_hash: Set(r.subject.commit_hash.clone()),
                    path: Set(r.subject.path.clone()),
                    analyzer_type: Set(r.analyzer.clone()),
                    count: Set(r.count),
                    content: Set(r.detail.as_ref().map(|d| d.to_string())),
                    ..Default::default()
                };
                let key = format!("{}, {}, {}", r.subject.commit_hash, r.subject.path, r.analyzer);
                (key, model)
            })
            .collect();
        self.runtime
            .block_on(insert_rows(&self.db, "git_analysis_result", models, self.policy))
    }

    fn write_file_snapshots(&mut self, rows: &[FileSnapshotRecord]) -> Result<WriteOutcome, SinkError> {
        let models = rows
            .iter()
            .map(|r| {
                let model = git_file_snapshot::ActiveModel {
                    commit_file_hash: Set(r.file_hash.clone()),
                    content_snapshot: Set(r.content.clone()),
                    ..Default::default()
                };
                (r.file_hash.clone(), model)
            })
            .collect();
        self.runtime
            .block_on(insert_rows(&self.db, "git_file_snapshot", models, ConflictPolicy::Skip))
    }

    fn existing_analyses(&mut self, commits: &[String]) -> Result<AnalysisIndex, SinkError> {
        let mut index = AnalysisIndex::new();
        for chunk in commits.chunks(LOOKUP_CHUNK) {
            let rows = self.runtime.block_on(
                git_analysis_result::Entity::find()
                    .filter(git_analysis_result::Column::CommitHash.is_in(chunk.iter().cloned()))
                    .all(&self.db),
            )?;
            for row in rows {
                index.insert(&SubjectKey::new(row.commit_hash, row.path), &row.analyzer_type);
            }
        }
        Ok(index)
    }

    fn reset(&mut self) -> Result<(), SinkError> {
        self.runtime.block_on(async {
            for table in TABLES {
                debug!("DROP TABLE IF EXISTS {};", table);
                self.db
                    .execute_unprepared(&format!("DROP TABLE IF EXISTS {}", table))
                    .await?;
            }
            Ok::<_, DbErr>(())
        })?;
        self.create_tables()
    }
}
