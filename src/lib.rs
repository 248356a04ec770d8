//! git2base - Git history metrics.
//!
//! git2base walks a repository's commits or diffs, runs pluggable per-file
//! analyzers over every file version and stores the results in SQLite or CSV.
//!
//! # Architecture
//!
//! - `analyzers`: the `Analyzer` trait, built-ins, the registry and user extensions
//! - `stack`: ordered tech-stack classification of paths
//! - `dispatch`: matches file versions to analyzers and runs each at most once
//! - `git`: the `RepositoryReader` trait and its `git2` implementation
//! - `sink`: the `OutputSink` trait with CSV and SQLite backends
//! - `orchestrator`: run modes, batching and cancellation
//! - `config`: YAML configuration
//! - `report`: output formatting (pretty, JSON)
//!
//! # Adding an Analyzer
//!
//! Implement `Analyzer` and register a factory with
//! `AnalyzerRegistry::register_extension`, or drop a YAML definition that
//! wraps a built-in into the configured extension directory.

pub mod analyzers;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod git;
pub mod orchestrator;
pub mod report;
pub mod sink;
pub mod stack;

pub use analyzers::{AnalysisOutput, Analyzer, AnalyzerRegistry, TestCase};
pub use config::{Config, ConfigStore};
pub use dispatch::{AnalysisResult, Dispatcher, FileVersion};
pub use git::{GitRepository, RepositoryReader};
pub use orchestrator::{CancelFlag, Orchestrator, RunMode, RunOptions, RunSummary};
pub use sink::{ConflictPolicy, OutputSink};
pub use stack::StackClassifier;
