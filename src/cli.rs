//! Command-line interface for git2base.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::analyzers::{selfcheck, AnalyzerRegistry, LoadError};
use crate::config::{self, Config, ConfigStore, OutputConfig, OutputKind};
use crate::dispatch::Dispatcher;
use crate::git::{GitError, GitRepository, RepositoryReader};
use crate::orchestrator::{CancelFlag, Orchestrator, RunMode, RunOptions, DEFAULT_BATCH_SIZE};
use crate::report;
use crate::sink::{self, ConflictPolicy};
use crate::stack::StackClassifier;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Configuration template written by `init`.
const CONFIG_TEMPLATE: &str = include_str!("templates/git2base.yaml");

/// Git history metrics.
///
/// git2base walks a repository's commits or diffs, runs the configured
/// analyzers over every file version and stores commit, diff and analysis
/// rows in SQLite or CSV.
#[derive(Parser)]
#[command(name = "git2base")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze every file of one commit
    Snapshot(SnapshotArgs),
    /// Analyze the changes of every commit after a starting point
    History(HistoryArgs),
    /// Analyze the changes between two commits of a branch
    Diff(DiffArgs),
    /// Analyze the changes between the tips of two branches
    DiffBranch(DiffBranchArgs),
    /// Delete every stored row
    #[command(visible_alias = "reset-db")]
    Reset(ResetArgs),
    /// Create a git2base config file from the template
    Init(InitArgs),
    /// List registered analyzers, or run their fixtures with --check
    Analyzers(AnalyzersArgs),
}

/// Flags shared by every run mode.
#[derive(Args, Clone)]
pub struct RunArgs {
    /// Path to the Git repository
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Path to the config file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured output: csv or sqlite
    #[arg(short, long)]
    pub output: Option<String>,

    /// Keep existing rows and skip work already stored
    #[arg(long)]
    pub resume: bool,

    /// Also store decoded file contents
    #[arg(long)]
    pub save_snapshots: bool,

    /// Summary format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// File versions per dispatch batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

#[derive(Args)]
pub struct SnapshotArgs {
    /// Commit to analyze, short hashes allowed (default: branch tip)
    pub commit: Option<String>,

    /// Branch the commit must be on (default: the checked-out branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args)]
pub struct HistoryArgs {
    /// Only commits after this one are analyzed (default: from the root)
    pub since: Option<String>,

    /// Branch to walk (default: the checked-out branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Base commit, short hashes allowed
    pub base: String,

    /// Target commit, short hashes allowed
    pub target: String,

    /// Branch both commits must be on (default: the checked-out branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args)]
pub struct DiffBranchArgs {
    /// Base branch
    pub base: String,

    /// Target branch
    pub target: String,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args)]
pub struct ResetArgs {
    /// Path to the config file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the configured output: csv or sqlite
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "git2base.yaml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct AnalyzersArgs {
    /// Path to the config file; its extension directory is loaded if present
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run every analyzer's fixtures
    #[arg(long)]
    pub check: bool,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

/// Dispatch a parsed command line to its command function.
pub fn run(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Commands::Snapshot(args) => run_snapshot(args),
        Commands::History(args) => run_history(args),
        Commands::Diff(args) => run_diff(args),
        Commands::DiffBranch(args) => run_diff_branch(args),
        Commands::Reset(args) => run_reset(args),
        Commands::Init(args) => run_init(args),
        Commands::Analyzers(args) => run_analyzers(args),
    }
}

/// Run the snapshot command.
pub fn run_snapshot(args: &SnapshotArgs) -> anyhow::Result<i32> {
    execute(&args.run, |repo| {
        Ok(RunMode::Snapshot {
            branch: branch_or_head(repo, args.branch.as_deref())?,
            commit: args.commit.clone(),
        })
    })
}

/// Run the history command.
pub fn run_history(args: &HistoryArgs) -> anyhow::Result<i32> {
    execute(&args.run, |repo| {
        Ok(RunMode::History {
            branch: branch_or_head(repo, args.branch.as_deref())?,
            since: args.since.clone(),
        })
    })
}

/// Run the diff command.
pub fn run_diff(args: &DiffArgs) -> anyhow::Result<i32> {
    execute(&args.run, |repo| {
        Ok(RunMode::DiffCommits {
            branch: branch_or_head(repo, args.branch.as_deref())?,
            base: args.base.clone(),
            target: args.target.clone(),
        })
    })
}

/// Run the diff-branch command.
pub fn run_diff_branch(args: &DiffBranchArgs) -> anyhow::Result<i32> {
    execute(&args.run, |_| {
        Ok(RunMode::DiffBranches {
            base: args.base.clone(),
            target: args.target.clone(),
        })
    })
}

fn branch_or_head(repo: &dyn RepositoryReader, branch: Option<&str>) -> Result<String, GitError> {
    match branch {
        Some(branch) => Ok(branch.to_string()),
        None => repo.head_branch(),
    }
}

fn execute<F>(args: &RunArgs, mode: F) -> anyhow::Result<i32>
where
    F: FnOnce(&dyn RepositoryReader) -> Result<RunMode, GitError>,
{
    if args.format != "pretty" && args.format != "json" {
        eprintln!("Error: invalid format {:?}, must be 'pretty' or 'json'", args.format);
        return Ok(EXIT_ERROR);
    }

    let Some(mut store) = load_config(args.config.as_deref()) else {
        return Ok(EXIT_ERROR);
    };
    let config = store.config();
    let config_path = store.path().to_path_buf();
    let output = match output_override(&config.output, args.output.as_deref()) {
        Ok(output) => output,
        Err(code) => return Ok(code),
    };

    let mut registry = AnalyzerRegistry::with_builtins();
    let mut load_errors = load_extensions(&mut registry, &config, &config_path);
    let loaded = registry.load_from_config(&config.analyzers);
    load_errors.extend(loaded.errors.iter().map(LoadError::to_string));

    let dispatcher = match Dispatcher::new(&loaded) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if dispatcher.is_empty() {
        tracing::warn!("no analyzers resolved; only commit and diff rows will be written");
    }
    let classifier = StackClassifier::new(config.stacks.clone());
    let filter = config.input.path_filter()?;

    let repo = match GitRepository::open(&args.repo) {
        Ok(repo) => repo,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    let mode = match mode(&repo) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let policy = if args.resume {
        ConflictPolicy::Skip
    } else {
        ConflictPolicy::Fail
    };
    let mut sink = sink::open_sink(&output, policy)?;

    let cancel = CancelFlag::new();
    if let Err(e) = cancel.install_ctrl_c_handler() {
        tracing::warn!("could not install Ctrl-C handler: {}", e);
    }

    let options = RunOptions {
        batch_size: args.batch_size,
        save_snapshots: args.save_snapshots,
        strict_utf8: config.input.strict_utf8,
        show_progress: !args.no_progress && args.format == "pretty",
    };

    let summary = Orchestrator::new(&repo, &dispatcher, &classifier, sink.as_mut())
        .with_filter(filter)
        .with_options(options)
        .with_cancel_flag(cancel)
        .run(&mode);
    let summary = match summary {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    note_config_change(&mut store);

    let config_str = config_path.to_string_lossy().to_string();
    let output_str = describe_output(&output);
    match args.format.as_str() {
        "json" => report::write_run_json(&config_str, &output_str, &load_errors, &summary)?,
        _ => report::write_run_pretty(&config_str, &output_str, &load_errors, &summary),
    }

    if summary.cancelled {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Discover, parse and validate the config, printing any error.
fn load_config(explicit: Option<&Path>) -> Option<ConfigStore> {
    let path = match config::discover(explicit) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'git2base init' to create a config file");
            return None;
        }
    };

    match ConfigStore::load(&path) {
        Ok(store) => {
            tracing::debug!(path = %store.path().display(), "config loaded");
            Some(store)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            None
        }
    }
}

/// Check the config file once a run is over. A run keeps the configuration
/// it started with; edits made meanwhile apply to the next run.
fn note_config_change(store: &mut ConfigStore) -> bool {
    match store.refresh_if_stale() {
        Ok(true) => {
            tracing::warn!(
                path = %store.path().display(),
                "config file changed during the run; the new settings apply to the next run"
            );
            true
        }
        Ok(false) => false,
        Err(e) => {
            tracing::warn!("config file changed during the run and no longer loads: {}", e);
            true
        }
    }
}

fn output_override(output: &OutputConfig, kind: Option<&str>) -> Result<OutputConfig, i32> {
    let mut output = output.clone();
    match kind {
        None => {}
        Some("csv") => output.kind = OutputKind::Csv,
        Some("sqlite") => output.kind = OutputKind::Sqlite,
        Some(other) => {
            eprintln!("Error: invalid output {:?}, must be 'csv' or 'sqlite'", other);
            return Err(EXIT_ERROR);
        }
    }
    Ok(output)
}

fn describe_output(output: &OutputConfig) -> String {
    match output.kind {
        OutputKind::Csv => format!("csv ({})", output.csv.path.display()),
        OutputKind::Sqlite => format!("sqlite ({})", output.sqlite.database.display()),
    }
}

/// Load the config's extension directory, resolved against the config file.
fn load_extensions(registry: &mut AnalyzerRegistry, config: &Config, config_path: &Path) -> Vec<String> {
    let Some(extensions) = &config.extensions else {
        return Vec::new();
    };

    let dir = if extensions.dir.is_absolute() {
        extensions.dir.clone()
    } else {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&extensions.dir)
    };

    registry
        .load_extensions_dir(&dir)
        .iter()
        .map(LoadError::to_string)
        .collect()
}

/// Run the reset command.
pub fn run_reset(args: &ResetArgs) -> anyhow::Result<i32> {
    let Some(store) = load_config(args.config.as_deref()) else {
        return Ok(EXIT_ERROR);
    };
    let config = store.config();
    let output = match output_override(&config.output, args.output.as_deref()) {
        Ok(output) => output,
        Err(code) => return Ok(code),
    };

    let mut sink = sink::open_sink(&output, ConflictPolicy::Fail)?;
    sink.reset()?;
    tracing::info!(output = %describe_output(&output), "output reset");
    println!("Reset {}", describe_output(&output));
    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() && !args.force {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it, pass --force, or use --output to choose another path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, CONFIG_TEMPLATE) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the stacks and analyzers in {}", args.output.display());
    println!("  2. Run: git2base snapshot --repo <path> --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

/// Run the analyzers command.
pub fn run_analyzers(args: &AnalyzersArgs) -> anyhow::Result<i32> {
    if args.format != "pretty" && args.format != "json" {
        eprintln!("Error: invalid format {:?}, must be 'pretty' or 'json'", args.format);
        return Ok(EXIT_ERROR);
    }

    let mut registry = AnalyzerRegistry::with_builtins();
    if let Some(explicit) = args.config.as_deref() {
        let Some(store) = load_config(Some(explicit)) else {
            return Ok(EXIT_ERROR);
        };
        for error in load_extensions(&mut registry, &store.config(), store.path()) {
            eprintln!("Warning: {}", error);
        }
    }

    let reports = selfcheck::check_registry(&registry);
    match args.format.as_str() {
        "json" => report::write_check_json(&reports)?,
        _ => report::write_check_pretty(&reports, args.check),
    }

    if args.check && !reports.iter().all(|r| r.is_ok()) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}
