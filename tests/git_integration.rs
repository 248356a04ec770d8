//! End-to-end runs over a temporary Git repository.
//!
//! History built by `fixture_repo`:
//!
//! ```text
//! main:    c1 -- c2
//!                  \
//! feature:          c3
//! ```

use std::fs;
use std::path::Path;

use git2::{Commit, IndexEntry, IndexTime, Oid, Repository, RepositoryInitOptions, Signature, Time};
use git2base::analyzers::AnalyzerRegistry;
use git2base::config::Config;
use git2base::dispatch::Dispatcher;
use git2base::git::{GitError, GitRepository, RepositoryReader, ZERO_ID};
use git2base::orchestrator::{Orchestrator, RunError, RunMode, RunOptions, RunSummary};
use git2base::sink::{ConflictPolicy, CsvSink, OutputSink};
use git2base::stack::StackClassifier;
use tempfile::TempDir;

const CONFIG: &str = r#"
output:
  type: csv
stacks:
  - name: Java
    extensions: [java]
  - name: Config
    extensions: [xml]
analyzers:
  - name: LineCount
    class: FileLineCountAnalyzer
    tech_stacks: [All]
  - name: JavaClasses
    class: RegexMatchCountAnalyzer
    tech_stacks: [Java]
    params:
      patterns: ['\bclass\s+(\w+)']
  - name: XmlElements
    class: XMLElementCountAnalyzer
    tech_stacks: [Config]
"#;

struct Fixture {
    _dir: TempDir,
    repo: GitRepository,
    c1: String,
    c2: String,
    c3: String,
}

const REGULAR: u32 = 0o100644;
const SYMLINK: u32 = 0o120000;

fn index_entry(path: &str, mode: u32) -> IndexEntry {
    IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode,
        uid: 0,
        gid: 0,
        file_size: 0,
        id: Oid::zero(),
        flags: 0,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    }
}

/// Commit a full tree of regular `files` onto `refname`.
fn commit(repo: &Repository, refname: &str, parent: Option<Oid>, files: &[(&str, &[u8])], seconds: i64) -> Oid {
    let entries: Vec<(&str, u32, &[u8])> = files.iter().map(|&(path, content)| (path, REGULAR, content)).collect();
    commit_entries(repo, refname, parent, &entries, seconds)
}

/// Commit a full tree of `(path, mode, content)` entries onto `refname`.
fn commit_entries(
    repo: &Repository,
    refname: &str,
    parent: Option<Oid>,
    files: &[(&str, u32, &[u8])],
    seconds: i64,
) -> Oid {
    let mut index = repo.index().unwrap();
    index.clear().unwrap();
    for (path, mode, content) in files {
        index.add_frombuffer(&index_entry(path, *mode), content).unwrap();
    }
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = Signature::new("Tester", "tester@example.com", &Time::new(seconds, 120)).unwrap();
    let parents: Vec<Commit> = parent.iter().map(|id| repo.find_commit(*id).unwrap()).collect();
    let parent_refs: Vec<&Commit> = parents.iter().collect();
    repo.commit(Some(refname), &sig, &sig, &format!("commit at {}", seconds), &tree, &parent_refs)
        .unwrap()
}

fn fixture_repo() -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(dir.path(), &opts).unwrap();

    let app_v1: &[u8] = b"public class App {\n}\n";
    let app_v2: &[u8] = b"public class App {\n}\nclass Helper {\n}\n";
    let pom: &[u8] = b"<project><version>1</version></project>";
    let readme: &[u8] = b"# demo\n";
    let logo: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    let c1 = commit(
        &repo,
        "refs/heads/main",
        None,
        &[("src/App.java", app_v1), ("pom.xml", pom), ("README.md", readme)],
        1_700_000_000,
    );
    let c2 = commit(
        &repo,
        "refs/heads/main",
        Some(c1),
        &[("src/App.java", app_v2), ("pom.xml", pom), ("logo.png", logo)],
        1_700_000_100,
    );
    let c3 = commit(
        &repo,
        "refs/heads/feature",
        Some(c2),
        &[
            ("src/App.java", app_v2),
            ("pom.xml", pom),
            ("logo.png", logo),
            ("docs/notes.txt", &b"select nothing\n"[..]),
        ],
        1_700_000_200,
    );

    Fixture {
        _dir: dir,
        repo: GitRepository::from_repository(repo),
        c1: c1.to_string(),
        c2: c2.to_string(),
        c3: c3.to_string(),
    }
}

fn run(fixture: &Fixture, out: &Path, policy: ConflictPolicy, mode: RunMode) -> Result<RunSummary, RunError> {
    let config = Config::from_yaml(CONFIG).unwrap();
    let loaded = AnalyzerRegistry::with_builtins().load_from_config(&config.analyzers);
    let dispatcher = Dispatcher::new(&loaded).unwrap();
    let classifier = StackClassifier::new(config.stacks);
    let mut sink = CsvSink::new(out, policy);

    Orchestrator::new(&fixture.repo, &dispatcher, &classifier, &mut sink)
        .with_options(RunOptions {
            show_progress: false,
            ..Default::default()
        })
        .run(&mode)
}

fn read(out: &Path, file: &str) -> String {
    fs::read_to_string(out.join(file)).unwrap()
}

#[test]
fn test_reader_basics() {
    let fixture = fixture_repo();
    let repo = &fixture.repo;

    assert_eq!(repo.head_branch().unwrap(), "main");
    assert_eq!(repo.branch_tip("main").unwrap(), fixture.c2);
    assert_eq!(repo.resolve(&fixture.c1[..7]).unwrap(), fixture.c1);
    assert!(repo.branch_contains("main", &fixture.c1).unwrap());
    assert!(!repo.branch_contains("main", &fixture.c3).unwrap());
    assert!(matches!(repo.branch_tip("nope"), Err(GitError::BranchNotFound(_))));

    assert_eq!(repo.walk("main", None).unwrap(), vec![fixture.c1.clone(), fixture.c2.clone()]);
    assert_eq!(repo.walk("feature", Some(&fixture.c1)).unwrap(), vec![fixture.c2.clone(), fixture.c3.clone()]);

    let info = repo.commit(&fixture.c2).unwrap();
    assert_eq!(info.first_parent(), Some(fixture.c1.as_str()));
    assert_eq!(info.author_date.offset().local_minus_utc(), 2 * 3600);

    let mut paths: Vec<String> = repo.tree(&fixture.c1).unwrap().into_iter().map(|e| e.path).collect();
    paths.sort();
    assert_eq!(paths, vec!["README.md", "pom.xml", "src/App.java"]);
}

#[test]
fn test_reader_diff() {
    let fixture = fixture_repo();
    let mut changes = fixture.repo.diff(Some(&fixture.c1), &fixture.c2).unwrap();
    changes.sort_by(|a, b| a.new_path.cmp(&b.new_path));

    let summary: Vec<(String, char)> = changes.iter().map(|c| (c.new_path.clone(), c.change_type)).collect();
    assert_eq!(
        summary,
        vec![
            ("README.md".to_string(), 'D'),
            ("logo.png".to_string(), 'A'),
            ("src/App.java".to_string(), 'M'),
        ]
    );

    let readme = &changes[0];
    assert_eq!(readme.new_blob, ZERO_ID);
    assert_eq!(readme.lines_deleted, 1);
    let app = &changes[2];
    assert_eq!((app.lines_added, app.lines_deleted), (2, 0));

    let root = fixture.repo.diff(None, &fixture.c1).unwrap();
    assert_eq!(root.len(), 3);
    assert!(root.iter().all(|c| c.change_type == 'A' && c.old_blob == ZERO_ID));
}

#[test]
fn test_snapshot_by_short_hash() {
    let fixture = fixture_repo();
    let out = TempDir::new().unwrap();
    let summary = run(
        &fixture,
        out.path(),
        ConflictPolicy::Fail,
        RunMode::Snapshot {
            branch: "main".to_string(),
            commit: Some(fixture.c1[..8].to_string()),
        },
    )
    .unwrap();

    assert_eq!(summary.commits, 1);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.unclassified, 1);
    // LineCount x3, JavaClasses, XmlElements.
    assert_eq!(summary.results_written, 5);

    let commits = read(out.path(), "commits.csv");
    assert!(commits.contains(&format!("\"main\",\"{}\"", fixture.c1)));
    assert!(commits.contains("2023-11-15T00:13:20+02:00"));

    let results = read(out.path(), "analysis_results.csv");
    assert!(results.contains(&format!("\"{}\",\"pom.xml\",\"XmlElements\",\"2\"", fixture.c1)));
    assert!(results.contains(&format!("\"{}\",\"src/App.java\",\"JavaClasses\",\"1\"", fixture.c1)));
}

#[test]
fn test_snapshot_rerun_needs_resume() {
    let fixture = fixture_repo();
    let out = TempDir::new().unwrap();
    let mode = RunMode::Snapshot {
        branch: "main".to_string(),
        commit: None,
    };

    let first = run(&fixture, out.path(), ConflictPolicy::Fail, mode.clone()).unwrap();
    assert_eq!(first.results_written, 5);

    let resumed = run(&fixture, out.path(), ConflictPolicy::Skip, mode.clone()).unwrap();
    assert_eq!(resumed.results_written, 0);
    assert_eq!(resumed.skipped, 3);
    assert_eq!(read(out.path(), "commits.csv").lines().count(), 2);

    // A fresh run starts over instead of appending.
    let fresh = run(&fixture, out.path(), ConflictPolicy::Fail, mode).unwrap();
    assert_eq!(fresh.results_written, 5);
    assert_eq!(read(out.path(), "analysis_results.csv").lines().count(), 6);
}

#[test]
fn test_diff_commits() {
    let fixture = fixture_repo();
    let out = TempDir::new().unwrap();
    let summary = run(
        &fixture,
        out.path(),
        ConflictPolicy::Fail,
        RunMode::DiffCommits {
            branch: "main".to_string(),
            base: fixture.c1.clone(),
            target: fixture.c2.clone(),
        },
    )
    .unwrap();
    assert_eq!(summary.commits, 2);

    let diffs = read(out.path(), "diff_results.csv");
    assert_eq!(diffs.lines().count(), 4);
    assert!(diffs.contains(&format!(
        "\"{}\",\"{}\",\"src/App.java\",\"src/App.java\",\"M\",\"Java\",\"Java\"",
        fixture.c1, fixture.c2
    )));

    let results = read(out.path(), "analysis_results.csv");
    // Deleted on the target side, added on the base side: sentinel zeros.
    assert!(results.contains(&format!("\"{}\",\"README.md\",\"LineCount\",\"0\"", fixture.c2)));
    assert!(results.contains(&format!("\"{}\",\"logo.png\",\"LineCount\",\"0\"", fixture.c1)));
    assert!(results.contains(&format!("\"{}\",\"src/App.java\",\"JavaClasses\",\"2\"", fixture.c2)));
    assert!(results.contains(&format!("\"{}\",\"src/App.java\",\"JavaClasses\",\"1\"", fixture.c1)));
}

/// `link.txt` is a regular file in c1 and a symlink to `README.md` in c2.
fn typechange_repo() -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(dir.path(), &opts).unwrap();

    let readme: &[u8] = b"# demo\n";
    let c1 = commit_entries(
        &repo,
        "refs/heads/main",
        None,
        &[("README.md", REGULAR, readme), ("link.txt", REGULAR, &b"hello\n"[..])],
        1_700_000_000,
    );
    let c2 = commit_entries(
        &repo,
        "refs/heads/main",
        Some(c1),
        &[("README.md", REGULAR, readme), ("link.txt", SYMLINK, &b"README.md"[..])],
        1_700_000_100,
    );

    Fixture {
        _dir: dir,
        repo: GitRepository::from_repository(repo),
        c1: c1.to_string(),
        c2: c2.to_string(),
        c3: c2.to_string(),
    }
}

#[test]
fn test_file_replaced_by_symlink_is_one_change() {
    let fixture = typechange_repo();
    let changes = fixture.repo.diff(Some(&fixture.c1), &fixture.c2).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].new_path, "link.txt");
    assert_eq!(changes[0].change_type, 'T');

    let out = TempDir::new().unwrap();
    let summary = run(
        &fixture,
        out.path(),
        ConflictPolicy::Fail,
        RunMode::DiffCommits {
            branch: "main".to_string(),
            base: fixture.c1.clone(),
            target: fixture.c2.clone(),
        },
    )
    .unwrap();
    assert_eq!(summary.results_written, 2);

    let diffs = read(out.path(), "diff_results.csv");
    assert_eq!(diffs.lines().count(), 2);
    assert!(diffs.contains(&format!(
        "\"{}\",\"{}\",\"link.txt\",\"link.txt\",\"T\"",
        fixture.c1, fixture.c2
    )));

    let results = read(out.path(), "analysis_results.csv");
    assert!(results.contains(&format!("\"{}\",\"link.txt\",\"LineCount\",\"2\"", fixture.c1)));
    assert!(results.contains(&format!("\"{}\",\"link.txt\",\"LineCount\",\"1\"", fixture.c2)));
}

#[test]
fn test_diff_rejects_commit_off_branch() {
    let fixture = fixture_repo();
    let out = TempDir::new().unwrap();
    let err = run(
        &fixture,
        out.path(),
        ConflictPolicy::Fail,
        RunMode::DiffCommits {
            branch: "main".to_string(),
            base: fixture.c1.clone(),
            target: fixture.c3.clone(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, RunError::Git(GitError::NotOnBranch { .. })));
}

#[test]
fn test_diff_branches() {
    let fixture = fixture_repo();
    let out = TempDir::new().unwrap();
    let summary = run(
        &fixture,
        out.path(),
        ConflictPolicy::Fail,
        RunMode::DiffBranches {
            base: "main".to_string(),
            target: "feature".to_string(),
        },
    )
    .unwrap();
    assert_eq!(summary.unclassified, 2);

    let diffs = read(out.path(), "diff_results.csv");
    assert_eq!(diffs.lines().count(), 2);
    assert!(diffs.contains("\"docs/notes.txt\",\"A\""));

    let commits = read(out.path(), "commits.csv");
    assert!(commits.contains(&format!("\"feature\",\"{}\"", fixture.c3)));
}

#[test]
fn test_history_since() {
    let fixture = fixture_repo();
    let out = TempDir::new().unwrap();
    let summary = run(
        &fixture,
        out.path(),
        ConflictPolicy::Fail,
        RunMode::History {
            branch: "feature".to_string(),
            since: Some(fixture.c1[..7].to_string()),
        },
    )
    .unwrap();

    // c1 -> c2 and c2 -> c3.
    assert_eq!(summary.commits, 4);
    let diffs = read(out.path(), "diff_results.csv");
    assert_eq!(diffs.lines().count(), 1 + 3 + 1);
    assert!(!diffs.contains(&format!("\"{}\",\"{}\"", ZERO_ID, fixture.c1)));
}

#[cfg(feature = "sqlite")]
#[test]
fn test_sqlite_snapshot_and_resume() {
    use git2base::sink::SqliteSink;

    let fixture = fixture_repo();
    let out = TempDir::new().unwrap();
    let db = out.path().join("git2base.db");

    let config = Config::from_yaml(CONFIG).unwrap();
    let loaded = AnalyzerRegistry::with_builtins().load_from_config(&config.analyzers);
    let dispatcher = Dispatcher::new(&loaded).unwrap();
    let classifier = StackClassifier::new(config.stacks);
    let mode = RunMode::Snapshot {
        branch: "main".to_string(),
        commit: None,
    };
    let options = RunOptions {
        show_progress: false,
        save_snapshots: true,
        ..Default::default()
    };

    let mut sink = SqliteSink::open(&db, ConflictPolicy::Fail).unwrap();
    let first = Orchestrator::new(&fixture.repo, &dispatcher, &classifier, &mut sink)
        .with_options(options.clone())
        .run(&mode)
        .unwrap();
    assert_eq!(first.results_written, 5);
    assert_eq!(first.snapshots_written, 3);
    drop(sink);

    let mut sink = SqliteSink::open(&db, ConflictPolicy::Skip).unwrap();
    assert_eq!(sink.existing_analyses(&[fixture.c2.clone()]).unwrap().len(), 5);
    let resumed = Orchestrator::new(&fixture.repo, &dispatcher, &classifier, &mut sink)
        .with_options(options)
        .run(&mode)
        .unwrap();
    assert_eq!(resumed.results_written, 0);
    assert_eq!(resumed.skipped, 3);

    sink.reset().unwrap();
    sink.prepare().unwrap();
    assert!(sink.existing_analyses(&[fixture.c2.clone()]).unwrap().is_empty());
}
