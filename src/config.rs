//! Configuration schema for git2base.
//!
//! A configuration file declares where results are written, how file paths
//! are classified into technology stacks, and which analyzers run on which
//! stacks. The parsed configuration lives in a [`ConfigStore`], which is built
//! once at startup and handed to every component by reference.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Stack name that makes an analyzer apply to every file, classified or not.
pub const WILDCARD_STACK: &str = "All";

/// Default configuration file names to search for in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["git2base.yaml", ".git2base.yaml"];

/// Opaque analyzer constructor parameters.
pub type AnalyzerParams = serde_json::Map<String, serde_json::Value>;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    pub output: OutputConfig,
    /// Ordered stack rules. Order matters: the first matching rule wins.
    #[serde(default)]
    pub stacks: Vec<StackRule>,
    #[serde(default)]
    pub analyzers: Vec<AnalyzerDescriptor>,
    /// Where user-defined analyzer definitions are loaded from.
    #[serde(default)]
    pub extensions: Option<ExtensionsConfig>,
}

impl Config {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|source| ConfigError::Yaml {
            path: PathBuf::from("<inline>"),
            source,
        })
    }
}

/// Which repository paths take part in a run.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct InputConfig {
    /// Glob patterns or directory prefixes; when non-empty a path must match one.
    #[serde(default)]
    pub include: Vec<String>,
    /// Glob patterns or directory prefixes to skip.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Reject blobs that are not valid UTF-8 instead of replacing bad sequences.
    #[serde(default)]
    pub strict_utf8: bool,
}

impl InputConfig {
    /// Compile the include/exclude lists into a matcher.
    pub fn path_filter(&self) -> Result<PathFilter, ConfigError> {
        Ok(PathFilter {
            include: PathPatterns::compile("include", &self.include)?,
            exclude: PathPatterns::compile("exclude", &self.exclude)?,
        })
    }
}

/// Compiled `input.include` / `input.exclude` lists.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: PathPatterns,
    exclude: PathPatterns,
}

impl PathFilter {
    /// A filter that lets every path through.
    pub fn allow_all() -> Self {
        Self {
            include: PathPatterns::default(),
            exclude: PathPatterns::default(),
        }
    }

    /// Returns whether `path` (repository-relative, `/`-separated) is analyzed.
    pub fn is_included(&self, path: &str) -> bool {
        if !self.include.is_empty() && !self.include.matches(path) {
            return false;
        }
        !self.exclude.matches(path)
    }
}

#[derive(Debug, Clone, Default)]
struct PathPatterns {
    prefixes: Vec<String>,
    globs: Option<GlobSet>,
}

impl PathPatterns {
    fn compile(field: &str, patterns: &[String]) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Ok(Self::default());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("invalid input.{} pattern {:?}: {}", field, pattern, e))
            })?;
            builder.add(glob);
        }
        let globs = builder.build().map_err(|e| {
            ConfigError::Invalid(format!("compiling input.{} patterns: {}", field, e))
        })?;

        Ok(Self {
            prefixes: patterns
                .iter()
                .map(|p| p.trim_end_matches('/').to_string())
                .collect(),
            globs: Some(globs),
        })
    }

    fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    fn matches(&self, path: &str) -> bool {
        let prefixed = self.prefixes.iter().any(|prefix| {
            path == prefix
                || (path.starts_with(prefix.as_str())
                    && path[prefix.len()..].starts_with('/'))
        });
        prefixed || self.globs.as_ref().map(|g| g.is_match(path)).unwrap_or(false)
    }
}

/// Output backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Csv,
    Sqlite,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Csv => write!(f, "csv"),
            OutputKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Output section.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    #[serde(default)]
    pub csv: CsvOutputConfig,
    #[serde(default)]
    pub sqlite: SqliteOutputConfig,
}

/// CSV output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CsvOutputConfig {
    /// Directory the CSV files are written to (default: `data`)
    #[serde(default = "default_csv_path")]
    pub path: PathBuf,
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("data")
}

impl Default for CsvOutputConfig {
    fn default() -> Self {
        Self {
            path: default_csv_path(),
        }
    }
}

/// SQLite output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteOutputConfig {
    /// Database file path (default: `git2base.db`)
    #[serde(default = "default_sqlite_database")]
    pub database: PathBuf,
}

fn default_sqlite_database() -> PathBuf {
    PathBuf::from("git2base.db")
}

impl Default for SqliteOutputConfig {
    fn default() -> Self {
        Self {
            database: default_sqlite_database(),
        }
    }
}

/// A named technology stack and the paths/extensions that select it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StackRule {
    pub name: String,
    /// Path prefixes; empty means any path.
    #[serde(default)]
    pub paths: Vec<String>,
    /// File extensions without the dot; empty means any extension.
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// One configured analyzer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalyzerDescriptor {
    /// Unique name, stored with every result this analyzer produces.
    pub name: String,
    /// Registry key of the implementation.
    #[serde(rename = "class", alias = "implementation")]
    pub implementation: String,
    /// Stacks this analyzer applies to, or `All`.
    #[serde(rename = "tech_stacks", default)]
    pub tech_stacks: Vec<String>,
    #[serde(default)]
    pub params: AnalyzerParams,
}

impl AnalyzerDescriptor {
    /// Returns whether this analyzer applies to every file.
    pub fn is_wildcard(&self) -> bool {
        self.tech_stacks.iter().any(|s| s == WILDCARD_STACK)
    }

    /// Returns whether this analyzer runs on a file classified as `stack`.
    pub fn applies_to(&self, stack: Option<&str>) -> bool {
        if self.is_wildcard() {
            return true;
        }
        match stack {
            Some(stack) => self.tech_stacks.iter().any(|s| s == stack),
            None => false,
        }
    }
}

/// User extension settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtensionsConfig {
    /// Directory scanned once at startup for `*.yaml` analyzer definitions.
    pub dir: PathBuf,
}

/// Validate a configuration for correctness.
///
/// Structural problems are errors. A missing `stacks` or `analyzers` section
/// is legal but almost certainly a mistake, so it is logged.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.stacks.is_empty() {
        tracing::warn!(
            "no 'stacks' defined in config; files will not be classified and only analyzers with tech_stacks set to 'All' will run"
        );
    }
    if config.analyzers.is_empty() {
        tracing::warn!("no 'analyzers' defined in config; no analysis will be applied");
    }

    let mut stack_names = HashSet::new();
    for rule in &config.stacks {
        if rule.name.trim().is_empty() {
            return Err(ConfigError::Invalid("stack rule with empty name".to_string()));
        }
        if rule.name == WILDCARD_STACK {
            return Err(ConfigError::Invalid(format!(
                "stack name {:?} is reserved for the wildcard",
                WILDCARD_STACK
            )));
        }
        if !stack_names.insert(rule.name.as_str()) {
            tracing::warn!(stack = %rule.name, "stack declared more than once; later rules only match what earlier ones miss");
        }
    }

    let mut analyzer_names = HashSet::new();
    for descriptor in &config.analyzers {
        if descriptor.name.trim().is_empty() {
            return Err(ConfigError::Invalid("analyzer with empty name".to_string()));
        }
        if descriptor.implementation.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "analyzer {:?} has no class",
                descriptor.name
            )));
        }
        if !analyzer_names.insert(descriptor.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate analyzer name {:?}",
                descriptor.name
            )));
        }
        if descriptor.tech_stacks.is_empty() {
            tracing::warn!(analyzer = %descriptor.name, "analyzer has no tech_stacks and will never run");
        }
        for stack in &descriptor.tech_stacks {
            if stack != WILDCARD_STACK && !stack_names.contains(stack.as_str()) {
                tracing::warn!(analyzer = %descriptor.name, stack = %stack, "analyzer references an undeclared stack");
            }
        }
    }

    if config.output.kind == OutputKind::Csv && config.output.csv.path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid("output.csv.path must not be empty".to_string()));
    }

    config.input.path_filter()?;

    Ok(())
}

/// Locate the configuration file.
///
/// Search order: explicit path, the default names in the working directory,
/// then `config.yaml` in the per-user config directory.
pub fn discover(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    for name in DEFAULT_CONFIG_NAMES {
        let path = PathBuf::from(name);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "git2base") {
        let path = dirs.config_dir().join("config.yaml");
        if path.exists() {
            return Ok(path);
        }
    }

    Err(ConfigError::Invalid(format!(
        "no config file found (looked for {})",
        DEFAULT_CONFIG_NAMES.join(", ")
    )))
}

/// Loaded configuration plus the file it came from.
///
/// Reloading is explicit: callers decide when [`ConfigStore::refresh_if_stale`]
/// runs, so a run never observes a config change half way through. The CLI
/// checks once a run has finished and warns when the file moved on.
pub struct ConfigStore {
    path: PathBuf,
    config: Arc<Config>,
    modified: Option<SystemTime>,
}

impl ConfigStore {
    /// Load and validate the configuration at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let modified = modified_time(&path)?;
        let config = Config::parse_file(&path)?;
        validate(&config)?;

        Ok(Self {
            path,
            config: Arc::new(config),
            modified,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current configuration.
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Re-read the file if its modification time moved forward.
    ///
    /// Returns `true` when a new configuration was loaded. On error the
    /// previous configuration stays in place.
    pub fn refresh_if_stale(&mut self) -> Result<bool, ConfigError> {
        let modified = modified_time(&self.path)?;
        let stale = match (modified, self.modified) {
            (Some(now), Some(seen)) => now > seen,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !stale {
            return Ok(false);
        }

        let config = Config::parse_file(&self.path)?;
        validate(&config)?;
        self.config = Arc::new(config);
        self.modified = modified;
        tracing::info!(path = %self.path.display(), "configuration reloaded");
        Ok(true)
    }
}

fn modified_time(path: &Path) -> Result<Option<SystemTime>, ConfigError> {
    let metadata = fs::metadata(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(metadata.modified().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
output:
  type: csv
  csv:
    path: out
stacks:
  - name: XML
    extensions: ["xml"]
  - name: Python
    paths: ["src"]
    extensions: ["py"]
analyzers:
  - name: FileLineCount
    class: FileLineCountAnalyzer
    tech_stacks: ["All"]
  - name: XMLElementCount
    class: XMLElementCountAnalyzer
    tech_stacks: ["XML"]
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.output.kind, OutputKind::Csv);
        assert_eq!(config.output.csv.path, PathBuf::from("out"));
        assert_eq!(config.stacks.len(), 2);
        assert!(config.stacks[0].paths.is_empty());
        assert_eq!(config.analyzers[1].implementation, "XMLElementCountAnalyzer");
        assert!(config.analyzers[0].params.is_empty());
        validate(&config).unwrap();
    }

    #[test]
    fn test_missing_output_section_is_an_error() {
        let err = Config::from_yaml("stacks: []\n").unwrap_err();
        assert!(err.to_string().contains("output"));
    }

    #[test]
    fn test_implementation_alias() {
        let yaml = r#"
output: { type: sqlite }
analyzers:
  - name: Lines
    implementation: FileLineCountAnalyzer
    tech_stacks: [All]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.analyzers[0].implementation, "FileLineCountAnalyzer");
        assert_eq!(config.output.sqlite.database, PathBuf::from("git2base.db"));
    }

    #[test]
    fn test_duplicate_analyzer_names_rejected() {
        let yaml = r#"
output: { type: csv }
analyzers:
  - { name: Lines, class: FileLineCountAnalyzer, tech_stacks: [All] }
  - { name: Lines, class: FileCharCountAnalyzer, tech_stacks: [All] }
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate analyzer name"));
    }

    #[test]
    fn test_applies_to() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let lines = &config.analyzers[0];
        let xml = &config.analyzers[1];

        assert!(lines.applies_to(None));
        assert!(lines.applies_to(Some("Python")));
        assert!(xml.applies_to(Some("XML")));
        assert!(!xml.applies_to(Some("Python")));
        assert!(!xml.applies_to(None));
    }

    #[test]
    fn test_path_filter() {
        let input = InputConfig {
            include: vec![],
            exclude: vec![".vscode".to_string(), "data/".to_string(), "**/*.lock".to_string()],
            strict_utf8: false,
        };
        let filter = input.path_filter().unwrap();

        assert!(filter.is_included("src/main.py"));
        assert!(filter.is_included("database/model.py"));
        assert!(!filter.is_included("data/commits.csv"));
        assert!(!filter.is_included(".vscode/settings.json"));
        assert!(!filter.is_included("deps/Cargo.lock"));

        let input = InputConfig {
            include: vec!["src".to_string()],
            exclude: vec![],
            strict_utf8: false,
        };
        let filter = input.path_filter().unwrap();
        assert!(filter.is_included("src/a.rs"));
        assert!(!filter.is_included("srcx/a.rs"));
        assert!(!filter.is_included("README.md"));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let input = InputConfig {
            include: vec!["src/[".to_string()],
            exclude: vec![],
            strict_utf8: false,
        };
        assert!(input.path_filter().is_err());
    }

    #[test]
    fn test_refresh_if_stale() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("git2base.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let mut store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.config().analyzers.len(), 2);
        assert!(!store.refresh_if_stale().unwrap());

        let updated = SAMPLE.replace(
            "  - name: XMLElementCount\n    class: XMLElementCountAnalyzer\n    tech_stacks: [\"XML\"]\n",
            "",
        );
        fs::write(&path, updated).unwrap();
        let later = SystemTime::now() + Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(store.refresh_if_stale().unwrap());
        assert_eq!(store.config().analyzers.len(), 1);
        assert!(!store.refresh_if_stale().unwrap());
    }
}
