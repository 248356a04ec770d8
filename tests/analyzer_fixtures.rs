//! Registered analyzers against their own fixtures, and configuration
//! loading end to end.

use std::path::PathBuf;

use git2base::analyzers::selfcheck::{check_entry, check_registry};
use git2base::analyzers::{builtin, AnalyzerRegistry, LoadError, Namespace};
use git2base::config::{self, Config};
use git2base::dispatch::Dispatcher;

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn registry_with_extensions() -> AnalyzerRegistry {
    let mut registry = AnalyzerRegistry::with_builtins();
    let errors = registry.load_extensions_dir(&testdata_path().join("extensions"));
    assert!(errors.is_empty(), "extension errors: {:?}", errors);
    registry
}

#[test]
fn test_every_builtin_passes_its_fixtures() {
    let registry = AnalyzerRegistry::with_builtins();
    let reports = check_registry(&registry);

    assert_eq!(reports.len(), 4);
    for report in &reports {
        assert!(
            report.is_ok(),
            "{} failed: {:?} {:?}",
            report.key,
            report.build_error,
            report.failures
        );
        assert!(report.passed > 0, "{} has no fixtures", report.key);
        assert_eq!(report.namespace, "builtin");
    }
}

#[test]
fn test_extension_passes_its_fixtures() {
    let registry = registry_with_extensions();
    let entry = registry.get("SqlSelectCount").expect("extension should be registered");
    assert_eq!(entry.namespace, Namespace::Extension);

    let report = check_entry(entry);
    assert!(report.is_ok(), "{:?}", report.failures);
    assert_eq!(report.passed, 2);
    assert_eq!(report.description, "Counts SELECT keywords, case-insensitively");
}

#[test]
fn test_extensions_cannot_shadow_builtins() {
    let mut registry = registry_with_extensions();
    let factory = registry
        .get(builtin::FILE_LINE_COUNT)
        .expect("builtin")
        .factory
        .clone();
    assert!(!registry.register_extension(builtin::FILE_LINE_COUNT, factory));
    assert_eq!(
        registry.get(builtin::FILE_LINE_COUNT).unwrap().namespace,
        Namespace::Builtin
    );
}

#[test]
fn test_testdata_config_resolves() {
    let config = Config::parse_file(testdata_path().join("git2base.yaml")).expect("should parse config");
    config::validate(&config).expect("config should be valid");

    let registry = registry_with_extensions();
    let loaded = registry.load_from_config(&config.analyzers);
    assert!(loaded.errors.is_empty(), "{:?}", loaded.errors);
    assert_eq!(loaded.resolved.len(), 4);

    let dispatcher = Dispatcher::new(&loaded).expect("analyzers should construct");
    let names: Vec<&str> = dispatcher.analyzers().iter().map(|a| a.name()).collect();
    assert_eq!(
        names,
        vec!["LineCount", "JavaClasses", "XmlElements", "SelectStatements"]
    );
}

#[test]
fn test_unresolved_class_is_skipped() {
    let config = Config::from_yaml(
        r#"
output:
  type: csv
analyzers:
  - name: Lines
    class: FileLineCountAnalyzer
    tech_stacks: [All]
  - name: Mystery
    class: NoSuchAnalyzer
    tech_stacks: [All]
"#,
    )
    .unwrap();

    let loaded = AnalyzerRegistry::with_builtins().load_from_config(&config.analyzers);
    assert_eq!(loaded.resolved.len(), 1);
    assert_eq!(loaded.errors.len(), 1);
    assert!(matches!(
        &loaded.errors[0],
        LoadError::Unresolved { analyzer, .. } if analyzer == "Mystery"
    ));
}

#[test]
fn test_bad_params_fail_construction() {
    let config = Config::from_yaml(
        r#"
output:
  type: csv
analyzers:
  - name: Broken
    class: RegexMatchCountAnalyzer
    tech_stacks: [All]
    params:
      patterns: ["(unclosed"]
"#,
    )
    .unwrap();

    let loaded = AnalyzerRegistry::with_builtins().load_from_config(&config.analyzers);
    assert!(loaded.errors.is_empty());
    assert!(Dispatcher::new(&loaded).is_err());
}
