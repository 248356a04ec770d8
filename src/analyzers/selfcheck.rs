//! Run registered analyzers against their own fixtures.

use serde::Serialize;
use serde_json::Value;

use super::registry::{AnalyzerRegistry, Namespace, RegisteredAnalyzer};

/// A fixture whose output differed from what it expected.
#[derive(Debug, Clone, Serialize)]
pub struct FixtureFailure {
    pub case: String,
    pub expected_count: i64,
    pub actual_count: i64,
    pub expected_detail: Option<Value>,
    pub actual_detail: Option<Value>,
}

/// Fixture results for one registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub key: String,
    pub namespace: String,
    pub description: String,
    pub passed: usize,
    pub failures: Vec<FixtureFailure>,
    /// Set when the analyzer could not be built with its fixture params.
    pub build_error: Option<String>,
}

impl FixtureReport {
    pub fn is_ok(&self) -> bool {
        self.build_error.is_none() && self.failures.is_empty()
    }
}

/// Run one entry's fixtures.
pub fn check_entry(entry: &RegisteredAnalyzer) -> FixtureReport {
    let mut report = FixtureReport {
        key: entry.key.clone(),
        namespace: entry.namespace.to_string(),
        description: String::new(),
        passed: 0,
        failures: Vec::new(),
        build_error: None,
    };

    let analyzer = match entry.factory.build_for_fixtures() {
        Ok(analyzer) => analyzer,
        Err(e) => {
            report.build_error = Some(e.to_string());
            return report;
        }
    };
    report.description = analyzer.describe().to_string();

    for case in analyzer.test_cases() {
        let output = analyzer.analyze(&case.input);
        if output.count == case.expected_count && output.detail == case.expected_detail {
            report.passed += 1;
        } else {
            report.failures.push(FixtureFailure {
                case: case.name,
                expected_count: case.expected_count,
                actual_count: output.count,
                expected_detail: case.expected_detail,
                actual_detail: output.detail,
            });
        }
    }

    report
}

/// Run the fixtures of every registered analyzer.
pub fn check_registry(registry: &AnalyzerRegistry) -> Vec<FixtureReport> {
    registry
        .entries()
        .map(|entry| {
            let report = check_entry(entry);
            if entry.namespace == Namespace::Extension && report.passed + report.failures.len() == 0 {
                tracing::debug!(key = %entry.key, "extension has no fixtures");
            }
            report
        })
        .collect()
}
