//! Core analyzer contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Result of analyzing one file's text.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AnalysisOutput {
    /// Primary numeric measurement.
    pub count: i64,
    /// Optional structured detail. Must be a JSON object when present.
    pub detail: Option<Value>,
}

impl AnalysisOutput {
    /// The fail-soft result: zero and no detail.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A bare count without detail.
    pub fn count(count: i64) -> Self {
        Self {
            count,
            detail: None,
        }
    }

    pub fn with_detail(count: i64, detail: Value) -> Self {
        Self {
            count,
            detail: Some(detail),
        }
    }

    /// Shorthand for [`is_valid_result`].
    pub fn is_valid(&self) -> bool {
        is_valid_result(self.count, self.detail.as_ref())
    }
}

/// A self-contained fixture shipped with an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub expected_count: i64,
    #[serde(default)]
    pub expected_detail: Option<Value>,
}

impl TestCase {
    pub fn new(name: &str, input: &str, expected_count: i64, expected_detail: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            expected_count,
            expected_detail,
        }
    }
}

/// Errors raised when constructing an analyzer from its parameters.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("missing required parameter {param:?}")]
    MissingParam { param: &'static str },

    #[error("parameter {param:?} {reason}")]
    InvalidParam { param: &'static str, reason: String },

    #[error("compiling pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A per-file metric.
///
/// Implementations are constructed once from their parameters and then
/// called concurrently, so they must be `Send + Sync` and keep no mutable
/// per-call state.
pub trait Analyzer: Send + Sync {
    /// Static human-readable description.
    fn describe(&self) -> &str;

    /// Fixtures that exercise this analyzer as constructed.
    fn test_cases(&self) -> Vec<TestCase>;

    /// Analyze one file's text.
    ///
    /// Never fails: malformed input yields [`AnalysisOutput::empty`].
    fn analyze(&self, text: &str) -> AnalysisOutput;
}

/// Returns whether `(count, detail)` may be stored.
pub fn is_valid_result(count: i64, detail: Option<&Value>) -> bool {
    count >= 0 && detail.map(Value::is_object).unwrap_or(true)
}
