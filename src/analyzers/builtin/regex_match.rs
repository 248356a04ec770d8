//! Regular-expression match counting.

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::analyzers::{AnalysisOutput, Analyzer, AnalyzerError, TestCase};
use crate::config::AnalyzerParams;

/// Java class declaration pattern used by the fixtures.
///
/// Captures the class name, the optional superclass and the optional
/// `implements` list.
pub const JAVA_CLASS_PATTERN: &str =
    r"\bclass\s+(\w+)\b(?:\s+extends\s+(\w+))?(?:\s+implements\s+([\w\s,]+))?\s*\{";

/// Pre-compiled pattern with its source text.
struct CompiledPattern {
    source: String,
    regex: Regex,
}

/// Counts matches of one or more patterns.
///
/// Each match is recorded the way a find-all over capture groups reports it:
/// the whole match when the pattern has no groups, the single group's text
/// when it has one, and a list of group texts otherwise. Groups that did not
/// participate in a match are recorded as empty strings.
pub struct RegexMatchCountAnalyzer {
    patterns: Vec<CompiledPattern>,
}

impl RegexMatchCountAnalyzer {
    /// Build from a `patterns` parameter holding a list of strings.
    pub fn from_params(params: &AnalyzerParams) -> Result<Self, AnalyzerError> {
        let raw = params
            .get("patterns")
            .ok_or(AnalyzerError::MissingParam { param: "patterns" })?;
        let list = raw.as_array().ok_or_else(|| AnalyzerError::InvalidParam {
            param: "patterns",
            reason: "must be a list of strings".to_string(),
        })?;

        let patterns = list
            .iter()
            .map(|value| {
                let source = value.as_str().ok_or_else(|| AnalyzerError::InvalidParam {
                    param: "patterns",
                    reason: format!("must be a list of strings, found {}", value),
                })?;
                let regex = Regex::new(source).map_err(|e| AnalyzerError::InvalidPattern {
                    pattern: source.to_string(),
                    source: e,
                })?;
                Ok(CompiledPattern {
                    source: source.to_string(),
                    regex,
                })
            })
            .collect::<Result<Vec<_>, AnalyzerError>>()?;

        Ok(Self { patterns })
    }

    /// Parameters the fixtures are written against.
    pub fn fixture_params() -> AnalyzerParams {
        let mut params = Map::new();
        params.insert("patterns".to_string(), json!([JAVA_CLASS_PATTERN]));
        params
    }
}

fn find_all(regex: &Regex, text: &str) -> Vec<Value> {
    let groups = regex.captures_len() - 1;
    regex
        .captures_iter(text)
        .map(|caps| {
            let group = |i: usize| {
                Value::String(caps.get(i).map(|m| m.as_str()).unwrap_or("").to_string())
            };
            match groups {
                0 => group(0),
                1 => group(1),
                n => Value::Array((1..=n).map(group).collect()),
            }
        })
        .collect()
}

impl Analyzer for RegexMatchCountAnalyzer {
    fn describe(&self) -> &str {
        "Counts the matches of regular expressions in a file"
    }

    fn test_cases(&self) -> Vec<TestCase> {
        vec![
            TestCase::new(
                "basic java class",
                "\n    public class MyClass {\n        private int x;\n    }\n",
                1,
                Some(json!({
                    JAVA_CLASS_PATTERN: {"count": 1, "matches": [["MyClass", "", ""]]}
                })),
            ),
            TestCase::new(
                "java class with extends and implements",
                "\n    public class MyClass extends BaseClass implements Interface1, Interface2 {\n        private String name;\n    }\n",
                1,
                Some(json!({
                    JAVA_CLASS_PATTERN: {
                        "count": 1,
                        "matches": [["MyClass", "BaseClass", "Interface1, Interface2 "]]
                    }
                })),
            ),
        ]
    }

    fn analyze(&self, text: &str) -> AnalysisOutput {
        let mut detail = Map::new();
        for pattern in &self.patterns {
            let matches = find_all(&pattern.regex, text);
            detail.insert(
                pattern.source.clone(),
                json!({"count": matches.len(), "matches": matches}),
            );
        }

        // Repeated patterns collapse into one entry, so sum what was kept.
        let count = detail
            .values()
            .filter_map(|v| v.get("count").and_then(Value::as_i64))
            .sum();

        AnalysisOutput::with_detail(count, Value::Object(detail))
    }
}
