//! Line counting.

use crate::analyzers::{AnalysisOutput, Analyzer, TestCase};

/// Counts lines as the number of `\n` characters plus one.
///
/// Empty text is one line, and a trailing newline starts a new (empty) line.
#[derive(Debug, Default)]
pub struct FileLineCountAnalyzer;

impl Analyzer for FileLineCountAnalyzer {
    fn describe(&self) -> &str {
        "Counts the lines in a file"
    }

    fn test_cases(&self) -> Vec<TestCase> {
        vec![
            TestCase::new("basic text", "这是一个测试文本。\n", 2, None),
            TestCase::new("empty file", "", 1, None),
        ]
    }

    fn analyze(&self, text: &str) -> AnalysisOutput {
        let newlines = text.bytes().filter(|&b| b == b'\n').count();
        AnalysisOutput::count(newlines as i64 + 1)
    }
}
