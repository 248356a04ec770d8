use crate::analyzers::{AnalysisOutput, Analyzer, TestCase};

/// Counts Unicode scalar values.
#[derive(Debug, Default)]
pub struct FileCharCountAnalyzer;

impl Analyzer for FileCharCountAnalyzer {
    fn describe(&self) -> &str {
        "Counts the characters in a file"
    }

    fn test_cases(&self) -> Vec<TestCase> {
        vec![TestCase::new("basic text", "这是一个测试文本。\n", 10, None)]
    }

    fn analyze(&self, text: &str) -> AnalysisOutput {
        AnalysisOutput::count(text.chars().count() as i64)
    }
}
