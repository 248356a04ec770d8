//! Built-in analyzers.

mod char_count;
mod line_count;
mod regex_match;
mod xml_element;

pub use char_count::FileCharCountAnalyzer;
pub use line_count::FileLineCountAnalyzer;
pub use regex_match::{RegexMatchCountAnalyzer, JAVA_CLASS_PATTERN};
pub use xml_element::XMLElementCountAnalyzer;

use super::{AnalyzerFactory, AnalyzerRegistry};

pub const FILE_LINE_COUNT: &str = "FileLineCountAnalyzer";
pub const FILE_CHAR_COUNT: &str = "FileCharCountAnalyzer";
pub const REGEX_MATCH_COUNT: &str = "RegexMatchCountAnalyzer";
pub const XML_ELEMENT_COUNT: &str = "XMLElementCountAnalyzer";

/// Register every built-in analyzer.
///
/// Idempotent: keys that are already present are left alone.
pub fn register_all(registry: &mut AnalyzerRegistry) {
    registry.register_builtin(
        FILE_LINE_COUNT,
        AnalyzerFactory::new(|_| Ok(Box::new(FileLineCountAnalyzer))),
    );
    registry.register_builtin(
        FILE_CHAR_COUNT,
        AnalyzerFactory::new(|_| Ok(Box::new(FileCharCountAnalyzer))),
    );
    registry.register_builtin(
        REGEX_MATCH_COUNT,
        AnalyzerFactory::new(|params| Ok(Box::new(RegexMatchCountAnalyzer::from_params(params)?)))
            .with_fixture_params(RegexMatchCountAnalyzer::fixture_params()),
    );
    registry.register_builtin(
        XML_ELEMENT_COUNT,
        AnalyzerFactory::new(|_| Ok(Box::new(XMLElementCountAnalyzer))),
    );
}
