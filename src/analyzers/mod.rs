//! Pluggable per-file analyzers.
//!
//! - `traits`: the [`Analyzer`] contract and result validation
//! - `builtin`: line, char, regex-match and XML-element counters
//! - `registry`: implementation key to factory table
//! - `extension`: declarative user analyzers loaded from YAML
//! - `selfcheck`: fixture runner behind `git2base analyzers --check`
//!
//! # Adding an Analyzer
//!
//! Implement [`Analyzer`], then register a factory under a new key with
//! [`AnalyzerRegistry::register_builtin`] (or `register_extension` from
//! library code). The key is what `class:` names in the configuration.

pub mod builtin;
mod extension;
mod registry;
pub mod selfcheck;
mod traits;

pub use extension::ExtensionDefinition;
pub use registry::{
    AnalyzerFactory, AnalyzerRegistry, LoadError, LoadedAnalyzers, Namespace, RegisteredAnalyzer,
    RegistryError, ResolvedAnalyzer,
};
pub use traits::{is_valid_result, AnalysisOutput, Analyzer, AnalyzerError, TestCase};
