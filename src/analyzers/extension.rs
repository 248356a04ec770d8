//! Declarative user analyzers.
//!
//! An extension file wraps a built-in analyzer with preset parameters and
//! ships its own fixtures:
//!
//! ```yaml
//! key: TodoCount
//! description: Counts TODO markers
//! base: RegexMatchCountAnalyzer
//! params:
//!   patterns: ["TODO"]
//! test_cases:
//!   - name: two markers
//!     input: "TODO a\nTODO b\n"
//!     expected_count: 2
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::registry::{AnalyzerFactory, AnalyzerRegistry, LoadError};
use super::{AnalysisOutput, Analyzer, TestCase};
use crate::config::AnalyzerParams;

/// On-disk extension definition.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtensionDefinition {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Built-in implementation key this extension wraps.
    pub base: String,
    #[serde(default)]
    pub params: AnalyzerParams,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// A built-in analyzer dressed with an extension's description and fixtures.
struct ExtensionAnalyzer {
    description: String,
    cases: Vec<TestCase>,
    inner: Box<dyn Analyzer>,
}

impl Analyzer for ExtensionAnalyzer {
    fn describe(&self) -> &str {
        &self.description
    }

    fn test_cases(&self) -> Vec<TestCase> {
        self.cases.clone()
    }

    fn analyze(&self, text: &str) -> AnalysisOutput {
        self.inner.analyze(text)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

impl AnalyzerRegistry {
    /// Register every extension definition found under `dir`.
    ///
    /// Files are visited in name order. A file that cannot be read, parsed
    /// or built is reported and skipped; the rest still load.
    pub fn load_extensions_dir(&mut self, dir: &Path) -> Vec<LoadError> {
        let mut errors = Vec::new();

        if !dir.is_dir() {
            errors.push(LoadError::Extension {
                path: dir.to_path_buf(),
                reason: "not a directory".to_string(),
            });
            return errors;
        }

        let walker = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_yaml(e.path()));

        for entry in walker {
            let path = entry.path();
            match self.load_extension_file(path) {
                Ok(key) => tracing::info!(key = %key, path = %path.display(), "loaded analyzer extension"),
                Err(reason) => {
                    let err = LoadError::Extension {
                        path: path.to_path_buf(),
                        reason,
                    };
                    tracing::warn!("{}", err);
                    errors.push(err);
                }
            }
        }

        errors
    }

    fn load_extension_file(&mut self, path: &Path) -> Result<String, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        let definition: ExtensionDefinition =
            serde_yaml::from_str(&content).map_err(|e| e.to_string())?;
        let key = definition.key.clone();
        let factory = self.extension_factory(definition)?;

        if !self.register_extension(&key, factory) {
            return Err(format!("key {:?} is already registered", key));
        }
        Ok(key)
    }

    /// Build a factory for `definition`, checking its preset parameters.
    pub fn extension_factory(&self, definition: ExtensionDefinition) -> Result<AnalyzerFactory, String> {
        if definition.key.trim().is_empty() {
            return Err("empty key".to_string());
        }
        if self.get_builtin(&definition.key).is_some() {
            return Err(format!("key {:?} shadows a built-in analyzer", definition.key));
        }

        let base = self
            .get_builtin(&definition.base)
            .ok_or_else(|| format!("base {:?} is not a built-in analyzer", definition.base))?
            .factory
            .clone();

        base.build(&definition.params)
            .map_err(|e| format!("invalid params for {}: {}", definition.base, e))?;

        let ExtensionDefinition {
            key,
            description,
            params: presets,
            test_cases,
            ..
        } = definition;
        let description = description.unwrap_or_else(|| key.clone());

        Ok(AnalyzerFactory::new(move |params| {
            // Descriptor params override the presets key by key.
            let mut merged = presets.clone();
            merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Box::new(ExtensionAnalyzer {
                description: description.clone(),
                cases: test_cases.clone(),
                inner: base.build(&merged)?,
            }))
        }))
    }
}
