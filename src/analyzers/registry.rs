//! Registration table mapping implementation keys to analyzer factories.
//!
//! The registry is populated at startup (built-ins, then extensions) and is
//! read-only afterwards. Configured descriptors are resolved against it once,
//! built-ins first, so an extension can never shadow a built-in key.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use super::builtin;
use super::{Analyzer, AnalyzerError};
use crate::config::{AnalyzerDescriptor, AnalyzerParams};

type BuildFn =
    dyn Fn(&AnalyzerParams) -> Result<Box<dyn Analyzer>, AnalyzerError> + Send + Sync;

/// Constructs analyzers from descriptor parameters.
#[derive(Clone)]
pub struct AnalyzerFactory {
    build: Arc<BuildFn>,
    fixture_params: AnalyzerParams,
}

impl AnalyzerFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&AnalyzerParams) -> Result<Box<dyn Analyzer>, AnalyzerError> + Send + Sync + 'static,
    {
        Self {
            build: Arc::new(build),
            fixture_params: AnalyzerParams::new(),
        }
    }

    /// Parameters to construct with when running the analyzer's own fixtures.
    pub fn with_fixture_params(mut self, params: AnalyzerParams) -> Self {
        self.fixture_params = params;
        self
    }

    pub fn build(&self, params: &AnalyzerParams) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        (self.build)(params)
    }

    pub fn build_for_fixtures(&self) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        self.build(&self.fixture_params)
    }

    pub fn fixture_params(&self) -> &AnalyzerParams {
        &self.fixture_params
    }
}

impl fmt::Debug for AnalyzerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerFactory")
            .field("fixture_params", &self.fixture_params)
            .finish_non_exhaustive()
    }
}

/// Where a registered key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Builtin,
    Extension,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Builtin => write!(f, "builtin"),
            Namespace::Extension => write!(f, "extension"),
        }
    }
}

/// A registry entry.
#[derive(Debug, Clone)]
pub struct RegisteredAnalyzer {
    pub key: String,
    pub namespace: Namespace,
    pub factory: AnalyzerFactory,
}

/// Errors from registry lookups.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("analyzer implementation {0:?} is not registered")]
    NotFound(String),
}

/// Non-fatal problems met while loading analyzers.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("analyzer {analyzer:?}: implementation {implementation:?} is not registered")]
    Unresolved {
        analyzer: String,
        implementation: String,
    },

    #[error("extension {path}: {reason}")]
    Extension { path: PathBuf, reason: String },
}

/// A configured analyzer whose implementation key resolved.
#[derive(Debug, Clone)]
pub struct ResolvedAnalyzer {
    pub descriptor: AnalyzerDescriptor,
    pub entry: RegisteredAnalyzer,
}

/// Output of [`AnalyzerRegistry::load_from_config`].
#[derive(Debug, Default)]
pub struct LoadedAnalyzers {
    /// Resolved descriptors, in configuration order.
    pub resolved: Vec<ResolvedAnalyzer>,
    /// Descriptors that were dropped.
    pub errors: Vec<LoadError>,
}

/// Registration table for analyzer implementations.
#[derive(Debug, Default)]
pub struct AnalyzerRegistry {
    builtins: BTreeMap<String, RegisteredAnalyzer>,
    extensions: BTreeMap<String, RegisteredAnalyzer>,
}

impl AnalyzerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in analyzer.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register a built-in implementation.
    ///
    /// Returns `false` and leaves the table unchanged when `key` is taken.
    pub fn register_builtin(&mut self, key: &str, factory: AnalyzerFactory) -> bool {
        Self::insert(&mut self.builtins, key, Namespace::Builtin, factory)
    }

    /// Register a user extension. Same contract as [`Self::register_builtin`];
    /// built-in keys are taken as well.
    pub fn register_extension(&mut self, key: &str, factory: AnalyzerFactory) -> bool {
        if self.builtins.contains_key(key) {
            tracing::warn!(key, "extension key collides with a built-in analyzer");
            return false;
        }
        Self::insert(&mut self.extensions, key, Namespace::Extension, factory)
    }

    fn insert(
        table: &mut BTreeMap<String, RegisteredAnalyzer>,
        key: &str,
        namespace: Namespace,
        factory: AnalyzerFactory,
    ) -> bool {
        if table.contains_key(key) {
            tracing::debug!(key, %namespace, "analyzer already registered");
            return false;
        }
        table.insert(
            key.to_string(),
            RegisteredAnalyzer {
                key: key.to_string(),
                namespace,
                factory,
            },
        );
        true
    }

    /// Look up `key`, built-ins first.
    pub fn get(&self, key: &str) -> Result<&RegisteredAnalyzer, RegistryError> {
        self.builtins
            .get(key)
            .or_else(|| self.extensions.get(key))
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    pub(crate) fn get_builtin(&self, key: &str) -> Option<&RegisteredAnalyzer> {
        self.builtins.get(key)
    }

    /// All entries: built-ins, then extensions, each sorted by key.
    pub fn entries(&self) -> impl Iterator<Item = &RegisteredAnalyzer> {
        self.builtins.values().chain(self.extensions.values())
    }

    pub fn len(&self) -> usize {
        self.builtins.len() + self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve configured descriptors.
    ///
    /// Unresolvable descriptors are logged, recorded in
    /// [`LoadedAnalyzers::errors`] and skipped.
    pub fn load_from_config(&self, descriptors: &[AnalyzerDescriptor]) -> LoadedAnalyzers {
        let mut loaded = LoadedAnalyzers::default();

        for descriptor in descriptors {
            match self.get(&descriptor.implementation) {
                Ok(entry) => loaded.resolved.push(ResolvedAnalyzer {
                    descriptor: descriptor.clone(),
                    entry: entry.clone(),
                }),
                Err(RegistryError::NotFound(_)) => {
                    let err = LoadError::Unresolved {
                        analyzer: descriptor.name.clone(),
                        implementation: descriptor.implementation.clone(),
                    };
                    tracing::warn!("{}; skipping", err);
                    loaded.errors.push(err);
                }
            }
        }

        loaded
    }
}
