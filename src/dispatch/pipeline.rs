//! Per-file-version analyzer dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;

use super::{AnalysisIndex, AnalysisResult, FileVersion, SubjectKey};
use crate::analyzers::{AnalysisOutput, Analyzer, AnalyzerError, LoadedAnalyzers};
use crate::config::AnalyzerDescriptor;

/// Log target for files no stack rule matched.
pub const NO_TECHSTACK_TARGET: &str = "git2base::no_techstack";

/// Errors from building or running the dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("constructing analyzer {analyzer:?}: {source}")]
    Construction {
        analyzer: String,
        #[source]
        source: AnalyzerError,
    },

    #[error("analyzer {analyzer:?} violated its contract on {subject}: {reason}")]
    ContractViolation {
        analyzer: String,
        subject: SubjectKey,
        reason: String,
    },
}

/// A configured analyzer constructed with its descriptor params.
pub struct PreparedAnalyzer {
    pub descriptor: AnalyzerDescriptor,
    analyzer: Box<dyn Analyzer>,
}

impl PreparedAnalyzer {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn analyzer(&self) -> &dyn Analyzer {
        self.analyzer.as_ref()
    }
}

/// What dispatching one file version produced.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub results: Vec<AnalysisResult>,
    /// Applicable analyzers skipped because a result already existed.
    pub skipped: usize,
    /// Set when the file version had no tech stack.
    pub unclassified: bool,
}

/// Matches file versions to analyzers and runs them.
///
/// Shared read-only across worker threads.
pub struct Dispatcher {
    analyzers: Vec<PreparedAnalyzer>,
}

impl Dispatcher {
    /// Construct every resolved analyzer.
    ///
    /// Any construction failure fails the whole dispatcher, so a run never
    /// starts with a misconfigured analyzer.
    pub fn new(loaded: &LoadedAnalyzers) -> Result<Self, DispatchError> {
        let analyzers = loaded
            .resolved
            .iter()
            .map(|resolved| {
                let analyzer = resolved
                    .entry
                    .factory
                    .build(&resolved.descriptor.params)
                    .map_err(|source| DispatchError::Construction {
                        analyzer: resolved.descriptor.name.clone(),
                        source,
                    })?;
                tracing::debug!(
                    analyzer = %resolved.descriptor.name,
                    implementation = %resolved.entry.key,
                    "analyzer ready"
                );
                Ok(PreparedAnalyzer {
                    descriptor: resolved.descriptor.clone(),
                    analyzer,
                })
            })
            .collect::<Result<Vec<_>, DispatchError>>()?;

        Ok(Self { analyzers })
    }

    pub fn analyzers(&self) -> &[PreparedAnalyzer] {
        &self.analyzers
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Analyzers that apply to a file of `stack`.
    pub fn applicable<'a>(
        &'a self,
        stack: Option<&'a str>,
    ) -> impl Iterator<Item = &'a PreparedAnalyzer> + 'a {
        self.analyzers
            .iter()
            .filter(move |prepared| prepared.descriptor.applies_to(stack))
    }

    /// Run every applicable, not-yet-run analyzer on `version`.
    pub fn dispatch(
        &self,
        version: &FileVersion,
        existing: &AnalysisIndex,
    ) -> Result<DispatchOutcome, DispatchError> {
        let stack = version.tech_stack.as_deref();
        let mut outcome = DispatchOutcome {
            unclassified: stack.is_none(),
            ..Default::default()
        };

        if stack.is_none() {
            tracing::debug!(
                target: NO_TECHSTACK_TARGET,
                commit = %version.subject.commit_hash,
                path = %version.subject.path,
                side = %version.side,
                "no tech stack matched"
            );
        }

        for prepared in self.applicable(stack) {
            let name = prepared.name();
            if existing.contains(&version.subject, name) {
                outcome.skipped += 1;
                continue;
            }

            let output = match version.content.as_text() {
                Some(text) => run_analyzer(prepared, &version.subject, text)?,
                None => AnalysisOutput::empty(),
            };

            outcome.results.push(AnalysisResult {
                subject: version.subject.clone(),
                analyzer: name.to_string(),
                count: output.count,
                detail: output.detail,
            });
        }

        Ok(outcome)
    }
}

fn run_analyzer(
    prepared: &PreparedAnalyzer,
    subject: &SubjectKey,
    text: &str,
) -> Result<AnalysisOutput, DispatchError> {
    let violation = |reason: String| DispatchError::ContractViolation {
        analyzer: prepared.name().to_string(),
        subject: subject.clone(),
        reason,
    };

    let output = catch_unwind(AssertUnwindSafe(|| prepared.analyzer.analyze(text)))
        .map_err(|payload| violation(format!("panicked: {}", panic_message(&payload))))?;

    if !output.is_valid() {
        return Err(violation(format!(
            "invalid result (count {}, detail {:?})",
            output.count, output.detail
        )));
    }

    Ok(output)
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
