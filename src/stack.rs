//! Technology-stack classification of repository paths.
//!
//! Rules are evaluated in declared order and the first match wins, so a
//! broad extension-only rule placed before a narrower path rule shadows it.

use crate::config::StackRule;

/// Extension token for dot-files such as `.gitignore`.
pub const DEV_CONFIG_EXTENSION: &str = "<dev-config>";

/// Extension token for files without a dot in their name.
pub const NO_EXTENSION: &str = "<no-extension>";

/// Derive the classification extension of a `/`-separated path.
///
/// Only the last path segment is considered.
pub fn file_extension(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.starts_with('.') {
        return DEV_CONFIG_EXTENSION;
    }
    match name.rfind('.') {
        Some(idx) => &name[idx + 1..],
        None => NO_EXTENSION,
    }
}

/// Ordered stack rules.
#[derive(Debug, Clone, Default)]
pub struct StackClassifier {
    rules: Vec<StackRule>,
}

impl StackClassifier {
    pub fn new(rules: Vec<StackRule>) -> Self {
        Self { rules }
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Classify `path`, returning the name of the first matching rule.
    pub fn classify(&self, path: &str) -> Option<&str> {
        let ext = file_extension(path);
        self.rules
            .iter()
            .find(|rule| rule_matches(rule, path, ext))
            .map(|rule| rule.name.as_str())
    }
}

fn rule_matches(rule: &StackRule, path: &str, ext: &str) -> bool {
    let ext_hit = rule.extensions.iter().any(|e| e == ext);
    let path_hit = rule.paths.iter().any(|p| path.starts_with(p.as_str()));

    match (rule.paths.is_empty(), rule.extensions.is_empty()) {
        (true, false) => ext_hit,
        (false, true) => path_hit,
        (false, false) => path_hit && ext_hit,
        // A rule with neither list matches nothing.
        (true, true) => false,
    }
}
