//! Path denylist.
//!
//! Every rule is matched case-insensitively as a substring of the *decoded* request
//! path. Callers must percent-decode first; an encoded `%2Eenv` would otherwise slip
//! past.

use crate::config::{AccessConfig, DEFAULT_DENIED_FILES, DEFAULT_DENIED_PATHS};

/// A single denylist entry. Patterns are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyRule {
    /// A sensitive filename such as `.env` or `secrets.json`
    Filename(String),
    /// A path fragment such as `/assets/.env`
    PathFragment(String),
}

impl DenyRule {
    pub fn filename(name: &str) -> Self {
        DenyRule::Filename(name.to_lowercase())
    }

    pub fn path_fragment(fragment: &str) -> Self {
        DenyRule::PathFragment(fragment.to_lowercase())
    }

    fn pattern(&self) -> &str {
        match self {
            DenyRule::Filename(p) | DenyRule::PathFragment(p) => p,
        }
    }

    fn matches(&self, lowered_path: &str) -> bool {
        let pattern = self.pattern();
        !pattern.is_empty() && lowered_path.contains(pattern)
    }
}

/// Classifies request paths as allowed or forbidden. The rule set never changes
/// after construction.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    rules: Vec<DenyRule>,
}

impl Default for AccessGuard {
    fn default() -> Self {
        let rules = DEFAULT_DENIED_PATHS
            .iter()
            .map(|p| DenyRule::path_fragment(p))
            .chain(DEFAULT_DENIED_FILES.iter().map(|f| DenyRule::filename(f)))
            .collect();
        Self { rules }
    }
}

impl AccessGuard {
    /// Built-in rules plus the configured extras. Configuration can only widen
    /// the denylist.
    pub fn from_config(config: &AccessConfig) -> Self {
        let mut guard = Self::default();
        guard.rules.extend(
            config
                .denied_paths
                .iter()
                .map(|p| DenyRule::path_fragment(p))
                .chain(config.denied_files.iter().map(|f| DenyRule::filename(f))),
        );
        guard
    }

    /// Returns `false` if the decoded path touches any denied file or fragment.
    pub fn is_allowed(&self, path: &str) -> bool {
        let lowered = path.to_lowercase();
        !self.rules.iter().any(|rule| rule.matches(&lowered))
    }
}
