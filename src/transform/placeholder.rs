//! `{{NAME}}` placeholder substitution for JS config stubs.

use std::borrow::Cow;
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::TransformConfig;
use crate::env::EnvironmentStore;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("placeholder pattern")
});

/// Maps placeholder names to store keys.
///
/// Lookup order: explicit table entry, then `prefix + NAME`, then `NAME`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderMap {
    prefix: String,
    table: BTreeMap<String, String>,
}

impl PlaceholderMap {
    pub fn new(prefix: impl Into<String>, table: BTreeMap<String, String>) -> Self {
        Self {
            prefix: prefix.into(),
            table,
        }
    }

    pub fn from_config(config: &TransformConfig) -> Self {
        Self::new(config.placeholder_prefix.clone(), config.placeholders.clone())
    }

    pub fn resolve<'a>(&self, name: &str, env: &'a EnvironmentStore) -> Option<&'a str> {
        if let Some(key) = self.table.get(name) {
            return env.get(key);
        }
        if !self.prefix.is_empty() {
            if let Some(value) = env.get(&format!("{}{}", self.prefix, name)) {
                return Some(value);
            }
        }
        env.get(name)
    }
}

/// Replace every resolvable `{{NAME}}` with its store value.
///
/// Unresolvable placeholders stay in the output verbatim so missing configuration
/// remains visible to the page.
pub fn substitute_placeholders(source: &str, env: &EnvironmentStore, map: &PlaceholderMap) -> String {
    let replaced: Cow<'_, str> = PLACEHOLDER.replace_all(source, |caps: &Captures<'_>| {
        let name = &caps[1];
        match map.resolve(name, env) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        }
    });
    replaced.into_owned()
}
