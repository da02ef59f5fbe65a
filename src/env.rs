//! Environment store loaded from `.env` style files.
//!
//! The store is built once before the server starts and is shared read-only by every
//! request handler.

use std::path::{Path, PathBuf};

/// Ordered, case-sensitive key/value pairs available for injection.
///
/// Iteration follows insertion order. Inserting an existing key keeps its
/// original position and replaces the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentStore {
    entries: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("Failed to read environment file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut store = Self::new();
        for (key, value) in pairs {
            store.insert(key.into(), value.into());
        }
        store
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Parse `KEY=VALUE` lines.
    ///
    /// Blank lines, `#` comments and lines without `=` are skipped. Keys and values
    /// are trimmed and one pair of matching surrounding quotes is removed from the
    /// value. With a prefix, only keys starting with it are kept.
    pub fn parse(contents: &str, prefix: Option<&str>) -> Self {
        let mut store = Self::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            if let Some(prefix) = prefix {
                if !key.starts_with(prefix) {
                    continue;
                }
            }
            store.insert(key.to_string(), strip_quotes(value.trim()).to_string());
        }
        store
    }

    /// Read and parse a single file. Non-UTF-8 files are decoded as Latin-1.
    pub fn load(path: &Path, prefix: Option<&str>) -> Result<Self, EnvError> {
        let bytes = std::fs::read(path).map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let contents = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(path = %path.display(), "Environment file is not UTF-8, decoding as Latin-1");
                err.into_bytes().iter().map(|&b| b as char).collect()
            }
        };
        Ok(Self::parse(&contents, prefix))
    }

    /// Load the first existing file among `candidates`.
    ///
    /// Returns the path that was used, or an empty store when none exists.
    pub fn load_first(
        candidates: &[PathBuf],
        prefix: Option<&str>,
    ) -> Result<(Self, Option<PathBuf>), EnvError> {
        for path in candidates {
            if path.is_file() {
                let store = Self::load(path, prefix)?;
                return Ok((store, Some(path.clone())));
            }
        }
        Ok((Self::new(), None))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
