//! Window-object injection: exposes the store to page scripts as
//! `window.OBJECT = { "KEY": "VALUE", ... }`.
//!
//! The block is delimited by a marker comment so a later run replaces it in place.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::cert::write_temp;
use crate::config::{WINDOW_BLOCK_MARKER, WINDOW_BLOCK_NOTE};
use crate::env::EnvironmentStore;

/// Build-time injection into an HTML file on disk failed.
#[derive(Debug, thiserror::Error)]
pub enum InjectError {
    #[error("no environment variables to inject")]
    EmptyStore,

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid UTF-8", path.display())]
    NotUtf8 { path: PathBuf },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

static WINDOW_BLOCK: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"(?s)[ \t]*{}\s*(?:<!--.*?-->\s*)?<script>.*?</script>",
        regex::escape(WINDOW_BLOCK_MARKER)
    );
    Regex::new(&pattern).expect("window block pattern")
});

static HEAD_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</head\s*>").expect("head close pattern"));

/// Replace the marked block, or insert a new one before `</head>`.
///
/// Keys are written in sorted order. Documents with neither a marker nor a closing
/// head tag are returned unchanged.
pub fn inject_window_object(html: &str, env: &EnvironmentStore, object: &str) -> String {
    let block = render_block(env, object);

    if let Some(existing) = WINDOW_BLOCK.find(html) {
        let mut out = String::with_capacity(html.len() + block.len());
        out.push_str(&html[..existing.start()]);
        out.push_str(&block);
        out.push_str(&html[existing.end()..]);
        return out;
    }

    match HEAD_CLOSE.find(html) {
        Some(close) => {
            let mut out = String::with_capacity(html.len() + block.len() + 1);
            out.push_str(&html[..close.start()]);
            out.push_str(&block);
            out.push('\n');
            out.push_str(&html[close.start()..]);
            out
        }
        None => html.to_string(),
    }
}

fn render_block(env: &EnvironmentStore, object: &str) -> String {
    let mut entries: Vec<(&str, &str)> = env.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let body = entries
        .iter()
        .map(|(key, value)| format!("      {}: {}", js_string(key), js_string(value)))
        .collect::<Vec<_>>()
        .join(",\n");

    let object_literal = if body.is_empty() {
        "{}".to_string()
    } else {
        format!("{{\n{body}\n    }}")
    };

    format!(
        "  {WINDOW_BLOCK_MARKER}\n  {WINDOW_BLOCK_NOTE}\n  <script>\n    window.{object} = {object_literal};\n  </script>"
    )
}

/// Rewrite the HTML file at `path` in place with the window-object block.
///
/// The file is replaced atomically. Returns `false` when the document has neither a
/// marker block nor a closing head tag and was left untouched.
pub fn inject_window_file(path: &Path, env: &EnvironmentStore, object: &str) -> Result<bool, InjectError> {
    if env.is_empty() {
        return Err(InjectError::EmptyStore);
    }

    let bytes = std::fs::read(path).map_err(|source| InjectError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let html = String::from_utf8(bytes).map_err(|_| InjectError::NotUtf8 {
        path: path.to_path_buf(),
    })?;

    let output = inject_window_object(&html, env, object);
    if output == html && !WINDOW_BLOCK.is_match(&html) {
        return Ok(false);
    }

    let write_err = |source| InjectError::Write {
        path: path.to_path_buf(),
        source,
    };
    let tmp = write_temp(path, output.as_bytes()).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    tracing::info!(path = %path.display(), count = env.len(), "Injected environment into HTML");
    Ok(true)
}

/// Double-quoted JavaScript string literal.
///
/// Backslash, quote and control characters are escaped by the JSON encoder; `<` is
/// additionally escaped so a value cannot terminate the surrounding script element.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace('<', "\\u003c")
}
