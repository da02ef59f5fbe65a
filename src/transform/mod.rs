//! Content rewriting for served resources.
//!
//! Three modes share one entry point:
//! - **Meta tags**: `<meta name=KEY content=VALUE>` inserted after `<head>`
//! - **Placeholders**: `{{NAME}}` tokens in JS config stubs replaced by store values
//! - **Window object**: a `window.OBJECT = {...}` script inserted before `</head>`
//!
//! All modes are pure functions of the input text and the store.

pub mod meta;
pub mod placeholder;
pub mod window;

pub use meta::inject_meta_tags;
pub use placeholder::{substitute_placeholders, PlaceholderMap};
pub use window::{inject_window_file, inject_window_object, InjectError};

use crate::env::EnvironmentStore;

/// Rewriting strategy for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformMode {
    MetaTags,
    WindowObject { object: String },
    Placeholders(PlaceholderMap),
}

/// The resource could not be treated as text.
#[derive(Debug, thiserror::Error)]
pub enum ContentReadError {
    #[error("content is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// Apply `mode` to raw resource bytes.
pub fn apply(
    mode: &TransformMode,
    bytes: &[u8],
    env: &EnvironmentStore,
) -> Result<Vec<u8>, ContentReadError> {
    let text = std::str::from_utf8(bytes)?;
    let output = match mode {
        TransformMode::MetaTags => inject_meta_tags(text, env),
        TransformMode::WindowObject { object } => inject_window_object(text, env, object),
        TransformMode::Placeholders(map) => substitute_placeholders(text, env, map),
    };
    Ok(output.into_bytes())
}
