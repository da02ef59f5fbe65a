//! Shared application state for request handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::access::AccessGuard;
use crate::config::{AppConfig, HtmlInjection};
use crate::env::EnvironmentStore;
use crate::transform::{PlaceholderMap, TransformMode};

/// Shared application state, cloneable across handlers via Arc-wrapped fields.
///
/// Everything here is built once at startup and never mutated, so handlers read it
/// concurrently without locks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub env: Arc<EnvironmentStore>,
    pub guard: Arc<AccessGuard>,
    /// Canonical site root; every served file must live below it
    pub root: Arc<PathBuf>,
    html_mode: Option<TransformMode>,
    js_mode: TransformMode,
}

impl AppState {
    /// Fails if the configured site root does not exist.
    pub fn new(config: AppConfig, env: EnvironmentStore) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(&config.site.root)?;
        let guard = AccessGuard::from_config(&config.access);

        let html_mode = match config.transform.html {
            HtmlInjection::None => None,
            HtmlInjection::Meta => Some(TransformMode::MetaTags),
            HtmlInjection::Window => Some(TransformMode::WindowObject {
                object: config.transform.window_object.clone(),
            }),
        };
        let js_mode = TransformMode::Placeholders(PlaceholderMap::from_config(&config.transform));

        Ok(Self {
            config: Arc::new(config),
            env: Arc::new(env),
            guard: Arc::new(guard),
            root: Arc::new(root),
            html_mode,
            js_mode,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Transform for HTML documents, if injection is enabled
    pub fn html_mode(&self) -> Option<&TransformMode> {
        self.html_mode.as_ref()
    }

    /// Transform for the request path if it names a designated JS config stub
    pub fn js_config_mode(&self, request_path: &str) -> Option<&TransformMode> {
        self.config
            .transform
            .js_config
            .iter()
            .any(|p| p == request_path)
            .then_some(&self.js_mode)
    }
}
