//! Configuration loading and constants.
//!
//! Loads server configuration from an optional TOML file and defines constants for
//! cache headers, default paths, denylist entries and logging. `AppConfig` is the root
//! configuration struct; every section has built-in defaults so the server can start
//! without a file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use const_format::formatcp;
use serde::Deserialize;

// =============================================================================
// HTTP Response Cache Control
// =============================================================================
// Injected values change across restarts, so nothing this server sends may be
// reused by a browser without revalidation.

/// Default for every response that does not set its own Cache-Control
pub const CACHE_CONTROL_DEFAULT: &str = "no-cache";

/// Directives for JS config stubs with substituted placeholders
pub const CACHE_CONTROL_NO_STORE: &str = "no-cache, no-store, must-revalidate";

// =============================================================================
// Media Types
// =============================================================================

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_JS: &str = "application/javascript";

// =============================================================================
// Server Constants
// =============================================================================

/// Default listening port for plain HTTP
pub const DEFAULT_HTTP_PORT: u16 = 8000;

/// Conventional port for the TLS variant
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

/// Default bind address. Development servers stay on loopback unless configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Seconds in-flight requests get to finish after a shutdown signal
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

/// Document served for `/` and any path ending in `/`
pub const INDEX_DOCUMENT: &str = "index.html";

// =============================================================================
// Certificate Constants
// =============================================================================

/// Validity window of generated certificates
pub const CERT_VALIDITY_DAYS: i64 = 365;

pub const DEFAULT_CERT_PATH: &str = "localhost.crt";
pub const DEFAULT_KEY_PATH: &str = "localhost.key";

// =============================================================================
// Injection Constants
// =============================================================================

/// Global object receiving environment values in window-object mode
pub const DEFAULT_WINDOW_OBJECT: &str = "flutterEnv";

/// Marker comment delimiting a window-object block
pub const WINDOW_BLOCK_MARKER: &str = "<!-- Environment variables injected by envserve -->";

/// Second comment line written under the marker
pub const WINDOW_BLOCK_NOTE: &str = formatcp!(
    "<!-- Generated by {} {}; edits inside this block are overwritten -->",
    env!("CARGO_PKG_NAME"),
    env!("CARGO_PKG_VERSION")
);

// =============================================================================
// Access Control Defaults
// =============================================================================

/// Filenames that are never served, matched case-insensitively as substrings
pub const DEFAULT_DENIED_FILES: &[&str] = &[".env", ".env.local", ".env.production", "secrets.json"];

/// Path fragments that are never served, matched case-insensitively as substrings
pub const DEFAULT_DENIED_PATHS: &[&str] = &["/assets/.env", "/.env"];

/// Path fragments whose 404s are logged at debug level (browser and devtools probes)
pub const OPTIONAL_ASSET_MARKERS: &[&str] = &[".well-known", ".map"];

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path (used only if it exists)
pub const DEFAULT_CONFIG_PATH: &str = "envserve.toml";

/// Environment files searched in order when none is configured
pub const DEFAULT_ENV_FILES: &[&str] = &[".env", "../.env"];

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "envserve=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Listener configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// TLS and certificate provisioning
    #[serde(default)]
    pub tls: TlsConfig,
    /// Served directory and routing rules
    #[serde(default)]
    pub site: SiteConfig,
    /// Environment source
    #[serde(default)]
    pub env: EnvConfig,
    /// Content rewriting
    #[serde(default)]
    pub transform: TransformConfig,
    /// Extra denylist entries on top of the built-ins
    #[serde(default)]
    pub access: AccessConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// Ports tried strictly in order instead of `port`; first successful bind wins
    #[serde(default)]
    pub port_candidates: Vec<u16>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            port_candidates: Vec::new(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }

    /// Ports to try, in order
    pub fn ports(&self) -> Vec<u16> {
        if self.port_candidates.is_empty() {
            vec![self.port]
        } else {
            self.port_candidates.clone()
        }
    }
}

/// What to do when the certificate cannot be provisioned or loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsFailurePolicy {
    /// Refuse to start
    #[default]
    Abort,
    /// Serve plain HTTP on the same listener and log a warning
    PlainHttp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "TlsConfig::default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "TlsConfig::default_key_path")]
    pub key_path: PathBuf,
    #[serde(default)]
    pub on_failure: TlsFailurePolicy,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: Self::default_cert_path(),
            key_path: Self::default_key_path(),
            on_failure: TlsFailurePolicy::default(),
        }
    }
}

impl TlsConfig {
    fn default_cert_path() -> PathBuf {
        PathBuf::from(DEFAULT_CERT_PATH)
    }

    fn default_key_path() -> PathBuf {
        PathBuf::from(DEFAULT_KEY_PATH)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Directory served at `/`
    #[serde(default = "SiteConfig::default_root")]
    pub root: PathBuf,
    /// When set, `/` and `/index.html` answer 302 to this location
    #[serde(default)]
    pub root_redirect: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            root_redirect: None,
        }
    }
}

impl SiteConfig {
    fn default_root() -> PathBuf {
        PathBuf::from(".")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvConfig {
    /// Candidate `.env` files; the first one that exists is loaded
    #[serde(default = "EnvConfig::default_files")]
    pub files: Vec<PathBuf>,
    /// Only keys starting with this prefix are kept
    #[serde(default)]
    pub prefix: Option<String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            files: Self::default_files(),
            prefix: None,
        }
    }
}

impl EnvConfig {
    fn default_files() -> Vec<PathBuf> {
        DEFAULT_ENV_FILES.iter().map(PathBuf::from).collect()
    }
}

/// Injection applied to HTML documents at serve time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum HtmlInjection {
    /// Serve HTML untouched
    None,
    /// `<meta name=KEY content=VALUE>` after `<head>`
    #[default]
    Meta,
    /// `window.OBJECT = {...}` script before `</head>`
    Window,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub html: HtmlInjection,
    /// Global object name for window-object injection
    #[serde(default = "TransformConfig::default_window_object")]
    pub window_object: String,
    /// Request paths of JS files whose `{{NAME}}` placeholders are substituted
    #[serde(default)]
    pub js_config: Vec<String>,
    /// Prefix prepended to a placeholder name to find its store key
    #[serde(default)]
    pub placeholder_prefix: String,
    /// Explicit placeholder name to store key table
    #[serde(default)]
    pub placeholders: BTreeMap<String, String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            html: HtmlInjection::default(),
            window_object: Self::default_window_object(),
            js_config: Vec::new(),
            placeholder_prefix: String::new(),
            placeholders: BTreeMap::new(),
        }
    }
}

impl TransformConfig {
    fn default_window_object() -> String {
        DEFAULT_WINDOW_OBJECT.to_string()
    }
}

/// Extra denylist entries. The built-in `DEFAULT_DENIED_FILES` and
/// `DEFAULT_DENIED_PATHS` always apply; these are added on top.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub denied_files: Vec<String>,
    #[serde(default)]
    pub denied_paths: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load the named file, or the default file if present, or built-in defaults.
    ///
    /// An explicitly named file that cannot be read is an error.
    pub fn load_or_default(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(target) = &self.site.root_redirect {
            if !target.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "site.root_redirect must be an absolute path, got '{target}'"
                )));
            }
        }

        if let Some(path) = self.transform.js_config.iter().find(|p| !p.starts_with('/')) {
            return Err(ConfigError::Validation(format!(
                "transform.js_config entries must start with '/', got '{path}'"
            )));
        }

        if self.transform.window_object.is_empty()
            || !self
                .transform
                .window_object
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            return Err(ConfigError::Validation(format!(
                "transform.window_object must be a JavaScript identifier, got '{}'",
                self.transform.window_object
            )));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
