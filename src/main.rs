//! envserve: a local development file server.
//!
//! This is the application entry point. It loads configuration from TOML with CLI
//! overrides, initializes tracing, reads the environment file once, and then
//! serves the site, rewrites an HTML file for deployment, or provisions the
//! development certificate.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use envserve::config::{
    AppConfig, EnvConfig, HtmlInjection, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT, DEFAULT_LOG_FILTER,
};
use envserve::env::{EnvError, EnvironmentStore};
use envserve::http::{setup_shutdown_handler, ServerRuntime};
use envserve::transform::inject_window_file;
use envserve::{cert, create_router, AppState};

/// envserve: serve a static site with environment injection
#[derive(Parser, Debug)]
#[command(name = "envserve", version, about)]
struct Args {
    /// Path to configuration file (defaults to envserve.toml when present)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level filter (e.g., "envserve=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the site (default)
    Serve(ServeArgs),

    /// Write the window-object block into an HTML file
    Inject {
        /// HTML file to rewrite in place
        #[arg(long)]
        html: PathBuf,

        #[command(flatten)]
        env: EnvArgs,

        /// Global object name (window.NAME)
        #[arg(long)]
        object: Option<String>,
    },

    /// Generate the self-signed certificate if missing
    Cert {
        #[arg(long)]
        cert: Option<PathBuf>,

        #[arg(long)]
        key: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Default)]
struct EnvArgs {
    /// Environment file to read instead of the configured candidates
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Only keep variables whose names start with this prefix
    #[arg(long)]
    env_prefix: Option<String>,
}

impl EnvArgs {
    fn apply(self, env: &mut EnvConfig) {
        if let Some(file) = self.env_file {
            env.files = vec![file];
        }
        if let Some(prefix) = self.env_prefix {
            env.prefix = Some(prefix);
        }
    }
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Site root (build output directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve over HTTPS with a self-signed certificate
    #[arg(long)]
    tls: bool,

    #[command(flatten)]
    env: EnvArgs,

    /// How environment values are injected into HTML
    #[arg(long, value_enum)]
    html_mode: Option<HtmlInjection>,

    /// Redirect requests for `/` to this path
    #[arg(long)]
    redirect_root: Option<String>,
}

impl ServeArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(root) = self.root {
            config.site.root = root;
        }
        if self.tls {
            config.tls.enabled = true;
            if self.port.is_none() && config.http.port == DEFAULT_HTTP_PORT {
                config.http.port = DEFAULT_HTTPS_PORT;
            }
        }
        if let Some(port) = self.port {
            config.http.port = port;
            config.http.port_candidates.clear();
        }
        self.env.apply(&mut config.env);
        if let Some(mode) = self.html_mode {
            config.transform.html = mode;
        }
        if let Some(target) = self.redirect_root {
            config.site.root_redirect = Some(target);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration, then layer CLI overrides on top
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    let command = args.command.unwrap_or(Command::Serve(ServeArgs::default()));
    match command {
        Command::Serve(serve) => {
            serve.apply(&mut config);
            config.validate()?;
            init_tracing(args.log_level, &config.logging.format);
            serve_site(config).await
        }
        Command::Inject { html, env, object } => {
            env.apply(&mut config.env);
            if let Some(object) = object {
                config.transform.window_object = object;
            }
            config.validate()?;
            init_tracing(args.log_level, &config.logging.format);

            let store = load_environment(&config.env)?;
            if !inject_window_file(&html, &store, &config.transform.window_object)? {
                tracing::warn!(path = %html.display(), "No </head> tag found, file left unchanged");
            }
            Ok(())
        }
        Command::Cert { cert, key } => {
            if let Some(cert) = cert {
                config.tls.cert_path = cert;
            }
            if let Some(key) = key {
                config.tls.key_path = key;
            }
            init_tracing(args.log_level, &config.logging.format);

            let outcome = cert::ensure(&config.tls.cert_path, &config.tls.key_path)?;
            tracing::info!(
                ?outcome,
                cert = %config.tls.cert_path.display(),
                key = %config.tls.key_path.display(),
                "Certificate ready"
            );
            Ok(())
        }
    }
}

/// Initialize tracing with priority: CLI > env > default
fn init_tracing(cli_filter: Option<String>, format: &str) {
    let log_filter = cli_filter
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry = tracing_subscriber::registry().with(EnvFilter::new(&log_filter));
    if format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Read the first environment file that exists. Values are never logged.
fn load_environment(config: &EnvConfig) -> Result<EnvironmentStore, EnvError> {
    let (store, source) = EnvironmentStore::load_first(&config.files, config.prefix.as_deref())?;
    match source {
        Some(path) => tracing::info!(
            path = %path.display(),
            count = store.len(),
            keys = ?store.keys().collect::<Vec<_>>(),
            "Loaded environment variables"
        ),
        None => tracing::warn!(
            candidates = ?config.files,
            "No environment file found, continuing with an empty environment"
        ),
    }
    Ok(store)
}

async fn serve_site(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env = load_environment(&config.env)?;

    // Create application state
    let state = AppState::new(config.clone(), env).map_err(|e| {
        format!("Site root {} is not usable: {e}", config.site.root.display())
    })?;
    tracing::info!(
        root = %state.root().display(),
        html = ?config.transform.html,
        js_config = ?config.transform.js_config,
        "Site configured"
    );

    // Create router
    let app = create_router(state);

    // Bind first so an occupied port fails before any certificate work
    let runtime = ServerRuntime::bind(&config.http)?;
    setup_shutdown_handler(runtime.handle());

    runtime.serve(app, config.tls.clone()).await?;
    tracing::info!("Server stopped");
    Ok(())
}
