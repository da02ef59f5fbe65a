//! Static file handler.
//!
//! Each request walks `ResolvePath -> GuardCheck -> Load -> (Transform) -> Respond`
//! and may stop early with 403 or 404. The guard runs before any filesystem
//! access and again on the canonical file location, so neither encoded names nor
//! symlinks reach a denied file.

use std::path::{Component, Path, PathBuf};

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use http::HeaderValue;
use tracing::instrument;

use crate::access::AccessGuard;
use crate::config::{
    CACHE_CONTROL_NO_STORE, CONTENT_TYPE_HTML, CONTENT_TYPE_JS, INDEX_DOCUMENT,
    OPTIONAL_ASSET_MARKERS,
};
use crate::error::AppError;
use crate::middleware::ServeOutcome;
use crate::state::AppState;
use crate::transform::{self, TransformMode};

/// A decoded request path mapped onto the site tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Decoded path with the default document applied, e.g. `/docs/index.html`
    pub request_path: String,
    /// Same path relative to the site root, free of `..` components
    pub relative: PathBuf,
}

/// Decode `raw`, apply the default document, consult the guard and reject
/// traversal. No filesystem access happens here.
pub fn resolve_request_path(raw: &str, guard: &AccessGuard) -> Result<ResolvedPath, AppError> {
    let decoded = urlencoding::decode(raw).map_err(|_| AppError::BadRequest)?;

    let request_path = if decoded.is_empty() || decoded == "/" {
        format!("/{INDEX_DOCUMENT}")
    } else if decoded.ends_with('/') {
        format!("{decoded}{INDEX_DOCUMENT}")
    } else {
        decoded.into_owned()
    };

    if !guard.is_allowed(&request_path) {
        tracing::warn!(path = %request_path, "Blocked request for protected path");
        return Err(AppError::Forbidden);
    }

    let mut relative = PathBuf::new();
    for segment in request_path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                tracing::warn!(path = %request_path, "Blocked path traversal attempt");
                return Err(AppError::Forbidden);
            }
            s if s.contains('\\') || s.contains('\0') => {
                tracing::warn!(path = %request_path, "Blocked path with invalid segment");
                return Err(AppError::Forbidden);
            }
            s => relative.push(s),
        }
    }

    Ok(ResolvedPath {
        request_path,
        relative,
    })
}

enum Located {
    File(PathBuf),
    Directory,
}

/// Map the resolved path to a canonical file below the site root.
async fn locate(state: &AppState, resolved: &ResolvedPath) -> Result<Located, AppError> {
    let full = state.root().join(&resolved.relative);

    let canonical = match tokio::fs::canonicalize(&full).await {
        Ok(path) => path,
        Err(e) => {
            tracing::debug!(path = %full.display(), error = %e, "Resource could not be resolved");
            return Err(AppError::NotFound(resolved.request_path.clone()));
        }
    };

    if !canonical.starts_with(state.root()) {
        tracing::warn!(path = %resolved.request_path, "Blocked request resolving outside the site root");
        return Err(AppError::Forbidden);
    }

    if !state.guard.is_allowed(&site_relative(state.root(), &canonical)) {
        tracing::warn!(path = %resolved.request_path, "Blocked request resolving to a protected file");
        return Err(AppError::Forbidden);
    }

    let metadata = tokio::fs::metadata(&canonical).await?;
    if metadata.is_dir() {
        return Ok(Located::Directory);
    }
    Ok(Located::File(canonical))
}

/// `/`-separated form of `path` relative to `root`, for re-checking the guard.
fn site_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut out = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            out.push('/');
            out.push_str(&part.to_string_lossy());
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// How a located file is sent.
struct Presentation<'a> {
    content_type: String,
    mode: Option<&'a TransformMode>,
    no_store: bool,
}

fn present<'a>(state: &'a AppState, request_path: &str, file: &Path) -> Presentation<'a> {
    if let Some(mode) = state.js_config_mode(request_path) {
        return Presentation {
            content_type: CONTENT_TYPE_JS.to_string(),
            mode: Some(mode),
            no_store: true,
        };
    }

    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => Presentation {
            content_type: CONTENT_TYPE_HTML.to_string(),
            mode: state.html_mode(),
            no_store: false,
        },
        Some("js") | Some("mjs") => Presentation {
            content_type: CONTENT_TYPE_JS.to_string(),
            mode: None,
            no_store: false,
        },
        _ => Presentation {
            content_type: mime_guess::from_path(file)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            mode: None,
            no_store: false,
        },
    }
}

fn is_optional_asset(path: &str) -> bool {
    OPTIONAL_ASSET_MARKERS.iter().any(|m| path.contains(m))
}

fn redirect(status: StatusCode, location: &str) -> Response {
    (status, [(header::LOCATION, location.to_string())]).into_response()
}

async fn handle(
    state: &AppState,
    method: &Method,
    raw_path: &str,
) -> Result<(ServeOutcome, Response), AppError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(AppError::NotImplemented(method.to_string()));
    }

    let resolved = resolve_request_path(raw_path, &state.guard)?;

    // Compared on the resolved form so encoded or dotted spellings of the root
    // document are redirected too.
    if let Some(target) = &state.config.site.root_redirect {
        if resolved.relative == Path::new(INDEX_DOCUMENT) {
            tracing::debug!(path = %raw_path, to = %target, "Redirecting site root");
            return Ok((ServeOutcome::Redirected, redirect(StatusCode::FOUND, target)));
        }
    }

    let file = match locate(state, &resolved).await? {
        Located::File(file) => file,
        Located::Directory if !raw_path.ends_with('/') => {
            let response = redirect(StatusCode::MOVED_PERMANENTLY, &format!("{raw_path}/"));
            return Ok((ServeOutcome::Redirected, response));
        }
        Located::Directory => return Err(AppError::NotFound(resolved.request_path)),
    };

    let bytes = tokio::fs::read(&file).await?;
    let presentation = present(state, &resolved.request_path, &file);

    let (outcome, body) = match presentation.mode {
        Some(mode) => match transform::apply(mode, &bytes, &state.env) {
            Ok(transformed) => (ServeOutcome::Transformed, transformed),
            Err(e) => {
                tracing::warn!(path = %resolved.request_path, error = %e, "Serving content untransformed");
                (ServeOutcome::Untransformed, bytes)
            }
        },
        None => (ServeOutcome::Static, bytes),
    };

    let mut response = ([(header::CONTENT_TYPE, presentation.content_type)], body).into_response();
    if presentation.no_store {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NO_STORE),
        );
    }
    Ok((outcome, response))
}

/// Fallback handler for every request.
#[instrument(name = "serve::serve", skip(state, method, uri))]
pub async fn serve(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    let raw_path = uri.path();
    let (outcome, mut response) = match handle(&state, &method, raw_path).await {
        Ok(served) => served,
        Err(err) => {
            match &err {
                AppError::NotFound(path) if is_optional_asset(path) => {
                    tracing::debug!(path = %path, "Optional asset not found");
                }
                AppError::NotFound(path) => tracing::info!(path = %path, "Resource not found"),
                AppError::NotImplemented(m) => tracing::info!(method = %m, "Unsupported method"),
                AppError::BadRequest => tracing::debug!(path = %raw_path, "Undecodable request path"),
                // logged where they are raised
                AppError::Forbidden | AppError::Io(_) => {}
            }
            (ServeOutcome::from(&err), err.into_response())
        }
    };
    response.extensions_mut().insert(outcome);
    response
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::{AppConfig, HtmlInjection, CACHE_CONTROL_NO_STORE};
    use crate::env::EnvironmentStore;
    use http::HeaderMap;

    const INDEX: &str = "<!DOCTYPE html>\n<html>\n<head>\n  <title>Home</title>\n</head>\n<body>home page</body>\n</html>\n";

    struct Site {
        dir: tempfile::TempDir,
    }

    impl Site {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("site");
            std::fs::create_dir_all(root.join("js")).unwrap();
            std::fs::create_dir_all(root.join("docs")).unwrap();
            std::fs::create_dir_all(root.join("assets")).unwrap();

            std::fs::write(root.join("index.html"), INDEX).unwrap();
            std::fs::write(root.join("docs/index.html"), "<head></head>docs").unwrap();
            std::fs::write(root.join("secrets.json"), "TOP-SECRET-VALUE").unwrap();
            std::fs::write(root.join(".env"), "FOO=LEAKED-ENV").unwrap();
            std::fs::write(root.join("assets/.env"), "FOO=LEAKED-ASSET").unwrap();
            std::fs::write(
                root.join("js/config.js"),
                r#"const CONFIG = { key: "{{API_KEY}}", missing: "{{NOT_SET}}" };"#,
            )
            .unwrap();
            std::fs::write(root.join("js/app.js"), r#"console.log("{{API_KEY}}");"#).unwrap();
            std::fs::write(root.join("latin1.html"), b"<head></head>caf\xe9").unwrap();
            std::fs::write(root.join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
            std::fs::write(dir.path().join("outside.txt"), "OUTSIDE-ROOT").unwrap();
            Self { dir }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("site")
        }

        fn config(&self) -> AppConfig {
            let mut config = AppConfig::default();
            config.site.root = self.root();
            config.transform.js_config = vec!["/js/config.js".to_string()];
            config.transform.placeholder_prefix = "EXPO_PUBLIC_".to_string();
            config
        }

        fn state(&self, config: AppConfig) -> AppState {
            let env = EnvironmentStore::from_pairs([("FOO", "bar"), ("EXPO_PUBLIC_API_KEY", "key-123")]);
            AppState::new(config, env).unwrap()
        }
    }

    async fn request(state: &AppState, method: Method, path: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        let uri: Uri = path.parse().unwrap();
        let response = serve(State(state.clone()), method, uri).await;
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }

    async fn get(state: &AppState, path: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
        request(state, Method::GET, path).await
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        String::from_utf8_lossy(haystack).contains(needle)
    }

    #[test]
    fn test_resolve_default_documents() {
        let guard = AccessGuard::default();
        let root = resolve_request_path("/", &guard).unwrap();
        assert_eq!(root.request_path, "/index.html");
        assert_eq!(root.relative, PathBuf::from("index.html"));

        let nested = resolve_request_path("/docs/", &guard).unwrap();
        assert_eq!(nested.request_path, "/docs/index.html");
        assert_eq!(nested.relative, PathBuf::from("docs/index.html"));
    }

    #[test]
    fn test_resolve_decodes_before_guard() {
        let guard = AccessGuard::default();
        for raw in ["/%2Eenv", "/%2eENV", "/assets/%2E%65nv", "/secrets%2Ejson"] {
            assert!(
                matches!(resolve_request_path(raw, &guard), Err(AppError::Forbidden)),
                "{raw} should be forbidden"
            );
        }
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let guard = AccessGuard::default();
        for raw in ["/../outside.txt", "/docs/../../outside.txt", "/%2e%2e/outside.txt", "/a%5c..%5cb"] {
            assert!(
                matches!(resolve_request_path(raw, &guard), Err(AppError::Forbidden)),
                "{raw} should be forbidden"
            );
        }
    }

    #[test]
    fn test_resolve_rejects_invalid_encoding() {
        let guard = AccessGuard::default();
        assert!(matches!(
            resolve_request_path("/%ff%fe.html", &guard),
            Err(AppError::BadRequest)
        ));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_forbidden_is_logged_without_rule() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let guard = AccessGuard::default();
        let result = tracing::subscriber::with_default(subscriber, || {
            resolve_request_path("/static/My.Env.Local.bak", &guard)
        });
        assert!(matches!(result, Err(AppError::Forbidden)));

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Blocked request for protected path"));
        assert!(output.contains("/static/My.Env.Local.bak"));
        assert!(!output.contains(".env.local"));
    }

    #[tokio::test]
    async fn test_root_injects_meta_tags() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, headers, body) = get(&state, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], CONTENT_TYPE_HTML);
        assert!(contains(&body, "<head>\n    <meta name=\"FOO\" content=\"bar\">"));
        assert!(contains(&body, "home page"));
    }

    #[tokio::test]
    async fn test_nested_directory_index() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, _, body) = get(&state, "/docs/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(contains(&body, "docs"));
    }

    #[tokio::test]
    async fn test_directory_without_slash_redirects() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, headers, _) = get(&state, "/docs").await;
        assert_eq!(status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(headers[header::LOCATION], "/docs/");
    }

    #[tokio::test]
    async fn test_denied_files_are_forbidden_without_content() {
        let site = Site::new();
        let state = site.state(site.config());
        for path in ["/secrets.json", "/.env", "/.ENV", "/assets/.env", "/%2Eenv", "/.env/"] {
            let (status, _, body) = get(&state, path).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
            assert!(!contains(&body, "TOP-SECRET"), "{path}");
            assert!(!contains(&body, "LEAKED"), "{path}");
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, _, _) = get(&state, "/missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get(&state, "/index.html/child").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_never_leaves_root() {
        let site = Site::new();
        let state = site.state(site.config());
        for path in ["/../outside.txt", "/%2e%2e/outside.txt", "/docs/%2E%2E/%2E%2E/outside.txt"] {
            let (status, _, body) = get(&state, path).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
            assert!(!contains(&body, "OUTSIDE-ROOT"));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_cannot_escape_or_alias_denied_files() {
        let site = Site::new();
        std::os::unix::fs::symlink(site.dir.path().join("outside.txt"), site.root().join("out.txt"))
            .unwrap();
        std::os::unix::fs::symlink(site.root().join("secrets.json"), site.root().join("data.txt"))
            .unwrap();
        let state = site.state(site.config());

        let (status, _, body) = get(&state, "/out.txt").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!contains(&body, "OUTSIDE-ROOT"));

        let (status, _, body) = get(&state, "/data.txt").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!contains(&body, "TOP-SECRET"));
    }

    #[tokio::test]
    async fn test_js_config_substitution_and_cache_headers() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, headers, body) = get(&state, "/js/config.js").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], CONTENT_TYPE_JS);
        assert_eq!(headers[header::CACHE_CONTROL], CACHE_CONTROL_NO_STORE);
        assert!(contains(&body, r#"key: "key-123""#));
        assert!(contains(&body, r#"missing: "{{NOT_SET}}""#));
    }

    #[tokio::test]
    async fn test_other_js_passes_through() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, headers, body) = get(&state, "/js/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], CONTENT_TYPE_JS);
        assert!(headers.get(header::CACHE_CONTROL).is_none());
        assert_eq!(body, br#"console.log("{{API_KEY}}");"#);
    }

    #[tokio::test]
    async fn test_non_utf8_html_served_raw() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, _, body) = get(&state, "/latin1.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<head></head>caf\xe9");
    }

    #[tokio::test]
    async fn test_binary_media_type() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, headers, body) = get(&state, "/logo.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(body, [0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn test_html_injection_disabled() {
        let site = Site::new();
        let mut config = site.config();
        config.transform.html = HtmlInjection::None;
        let state = site.state(config);
        let (_, _, body) = get(&state, "/index.html").await;
        assert_eq!(body, INDEX.as_bytes());
    }

    #[tokio::test]
    async fn test_window_injection_mode() {
        let site = Site::new();
        let mut config = site.config();
        config.transform.html = HtmlInjection::Window;
        config.transform.window_object = "ENV".to_string();
        let state = site.state(config);
        let (_, _, body) = get(&state, "/").await;
        assert!(contains(&body, "window.ENV = {"));
        assert!(contains(&body, r#""FOO": "bar""#));
        assert!(!contains(&body, "<meta name=\"FOO\""));
    }

    #[tokio::test]
    async fn test_configured_root_redirect() {
        let site = Site::new();
        let mut config = site.config();
        config.site.root_redirect = Some("/auth/login.html".to_string());
        let state = site.state(config);

        for path in ["/", "/index.html", "/%69ndex.html", "/./index.html", "//index.html", "/%2F"] {
            let (status, headers, _) = get(&state, path).await;
            assert_eq!(status, StatusCode::FOUND, "{path}");
            assert_eq!(headers[header::LOCATION], "/auth/login.html");
        }
        let (status, _, _) = get(&state, "/docs/").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, _, _) = request(&state, Method::POST, "/index.html").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        let (status, _, _) = request(&state, Method::DELETE, "/secrets.json").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_head_uses_get_pipeline() {
        let site = Site::new();
        let state = site.state(site.config());
        let (status, headers, _) = request(&state, Method::HEAD, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], CONTENT_TYPE_HTML);
        let (status, _, _) = request(&state, Method::HEAD, "/secrets.json").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_responses_carry_outcome() {
        let site = Site::new();
        let state = site.state(site.config());

        for (path, expected) in [
            ("/", ServeOutcome::Transformed),
            ("/logo.png", ServeOutcome::Static),
            ("/latin1.html", ServeOutcome::Untransformed),
            ("/docs", ServeOutcome::Redirected),
            ("/.env", ServeOutcome::Denied),
            ("/nope.html", ServeOutcome::Missing),
            ("/%ff", ServeOutcome::Rejected),
        ] {
            let uri: Uri = path.parse().unwrap();
            let response = serve(State(state.clone()), Method::GET, uri).await;
            assert_eq!(response.extensions().get::<ServeOutcome>(), Some(&expected), "{path}");
        }
    }

    #[test]
    fn test_optional_assets() {
        assert!(is_optional_asset("/.well-known/appspecific/com.chrome.devtools.json"));
        assert!(is_optional_asset("/main.dart.js.map"));
        assert!(!is_optional_asset("/missing.html"));
    }
}
