//! The application core.
//!
//! An [`App`] owns the configuration, the parsed base URL, the dispatcher,
//! and the middleware chain, and turns one request into one response. It is
//! a cheap `Clone` around immutable innards: nothing here mutates after
//! construction, so one value is shared safely across every concurrent
//! connection the transport spawns.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use futures_util::FutureExt;
use serde_json::{Map, Value};
use url::Url;

use crate::assets::AssetRegistry;
use crate::config::Config;
use crate::dispatch::{Dispatcher, NullDispatcher};
use crate::error::Error;
use crate::flash;
use crate::handler::{BoxFuture, HandlerResult, IntoHandlerResult};
use crate::method::Method;
use crate::middleware::{EndpointFn, Middleware, Next};
use crate::oauth::OAuthBackend;
use crate::request::Request;
use crate::response::{escape_html, Response};
use crate::routes::{PathArgs, RouteBuildError};
use crate::session::{SessionCodec, SessionMiddleware};
use crate::templates::{ContextProcessor, TemplateRenderer};

// ── Handler combinators ───────────────────────────────────────────────────────

/// Wraps a handler with a request guard.
///
/// If `test(request)` returns `false`, the wrapped handler is skipped and
/// the response is a redirect to `target` (an endpoint name or a literal
/// URL, as accepted by [`App::redirect_to`]). Otherwise the call passes
/// through unchanged, arguments and return value included.
///
/// ```rust,no_run
/// use trellis::{redirect_if, MapDispatcher, PathArgs, Request, Response, RuleSet};
///
/// async fn dashboard(_req: Request, _args: PathArgs) -> Response {
///     Response::html("<h1>secrets</h1>")
/// }
///
/// fn logged_in(req: &Request) -> bool {
///     req.session().contains("user_id")
/// }
///
/// let dispatcher = MapDispatcher::new(RuleSet::new().rule("/dashboard/", "dashboard"))
///     .handler("dashboard", redirect_if(logged_in, "/login/", dashboard));
/// ```
pub fn redirect_if<T, F, Fut, R>(
    test: T,
    target: &'static str,
    handler: F,
) -> impl Fn(Request, PathArgs) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static
where
    T: Fn(&Request) -> bool + Send + Sync + 'static,
    F: Fn(Request, PathArgs) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = R> + Send + 'static,
    R: IntoHandlerResult + Send + 'static,
{
    move |req: Request, args: PathArgs| -> BoxFuture<'static, HandlerResult> {
        if test(&req) {
            let fut = handler(req, args);
            Box::pin(async move { fut.await.into_handler_result() })
        } else {
            let result = req
                .app()
                .redirect_to(target, &[])
                .map_err(crate::dispatch::HttpError::from);
            Box::pin(async move { result })
        }
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

/// The application core. Construct via [`App::builder`].
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    config: Config,
    secret_key: String,
    base_url: Url,
    server_scheme: String,
    server_host: String,
    dispatcher: Arc<dyn Dispatcher>,
    middlewares: Vec<Arc<dyn Middleware>>,
    renderer: TemplateRenderer,
    assets: Option<AssetRegistry>,
    debugger: bool,
    static_files: Option<StaticFiles>,
}

impl App {
    /// Starts building an app from its configuration and base directory
    /// (the directory holding `templates/` and `static/`).
    pub fn builder(config: Config, base_dir: impl Into<PathBuf>) -> AppBuilder {
        AppBuilder {
            config,
            base_dir: base_dir.into(),
            dispatcher: Arc::new(NullDispatcher),
            middlewares: Vec::new(),
            context_processors: vec![Arc::new(flash::context_processor)],
            oauth: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn secret_key(&self) -> &str {
        &self.inner.secret_key
    }

    pub fn base_url(&self) -> &str {
        self.inner.base_url.as_str()
    }

    pub fn server_scheme(&self) -> &str {
        &self.inner.server_scheme
    }

    pub fn server_host(&self) -> &str {
        &self.inner.server_host
    }

    /// Whether the app is configured to serve over HTTPS. Session cookies
    /// are marked `Secure` exactly when this holds.
    pub fn is_ssl(&self) -> bool {
        self.inner.server_scheme == "https"
    }

    pub fn assets(&self) -> Option<&AssetRegistry> {
        self.inner.assets.as_ref()
    }

    /// Builds a URL for an endpoint via the dispatcher.
    pub fn url_for(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, RouteBuildError> {
        self.inner
            .dispatcher
            .url_for(self.server_host(), endpoint, params)
    }

    /// Makes a relative URL absolute against the configured base URL, per
    /// RFC 3986 relative-reference resolution. Absolute URLs pass through.
    pub fn make_absolute_url(&self, url: &str) -> String {
        match self.inner.base_url.join(url) {
            Ok(joined) => joined.to_string(),
            Err(_) => url.to_string(),
        }
    }

    /// Redirects to a URL or endpoint, made absolute if needed.
    ///
    /// A target containing a slash is taken as a literal URL; anything else
    /// is an endpoint name resolved with `params` via [`App::url_for`].
    pub fn redirect_to(
        &self,
        target: &str,
        params: &[(&str, &str)],
    ) -> Result<Response, RouteBuildError> {
        let url = if target.contains('/') {
            target.to_string()
        } else {
            self.url_for(target, params)?
        };
        Ok(Response::redirect(&self.make_absolute_url(&url)))
    }

    /// Request-aware template render (applies context processors — flash
    /// messages among them).
    pub fn render(
        &self,
        req: &Request,
        template_name: &str,
        context: Map<String, Value>,
    ) -> Result<Response, Error> {
        self.inner.renderer.render(req, template_name, context)
    }

    /// Renders a template with a bare context.
    pub fn render_template(
        &self,
        template_name: &str,
        context: &Map<String, Value>,
    ) -> Result<Response, Error> {
        self.inner.renderer.render_template(template_name, context)
    }

    pub(crate) fn new_request(
        &self,
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Request {
        Request::new(self.clone(), method, path, query, headers, body)
    }

    /// The transport boundary: one request in, one response out.
    ///
    /// Serves static files when configured, then runs the middleware chain
    /// around dispatch and converts any HTTP-level short-circuit into its
    /// response.
    pub async fn handle(&self, req: Request) -> Response {
        if let Some(static_files) = &self.inner.static_files {
            if let Some(response) = static_files.try_serve(req.method(), req.path()).await {
                return response;
            }
        }

        let dispatcher = Arc::clone(&self.inner.dispatcher);
        let endpoint = move |req: Request| dispatcher.dispatch(req);
        match self.run_chain(&endpoint, req).await {
            Ok(response) => response,
            Err(http) => http.into_response(),
        }
    }

    async fn run_chain(&self, endpoint: &EndpointFn, req: Request) -> HandlerResult {
        let next = Next::new(&self.inner.middlewares, endpoint);
        if !self.inner.debugger {
            return next.run(req).await;
        }
        // Debug wrapper: trap handler panics and show them instead of
        // tearing down the connection.
        match AssertUnwindSafe(next.run(req)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "handler panicked");
                Ok(Response::builder().status(500).html(format!(
                    "<!doctype html>\n<title>Internal Server Error</title>\n\
                     <h1>Internal Server Error</h1>\n<pre>{}</pre>\n",
                    escape_html(&message)
                )))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Builds an [`App`]. Obtained from [`App::builder`].
pub struct AppBuilder {
    config: Config,
    base_dir: PathBuf,
    dispatcher: Arc<dyn Dispatcher>,
    middlewares: Vec<Arc<dyn Middleware>>,
    context_processors: Vec<ContextProcessor>,
    oauth: Option<Arc<dyn OAuthBackend>>,
}

impl AppBuilder {
    /// Sets the dispatcher. Defaults to [`NullDispatcher`] (everything
    /// 404s) so the app is usable before routes are wired up.
    pub fn dispatcher(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    /// Appends a middleware. First-registered runs outermost; the session
    /// middleware is always appended after all of these, innermost.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Appends a template context processor (flash is pre-registered).
    pub fn context_processor(mut self, processor: ContextProcessor) -> Self {
        self.context_processors.push(processor);
        self
    }

    /// Installs an OAuth backend; its app middleware (if any) wraps the
    /// chain outermost.
    pub fn oauth(mut self, backend: Arc<dyn OAuthBackend>) -> Self {
        self.oauth = Some(backend);
        self
    }

    /// Reads the startup configuration and assembles the app.
    ///
    /// Fails fast on a missing `app.secret_key`, an unparseable
    /// `app.base_url`, or malformed toggle values.
    pub fn build(self) -> Result<App, Error> {
        let config = self.config;

        let base_url_text = config.get_or("app.base_url", "http://localhost").to_string();
        let base_url =
            Url::parse(&base_url_text).map_err(|_| Error::BadBaseUrl(base_url_text.clone()))?;
        let server_scheme = base_url.scheme().to_string();
        let server_host = match base_url.port() {
            Some(port) => format!("{}:{port}", base_url.host_str().unwrap_or_default()),
            None => base_url.host_str().unwrap_or_default().to_string(),
        };

        let secret_key = config.require("app.secret_key")?.to_string();

        let static_dir = self.base_dir.join("static");
        let static_url = "/static/";

        let assets = if static_dir.join("bundles.yml").is_file() {
            let minify = config.getbool_or("assets.minify", true)?;
            Some(AssetRegistry::from_yaml(&static_dir, static_url, !minify)?)
        } else {
            None
        };

        let mut renderer = TemplateRenderer::new(self.base_dir.join("templates"));
        for processor in self.context_processors {
            renderer.add_context_processor(processor);
        }
        if let Some(assets) = &assets {
            renderer.register_assets(assets);
        }

        let cookie_name = config.get_or("session.cookie_name", "session").to_string();
        let expiry_days = config.getint_or("session.expiry_days", 0)?;
        let expiry = (expiry_days > 0).then(|| Duration::days(expiry_days));
        let secure = server_scheme == "https";
        let codec = SessionCodec::new(secret_key.clone(), cookie_name, expiry, secure);

        let mut middlewares: Vec<Arc<dyn Middleware>> = Vec::new();
        if let Some(layer) = self.oauth.as_ref().and_then(|backend| backend.app_middleware()) {
            middlewares.push(layer);
        }
        middlewares.extend(self.middlewares);
        middlewares.push(Arc::new(SessionMiddleware::new(codec)));

        let debugger = config.getbool_or("app.debugger", false)?;
        let static_files = config
            .getbool_or("app.serve_static", false)?
            .then(|| StaticFiles::new(static_url, static_dir));

        Ok(App {
            inner: Arc::new(AppInner {
                config,
                secret_key,
                base_url,
                server_scheme,
                server_host,
                dispatcher: self.dispatcher,
                middlewares,
                renderer,
                assets,
                debugger,
                static_files,
            }),
        })
    }
}

// ── Static file serving ───────────────────────────────────────────────────────

/// Serves files under a URL prefix straight from a directory, ahead of
/// dispatch. Meant for development setups without a fronting web server.
struct StaticFiles {
    url_prefix: String,
    dir: PathBuf,
}

impl StaticFiles {
    fn new(url_prefix: impl Into<String>, dir: PathBuf) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            dir,
        }
    }

    /// `None` when the path is outside the prefix; otherwise always a
    /// response (the file, or a 404 for misses and traversal attempts).
    async fn try_serve(&self, method: Method, path: &str) -> Option<Response> {
        let rel = path.strip_prefix(&self.url_prefix)?;
        if !matches!(method, Method::Get | Method::Head) {
            return Some(Response::status(405));
        }
        if rel.starts_with('/') || rel.split('/').any(|seg| seg == "..") {
            return Some(Response::status(404));
        }
        match tokio::fs::read(self.dir.join(rel)).await {
            Ok(bytes) => Some(Response::builder().bytes(content_type_for(rel), bytes)),
            Err(_) => Some(Response::status(404)),
        }
    }
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or_default() {
        "css" => "text/css; charset=utf-8",
        "gif" => "image/gif",
        "html" => "text/html; charset=utf-8",
        "ico" => "image/x-icon",
        "jpeg" | "jpg" => "image/jpeg",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "txt" => "text/plain; charset=utf-8",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MapDispatcher;
    use crate::routes::RuleSet;
    use serde_json::json;

    async fn show_thing(_req: Request, args: PathArgs) -> Response {
        Response::text(format!("thing id: {}", args.int("thing_id").unwrap_or(0)))
    }

    fn dispatcher() -> MapDispatcher {
        MapDispatcher::new(RuleSet::new().rule("/thing/<int:thing_id>/", "thing"))
            .handler("thing", show_thing)
    }

    fn app_with(pairs: &[(&str, &str)]) -> App {
        let mut config = Config::from_map([("app.secret_key", "secret")]);
        config.update(pairs.iter().copied());
        App::builder(config, "/tmp/testapp")
            .dispatcher(dispatcher())
            .build()
            .unwrap()
    }

    fn get(app: &App, path: &str) -> Request {
        app.new_request(Method::Get, path.to_string(), Vec::new(), Vec::new(), Vec::new())
    }

    #[test]
    fn base_url_parsed_into_scheme_and_host() {
        let app = app_with(&[("app.base_url", "https://example.com")]);
        assert_eq!(app.base_url(), "https://example.com/");
        assert_eq!(app.server_scheme(), "https");
        assert_eq!(app.server_host(), "example.com");
        assert!(app.is_ssl());
    }

    #[test]
    fn base_url_host_keeps_port() {
        let app = app_with(&[("app.base_url", "http://localhost:8000")]);
        assert_eq!(app.server_host(), "localhost:8000");
        assert!(!app.is_ssl());
    }

    #[test]
    fn missing_secret_key_fails_fast() {
        let err = App::builder(Config::new(), "/tmp/testapp").build().map(|_| ()).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(crate::config::ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn bad_toggle_value_fails_fast() {
        let config = Config::from_map([("app.secret_key", "secret"), ("app.debugger", "maybe")]);
        let err = App::builder(config, "/tmp/testapp").build().map(|_| ()).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(crate::config::ConfigError::InvalidBoolean { .. })
        ));
    }

    #[test]
    fn make_absolute_url_joins_base() {
        let app = app_with(&[("app.base_url", "http://somehost")]);
        assert_eq!(app.make_absolute_url("/foo/"), "http://somehost/foo/");
        assert_eq!(
            app.make_absolute_url("https://other/x/"),
            "https://other/x/"
        );
    }

    #[test]
    fn redirect_to_relative_url() {
        let app = app_with(&[("app.base_url", "http://somehost")]);
        let response = app.redirect_to("/foo/", &[]).unwrap();
        assert_eq!(response.status_code(), 302);
        assert_eq!(response.header("location"), Some("http://somehost/foo/"));
    }

    #[test]
    fn redirect_to_reverses_endpoint() {
        let app = app_with(&[("app.base_url", "http://somehost")]);
        let response = app.redirect_to("thing", &[("thing_id", "2")]).unwrap();
        assert_eq!(response.status_code(), 302);
        assert_eq!(response.header("location"), Some("http://somehost/thing/2/"));
    }

    #[test]
    fn redirect_to_absolute_url_unchanged() {
        let app = app_with(&[]);
        let response = app.redirect_to("https://www.example.com/bar/", &[]).unwrap();
        assert_eq!(
            response.header("location"),
            Some("https://www.example.com/bar/")
        );
    }

    #[test]
    fn url_for_builds_paths() {
        let app = app_with(&[]);
        assert_eq!(app.url_for("thing", &[("thing_id", "1")]).unwrap(), "/thing/1/");
        assert!(app.url_for("nope", &[]).is_err());
    }

    #[tokio::test]
    async fn handle_dispatches_matched_route() {
        let app = app_with(&[]);
        let response = app.handle(get(&app, "/thing/3/")).await;
        assert_eq!(response.body(), b"thing id: 3");
    }

    #[tokio::test]
    async fn handle_unknown_path_is_404() {
        let app = app_with(&[]);
        let response = app.handle(get(&app, "/foo/")).await;
        assert_eq!(response.status_code(), 404);
    }

    #[tokio::test]
    async fn handle_without_routes_is_404() {
        let config = Config::from_map([("app.secret_key", "secret")]);
        let app = App::builder(config, "/tmp/testapp").build().unwrap();
        let response = app.handle(get(&app, "/anything/")).await;
        assert_eq!(response.status_code(), 404);
    }

    #[tokio::test]
    async fn handle_saves_session_written_by_handler() {
        async fn remember(req: Request, _args: PathArgs) -> Response {
            req.session().insert("user_id", json!(7));
            Response::text("ok")
        }
        let config = Config::from_map([("app.secret_key", "secret")]);
        let dispatcher = MapDispatcher::new(RuleSet::new().rule("/login/", "login"))
            .handler("login", remember);
        let app = App::builder(config, "/tmp/testapp")
            .dispatcher(dispatcher)
            .build()
            .unwrap();

        let response = app.handle(get(&app, "/login/")).await;
        let cookie = response.header("set-cookie").expect("session cookie");
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("; HttpOnly"));
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn debugger_renders_panics_as_500() {
        async fn boom(_req: Request, _args: PathArgs) -> Response {
            panic!("kaboom");
        }
        let config =
            Config::from_map([("app.secret_key", "secret"), ("app.debugger", "true")]);
        let dispatcher =
            MapDispatcher::new(RuleSet::new().rule("/boom/", "boom")).handler("boom", boom);
        let app = App::builder(config, "/tmp/testapp")
            .dispatcher(dispatcher)
            .build()
            .unwrap();

        let response = app.handle(get(&app, "/boom/")).await;
        assert_eq!(response.status_code(), 500);
        assert!(String::from_utf8_lossy(response.body()).contains("kaboom"));
    }

    #[tokio::test]
    async fn redirect_if_passes_through_when_test_holds() {
        async fn inner(_req: Request, args: PathArgs) -> Response {
            Response::text(format!("handled {}", args.int("thing_id").unwrap_or(0)))
        }
        let app = app_with(&[]);
        let guarded = redirect_if(|_req: &Request| true, "/login/", inner);

        let response = guarded(get(&app, "/x/"), PathArgs::empty()).await.unwrap();
        assert_eq!(response.body(), b"handled 0");
    }

    #[tokio::test]
    async fn redirect_if_redirects_when_test_fails() {
        async fn inner(_req: Request, _args: PathArgs) -> Response {
            Response::text("should not run")
        }
        let app = app_with(&[("app.base_url", "http://somehost")]);
        let guarded = redirect_if(|_req: &Request| false, "/login/", inner);

        let response = guarded(get(&app, "/x/"), PathArgs::empty()).await.unwrap();
        assert_eq!(response.status_code(), 302);
        assert_eq!(response.header("location"), Some("http://somehost/login/"));
    }

    #[tokio::test]
    async fn serves_static_files_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(&static_dir).unwrap();
        std::fs::write(static_dir.join("site.css"), "body {}").unwrap();

        let config =
            Config::from_map([("app.secret_key", "secret"), ("app.serve_static", "true")]);
        let app = App::builder(config, dir.path()).build().unwrap();

        let response = app.handle(get(&app, "/static/site.css")).await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.header("content-type"), Some("text/css; charset=utf-8"));
        assert_eq!(response.body(), b"body {}");

        let response = app.handle(get(&app, "/static/../secret.txt")).await;
        assert_eq!(response.status_code(), 404);

        let response = app.handle(get(&app, "/static/missing.css")).await;
        assert_eq!(response.status_code(), 404);
    }
}
