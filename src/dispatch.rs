//! Request dispatch: endpoint lookup and the HTTP-level short-circuits.
//!
//! A [`Dispatcher`] maps a matched route to a handler and reverses endpoint
//! names back into URLs. Handlers are registered in an explicit
//! `endpoint → handler` map, so the handler set is statically enumerable
//! and testable.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler, HandlerResult};
use crate::request::Request;
use crate::response::Response;
use crate::routes::{RouteBuildError, RuleSet};

// ── HTTP-level short-circuits ─────────────────────────────────────────────────

/// A recoverable HTTP-level condition, converted into its response at the
/// application-core boundary instead of crashing the request.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// No route matched, or the matched endpoint has no handler. Surfaced
    /// to the client as a 404 response.
    #[error("not found")]
    NotFound,

    /// A redirect raised as an error to unwind out of nested handler code.
    #[error("redirect to {0}")]
    Redirect(String),

    /// A programmer or configuration error that escaped a handler.
    /// Surfaced as a 500 response; the underlying error is logged.
    #[error(transparent)]
    Internal(#[from] Box<Error>),
}

impl HttpError {
    pub fn into_response(self) -> Response {
        match self {
            Self::NotFound => {
                let mut response =
                    Response::html("<!doctype html>\n<title>Not Found</title>\n<h1>Not Found</h1>\n");
                response.status = 404;
                response
            }
            Self::Redirect(url) => Response::redirect(&url),
            Self::Internal(err) => {
                tracing::error!(error = %err, "handler failed");
                Response::status(500)
            }
        }
    }
}

impl From<Error> for HttpError {
    fn from(err: Error) -> Self {
        Self::Internal(Box::new(err))
    }
}

impl From<RouteBuildError> for HttpError {
    fn from(err: RouteBuildError) -> Self {
        Self::Internal(Box::new(Error::RouteBuild(err)))
    }
}

impl From<ConfigError> for HttpError {
    fn from(err: ConfigError) -> Self {
        Self::Internal(Box::new(Error::Config(err)))
    }
}

impl From<crate::oauth::OAuthError> for HttpError {
    fn from(err: crate::oauth::OAuthError) -> Self {
        Self::Internal(Box::new(Error::OAuth(err)))
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Maps requests to handlers and endpoint names back to URLs.
pub trait Dispatcher: Send + Sync {
    /// Builds a URL for `endpoint` on `host` with the given parameters.
    fn url_for(
        &self,
        host: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, RouteBuildError>;

    /// Dispatches a request to its handler and returns the handler's
    /// result verbatim.
    fn dispatch(&self, req: Request) -> BoxFuture<'static, HandlerResult>;
}

/// A dispatcher with no routes: every `url_for` fails and every dispatch
/// is a 404. Lets the application core be constructed and wrapped in
/// middleware before any routes are wired up.
pub struct NullDispatcher;

impl Dispatcher for NullDispatcher {
    fn url_for(
        &self,
        _host: &str,
        endpoint: &str,
        _params: &[(&str, &str)],
    ) -> Result<String, RouteBuildError> {
        Err(RouteBuildError::UnknownEndpoint(endpoint.to_string()))
    }

    fn dispatch(&self, _req: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin(async { Err(HttpError::NotFound) })
    }
}

/// Dispatcher over a [`RuleSet`] and an explicit endpoint → handler map.
///
/// ```rust,no_run
/// use trellis::{MapDispatcher, PathArgs, Request, Response, RuleSet};
///
/// async fn show_thing(_req: Request, args: PathArgs) -> Response {
///     Response::text(format!("thing id: {}", args.int("thing_id").unwrap_or(0)))
/// }
///
/// let dispatcher = MapDispatcher::new(RuleSet::new().rule("/thing/<int:thing_id>/", "thing"))
///     .handler("thing", show_thing);
/// ```
pub struct MapDispatcher {
    rules: RuleSet,
    handlers: HashMap<String, BoxedHandler>,
}

impl MapDispatcher {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for an endpoint name. Returns `self` for
    /// chaining.
    pub fn handler(mut self, endpoint: &str, handler: impl Handler) -> Self {
        self.handlers
            .insert(endpoint.to_string(), handler.into_boxed_handler());
        self
    }
}

impl Dispatcher for MapDispatcher {
    fn url_for(
        &self,
        _host: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, RouteBuildError> {
        self.rules.build(endpoint, params)
    }

    /// A request whose path matches no rule, or whose endpoint has no
    /// registered handler, resolves to [`HttpError::NotFound`].
    fn dispatch(&self, req: Request) -> BoxFuture<'static, HandlerResult> {
        let matched = self
            .rules
            .recognize(req.path())
            .and_then(|(endpoint, args)| Some((Arc::clone(self.handlers.get(endpoint)?), args)));
        match matched {
            Some((handler, args)) => handler.call(req, args),
            None => Box::pin(async { Err(HttpError::NotFound) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::routes::PathArgs;

    fn dispatcher() -> MapDispatcher {
        async fn show_thing(_req: Request, args: PathArgs) -> Response {
            Response::text(format!("thing id: {}", args.int("thing_id").unwrap_or(0)))
        }

        let rules = RuleSet::new()
            .rule("/thing/<int:thing_id>/", "thing")
            .rule("/no/handler/", "orphan");
        MapDispatcher::new(rules).handler("thing", show_thing)
    }

    fn request(path: &str) -> Request {
        Request::detached(Method::Get, path)
    }

    #[test]
    fn null_dispatcher_url_for_always_fails() {
        let err = NullDispatcher.url_for("loc", "foo", &[]).unwrap_err();
        assert!(matches!(err, RouteBuildError::UnknownEndpoint(_)));
    }

    #[tokio::test]
    async fn null_dispatcher_always_not_found() {
        let result = NullDispatcher.dispatch(request("/anything/")).await;
        assert!(matches!(result, Err(HttpError::NotFound)));
    }

    #[test]
    fn map_dispatcher_url_for() {
        let url = dispatcher().url_for("loc", "thing", &[("thing_id", "4")]).unwrap();
        assert_eq!(url, "/thing/4/");
    }

    #[tokio::test]
    async fn map_dispatcher_invokes_handler_with_typed_args() {
        let response = dispatcher().dispatch(request("/thing/2/")).await.unwrap();
        assert_eq!(response.body(), b"thing id: 2");
    }

    #[tokio::test]
    async fn map_dispatcher_no_route_is_not_found() {
        let result = dispatcher().dispatch(request("/foo/")).await;
        assert!(matches!(result, Err(HttpError::NotFound)));
    }

    #[tokio::test]
    async fn map_dispatcher_no_handler_is_not_found() {
        let result = dispatcher().dispatch(request("/no/handler/")).await;
        assert!(matches!(result, Err(HttpError::NotFound)));
    }
}
