//! Middleware: ordered pre/post processing around dispatch.
//!
//! A middleware wraps the rest of the chain: work done before
//! `next.run(req)` is its pre-phase, work done on the returned response is
//! its post-phase. The first-registered middleware is outermost — its
//! pre-phase runs first and its post-phase last. The session middleware is
//! always appended by the application builder, so it runs innermost: it
//! loads the session immediately before dispatch and stamps the cookie
//! immediately after the handler returns, before any outer middleware sees
//! the response.
//!
//! An error short-circuit (`HttpError`) unwinds past the remaining
//! post-phases and is converted to a response at the application boundary.

use std::sync::Arc;

use crate::handler::{BoxFuture, HandlerResult};
use crate::request::Request;

/// One stage of the request-processing chain.
pub trait Middleware: Send + Sync {
    /// Processes `req`, calling `next.run(req)` to execute the rest of the
    /// chain (remaining middlewares, then the dispatcher).
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, HandlerResult>;
}

/// The innermost stage: the dispatcher itself.
pub type EndpointFn = dyn Fn(Request) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// The remainder of the middleware chain.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    endpoint: &'a EndpointFn,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a EndpointFn) -> Self {
        Self { rest: chain, endpoint }
    }

    /// Runs the rest of the chain to completion.
    pub fn run(self, req: Request) -> BoxFuture<'a, HandlerResult> {
        match self.rest.split_first() {
            Some((middleware, rest)) => middleware.call(
                req,
                Next {
                    rest,
                    endpoint: self.endpoint,
                },
            ),
            None => (self.endpoint)(req),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::response::Response;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recorder {
        fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("{}:pre", self.name));
                let response = next.run(req).await;
                self.log.lock().unwrap().push(format!("{}:post", self.name));
                response
            })
        }
    }

    #[tokio::test]
    async fn first_registered_runs_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder { name: "outer", log: Arc::clone(&log) }),
            Arc::new(Recorder { name: "inner", log: Arc::clone(&log) }),
        ];
        let endpoint = |_req: Request| -> BoxFuture<'static, HandlerResult> {
            Box::pin(async { Ok(Response::text("ok")) })
        };

        let next = Next::new(&chain, &endpoint);
        let response = next.run(Request::detached(Method::Get, "/")).await.unwrap();

        assert_eq!(response.body(), b"ok");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["outer:pre", "inner:pre", "inner:post", "outer:post"]
        );
    }

    #[tokio::test]
    async fn empty_chain_calls_endpoint_directly() {
        let endpoint = |_req: Request| -> BoxFuture<'static, HandlerResult> {
            Box::pin(async { Ok(Response::text("bare")) })
        };
        let chain: Vec<Arc<dyn Middleware>> = Vec::new();

        let next = Next::new(&chain, &endpoint);
        let response = next.run(Request::detached(Method::Get, "/")).await.unwrap();
        assert_eq!(response.body(), b"bare");
    }
}
