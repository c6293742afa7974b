//! Dummy OAuth backend for testing and local development.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{OAuthBackend, OAuthError};
use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// The path the dummy backend's login form lives at.
pub const DUMMY_FORM_URL: &str = "/__dummy_oauth/";

const USER_FORM: &str = r#"<html>
<head>
<title>Dummy OAuth login form</title>
</head>
<body>
<form id="dummy-oauth-form" method="GET" action="{redirect_uri}">
Username: <input type="text" name="username">
Email: <input type="text" name="email">
Name: <input type="text" name="name">
<button type="submit">Submit</button>
</form>
</body>
</html>
"#;

/// Rather than redirecting to an external provider, this backend redirects
/// to a form served by its own app middleware; the submitted form fields
/// come back as the "user data".
pub struct DummyOAuth {
    redirect_uri: String,
}

impl DummyOAuth {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
        }
    }
}

#[async_trait]
impl OAuthBackend for DummyOAuth {
    fn authorize_url(&self) -> String {
        DUMMY_FORM_URL.to_string()
    }

    /// Echoes the callback args back as user data.
    async fn user_data(
        &self,
        args: &HashMap<String, String>,
    ) -> Result<Map<String, Value>, OAuthError> {
        Ok(args
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect())
    }

    fn app_middleware(&self) -> Option<Arc<dyn Middleware>> {
        Some(Arc::new(DummyFormMiddleware {
            redirect_uri: self.redirect_uri.clone(),
        }))
    }
}

/// Intercepts [`DUMMY_FORM_URL`] and serves the user-data form; everything
/// else passes through.
struct DummyFormMiddleware {
    redirect_uri: String,
}

impl Middleware for DummyFormMiddleware {
    fn call<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if req.path() == DUMMY_FORM_URL {
                return Ok(Response::html(
                    USER_FORM.replace("{redirect_uri}", &self.redirect_uri),
                ));
            }
            next.run(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    #[test]
    fn authorize_url_is_the_form_url() {
        let backend = DummyOAuth::new("/redirect/");
        assert_eq!(backend.authorize_url(), DUMMY_FORM_URL);
    }

    #[tokio::test]
    async fn user_data_echoes_args() {
        let backend = DummyOAuth::new("/redirect/");
        let args = HashMap::from([("foo".to_string(), "bar".to_string())]);

        let data = backend.user_data(&args).await.unwrap();
        assert_eq!(data.get("foo"), Some(&Value::String("bar".to_string())));
        assert_eq!(data.len(), 1);
    }

    #[tokio::test]
    async fn middleware_serves_form_at_fixed_path() {
        let middleware = DummyFormMiddleware {
            redirect_uri: "/redirect/".to_string(),
        };
        let chain: Vec<Arc<dyn Middleware>> = Vec::new();
        let endpoint = |_req: Request| -> BoxFuture<'static, HandlerResult> {
            Box::pin(async { Ok(Response::text("wrapped app")) })
        };

        let next = Next::new(&chain, &endpoint);
        let response = middleware
            .call(Request::detached(Method::Get, DUMMY_FORM_URL), next)
            .await
            .unwrap();
        let body = String::from_utf8_lossy(response.body()).into_owned();
        assert!(body.contains("action=\"/redirect/\""));

        let next = Next::new(&chain, &endpoint);
        let response = middleware
            .call(Request::detached(Method::Get, "/elsewhere/"), next)
            .await
            .unwrap();
        assert_eq!(response.body(), b"wrapped app");
    }
}
