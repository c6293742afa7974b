//! Test utilities.
//!
//! [`TestClient`] drives [`App::handle`] directly — no sockets, no server —
//! so integration tests exercise the full middleware chain and dispatch
//! without binding a port.

use crate::app::App;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

/// Builds a [`Request`] by hand.
pub struct TestRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TestRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Assembles the request against an app.
    pub fn build(self, app: &App) -> Request {
        let mut headers = self.headers;
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.push(("cookie".to_string(), cookie));
        }
        app.new_request(self.method, self.path, self.query, headers, self.body)
    }
}

/// Drives an app end to end, one request at a time.
pub struct TestClient {
    app: App,
}

impl TestClient {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub async fn get(&self, path: &str) -> Response {
        self.request(TestRequest::get(path)).await
    }

    pub async fn request(&self, request: TestRequest) -> Response {
        let request = request.build(&self.app);
        self.app.handle(request).await
    }

    /// Extracts the `name=value` pair out of a response's first matching
    /// `Set-Cookie` header, for replaying on a follow-up request.
    pub fn cookie_pair(response: &Response, name: &str) -> Option<(String, String)> {
        response
            .header_values("set-cookie")
            .into_iter()
            .filter_map(|header| header.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(k, v)| (k.to_string(), v.to_string()))
    }
}

/// Asserts two URLs are equivalent modulo query-parameter order. Order of
/// multiple values for one key still matters.
///
/// # Panics
///
/// Panics (as an assertion) when the URLs differ.
pub fn assert_same_url(actual: &str, expected: &str) {
    fn decompose(url: &str) -> (String, Vec<(String, String)>) {
        match url::Url::parse(url) {
            Ok(parsed) => {
                let mut query: Vec<(String, String)> =
                    parsed.query_pairs().into_owned().collect();
                query.sort();
                let mut base = parsed.clone();
                base.set_query(None);
                (base.to_string(), query)
            }
            Err(_) => (url.to_string(), Vec::new()),
        }
    }

    let (actual_base, actual_query) = decompose(actual);
    let (expected_base, expected_query) = decompose(expected);
    assert_eq!(actual_base, expected_base, "URL mismatch: {actual} vs {expected}");
    assert_eq!(
        actual_query, expected_query,
        "query mismatch: {actual} vs {expected}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_url_ignores_query_order() {
        assert_same_url("http://h/p?a=1&b=2", "http://h/p?b=2&a=1");
    }

    #[test]
    #[should_panic(expected = "query mismatch")]
    fn different_query_values_fail() {
        assert_same_url("http://h/p?a=1", "http://h/p?a=2");
    }

    #[test]
    fn extracts_cookie_pair() {
        let mut response = Response::status(200);
        response.set_cookie("session=abc.1.def; Path=/; HttpOnly");
        let (name, value) = TestClient::cookie_pair(&response, "session").unwrap();
        assert_eq!(name, "session");
        assert_eq!(value, "abc.1.def");
    }
}
