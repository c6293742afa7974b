//! Incoming HTTP request type.

use std::collections::HashMap;

use crate::app::App;
use crate::flash::Flash;
use crate::method::Method;
use crate::session::Session;

/// An incoming HTTP request.
///
/// Carries a back-reference to the [`App`] that is handling it, so handlers
/// and middleware can reach configuration, `redirect_to`, the template
/// renderer, and friends. The session slot is populated by the session
/// middleware before dispatch.
pub struct Request {
    app: Option<App>,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    cookies: HashMap<String, String>,
    body: Vec<u8>,
    session: Session,
}

impl Request {
    pub(crate) fn new(
        app: App,
        method: Method,
        path: String,
        query: Vec<(String, String)>,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Self {
        let cookies = parse_cookies(&headers);
        Self {
            app: Some(app),
            method,
            path,
            query,
            headers,
            cookies,
            body,
            session: Session::new(),
        }
    }

    /// A request with no application attached, for exercising dispatchers
    /// and middleware in isolation.
    #[cfg(test)]
    pub(crate) fn detached(method: Method, path: &str) -> Self {
        Self {
            app: None,
            method,
            path: path.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
            cookies: HashMap::new(),
            body: Vec::new(),
            session: Session::new(),
        }
    }

    /// The application handling this request.
    ///
    /// # Panics
    ///
    /// Panics if the request was built without an application, which only
    /// happens in unit tests that construct requests by hand.
    pub fn app(&self) -> &App {
        self.app.as_ref().expect("request not attached to an app")
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup; first value wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// A query-string parameter; the last occurrence wins.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All query-string parameters as a map (last occurrence wins), in the
    /// shape OAuth callbacks consume.
    pub fn query_args(&self) -> HashMap<String, String> {
        self.query.iter().cloned().collect()
    }

    /// The session attached by the session middleware. A cheap handle:
    /// clones share the same underlying data.
    pub fn session(&self) -> Session {
        self.session.clone()
    }

    pub(crate) fn set_session(&mut self, session: Session) {
        self.session = session;
    }

    /// Flash queue over this request's session.
    pub fn flash(&self) -> Flash {
        Flash::new(self.session())
    }
}

fn parse_cookies(headers: &[(String, String)]) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for (name, value) in headers {
        if !name.eq_ignore_ascii_case("cookie") {
            continue;
        }
        for pair in value.split(';') {
            if let Some((k, v)) = pair.trim().split_once('=') {
                cookies.insert(k.to_string(), v.to_string());
            }
        }
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cookie_header() {
        let headers = vec![
            ("Cookie".to_string(), "a=1; session=abc.def".to_string()),
            ("x-other".to_string(), "ignored".to_string()),
        ];
        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("session").map(String::as_str), Some("abc.def"));
    }

    #[test]
    fn query_last_occurrence_wins() {
        let mut req = Request::detached(Method::Get, "/");
        req.query = vec![
            ("limit".to_string(), "10".to_string()),
            ("limit".to_string(), "20".to_string()),
        ];
        assert_eq!(req.query("limit"), Some("20"));
        assert_eq!(req.query_args().get("limit").map(String::as_str), Some("20"));
    }
}
