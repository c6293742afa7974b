//! Signed, expiring cookie sessions.
//!
//! The session payload is a JSON object carried entirely in the cookie —
//! there is no server-side store. The cookie value is
//! `base64url(payload).issued-ts.base64url(tag)` where the HMAC-SHA256 tag
//! covers both payload and timestamp, so any bit flip invalidates the
//! cookie and expiry can be checked without trusting the client.
//!
//! Verification is fail-open: a missing, tampered, malformed, or expired
//! cookie yields a fresh empty session, never an error. Rejecting a
//! request over a bad session cookie would turn a stale browser state into
//! an outage.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::handler::{BoxFuture, HandlerResult};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

type HmacSha256 = Hmac<Sha256>;

// ── Session ───────────────────────────────────────────────────────────────────

/// A request-scoped, dictionary-like session.
///
/// Cloning is cheap and shares the same underlying data, so the session
/// middleware and the handler observe each other's writes. Mutations set a
/// dirty flag; the cookie is only re-emitted when the flag is set.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

#[derive(Default)]
struct SessionInner {
    data: Map<String, Value>,
    modified: bool,
}

impl Session {
    /// A fresh, empty, unmodified session.
    pub fn new() -> Self {
        Self::default()
    }

    fn from_map(data: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                data,
                modified: false,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().data.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let mut inner = self.lock();
        inner.data.insert(key.into(), value);
        inner.modified = true;
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut inner = self.lock();
        let removed = inner.data.remove(key);
        if removed.is_some() {
            inner.modified = true;
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.lock().data.is_empty()
    }

    /// Whether the session has been written to since it was loaded.
    pub fn modified(&self) -> bool {
        self.lock().modified
    }

    fn snapshot(&self) -> Map<String, Value> {
        self.lock().data.clone()
    }

    /// Read-only access to the underlying object, without touching the
    /// dirty flag.
    pub(crate) fn peek<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> R {
        f(&self.lock().data)
    }

    /// Mutable access; the closure reports whether it actually changed
    /// anything, which drives the dirty flag.
    pub(crate) fn mutate_if<R>(&self, f: impl FnOnce(&mut Map<String, Value>) -> (bool, R)) -> R {
        let mut inner = self.lock();
        let (changed, result) = f(&mut inner.data);
        if changed {
            inner.modified = true;
        }
        result
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Signs sessions into cookie values and verifies them back.
pub struct SessionCodec {
    secret: Vec<u8>,
    cookie_name: String,
    expiry: Option<Duration>,
    secure: bool,
}

impl SessionCodec {
    /// `expiry` of `None` produces session-lifetime cookies (no `Expires`
    /// attribute, no server-side expiry check).
    pub fn new(
        secret: impl Into<Vec<u8>>,
        cookie_name: impl Into<String>,
        expiry: Option<Duration>,
        secure: bool,
    ) -> Self {
        Self {
            secret: secret.into(),
            cookie_name: cookie_name.into(),
            expiry,
            secure,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Verifies and decodes an inbound cookie. Fail-open: any problem
    /// yields an empty session.
    pub fn load(&self, cookie: Option<&str>) -> Session {
        self.load_at(cookie, Utc::now())
    }

    fn load_at(&self, cookie: Option<&str>, now: DateTime<Utc>) -> Session {
        cookie
            .and_then(|value| self.decode_at(value, now))
            .map(Session::from_map)
            .unwrap_or_default()
    }

    /// Serializes the session onto the response as a `Set-Cookie` header.
    /// Skipped entirely when the session was never modified.
    pub fn save(&self, session: &Session, response: &mut Response) {
        self.save_at(session, response, Utc::now());
    }

    fn save_at(&self, session: &Session, response: &mut Response, now: DateTime<Utc>) {
        if !session.modified() {
            return;
        }
        let value = self.encode_at(&session.snapshot(), now);
        let mut cookie = format!("{}={value}", self.cookie_name);
        if let Some(expiry) = self.expiry {
            let expires = (now + expiry).format("%a, %d %b %Y %H:%M:%S GMT");
            cookie.push_str(&format!("; Expires={expires}"));
        }
        cookie.push_str("; Path=/; HttpOnly");
        if self.secure {
            cookie.push_str("; Secure");
        }
        response.set_cookie(cookie);
    }

    fn encode_at(&self, payload: &Map<String, Value>, issued: DateTime<Utc>) -> String {
        let json = serde_json::to_vec(payload).expect("session payload is a JSON object");
        let payload_b64 = URL_SAFE_NO_PAD.encode(json);
        let ts = issued.timestamp();
        let tag = self.tag(&payload_b64, ts);
        format!("{payload_b64}.{ts}.{}", URL_SAFE_NO_PAD.encode(tag))
    }

    fn decode_at(&self, value: &str, now: DateTime<Utc>) -> Option<Map<String, Value>> {
        let mut parts = value.split('.');
        let payload_b64 = parts.next()?;
        let ts: i64 = parts.next()?.parse().ok()?;
        let tag = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
        if parts.next().is_some() {
            return None;
        }

        let mut mac = self.mac(payload_b64, ts);
        mac.verify_slice(&tag).ok()?;

        if let Some(expiry) = self.expiry {
            let issued = DateTime::<Utc>::from_timestamp(ts, 0)?;
            if now > issued + expiry {
                return None;
            }
        }

        let json = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        serde_json::from_slice(&json).ok()
    }

    fn tag(&self, payload_b64: &str, ts: i64) -> Vec<u8> {
        self.mac(payload_b64, ts).finalize().into_bytes().to_vec()
    }

    fn mac(&self, payload_b64: &str, ts: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        mac.update(b".");
        mac.update(ts.to_string().as_bytes());
        mac
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// JSON signed-cookie session middleware.
///
/// Pre-phase: verify the inbound cookie and attach the session to the
/// request. Post-phase: re-sign the session onto the response if it
/// changed. An error short-circuit (404 and friends) skips the save.
pub struct SessionMiddleware {
    codec: SessionCodec,
}

impl SessionMiddleware {
    pub fn new(codec: SessionCodec) -> Self {
        Self { codec }
    }
}

impl Middleware for SessionMiddleware {
    fn call<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let session = self.codec.load(req.cookie(self.codec.cookie_name()));
            req.set_session(session.clone());
            let mut response = next.run(req).await?;
            self.codec.save(&session, &mut response);
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use serde_json::json;
    use std::sync::Arc;

    fn codec() -> SessionCodec {
        SessionCodec::new("secret", "session", Some(Duration::days(14)), false)
    }

    fn cookie_value(codec: &SessionCodec, session: &Session, now: DateTime<Utc>) -> String {
        let mut response = Response::status(200);
        codec.save_at(session, &mut response, now);
        let header = response.header("set-cookie").expect("cookie set").to_owned();
        let pair = header.split(';').next().unwrap();
        pair.split_once('=').unwrap().1.to_string()
    }

    #[test]
    fn round_trip_preserves_contents() {
        let codec = codec();
        let now = Utc::now();
        let session = Session::new();
        session.insert("user_id", json!(7));
        session.insert("name", json!("carl"));

        let value = cookie_value(&codec, &session, now);
        let loaded = codec.load_at(Some(&value), now);

        assert_eq!(loaded.get("user_id"), Some(json!(7)));
        assert_eq!(loaded.get("name"), Some(json!("carl")));
        assert!(!loaded.modified());
    }

    #[test]
    fn missing_cookie_is_empty_session() {
        let session = codec().load(None);
        assert!(session.is_empty());
        assert!(!session.modified());
    }

    #[test]
    fn wrong_secret_is_empty_session() {
        let now = Utc::now();
        let session = Session::new();
        session.insert("user_id", json!(7));
        let value = cookie_value(&codec(), &session, now);

        let other = SessionCodec::new("other", "session", Some(Duration::days(14)), false);
        assert!(other.load_at(Some(&value), now).is_empty());
    }

    #[test]
    fn tampered_value_is_empty_session() {
        let codec = codec();
        let now = Utc::now();
        let session = Session::new();
        session.insert("user_id", json!(7));
        let value = cookie_value(&codec, &session, now);

        let tampered = format!("A{}", &value[1..]);
        assert!(codec.load_at(Some(&tampered), now).is_empty());
        assert!(codec.load_at(Some("garbage"), now).is_empty());
    }

    #[test]
    fn expired_cookie_is_empty_session() {
        let codec = codec();
        let issued = Utc::now();
        let session = Session::new();
        session.insert("user_id", json!(7));
        let value = cookie_value(&codec, &session, issued);

        let later = issued + Duration::days(15);
        assert!(codec.load_at(Some(&value), later).is_empty());

        // Still fine just inside the window.
        let sooner = issued + Duration::days(13);
        assert!(!codec.load_at(Some(&value), sooner).is_empty());
    }

    #[test]
    fn no_expiry_configured_never_expires() {
        let codec = SessionCodec::new("secret", "session", None, false);
        let issued = Utc::now();
        let session = Session::new();
        session.insert("user_id", json!(7));
        let value = cookie_value(&codec, &session, issued);

        let later = issued + Duration::days(4000);
        assert!(!codec.load_at(Some(&value), later).is_empty());
    }

    #[test]
    fn unmodified_session_is_not_saved() {
        let codec = codec();
        let mut response = Response::status(200);
        codec.save(&Session::new(), &mut response);
        assert!(response.header("set-cookie").is_none());
    }

    #[test]
    fn cookie_attributes() {
        let now = Utc::now();
        let session = Session::new();
        session.insert("k", json!(1));

        let secure = SessionCodec::new("secret", "sid", Some(Duration::days(1)), true);
        let mut response = Response::status(200);
        secure.save_at(&session, &mut response, now);
        let header = response.header("set-cookie").unwrap();
        assert!(header.starts_with("sid="));
        assert!(header.contains("; HttpOnly"));
        assert!(header.contains("; Secure"));
        assert!(header.contains("; Expires="));

        let plain = SessionCodec::new("secret", "sid", None, false);
        let mut response = Response::status(200);
        plain.save_at(&session, &mut response, now);
        let header = response.header("set-cookie").unwrap();
        assert!(header.contains("; HttpOnly"));
        assert!(!header.contains("Secure"));
        assert!(!header.contains("Expires"));
    }

    #[test]
    fn remove_of_absent_key_is_not_a_modification() {
        let session = Session::new();
        assert!(session.remove("nope").is_none());
        assert!(!session.modified());
    }

    #[tokio::test]
    async fn middleware_attaches_and_saves_session() {
        let middleware = SessionMiddleware::new(codec());
        let chain: Vec<Arc<dyn Middleware>> = Vec::new();
        let endpoint = |req: Request| -> BoxFuture<'static, HandlerResult> {
            req.session().insert("seen", json!(true));
            Box::pin(async { Ok(Response::text("ok")) })
        };

        let next = Next::new(&chain, &endpoint);
        let req = Request::detached(Method::Get, "/");
        let response = middleware.call(req, next).await.unwrap();
        let cookie = response.header("set-cookie").unwrap();
        assert!(cookie.starts_with("session="));
    }

    #[tokio::test]
    async fn middleware_skips_save_when_untouched() {
        let middleware = SessionMiddleware::new(codec());
        let chain: Vec<Arc<dyn Middleware>> = Vec::new();
        let endpoint = |_req: Request| -> BoxFuture<'static, HandlerResult> {
            Box::pin(async { Ok(Response::text("ok")) })
        };

        let next = Next::new(&chain, &endpoint);
        let req = Request::detached(Method::Get, "/");
        let response = middleware.call(req, next).await.unwrap();
        assert!(response.header("set-cookie").is_none());
    }
}
