//! Pluggable external-login backends.
//!
//! A backend covers one login attempt: build the provider's authorize URL,
//! exchange the callback's `code` for an access token, fetch a profile.
//! Nothing is persisted; the flow's state lives in the URLs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::middleware::Middleware;

mod dummy;
mod facebook;

pub use dummy::{DummyOAuth, DUMMY_FORM_URL};
pub use facebook::FacebookOAuth;

/// The provider rejected the exchange, or the callback carried no
/// authorization code. The message is human-readable and suitable for
/// display.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct OAuthError(pub String);

impl OAuthError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An OAuth login backend.
#[async_trait]
pub trait OAuthBackend: Send + Sync {
    /// The authorization URL to send the user to.
    fn authorize_url(&self) -> String;

    /// Profile data for a newly-authenticated user.
    ///
    /// `args` is the query-string data of the provider's redirect back to
    /// us. Blocking network calls happen here, synchronously from the
    /// caller's point of view; resilience (timeouts, retries) is the
    /// caller's concern.
    async fn user_data(
        &self,
        args: &HashMap<String, String>,
    ) -> Result<Map<String, Value>, OAuthError>;

    /// A middleware the backend wants wrapped around the application
    /// (outermost). The dummy backend uses this to serve its login form.
    fn app_middleware(&self) -> Option<Arc<dyn Middleware>> {
        None
    }
}
