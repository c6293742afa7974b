//! OAuth backend for Facebook login.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

use super::{OAuthBackend, OAuthError};

const AUTHORIZE_URL: &str = "https://graph.facebook.com/oauth/authorize";
const ACCESS_TOKEN_URL: &str = "https://graph.facebook.com/oauth/access_token";
const PROFILE_URL: &str = "https://graph.facebook.com/me";

/// Profile fields requested from the provider; anything else it returns is
/// discarded.
const PROFILE_FIELDS: [&str; 9] = [
    "username",
    "first_name",
    "middle_name",
    "last_name",
    "name",
    "locale",
    "gender",
    "timezone",
    "email",
];

pub struct FacebookOAuth {
    redirect_uri: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

impl FacebookOAuth {
    pub fn new(
        redirect_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Exchanges an authorization code for an access token.
    async fn access_token(&self, code: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .get(ACCESS_TOKEN_URL)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::new(format!("token exchange failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OAuthError::new(format!("token exchange failed: {e}")))?;

        if !status.is_success() {
            return Err(OAuthError::new(provider_error_message(&body)));
        }
        parse_access_token(&body)
            .ok_or_else(|| OAuthError::new("no access token in provider response"))
    }

    /// Fetches the allow-listed profile fields with an access token.
    async fn profile(&self, access_token: &str) -> Result<Map<String, Value>, OAuthError> {
        let fields = PROFILE_FIELDS.join(",");
        let data: Value = self
            .http
            .get(PROFILE_URL)
            .query(&[("access_token", access_token), ("fields", fields.as_str())])
            .send()
            .await
            .map_err(|e| OAuthError::new(format!("profile fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| OAuthError::new(format!("profile fetch failed: {e}")))?;

        match data {
            Value::Object(map) => Ok(filter_profile(map)),
            _ => Err(OAuthError::new("profile response is not an object")),
        }
    }
}

#[async_trait]
impl OAuthBackend for FacebookOAuth {
    fn authorize_url(&self) -> String {
        Url::parse_with_params(
            AUTHORIZE_URL,
            [
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", "email"),
            ],
        )
        .expect("authorize URL is well-formed")
        .to_string()
    }

    async fn user_data(
        &self,
        args: &HashMap<String, String>,
    ) -> Result<Map<String, Value>, OAuthError> {
        let code = args.get("code").ok_or_else(|| {
            OAuthError::new("Sorry, we couldn't get your login info from Facebook!")
        })?;
        let access_token = self.access_token(code).await?;
        self.profile(&access_token).await
    }
}

/// The provider's error message out of a JSON error body, or the body
/// itself when it is not in the expected shape.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message")?.as_str().map(str::to_owned))
        .unwrap_or_else(|| body.to_string())
}

/// The token-exchange response is query-string encoded; the last
/// `access_token` value wins.
fn parse_access_token(body: &str) -> Option<String> {
    url::form_urlencoded::parse(body.as_bytes())
        .filter(|(k, _)| k == "access_token")
        .map(|(_, v)| v.into_owned())
        .last()
}

fn filter_profile(mut data: Map<String, Value>) -> Map<String, Value> {
    data.retain(|k, _| PROFILE_FIELDS.contains(&k.as_str()));
    data
}
