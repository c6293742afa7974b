//! Crate-level error type.
//!
//! HTTP-level conditions (404, redirects) are not `Error`s — they travel as
//! [`HttpError`](crate::HttpError) and are converted into responses at the
//! application boundary. This type surfaces the failures that should stop a
//! program: bad configuration, unbuildable URLs, template problems, I/O.

use crate::config::ConfigError;
use crate::oauth::OAuthError;
use crate::routes::RouteBuildError;

/// The error type returned by trellis's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    RouteBuild(#[from] RouteBuildError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error("template: {0}")]
    Template(#[from] minijinja::Error),

    #[error("asset bundle: {0}")]
    Assets(String),

    #[error("invalid base URL `{0}`")]
    BadBaseUrl(String),

    #[error("logging: {0}")]
    Logging(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
