//! Process-global logging setup.
//!
//! Installing a tracing subscriber is global mutable state, so it never
//! happens implicitly: call [`configure_logging`] once from `main`, or
//! install your own subscriber and skip this entirely.

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Error;

/// Initializes the global tracing subscriber from app configuration.
///
/// `app.log_filter` holds an env-filter directive (`info,hyper=warn`);
/// without it the `RUST_LOG` environment variable applies. Calling this a
/// second time — or after any other subscriber was installed — is an
/// [`Error::Logging`].
pub fn configure_logging(config: &Config) -> Result<(), Error> {
    let filter = match config.get("app.log_filter") {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|e| Error::Logging(e.to_string()))?
        }
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_filter_directive() {
        let config = Config::from_map([("app.log_filter", "app=notalevel")]);
        assert!(matches!(
            configure_logging(&config),
            Err(Error::Logging(_))
        ));
    }
}
