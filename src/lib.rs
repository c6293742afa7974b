//! # trellis
//!
//! A small personal web-application toolkit. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! trellis is a convenience layer over things that already exist: a radix
//! tree matches URLs, minijinja renders templates, HMAC signs cookies,
//! hyper moves bytes. What trellis adds is the glue a small application
//! keeps rewriting:
//!
//! - **Dispatch** — typed URL patterns bound to named endpoints bound to
//!   handlers, with reverse URL building ([`RuleSet`], [`MapDispatcher`])
//! - **Middleware** — an ordered wrap-style chain around dispatch
//!   ([`Middleware`])
//! - **Sessions** — signed, expiring, fail-open cookie sessions
//!   ([`Session`], [`SessionCodec`])
//! - **Flash** — one-time messages carried in the session ([`Flash`])
//! - **Config** — flat dotted keys from INI files and the environment,
//!   with typed accessors ([`Config`])
//! - **OAuth** — pluggable external-login backends ([`oauth`])
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use trellis::{App, Config, MapDispatcher, PathArgs, Request, Response, RuleSet, Server};
//!
//! async fn show_thing(req: Request, args: PathArgs) -> Response {
//!     let id = args.int("thing_id").unwrap_or(0);
//!     req.flash().success(format!("looked at thing {id}"));
//!     Response::text(format!("thing id: {id}"))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = Config::new();
//!     config.read_from_os_env("MYAPP_");
//!     config.update([("app.secret_key", "change-me")]);
//!
//!     let dispatcher = MapDispatcher::new(
//!         RuleSet::new().rule("/thing/<int:thing_id>/", "thing"),
//!     )
//!     .handler("thing", show_thing);
//!
//!     let app = App::builder(config, ".")
//!         .dispatcher(dispatcher)
//!         .build()
//!         .expect("app configuration");
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await.unwrap();
//! }
//! ```

mod app;
mod assets;
mod config;
mod dispatch;
mod error;
mod flash;
mod handler;
mod log;
mod method;
mod middleware;
mod request;
mod response;
mod routes;
mod server;
mod session;
mod templates;

pub mod oauth;
pub mod testing;

pub use app::{redirect_if, App, AppBuilder};
pub use assets::{AssetRegistry, Bundle};
pub use config::{Config, ConfigError};
pub use dispatch::{Dispatcher, HttpError, MapDispatcher, NullDispatcher};
pub use error::Error;
pub use flash::{Flash, FlashMessage, Level};
pub use handler::{BoxFuture, Handler, HandlerResult, IntoHandlerResult};
pub use log::configure_logging;
pub use method::Method;
pub use middleware::{Middleware, Next};
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use routes::{ParamValue, PathArgs, RouteBuildError, RuleSet};
pub use server::Server;
pub use session::{Session, SessionCodec, SessionMiddleware};
pub use templates::{ContextProcessor, TemplateRenderer};
