//! Minimal trellis example — flash messages, sessions, and a dummy OAuth
//! login.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -v http://localhost:3000/
//!   curl -v http://localhost:3000/thing/42/
//!   curl -v http://localhost:3000/login/
//!   curl -v http://localhost:3000/admin/        # redirects until logged in

use std::sync::Arc;

use serde_json::{json, Value};
use trellis::oauth::{DummyOAuth, OAuthBackend};
use trellis::{
    configure_logging, redirect_if, App, Config, HandlerResult, MapDispatcher, PathArgs, Request,
    Response, RuleSet, Server,
};

#[tokio::main]
async fn main() {
    let mut config = Config::from_map([
        ("app.secret_key", "demo-secret-change-me"),
        ("app.base_url", "http://localhost:3000"),
        ("session.expiry_days", "14"),
    ]);
    config.read_from_os_env("DEMO_");

    let oauth: Arc<DummyOAuth> = Arc::new(DummyOAuth::new("/oauth/callback/"));

    let rules = RuleSet::new()
        .rule("/", "home")
        .rule("/thing/<int:thing_id>/", "thing")
        .rule("/login/", "login")
        .rule("/oauth/callback/", "callback")
        .rule("/admin/", "admin");

    let login_backend = Arc::clone(&oauth);
    let callback_backend = Arc::clone(&oauth);

    let dispatcher = MapDispatcher::new(rules)
        .handler("home", home)
        .handler("thing", show_thing)
        .handler("login", move |req: Request, _args: PathArgs| {
            let url = login_backend.authorize_url();
            async move { Ok::<_, trellis::HttpError>(req.app().redirect_to(&url, &[])?) }
        })
        .handler("callback", move |req: Request, _args: PathArgs| {
            let backend = Arc::clone(&callback_backend);
            async move {
                let user = backend.user_data(&req.query_args()).await?;
                req.session().insert("user", Value::Object(user));
                req.flash().success("Logged in!");
                Ok::<_, trellis::HttpError>(req.app().redirect_to("home", &[])?)
            }
        })
        .handler("admin", redirect_if(logged_in, "login", admin));

    let app = App::builder(config, ".")
        .dispatcher(dispatcher)
        .oauth(oauth)
        .build()
        .expect("app configuration");

    configure_logging(app.config()).expect("logging setup");

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

fn logged_in(req: &Request) -> bool {
    req.session().contains("user")
}

// GET /
async fn home(req: Request, _args: PathArgs) -> Response {
    let messages: Vec<String> = req
        .flash()
        .get_and_clear()
        .map(|m| m.message)
        .collect();
    let user = req
        .session()
        .get("user")
        .and_then(|u| u.get("username").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| "stranger".to_string());
    Response::html(format!(
        "<h1>hello, {user}</h1><ul>{}</ul>",
        messages
            .iter()
            .map(|m| format!("<li>{m}</li>"))
            .collect::<String>()
    ))
}

// GET /thing/<int:thing_id>/
async fn show_thing(req: Request, args: PathArgs) -> HandlerResult {
    let id = args.int("thing_id").unwrap_or(0);
    req.session().insert("last_thing", json!(id));
    Ok(Response::text(format!("thing id: {id}")))
}

// GET /admin/ — only with a logged-in session, otherwise redirected to login
async fn admin(_req: Request, _args: PathArgs) -> Response {
    Response::html("<h1>admin</h1>")
}
