//! Cookie-based login for the web interface.
//!
//! A successful login sets a signed session cookie. [`require_login`] is
//! layered in front of protected routes and redirects anonymous requests to
//! the login page.

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use serde::Deserialize;
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::crypto::RandomSource;
use crate::web::handlers::AppState;
use crate::web::pages;
use crate::Config;

pub const SESSION_COOKIE: &str = "smsrelay_session";

/// Build the cookie signing key.
///
/// A configured secret is stretched with SHA-512 so sessions survive restarts;
/// otherwise a random key is drawn and sessions end with the process.
pub fn cookie_key(secret: Option<&str>, rng: &dyn RandomSource) -> Key {
    match secret {
        Some(secret) => Key::from(Sha512::digest(secret.as_bytes()).as_slice()),
        None => Key::from(rng.bytes(64).as_slice()),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

fn is_logged_in(jar: &SignedCookieJar) -> bool {
    jar.get(SESSION_COOKIE).is_some()
}

/// Compare submitted credentials in constant time.
fn credentials_match(config: &Config, username: &str, password: &str) -> bool {
    let Some(expected_password) = config.web_password.as_deref() else {
        return false;
    };

    let user_ok = config.web_username.as_bytes().ct_eq(username.as_bytes());
    let pass_ok = expected_password.as_bytes().ct_eq(password.as_bytes());
    (user_ok & pass_ok).into()
}

/// Only same-origin relative paths are honoured as redirect targets.
fn safe_next(next: &str) -> Option<&str> {
    if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') {
        Some(next)
    } else {
        None
    }
}

/// Login form.
pub async fn login_page(jar: SignedCookieJar) -> Response {
    if is_logged_in(&jar) {
        return Redirect::to("/").into_response();
    }
    Html(pages::login_page(None)).into_response()
}

/// Login form submission.
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<NextQuery>,
    jar: SignedCookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if !credentials_match(&state.config, &form.username, &form.password) {
        warn!(
            username = %form.username,
            password_configured = state.config.web_password.is_some(),
            "login_failed"
        );
        return (
            StatusCode::UNAUTHORIZED,
            Html(pages::login_page(Some("Invalid username or password."))),
        )
            .into_response();
    }

    info!(username = %form.username, "login_succeeded");

    let cookie = Cookie::build((SESSION_COOKIE, form.username))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    let target = query
        .next
        .as_deref()
        .and_then(safe_next)
        .unwrap_or("/")
        .to_string();

    (jar.add(cookie), Redirect::to(&target)).into_response()
}

/// Clear the session and return to the login page.
pub async fn logout(jar: SignedCookieJar) -> (SignedCookieJar, Redirect) {
    info!("logout");
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login"),
    )
}

/// Middleware that redirects anonymous requests to `/login?next=<path>`.
pub async fn require_login(jar: SignedCookieJar, request: Request, next: Next) -> Response {
    if is_logged_in(&jar) {
        return next.run(request).await;
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("next", request.uri().path())
        .finish();

    Redirect::to(&format!("/login?{}", query)).into_response()
}
