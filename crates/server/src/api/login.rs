use axum::extract::{Form, State};
use axum::response::Response;
use serde::Deserialize;

use crate::auth::{sign_session, verify_password};
use crate::auth::middleware::cookie_header;
use crate::error::Envelope;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

/// `GET /xqueue/login/` always reports `login_required` — the LMS uses this as
/// a signal to (re-)submit credentials, matching the reference system's
/// `log_in` view returning the same failure on anything but a `POST`.
pub async fn login_required() -> Response {
    Envelope::<String>::fail("login_required")
}

/// `POST /xqueue/login/`: checks `username`/`password` against the hashed
/// credentials in the user store (populated by `update-users`), not against
/// the TOML config directly (§6).
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let hash = match state.users.password_hash(&form.username).await {
        Ok(Some(hash)) => hash,
        Ok(None) => return Envelope::<String>::fail("Incorrect login credentials"),
        Err(e) => {
            tracing::error!(error = %e, "user store lookup failed during login");
            return Envelope::<String>::fail("Incorrect login credentials");
        }
    };

    if !verify_password(&hash, &form.password) {
        return Envelope::<String>::fail("Incorrect login credentials");
    }

    let token = sign_session(&state.session, &form.username);
    let mut response = Envelope::ok("Logged in");
    if let Ok(value) = axum::http::HeaderValue::from_str(&cookie_header(&token)) {
        response.headers_mut().append(axum::http::header::SET_COOKIE, value);
    }
    response
}
