use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use xqueue_core::error::XqueueError;

use super::session::{sign_session, verify_session};
use crate::state::AppState;

/// Name of the session cookie set by `/xqueue/login/` and read by this middleware.
pub const SESSION_COOKIE: &str = "xqueue_session";

/// Gates the pull/push/intake surface on a valid session cookie.
///
/// Grounded on the layering in the teacher's `api/mod.rs` (auth applied to a
/// `protected` router group as a single layer); implemented as `from_fn_with_state`
/// rather than a custom `tower::Layer` since there is only one auth scheme here.
/// On success, the session is refreshed (a fresh cookie with a renewed expiry is
/// set on the response) per SPEC_FULL.md's "refreshed on use".
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, XqueueError> {
    let username = extract_cookie(&request, SESSION_COOKIE)
        .and_then(|token| verify_session(&state.session, &token))
        .ok_or(XqueueError::Unauthorized)?;

    request.extensions_mut().insert(AuthenticatedUser(username.clone()));

    let mut response = next.run(request).await;
    let refreshed = sign_session(&state.session, &username);
    if let Ok(value) = header::HeaderValue::from_str(&cookie_header(&refreshed)) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}

/// The username bound to the current request's session, inserted by [`require_session`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

pub fn cookie_header(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

fn extract_cookie(request: &Request, name: &str) -> Option<String> {
    let raw = request.headers().get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}
