use axum::response::Response;

use crate::auth::middleware::SESSION_COOKIE;
use crate::error::Envelope;

pub async fn logout() -> Response {
    let mut response = Envelope::ok("Goodbye");
    let expired = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if let Ok(value) = axum::http::HeaderValue::from_str(&expired) {
        response.headers_mut().append(axum::http::header::SET_COOKIE, value);
    }
    response
}
