use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use xqueue_core::error::XqueueError;

/// The `{return_code, content}` envelope every xqueue endpoint returns.
///
/// `return_code` is `0` on success, `1` on failure; `content` carries either
/// the payload or a human-readable failure message. HTTP status stays 200 for
/// every request-shape and auth failure (§7) — the envelope carries the
/// failure so the LMS never has to special-case a non-2xx response.
#[derive(Serialize)]
pub struct Envelope<T> {
    return_code: u8,
    content: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(content: T) -> Response {
        Json(Envelope { return_code: 0, content }).into_response()
    }
}

impl Envelope<String> {
    pub fn fail(message: impl Into<String>) -> Response {
        Json(Envelope {
            return_code: 1,
            content: message.into(),
        })
        .into_response()
    }
}

impl IntoResponse for XqueueError {
    fn into_response(self) -> Response {
        match self {
            Self::UnknownQueue(_)
            | Self::InvalidRequest(_)
            | Self::NotFound(_)
            | Self::PullkeyMismatch(_)
            | Self::Storage(_)
            | Self::Blob(_) => Envelope::<String>::fail(self.to_string()),
            Self::Unauthorized => Envelope::<String>::fail("login_required"),
            Self::Config(msg) => {
                tracing::error!(error = %msg, "configuration error reached the request path");
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
        }
    }
}
