use axum::response::Response;

use crate::error::Envelope;

pub async fn status() -> Response {
    Envelope::ok("OK")
}
