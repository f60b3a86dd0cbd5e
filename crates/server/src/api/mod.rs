mod get_queuelen;
mod get_submission;
mod login;
mod logout;
mod put_result;
mod status;
mod submit;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_session;
use crate::state::AppState;

/// Builds the full xqueue HTTP surface (§6).
///
/// Grounded on the teacher's `api::router` shape: a `public` group and a
/// `protected` group merged together, with the auth layer applied only to
/// the protected group.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/xqueue/login/", post(login::login).get(login::login_required))
        .route("/xqueue/status/", get(status::status));

    let protected = Router::new()
        .route("/xqueue/logout/", post(logout::logout))
        .route("/xqueue/submit/", post(submit::submit))
        .route("/xqueue/get_queuelen/", get(get_queuelen::get_queuelen))
        .route("/xqueue/get_submission/", get(get_submission::get_submission))
        .route("/xqueue/put_result/", post(put_result::put_result))
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
